use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Discriminates every frame exchanged between peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireKind {
    #[serde(rename = "USER_MESSAGE")]
    UserMessage,
    #[serde(rename = "SYSTEM_MESSAGE")]
    SystemMessage,
    #[serde(rename = "ASK_REQUEST")]
    AskRequest,
    #[serde(rename = "ASK_RESPONSE")]
    AskResponse,
    #[serde(rename = "HANDSHAKE")]
    Handshake,
    #[serde(rename = "HEARTBEAT")]
    Heartbeat,
}

/// The JSON envelope carried in every frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireEnvelope {
    pub kind: WireKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message_type: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_path: Option<String>,
    pub timestamp_ms: u64,
}

/// Payload of a `Handshake` frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    pub system: String,
    pub address: String,
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl WireEnvelope {
    pub fn user(
        target_path: String,
        message_type: String,
        payload: Value,
        sender_path: Option<String>,
    ) -> WireEnvelope {
        WireEnvelope {
            kind: WireKind::UserMessage,
            target_path,
            message_type,
            payload,
            correlation_id: None,
            sender_path,
            timestamp_ms: now_ms(),
        }
    }

    pub fn system(target_path: String, message_type: String, payload: Value) -> WireEnvelope {
        WireEnvelope {
            kind: WireKind::SystemMessage,
            target_path,
            message_type,
            payload,
            correlation_id: None,
            sender_path: None,
            timestamp_ms: now_ms(),
        }
    }

    pub fn ask_request(
        target_path: String,
        message_type: String,
        payload: Value,
        correlation_id: Uuid,
        sender_path: Option<String>,
    ) -> WireEnvelope {
        WireEnvelope {
            kind: WireKind::AskRequest,
            target_path,
            message_type,
            payload,
            correlation_id: Some(correlation_id),
            sender_path,
            timestamp_ms: now_ms(),
        }
    }

    pub fn ask_response(
        correlation_id: Uuid,
        message_type: String,
        payload: Value,
    ) -> WireEnvelope {
        WireEnvelope {
            kind: WireKind::AskResponse,
            target_path: String::new(),
            message_type,
            payload,
            correlation_id: Some(correlation_id),
            sender_path: None,
            timestamp_ms: now_ms(),
        }
    }

    pub fn handshake(system: &str, address: &str) -> WireEnvelope {
        WireEnvelope {
            kind: WireKind::Handshake,
            target_path: String::new(),
            message_type: String::new(),
            payload: serde_json::json!({ "system": system, "address": address }),
            correlation_id: None,
            sender_path: None,
            timestamp_ms: now_ms(),
        }
    }

    pub fn heartbeat() -> WireEnvelope {
        WireEnvelope {
            kind: WireKind::Heartbeat,
            target_path: String::new(),
            message_type: String::new(),
            payload: Value::Null,
            correlation_id: None,
            sender_path: None,
            timestamp_ms: now_ms(),
        }
    }

    pub fn handshake_info(&self) -> Option<Handshake> {
        if self.kind != WireKind::Handshake {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_tags_are_screaming_snake() {
        let json = serde_json::to_string(&WireKind::AskRequest).unwrap();
        assert_eq!(json, "\"ASK_REQUEST\"");
        let back: WireKind = serde_json::from_str("\"HEARTBEAT\"").unwrap();
        assert_eq!(back, WireKind::Heartbeat);
    }

    #[test]
    fn handshake_payload_round_trips() {
        let env = WireEnvelope::handshake("sys", "movie.tcp://sys@127.0.0.1:2552");
        let info = env.handshake_info().unwrap();
        assert_eq!(info.system, "sys");
        assert_eq!(info.address, "movie.tcp://sys@127.0.0.1:2552");
        assert!(WireEnvelope::heartbeat().handshake_info().is_none());
    }
}
