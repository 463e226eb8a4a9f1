use std::any::TypeId;

use dashmap::DashMap;
use lazy_static::lazy_static;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::remote::WireError;
use crate::{AnyMessage, Message};

/// A message that can cross the wire.
pub trait RemoteMessage: Message + Serialize + DeserializeOwned {}
impl<T: Message + Serialize + DeserializeOwned> RemoteMessage for T {}

type DeserializeFn = Box<dyn Fn(&Value) -> Result<AnyMessage, WireError> + Send + Sync>;
type SerializeFn = Box<dyn Fn(&(dyn std::any::Any + Send)) -> Result<Value, WireError> + Send + Sync>;

struct TypeEntry {
    tag: String,
    serialize: SerializeFn,
}

/// Process-wide mapping between message tags and their codecs.
///
/// Registration associates a concrete message type with a tag (the type
/// name by default). Serialization looks up the tag for the value's
/// type; deserialization uses the received tag to pick the reader.
/// Unknown tags on receive are a decode error.
pub struct MessageRegistry {
    by_tag: DashMap<String, DeserializeFn>,
    by_type: DashMap<TypeId, TypeEntry>,
}

impl MessageRegistry {
    pub fn new() -> MessageRegistry {
        MessageRegistry {
            by_tag: DashMap::new(),
            by_type: DashMap::new(),
        }
    }

    /// Registers `M` under an explicit tag.
    pub fn register<M: RemoteMessage>(&self, tag: &str) {
        self.by_tag.insert(
            tag.to_string(),
            Box::new(|payload: &Value| {
                let msg: M = serde_json::from_value(payload.clone())
                    .map_err(|e| WireError::MalformedFrame(e.to_string()))?;
                Ok(AnyMessage::new(msg, true))
            }),
        );

        self.by_type.insert(
            TypeId::of::<M>(),
            TypeEntry {
                tag: tag.to_string(),
                serialize: Box::new(|any| {
                    let msg = any
                        .downcast_ref::<M>()
                        .ok_or_else(|| WireError::MalformedFrame("type mismatch".into()))?;
                    serde_json::to_value(msg).map_err(|e| WireError::MalformedFrame(e.to_string()))
                }),
            },
        );
    }

    /// Registers `M` under its type name.
    pub fn register_type<M: RemoteMessage>(&self) {
        self.register::<M>(short_type_name::<M>());
    }

    pub fn deserialize(&self, tag: &str, payload: &Value) -> Result<AnyMessage, WireError> {
        match self.by_tag.get(tag) {
            Some(reader) => (reader.value())(payload),
            None => Err(WireError::UnknownMessageTag(tag.to_string())),
        }
    }

    /// Serializes a typed message, returning `(tag, payload)`.
    pub fn serialize<M: RemoteMessage>(&self, msg: &M) -> Result<(String, Value), WireError> {
        match self.by_type.get(&TypeId::of::<M>()) {
            Some(entry) => {
                let payload = serde_json::to_value(msg)
                    .map_err(|e| WireError::MalformedFrame(e.to_string()))?;
                Ok((entry.tag.clone(), payload))
            }
            None => Err(WireError::UnknownMessageTag(
                short_type_name::<M>().to_string(),
            )),
        }
    }

    /// Serializes a type-erased message by the type of its content.
    pub fn serialize_any(&self, msg: &AnyMessage) -> Result<(String, Value), WireError> {
        let type_id = msg
            .inner_type_id()
            .ok_or_else(|| WireError::MalformedFrame("empty message".into()))?;
        let inner = msg
            .inner_ref()
            .ok_or_else(|| WireError::MalformedFrame("empty message".into()))?;

        match self.by_type.get(&type_id) {
            Some(entry) => {
                let payload = (entry.serialize)(inner)?;
                Ok((entry.tag.clone(), payload))
            }
            None => Err(WireError::UnknownMessageTag("<unregistered>".to_string())),
        }
    }

    /// Removes every registration. For tests.
    pub fn clear(&self) {
        self.by_tag.clear();
        self.by_type.clear();
    }
}

impl Default for MessageRegistry {
    fn default() -> Self {
        MessageRegistry::new()
    }
}

fn short_type_name<M>() -> &'static str {
    let full = std::any::type_name::<M>();
    full.rsplit("::").next().unwrap_or(full)
}

lazy_static! {
    static ref MESSAGES: MessageRegistry = MessageRegistry::new();
}

/// The process-wide message registry.
pub fn messages() -> &'static MessageRegistry {
    &MESSAGES
}

/// Registers `M` under `tag` in the process-wide registry.
pub fn register_message<M: RemoteMessage>(tag: &str) {
    messages().register::<M>(tag)
}
