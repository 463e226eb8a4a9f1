pub(crate) mod codec;
pub(crate) mod connection;
pub(crate) mod envelope;
pub(crate) mod extension;
pub(crate) mod pool;
pub(crate) mod registry;
pub(crate) mod remote_ref;
pub(crate) mod server;

use serde_json::Value;
use thiserror::Error;

use crate::actor::{ActorPath, ActorRefFactory, ActorReference, BasicActorRef, Sender};
use crate::system::{ActorSystem, SystemCmd, SystemMsg};

pub use self::codec::{decode_frame, encode_frame, read_frame, write_frame, MAX_FRAME_LEN};
pub use self::connection::Connection;
pub use self::envelope::{Handshake, WireEnvelope, WireKind};
pub use self::extension::{enable_remoting, enable_remoting_from_config, RemoteExtension, Remoting};
pub use self::pool::{ConnectionPool, PoolStats};
pub use self::registry::{messages, register_message, MessageRegistry, RemoteMessage};
pub use self::remote_ref::RemoteActorRef;
pub use self::server::{InboundHandler, InboundPeer, TcpServer};

/// Frame- and codec-level failures.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame exceeds the 16 MiB limit ({0} bytes)")]
    FrameTooLarge(usize),
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("unknown message tag: {0}")]
    UnknownMessageTag(String),
    #[error("i/o failure: {0}")]
    Io(String),
}

/// Connection- and delivery-level failures.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("failed to connect to {0}: {1}")]
    Connect(String, String),
    #[error("failed to bind {0}: {1}")]
    Bind(String, String),
    #[error("remote delivery failed: {0}")]
    Delivery(String),
    #[error("remoting is not enabled on this system")]
    Disabled,
    #[error("{0} is not a remote path")]
    NotRemote(String),
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Message type tag used for application-level ask failures.
pub const ERROR_TAG: &str = "!error";

/// System signals in their wire form. `Watch`, `Unwatch` and
/// `Terminated` embed the referenced actor's path so the peer can
/// re-resolve its local ref.
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteSystemMsg {
    Stop,
    Watch(ActorPath),
    Unwatch(ActorPath),
    Terminated(ActorPath),
}

impl RemoteSystemMsg {
    pub(crate) fn encode(&self) -> (String, Value) {
        match self {
            RemoteSystemMsg::Stop => ("Stop".to_string(), serde_json::json!({})),
            RemoteSystemMsg::Watch(path) => (
                "Watch".to_string(),
                serde_json::json!({ "path": path.to_string() }),
            ),
            RemoteSystemMsg::Unwatch(path) => (
                "Unwatch".to_string(),
                serde_json::json!({ "path": path.to_string() }),
            ),
            RemoteSystemMsg::Terminated(path) => (
                "Terminated".to_string(),
                serde_json::json!({ "path": path.to_string() }),
            ),
        }
    }

    pub(crate) fn decode(tag: &str, payload: &Value) -> Result<RemoteSystemMsg, WireError> {
        let path = || -> Result<ActorPath, WireError> {
            let raw = payload
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| WireError::MalformedFrame("missing path".into()))?;
            ActorPath::parse(raw).map_err(|e| WireError::MalformedFrame(e.to_string()))
        };

        match tag {
            "Stop" => Ok(RemoteSystemMsg::Stop),
            "Watch" => Ok(RemoteSystemMsg::Watch(path()?)),
            "Unwatch" => Ok(RemoteSystemMsg::Unwatch(path()?)),
            "Terminated" => Ok(RemoteSystemMsg::Terminated(path()?)),
            other => Err(WireError::UnknownMessageTag(other.to_string())),
        }
    }
}

fn remote_dead_letter(sys: &ActorSystem, recipient: String, detail: String) {
    if let Some(dl) = sys.dead_letters_opt() {
        crate::actor::dead_letter(&dl, None, recipient, detail);
    }
}

/// Demultiplexes one inbound frame onto the local actor hierarchy.
pub(crate) fn handle_inbound(sys: &ActorSystem, env: WireEnvelope, peer: server::InboundPeer) {
    let target_path = match ActorPath::parse(&env.target_path) {
        Ok(p) => p,
        Err(_) => {
            remote_dead_letter(
                sys,
                env.target_path.clone(),
                format!("unparseable target path in {:?} frame", env.kind),
            );
            return;
        }
    };

    let target = sys.registry().resolve_ref(&target_path);

    match env.kind {
        WireKind::UserMessage => {
            let target = match target {
                Some(t) => t,
                None => {
                    remote_dead_letter(sys, env.target_path, env.message_type);
                    return;
                }
            };

            match messages().deserialize(&env.message_type, &env.payload) {
                Ok(mut any) => {
                    if target.try_tell_any(&mut any, None).is_err() {
                        remote_dead_letter(sys, env.target_path, env.message_type);
                    }
                }
                Err(e) => {
                    remote_dead_letter(sys, env.target_path, e.to_string());
                }
            }
        }
        WireKind::SystemMessage => {
            handle_inbound_system(sys, &env, target);
        }
        WireKind::AskRequest => {
            handle_inbound_ask(sys, env, target, peer);
        }
        // responses ride the requesting connection; anything else here
        // is a protocol violation from the peer
        WireKind::AskResponse | WireKind::Handshake | WireKind::Heartbeat => {}
    }
}

fn handle_inbound_system(sys: &ActorSystem, env: &WireEnvelope, target: Option<BasicActorRef>) {
    let target = match target {
        Some(t) => t,
        None => {
            remote_dead_letter(sys, env.target_path.clone(), env.message_type.clone());
            return;
        }
    };

    let decoded = match RemoteSystemMsg::decode(&env.message_type, &env.payload) {
        Ok(d) => d,
        Err(e) => {
            remote_dead_letter(sys, env.target_path.clone(), e.to_string());
            return;
        }
    };

    match decoded {
        RemoteSystemMsg::Stop => target.sys_tell(SystemCmd::Stop.into()),
        RemoteSystemMsg::Watch(path) => match sys.registry().resolve_ref(&path) {
            Some(watcher) => target.sys_tell(SystemMsg::Watch(watcher)),
            None => remote_dead_letter(sys, path.to_string(), "Watch".into()),
        },
        RemoteSystemMsg::Unwatch(path) => match sys.registry().resolve_ref(&path) {
            Some(watcher) => target.sys_tell(SystemMsg::Unwatch(watcher)),
            None => remote_dead_letter(sys, path.to_string(), "Unwatch".into()),
        },
        RemoteSystemMsg::Terminated(path) => match sys.registry().resolve_ref(&path) {
            Some(terminated) => target.sys_tell(SystemMsg::Terminated(terminated)),
            None => remote_dead_letter(sys, path.to_string(), "Terminated".into()),
        },
    }
}

fn handle_inbound_ask(
    sys: &ActorSystem,
    env: WireEnvelope,
    target: Option<BasicActorRef>,
    peer: server::InboundPeer,
) {
    use crate::actor::TmpActorRefFactory;

    let correlation_id = match env.correlation_id {
        Some(id) => id,
        None => {
            remote_dead_letter(sys, env.target_path, "ask request without correlation".into());
            return;
        }
    };

    let target = match target {
        Some(t) => t,
        None => {
            remote_dead_letter(sys, env.target_path, env.message_type);
            return;
        }
    };

    let mut any = match messages().deserialize(&env.message_type, &env.payload) {
        Ok(any) => any,
        Err(e) => {
            remote_dead_letter(sys, env.target_path, e.to_string());
            return;
        }
    };

    let replier = match sys.tmp_actor_of_args::<AskReplier, _>((correlation_id, peer, sys.clone()))
    {
        Ok(r) => r,
        Err(_) => return,
    };

    if target
        .try_tell_any(&mut any, Some(replier.clone().into()))
        .is_err()
    {
        remote_dead_letter(sys, env.target_path, env.message_type);
        sys.stop(&replier);
    }
}

/// Receives the local reply to a remote ask and writes the
/// `AskResponse` frame back on the inbound connection.
struct AskReplier {
    correlation_id: uuid::Uuid,
    peer: server::InboundPeer,
    system: ActorSystem,
}

impl crate::actor::ActorFactoryArgs<(uuid::Uuid, server::InboundPeer, ActorSystem)> for AskReplier {
    fn create_args(
        (correlation_id, peer, system): (uuid::Uuid, server::InboundPeer, ActorSystem),
    ) -> Self {
        AskReplier {
            correlation_id,
            peer,
            system,
        }
    }
}

impl crate::actor::Actor for AskReplier {
    type Msg = crate::AnyMessage;

    // the asker's own deadline governs the reply; this bound only
    // reclaims the temp actor when no reply ever arrives
    fn pre_start(&mut self, ctx: &crate::actor::Context<Self::Msg>) {
        use crate::executor::Run;
        let myself: BasicActorRef = ctx.myself().into();
        if let Ok(handle) = self.system.run(async move {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            myself.sys_tell(SystemCmd::Stop.into());
        }) {
            handle.forget();
        }
    }

    fn recv(
        &mut self,
        _: &crate::actor::Context<Self::Msg>,
        msg: Self::Msg,
        _: Sender,
    ) -> crate::actor::Next<Self::Msg> {
        let env = match messages().serialize_any(&msg) {
            Ok((tag, payload)) => WireEnvelope::ask_response(self.correlation_id, tag, payload),
            Err(e) => WireEnvelope::ask_response(
                self.correlation_id,
                ERROR_TAG.to_string(),
                serde_json::json!({ "message": e.to_string() }),
            ),
        };

        let peer = self.peer.clone();
        use crate::executor::Run;
        if let Ok(handle) = self.system.run(async move {
            let _ = peer.reply(&env).await;
        }) {
            handle.forget();
        }

        crate::actor::Next::Stopped
    }
}
