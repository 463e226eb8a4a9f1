use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::actor::{ActorPath, ActorReference, Address, Sender};
use crate::executor::Run;
use crate::future::{promise, Fault, Future};
use crate::remote::connection::Connection;
use crate::remote::envelope::WireEnvelope;
use crate::remote::pool::ConnectionPool;
use crate::remote::registry::{messages, RemoteMessage};
use crate::remote::{RemoteSystemMsg, ERROR_TAG};
use crate::system::ActorSystem;

/// A typed handle to an actor on another system.
///
/// Shares the local `ActorRef` contract at the call site: `tell` and
/// `ask` serialize through the message registry and dispatch on the
/// path's dedicated stripe, so per-actor delivery order is preserved.
pub struct RemoteActorRef<Msg: RemoteMessage> {
    inner: Arc<RemoteRefInner>,
    _marker: PhantomData<fn(Msg)>,
}

struct RemoteRefInner {
    path: ActorPath,
    target: String,
    pool: ConnectionPool,
    conn: Connection,
    local_address: Option<Address>,
    system: ActorSystem,
}

impl<Msg: RemoteMessage> Clone for RemoteActorRef<Msg> {
    fn clone(&self) -> Self {
        RemoteActorRef {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<Msg: RemoteMessage> RemoteActorRef<Msg> {
    pub(crate) fn new(
        path: ActorPath,
        pool: ConnectionPool,
        local_address: Option<Address>,
        system: ActorSystem,
    ) -> RemoteActorRef<Msg> {
        let conn = pool.stripe_for(&path).clone();
        RemoteActorRef {
            inner: Arc::new(RemoteRefInner {
                target: path.to_string(),
                path,
                pool,
                conn,
                local_address,
                system,
            }),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &ActorPath {
        &self.inner.path
    }

    fn sender_path(&self, sender: &Sender) -> Option<String> {
        let local = self.inner.local_address.as_ref()?;
        let sender = sender.as_ref()?;
        Some(sender.path().with_address(local.clone()).to_string())
    }

    fn dead_letter(&self, detail: String) {
        if let Some(dl) = self.inner.system.dead_letters_opt() {
            crate::actor::dead_letter(&dl, None, self.inner.target.clone(), detail);
        }
    }

    fn send_env(&self, conn: &Connection, env: WireEnvelope) {
        let message_type = env.message_type.clone();
        if conn.send(env).is_err() {
            self.dead_letter(message_type);
        }
    }

    /// Serializes and sends on the path's dedicated stripe.
    pub fn tell(&self, msg: Msg, sender: Sender) {
        match messages().serialize(&msg) {
            Ok((tag, payload)) => {
                let env = WireEnvelope::user(
                    self.inner.target.clone(),
                    tag,
                    payload,
                    self.sender_path(&sender),
                );
                self.send_env(&self.inner.conn, env);
            }
            Err(e) => self.dead_letter(e.to_string()),
        }
    }

    /// Sends on the round-robin stripe, waiving per-actor ordering.
    pub fn tell_unordered(&self, msg: Msg, sender: Sender) {
        match messages().serialize(&msg) {
            Ok((tag, payload)) => {
                let env = WireEnvelope::user(
                    self.inner.target.clone(),
                    tag,
                    payload,
                    self.sender_path(&sender),
                );
                let conn = self.inner.pool.unordered().clone();
                self.send_env(&conn, env);
            }
            Err(e) => self.dead_letter(e.to_string()),
        }
    }

    /// Sends a system signal in its wire form.
    pub fn send_system(&self, msg: RemoteSystemMsg) {
        let (tag, payload) = msg.encode();
        let env = WireEnvelope::system(self.inner.target.clone(), tag, payload);
        self.send_env(&self.inner.conn, env);
    }

    /// Correlated request-reply over the dedicated stripe.
    ///
    /// The correlation entry is registered before the send and removed
    /// on response, timeout or connection loss. The returned future
    /// fails with `Fault::Timeout` at the deadline and `Fault::Remote`
    /// when the connection drops.
    pub fn ask<R>(&self, msg: Msg, timeout: Duration) -> Future<R>
    where
        R: RemoteMessage,
    {
        let (tx, future) = promise::<R>();

        let (tag, payload) = match messages().serialize(&msg) {
            Ok(parts) => parts,
            Err(e) => {
                tx.failure(Fault::Remote(e.to_string()));
                return future;
            }
        };

        let correlation_id = Uuid::new_v4();
        let conn = self.inner.conn.clone();
        let rx = conn.register_ask(correlation_id);

        let env = WireEnvelope::ask_request(
            self.inner.target.clone(),
            tag,
            payload,
            correlation_id,
            self.sender_path(&None),
        );

        if let Err(e) = conn.send(env) {
            conn.remove_ask(&correlation_id);
            tx.failure(Fault::Remote(e.to_string()));
            return future;
        }

        let task = self.inner.system.run(async move {
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(resp)) => {
                    if resp.message_type == ERROR_TAG {
                        let detail = resp.payload["message"]
                            .as_str()
                            .unwrap_or("remote failure")
                            .to_string();
                        tx.failure(Fault::App(detail));
                    } else {
                        match serde_json::from_value::<R>(resp.payload) {
                            Ok(value) => {
                                tx.success(value);
                            }
                            Err(e) => tx.failure(Fault::Remote(e.to_string())),
                        }
                    }
                }
                Ok(Err(_)) => {
                    // the connection dropped and failed its pending asks
                    tx.failure(Fault::Remote("connection closed".to_string()));
                }
                Err(_) => {
                    conn.remove_ask(&correlation_id);
                    tx.failure(Fault::Timeout);
                }
            }
        });
        if let Ok(handle) = task {
            handle.forget();
        }

        future
    }

    /// Stats of the pool backing this ref.
    pub fn pool_stats(&self) -> crate::remote::PoolStats {
        self.inner.pool.stats()
    }
}

impl<Msg: RemoteMessage> fmt::Debug for RemoteActorRef<Msg> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RemoteActorRef[{}]", self.inner.target)
    }
}

impl<Msg: RemoteMessage> fmt::Display for RemoteActorRef<Msg> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "RemoteActorRef[{}]", self.inner.target)
    }
}
