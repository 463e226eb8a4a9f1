use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use dashmap::DashMap;
use slog::{debug, Logger};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::remote::codec::{read_frame, write_frame};
use crate::remote::envelope::{WireEnvelope, WireKind};
use crate::remote::RemoteError;

/// One outbound socket to a remote peer.
///
/// Sends enqueue onto an ordered outbound queue drained by a single
/// writer task, so frames leave in the exact order callers submitted
/// them. A reader task drains inbound frames; the only frames expected
/// on an outbound connection are ask responses and heartbeats. All
/// pending asks fail when the connection drops.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

struct ConnectionInner {
    peer: String,
    outbound: Mutex<Option<mpsc::UnboundedSender<WireEnvelope>>>,
    pending_asks: DashMap<Uuid, oneshot::Sender<WireEnvelope>>,
    connected: AtomicBool,
    log: Logger,
}

impl Connection {
    pub async fn connect(peer: &str, log: Logger) -> Result<Connection, RemoteError> {
        let stream = TcpStream::connect(peer)
            .await
            .map_err(|e| RemoteError::Connect(peer.to_string(), e.to_string()))?;
        stream
            .set_nodelay(true)
            .map_err(|e| RemoteError::Connect(peer.to_string(), e.to_string()))?;

        let (read_half, write_half) = stream.into_split();
        let (tx, rx) = mpsc::unbounded_channel();

        let conn = Connection {
            inner: Arc::new(ConnectionInner {
                peer: peer.to_string(),
                outbound: Mutex::new(Some(tx)),
                pending_asks: DashMap::new(),
                connected: AtomicBool::new(true),
                log,
            }),
        };

        conn.spawn_writer(write_half, rx);
        conn.spawn_reader(read_half);
        Ok(conn)
    }

    fn spawn_writer(
        &self,
        mut write_half: OwnedWriteHalf,
        mut rx: mpsc::UnboundedReceiver<WireEnvelope>,
    ) {
        let conn = self.clone();
        tokio::spawn(async move {
            while let Some(env) = rx.recv().await {
                if let Err(e) = write_frame(&mut write_half, &env).await {
                    debug!(conn.inner.log, "connection write failed: {}", e;
                           "peer" => %conn.inner.peer);
                    break;
                }
            }
            conn.mark_disconnected();
        });
    }

    fn spawn_reader(&self, mut read_half: OwnedReadHalf) {
        let conn = self.clone();
        tokio::spawn(async move {
            loop {
                match read_frame(&mut read_half).await {
                    Ok(Some(env)) => conn.handle_inbound(env),
                    Ok(None) => break,
                    Err(e) => {
                        debug!(conn.inner.log, "connection read failed: {}", e;
                               "peer" => %conn.inner.peer);
                        break;
                    }
                }
            }
            conn.mark_disconnected();
        });
    }

    fn handle_inbound(&self, env: WireEnvelope) {
        match env.kind {
            WireKind::AskResponse => {
                if let Some(id) = env.correlation_id {
                    if let Some((_, tx)) = self.inner.pending_asks.remove(&id) {
                        let _ = tx.send(env);
                    }
                    // a late response after timeout is dropped without
                    // error
                }
            }
            WireKind::Heartbeat => {}
            other => {
                debug!(self.inner.log, "unexpected frame on outbound connection";
                       "kind" => format!("{:?}", other), "peer" => %self.inner.peer);
            }
        }
    }

    pub fn peer(&self) -> &str {
        &self.inner.peer
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Relaxed)
    }

    /// Enqueues one envelope on the ordered outbound queue.
    pub fn send(&self, env: WireEnvelope) -> Result<(), RemoteError> {
        if !self.is_connected() {
            return Err(RemoteError::Delivery(self.inner.peer.clone()));
        }

        let outbound = self.inner.outbound.lock().expect("outbound poisoned");
        match outbound.as_ref() {
            Some(tx) => tx
                .send(env)
                .map_err(|_| RemoteError::Delivery(self.inner.peer.clone())),
            None => Err(RemoteError::Delivery(self.inner.peer.clone())),
        }
    }

    /// Inserts a correlation entry before an ask request is sent.
    pub fn register_ask(&self, id: Uuid) -> oneshot::Receiver<WireEnvelope> {
        let (tx, rx) = oneshot::channel();
        self.inner.pending_asks.insert(id, tx);
        rx
    }

    /// Removes a correlation entry on timeout or failure.
    pub fn remove_ask(&self, id: &Uuid) {
        self.inner.pending_asks.remove(id);
    }

    pub fn pending_ask_count(&self) -> usize {
        self.inner.pending_asks.len()
    }

    fn mark_disconnected(&self) {
        if self.inner.connected.swap(false, Ordering::Relaxed) {
            self.inner.outbound.lock().expect("outbound poisoned").take();
            // fail every pending ask by dropping its channel
            self.inner.pending_asks.clear();
        }
    }

    /// Closes the connection, failing pending asks.
    pub fn close(&self) {
        self.mark_disconnected();
    }
}
