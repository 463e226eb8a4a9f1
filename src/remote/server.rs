use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use slog::{debug, Logger};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::remote::codec::{read_frame, write_frame};
use crate::remote::envelope::{Handshake, WireEnvelope, WireKind};
use crate::remote::RemoteError;

/// Callback invoked for every demultiplexed inbound frame.
pub type InboundHandler = Arc<dyn Fn(WireEnvelope, InboundPeer) + Send + Sync>;

/// The reply side of one inbound connection, shared with ask repliers.
#[derive(Clone)]
pub struct InboundPeer {
    writer: Arc<tokio::sync::Mutex<Option<OwnedWriteHalf>>>,
    info: Arc<Mutex<Option<Handshake>>>,
}

impl InboundPeer {
    /// Peer identity recorded from the handshake frame.
    pub fn info(&self) -> Option<Handshake> {
        self.info.lock().expect("peer info poisoned").clone()
    }

    /// Writes a frame back to the peer on this inbound socket.
    pub async fn reply(&self, env: &WireEnvelope) -> Result<(), RemoteError> {
        let mut guard = self.writer.lock().await;
        match guard.as_mut() {
            Some(writer) => write_frame(writer, env)
                .await
                .map_err(|e| RemoteError::Delivery(e.to_string())),
            None => Err(RemoteError::Delivery("connection closed".into())),
        }
    }
}

/// Accept loop that demultiplexes inbound connections to a single
/// message handler.
///
/// The first frame on every connection must be a handshake; it records
/// the peer's system name and address. Heartbeats are ignored. All
/// other frames are dispatched to the handler.
pub struct TcpServer {
    inner: Arc<ServerInner>,
}

struct ServerInner {
    local_addr: SocketAddr,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    conn_tasks: Mutex<Vec<JoinHandle<()>>>,
    log: Logger,
}

impl TcpServer {
    /// Binds and starts accepting. Port 0 binds an ephemeral port;
    /// query it with `port()`.
    pub fn bind(host: &str, port: u16, handler: InboundHandler, log: Logger) -> Result<TcpServer, RemoteError> {
        let std_listener = std::net::TcpListener::bind((host, port))
            .map_err(|e| RemoteError::Bind(format!("{}:{}", host, port), e.to_string()))?;
        std_listener
            .set_nonblocking(true)
            .map_err(|e| RemoteError::Bind(format!("{}:{}", host, port), e.to_string()))?;
        let listener = TcpListener::from_std(std_listener)
            .map_err(|e| RemoteError::Bind(format!("{}:{}", host, port), e.to_string()))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| RemoteError::Bind(format!("{}:{}", host, port), e.to_string()))?;

        let inner = Arc::new(ServerInner {
            local_addr,
            accept_task: Mutex::new(None),
            conn_tasks: Mutex::new(Vec::new()),
            log,
        });

        let accept_inner = inner.clone();
        let accept = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer_addr)) => {
                        let _ = stream.set_nodelay(true);
                        debug!(accept_inner.log, "inbound connection"; "peer" => %peer_addr);

                        let task = spawn_inbound(stream, handler.clone(), accept_inner.log.clone());
                        accept_inner
                            .conn_tasks
                            .lock()
                            .expect("conn tasks poisoned")
                            .push(task);
                    }
                    Err(e) => {
                        debug!(accept_inner.log, "accept failed: {}", e);
                        break;
                    }
                }
            }
        });

        *inner.accept_task.lock().expect("accept task poisoned") = Some(accept);

        Ok(TcpServer { inner })
    }

    pub fn port(&self) -> u16 {
        self.inner.local_addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    /// Stops accepting and closes all inbound connections. Connection
    /// tasks are aborted directly; they never re-enter the tracking
    /// set.
    pub fn stop(&self) {
        if let Some(task) = self
            .inner
            .accept_task
            .lock()
            .expect("accept task poisoned")
            .take()
        {
            task.abort();
        }

        let tasks: Vec<JoinHandle<()>> = {
            let mut conns = self.inner.conn_tasks.lock().expect("conn tasks poisoned");
            conns.drain(..).collect()
        };
        for task in tasks {
            task.abort();
        }
    }
}

fn spawn_inbound(
    stream: tokio::net::TcpStream,
    handler: InboundHandler,
    log: Logger,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (mut read_half, write_half) = stream.into_split();

        let peer = InboundPeer {
            writer: Arc::new(tokio::sync::Mutex::new(Some(write_half))),
            info: Arc::new(Mutex::new(None)),
        };

        let mut seen_handshake = false;

        loop {
            match read_frame(&mut read_half).await {
                Ok(Some(env)) => match env.kind {
                    WireKind::Handshake => {
                        if let Some(info) = env.handshake_info() {
                            debug!(log, "handshake"; "system" => %info.system, "address" => %info.address);
                            *peer.info.lock().expect("peer info poisoned") = Some(info);
                        }
                        seen_handshake = true;
                    }
                    WireKind::Heartbeat => {}
                    _ => {
                        if !seen_handshake {
                            debug!(log, "frame before handshake, closing connection");
                            break;
                        }
                        handler(env, peer.clone());
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    debug!(log, "inbound read failed: {}", e);
                    break;
                }
            }
        }

        peer.writer.lock().await.take();
    })
}
