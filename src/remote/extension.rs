use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use slog::info;

use crate::actor::{ActorPath, Address};
use crate::remote::pool::ConnectionPool;
use crate::remote::registry::RemoteMessage;
use crate::remote::remote_ref::RemoteActorRef;
use crate::remote::server::TcpServer;
use crate::remote::{handle_inbound, RemoteError};
use crate::system::{ActorSystem, Extension, ExtensionId};

/// Extension id for the remoting subsystem.
pub struct Remoting;

impl ExtensionId for Remoting {
    type Ext = RemoteExtension;

    fn create(&self, sys: &ActorSystem) -> RemoteExtension {
        RemoteExtension {
            inner: Arc::new(RemoteInner {
                system: sys.clone(),
                server: Mutex::new(None),
                bind_address: Mutex::new(None),
                stripe_count: Mutex::new(8),
                pools: DashMap::new(),
            }),
        }
    }
}

/// Owns the TCP server and the striped pools to every remote peer.
#[derive(Clone)]
pub struct RemoteExtension {
    inner: Arc<RemoteInner>,
}

struct RemoteInner {
    system: ActorSystem,
    server: Mutex<Option<TcpServer>>,
    bind_address: Mutex<Option<Address>>,
    stripe_count: Mutex<usize>,
    pools: DashMap<String, ConnectionPool>,
}

impl Extension for RemoteExtension {
    fn stop(&self, sys: &ActorSystem) {
        if let Some(server) = self.inner.server.lock().expect("server poisoned").take() {
            server.stop();
        }

        let _ = sys;
        let pools: Vec<ConnectionPool> = self.inner.pools.iter().map(|p| p.value().clone()).collect();
        self.inner.pools.clear();
        for pool in pools {
            pool.close();
        }
    }
}

impl RemoteExtension {
    /// Binds the server and records the system's remote address.
    pub fn start(&self, host: &str, port: u16, stripes: usize) -> Result<Address, RemoteError> {
        let mut server_slot = self.inner.server.lock().expect("server poisoned");
        if server_slot.is_some() {
            return self
                .bind_address()
                .ok_or(RemoteError::Disabled);
        }

        let sys = self.inner.system.clone();
        let handler = Arc::new(move |env, peer| {
            handle_inbound(&sys, env, peer);
        });

        let server = TcpServer::bind(host, port, handler, self.inner.system.log())?;
        let address = Address::tcp(&self.inner.system.name(), host, server.port());

        info!(self.inner.system.log(), "remoting enabled"; "address" => %address);

        *server_slot = Some(server);
        *self.inner.bind_address.lock().expect("bind poisoned") = Some(address.clone());
        *self.inner.stripe_count.lock().expect("stripes poisoned") = stripes.max(1);

        Ok(address)
    }

    /// The address peers can reach this system at, once started.
    pub fn bind_address(&self) -> Option<Address> {
        self.inner.bind_address.lock().expect("bind poisoned").clone()
    }

    pub fn is_started(&self) -> bool {
        self.inner.server.lock().expect("server poisoned").is_some()
    }

    /// Returns the pool for `authority` (`host:port`), establishing all
    /// stripes on first use and re-establishing after a disconnect.
    pub async fn pool_for(&self, authority: &str) -> Result<ConnectionPool, RemoteError> {
        if let Some(existing) = self.inner.pools.get(authority) {
            if existing.is_connected() {
                return Ok(existing.clone());
            }
        }
        self.inner.pools.remove(authority);

        let stripes = *self.inner.stripe_count.lock().expect("stripes poisoned");
        let local_address = self
            .bind_address()
            .map(|a| a.to_string())
            .unwrap_or_else(|| self.inner.system.address().to_string());

        let pool = ConnectionPool::connect(
            authority,
            stripes,
            &self.inner.system.name(),
            &local_address,
            self.inner.system.log(),
        )
        .await?;

        self.inner.pools.insert(authority.to_string(), pool.clone());
        Ok(pool)
    }

    /// Builds a typed remote ref for a `movie.tcp` path.
    pub async fn actor_ref<M>(&self, path: &str) -> Result<RemoteActorRef<M>, RemoteError>
    where
        M: RemoteMessage,
    {
        let path = ActorPath::parse(path)
            .map_err(|e| RemoteError::NotRemote(e.to_string()))?;
        let authority = path
            .address()
            .authority()
            .ok_or_else(|| RemoteError::NotRemote(path.to_string()))?;

        let pool = self.pool_for(&authority).await?;

        Ok(RemoteActorRef::new(
            path,
            pool,
            self.bind_address(),
            self.inner.system.clone(),
        ))
    }
}

/// Starts remoting with explicit parameters.
pub fn enable_remoting(
    sys: &ActorSystem,
    host: &str,
    port: u16,
    stripes: usize,
) -> Result<Address, RemoteError> {
    sys.extension(&Remoting).start(host, port, stripes)
}

/// Starts remoting from the `remoting.*` config keys.
pub fn enable_remoting_from_config(sys: &ActorSystem) -> Result<Address, RemoteError> {
    let cfg = sys.config();
    let host = cfg.get_str_or("remoting.host", "127.0.0.1");
    let port = cfg.get_int_or("remoting.port", 2552) as u16;
    let stripes = cfg.get_int_or("remoting.stripe-count", 8) as usize;
    enable_remoting(sys, &host, port, stripes)
}
