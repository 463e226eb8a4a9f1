use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use futures::future::try_join_all;
use slog::Logger;

use crate::actor::ActorPath;
use crate::remote::connection::Connection;
use crate::remote::envelope::WireEnvelope;
use crate::remote::RemoteError;

/// Striped pool of parallel connections to one remote peer.
///
/// Messages for a given target path always travel on the stripe
/// `hash(path) mod N`, which preserves per-actor delivery order. The
/// `unordered` stripe rotates round-robin for fan-out where order does
/// not matter.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    peer: String,
    stripes: Vec<Connection>,
    round_robin: AtomicUsize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStats {
    pub stripes: usize,
    pub connected: usize,
}

impl ConnectionPool {
    /// Connects all stripes in parallel, then performs the handshake on
    /// stripe 0.
    pub async fn connect(
        peer: &str,
        stripe_count: usize,
        system_name: &str,
        local_address: &str,
        log: Logger,
    ) -> Result<ConnectionPool, RemoteError> {
        let stripe_count = stripe_count.max(1);

        let connects = (0..stripe_count).map(|_| Connection::connect(peer, log.clone()));
        let stripes = try_join_all(connects).await?;

        let pool = ConnectionPool {
            inner: Arc::new(PoolInner {
                peer: peer.to_string(),
                stripes,
                round_robin: AtomicUsize::new(0),
            }),
        };

        // every stripe opens with a handshake, stripe 0 first; the
        // peer refuses frames on a connection that has not shaken hands
        for stripe in &pool.inner.stripes {
            stripe.send(WireEnvelope::handshake(system_name, local_address))?;
        }

        Ok(pool)
    }

    pub fn peer(&self) -> &str {
        &self.inner.peer
    }

    pub fn stripe_count(&self) -> usize {
        self.inner.stripes.len()
    }

    /// The stripe every envelope for `path` travels on.
    pub fn stripe_for(&self, path: &ActorPath) -> &Connection {
        let idx = stripe_hash(&path.key()) as usize % self.inner.stripes.len();
        &self.inner.stripes[idx]
    }

    /// Round-robin stripe for sends that waive per-actor ordering.
    pub fn unordered(&self) -> &Connection {
        let idx = self.inner.round_robin.fetch_add(1, Ordering::Relaxed)
            % self.inner.stripes.len();
        &self.inner.stripes[idx]
    }

    /// Sends on the target path's stripe.
    pub fn send_to(&self, path: &ActorPath, env: WireEnvelope) -> Result<(), RemoteError> {
        self.stripe_for(path).send(env)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            stripes: self.inner.stripes.len(),
            connected: self
                .inner
                .stripes
                .iter()
                .filter(|c| c.is_connected())
                .count(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.stripes.iter().all(|c| c.is_connected())
    }

    pub fn close(&self) {
        for stripe in &self.inner.stripes {
            stripe.close();
        }
    }
}

/// FNV-1a over the normalized path key. Deterministic across pool
/// instances so both peers agree on stripe assignment for a path.
pub(crate) fn stripe_hash(key: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in key.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stripe_hash_is_stable() {
        let a = stripe_hash("/user/counter");
        let b = stripe_hash("/user/counter");
        assert_eq!(a, b);
        assert_ne!(stripe_hash("/user/a"), stripe_hash("/user/b"));
    }
}
