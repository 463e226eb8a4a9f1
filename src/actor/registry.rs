use std::sync::Arc;

use dashmap::DashMap;

use crate::actor::{ActorId, ActorPath, ActorReference, BasicActorRef};

/// Process-wide map from normalized path keys to live actors.
///
/// Keys are the path segments alone (protocol, host and port are
/// ignored), so local and remote lookups for the same logical actor
/// agree. The registry holds back references; it does not own cells.
#[derive(Clone)]
pub struct PathRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    by_key: DashMap<String, Entry>,
    by_id: DashMap<ActorId, ActorPath>,
}

#[derive(Clone)]
struct Entry {
    id: ActorId,
    actor: BasicActorRef,
}

impl PathRegistry {
    pub fn new() -> PathRegistry {
        PathRegistry {
            inner: Arc::new(RegistryInner {
                by_key: DashMap::new(),
                by_id: DashMap::new(),
            }),
        }
    }

    /// Associates `path` with `actor`. A collision overwrites the
    /// previous entry.
    pub fn register(&self, actor: &BasicActorRef, path: &ActorPath) {
        let entry = Entry {
            id: actor.uri().uid,
            actor: actor.clone(),
        };

        if let Some(old) = self.inner.by_key.insert(path.key(), entry) {
            if old.id != actor.uri().uid {
                self.inner.by_id.remove(&old.id);
            }
        }
        self.inner.by_id.insert(actor.uri().uid, path.clone());
    }

    /// Removes the actor's entry. Required on actor stop.
    pub fn unregister(&self, actor: &BasicActorRef) {
        let uid = actor.uri().uid;
        if let Some((_, path)) = self.inner.by_id.remove(&uid) {
            // only drop the forward entry if it still points at us;
            // a later register may have overwritten it
            self.inner
                .by_key
                .remove_if(&path.key(), |_, entry| entry.id == uid);
        }
    }

    pub fn resolve(&self, path: &ActorPath) -> Option<ActorId> {
        self.inner.by_key.get(&path.key()).map(|e| e.id)
    }

    pub fn resolve_ref(&self, path: &ActorPath) -> Option<BasicActorRef> {
        self.inner.by_key.get(&path.key()).map(|e| e.actor.clone())
    }

    pub fn path_for(&self, id: ActorId) -> Option<ActorPath> {
        self.inner.by_id.get(&id).map(|p| p.clone())
    }

    pub fn contains(&self, path: &ActorPath) -> bool {
        self.inner.by_key.contains_key(&path.key())
    }
}

impl Default for PathRegistry {
    fn default() -> Self {
        PathRegistry::new()
    }
}
