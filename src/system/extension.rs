use std::any::{Any, TypeId};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;

use crate::system::ActorSystem;

/// A system-scoped singleton created lazily on first lookup.
pub trait Extension: Any + Send + Sync + 'static {
    /// Invoked during system shutdown, in reverse creation order.
    fn stop(&self, sys: &ActorSystem) {
        let _ = sys;
    }
}

/// The key type for an extension. One implementation per extension;
/// the unit-struct key carries the factory.
pub trait ExtensionId: Send + Sync + 'static {
    type Ext: Extension + Clone;

    fn create(&self, sys: &ActorSystem) -> Self::Ext;
}

trait ErasedStop: Send + Sync {
    fn stop_ext(&self, sys: &ActorSystem);
}

struct StopHandle<E: Extension>(E);

impl<E: Extension> ErasedStop for StopHandle<E> {
    fn stop_ext(&self, sys: &ActorSystem) {
        self.0.stop(sys);
    }
}

/// Registry of lazily created extensions.
pub(crate) struct Extensions {
    map: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    order: Mutex<Vec<Box<dyn ErasedStop>>>,
    create_lock: Mutex<()>,
}

impl Extensions {
    pub(crate) fn new() -> Extensions {
        Extensions {
            map: DashMap::new(),
            order: Mutex::new(Vec::new()),
            create_lock: Mutex::new(()),
        }
    }

    pub(crate) fn get_or_create<I>(&self, id: &I, sys: &ActorSystem) -> I::Ext
    where
        I: ExtensionId,
    {
        let key = TypeId::of::<I>();

        if let Some(existing) = self.map.get(&key) {
            return existing
                .downcast_ref::<I::Ext>()
                .expect("extension type mismatch")
                .clone();
        }

        // serialize creation so each factory runs exactly once
        let _guard = self.create_lock.lock().expect("extension lock poisoned");
        if let Some(existing) = self.map.get(&key) {
            return existing
                .downcast_ref::<I::Ext>()
                .expect("extension type mismatch")
                .clone();
        }

        let ext = id.create(sys);
        self.map.insert(key, Arc::new(ext.clone()));
        self.order
            .lock()
            .expect("extension order poisoned")
            .push(Box::new(StopHandle(ext.clone())));
        ext
    }

    /// Stops extensions in reverse creation order.
    pub(crate) fn stop_all(&self, sys: &ActorSystem) {
        let handles: Vec<Box<dyn ErasedStop>> = {
            let mut order = self.order.lock().expect("extension order poisoned");
            order.drain(..).collect()
        };
        for handle in handles.into_iter().rev() {
            handle.stop_ext(sys);
        }
        self.map.clear();
    }
}
