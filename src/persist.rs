pub(crate) mod durable_state;
pub(crate) mod entity;
pub(crate) mod event_sourced;
pub(crate) mod pool;
pub(crate) mod store;

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Message;

pub use self::durable_state::{DsMsg, DurableState, DurableStateBehavior};
pub use self::entity::{EntityFactory, EntityMsg, EntityRef, EntityRegistry};
pub use self::event_sourced::{EsMsg, EventSourced, EventSourcedBehavior};
pub use self::pool::{ConnectionActor, ConnectionPool, DbQuery, DbReply};
pub use self::store::{
    EventStoreActor, EventStoreMsg, EventStoreReply, StateStoreActor, StateStoreMsg,
    StateStoreReply,
};

/// Payloads persisted as JSON blobs.
pub trait PersistentPayload: Message + Serialize + DeserializeOwned {}
impl<T: Message + Serialize + DeserializeOwned> PersistentPayload for T {}

/// Identity of a persistent entity: `(entity_type, entity_id)` with
/// canonical form `"Type:id"`. The canonical form is the event stream
/// id and the durable-state row key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PersistenceId {
    pub entity_type: String,
    pub entity_id: String,
}

impl PersistenceId {
    pub fn new(entity_type: &str, entity_id: &str) -> PersistenceId {
        PersistenceId {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
        }
    }

    pub fn parse(s: &str) -> Option<PersistenceId> {
        let (entity_type, entity_id) = s.split_once(':')?;
        if entity_type.is_empty() || entity_id.is_empty() {
            return None;
        }
        Some(PersistenceId::new(entity_type, entity_id))
    }
}

impl fmt::Display for PersistenceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form() {
        let id = PersistenceId::new("Counter", "c-1");
        assert_eq!(id.to_string(), "Counter:c-1");
        assert_eq!(PersistenceId::parse("Counter:c-1"), Some(id));
        assert_eq!(PersistenceId::parse("nope"), None);
        assert_eq!(PersistenceId::parse(":x"), None);
    }
}
