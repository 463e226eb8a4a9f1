use std::collections::HashMap;
use std::sync::Arc;

use slog::warn;

use crate::actor::{
    Actor, ActorFactoryArgs, ActorRef, ActorRefFactory, ActorReference, BoxActorProd, Context,
    Next, Sender,
};
use crate::Message;

/// Builds the props for one entity instance, given its entity id.
pub type EntityFactory<A> = Arc<dyn Fn(&str) -> BoxActorProd<A> + Send + Sync>;

/// Requests understood by [`EntityRegistry`].
#[derive(Clone, Debug)]
pub enum EntityMsg {
    /// Returns the existing child for `entity_id`, spawning it first if
    /// needed. The reply is an [`EntityRef`].
    Get { entity_id: String },
}

/// Reply to [`EntityMsg::Get`].
#[derive(Clone, Debug)]
pub struct EntityRef<Msg: Message>(pub ActorRef<Msg>);

/// Keeps one child actor per entity id, spawned on demand under a
/// deterministic name `entity-<lowercase-type>-<id>`.
pub struct EntityRegistry<A: Actor> {
    entity_type: String,
    factory: EntityFactory<A>,
    entities: HashMap<String, ActorRef<A::Msg>>,
}

impl<A: Actor> ActorFactoryArgs<(String, EntityFactory<A>)> for EntityRegistry<A> {
    fn create_args((entity_type, factory): (String, EntityFactory<A>)) -> Self {
        EntityRegistry {
            entity_type,
            factory,
            entities: HashMap::new(),
        }
    }
}

impl<A: Actor> Actor for EntityRegistry<A> {
    type Msg = EntityMsg;

    fn recv(&mut self, ctx: &Context<Self::Msg>, msg: Self::Msg, sender: Sender) -> Next<Self::Msg> {
        match msg {
            EntityMsg::Get { entity_id } => {
                let entity = match self.entities.get(&entity_id) {
                    Some(existing) => existing.clone(),
                    None => {
                        let name = format!(
                            "entity-{}-{}",
                            self.entity_type.to_lowercase(),
                            entity_id
                        );
                        let props = (self.factory)(&entity_id);
                        match ctx.actor_of_props(&name, props) {
                            Ok(spawned) => {
                                self.entities.insert(entity_id.clone(), spawned.clone());
                                spawned
                            }
                            Err(e) => {
                                warn!(
                                    ctx.system.log(),
                                    "failed to spawn entity {}: {}", name, e
                                );
                                return Next::Same;
                            }
                        }
                    }
                };

                if let Some(sender) = sender {
                    let _ = sender.try_tell(EntityRef(entity), Some(ctx.myself().into()));
                }
            }
        }
        Next::Same
    }

    fn sys_recv(
        &mut self,
        _: &Context<Self::Msg>,
        msg: crate::system::SystemMsg,
        _: Sender,
    ) {
        // drop the cache entry when an entity stops
        if let crate::system::SystemMsg::Terminated(terminated) = msg {
            self.entities
                .retain(|_, entity| entity.cell.path() != terminated.path());
        }
    }
}
