use crate::actor::{Actor, ActorRef, BoxActorProd, Context, Next, Props, Sender};
use crate::persist::store::{StateStoreMsg, StateStoreReply};
use crate::persist::{PersistenceId, PersistentPayload};
use crate::Message;

/// Behavior contract for a durable-state entity.
///
/// On start the latest saved state is loaded. A command returning
/// `Some(state)` has that state persisted before the next command is
/// processed; `None` leaves the state untouched.
pub trait DurableStateBehavior: Send + 'static {
    type Cmd: Message;
    type State: PersistentPayload;

    fn empty_state(&self) -> Self::State;

    fn handle_command(
        &mut self,
        state: &Self::State,
        cmd: Self::Cmd,
        ctx: &Context<DsMsg<Self::Cmd>>,
        sender: &Sender,
    ) -> Option<Self::State>;

    /// Runs after a returned state has been saved.
    fn on_persisted(
        &mut self,
        _state: &Self::State,
        _ctx: &Context<DsMsg<Self::Cmd>>,
        _sender: &Sender,
    ) {
    }
}

/// Mailbox protocol of a durable-state entity.
#[derive(Clone, Debug)]
pub enum DsMsg<Cmd: Message> {
    Command(Cmd),
    Store(StateStoreReply),
}

impl<Cmd: Message> From<StateStoreReply> for DsMsg<Cmd> {
    fn from(reply: StateStoreReply) -> Self {
        DsMsg::Store(reply)
    }
}

enum Phase<B: DurableStateBehavior> {
    Loading {
        stash: Vec<(B::Cmd, Sender)>,
    },
    Ready,
    Persisting {
        next_state: B::State,
        stash: Vec<(B::Cmd, Sender)>,
        sender: Sender,
    },
}

/// Actor wrapper that drives a [`DurableStateBehavior`].
pub struct DurableState<B: DurableStateBehavior> {
    behavior: B,
    id: PersistenceId,
    store: ActorRef<StateStoreMsg>,
    state: Option<B::State>,
    phase: Phase<B>,
}

impl<B: DurableStateBehavior> DurableState<B> {
    pub fn new(behavior: B, id: PersistenceId, store: ActorRef<StateStoreMsg>) -> DurableState<B> {
        let state = Some(behavior.empty_state());
        DurableState {
            behavior,
            id,
            store,
            state,
            phase: Phase::Loading { stash: Vec::new() },
        }
    }

    /// Props whose factory reloads the entity on restart. The store
    /// must be a `StateStoreActor` instantiated with
    /// `W = DsMsg<B::Cmd>`.
    pub fn props<F>(
        make: F,
        id: PersistenceId,
        store: ActorRef<StateStoreMsg>,
    ) -> BoxActorProd<DurableState<B>>
    where
        F: Fn() -> B + Send + Sync + 'static,
    {
        Props::new_from(move || DurableState::new(make(), id.clone(), store.clone()))
    }

    fn process_command(&mut self, ctx: &Context<DsMsg<B::Cmd>>, cmd: B::Cmd, sender: Sender) {
        let state = self.state.as_ref().expect("entity state");
        match self.behavior.handle_command(state, cmd, ctx, &sender) {
            Some(next_state) => {
                let payload = serde_json::to_value(&next_state)
                    .unwrap_or_else(|e| panic!("state serialization failed: {}", e));
                self.store.tell_from(
                    StateStoreMsg::Save {
                        entity_id: self.id.to_string(),
                        payload,
                    },
                    Some(ctx.myself().into()),
                );
                self.phase = Phase::Persisting {
                    next_state,
                    stash: Vec::new(),
                    sender,
                };
            }
            None => {}
        }
    }

    fn drain_stash(&mut self, ctx: &Context<DsMsg<B::Cmd>>, stash: Vec<(B::Cmd, Sender)>) {
        for (cmd, sender) in stash {
            match &mut self.phase {
                Phase::Ready => self.process_command(ctx, cmd, sender),
                Phase::Persisting { stash, .. } => stash.push((cmd, sender)),
                Phase::Loading { stash } => stash.push((cmd, sender)),
            }
        }
    }

    fn handle_store_reply(&mut self, ctx: &Context<DsMsg<B::Cmd>>, reply: StateStoreReply) {
        match std::mem::replace(&mut self.phase, Phase::Ready) {
            Phase::Loading { stash } => match reply {
                StateStoreReply::Loaded { payload } => {
                    if let Some(raw) = payload {
                        let loaded: B::State = serde_json::from_str(&raw).unwrap_or_else(|e| {
                            panic!("state load failed for {}: {}", self.id, e)
                        });
                        self.state = Some(loaded);
                    }
                    self.drain_stash(ctx, stash);
                }
                StateStoreReply::Failed { error } => {
                    panic!("state load failed for {}: {}", self.id, error);
                }
                StateStoreReply::Saved => {
                    self.phase = Phase::Loading { stash };
                }
            },
            Phase::Persisting {
                next_state,
                stash,
                sender,
            } => match reply {
                StateStoreReply::Saved => {
                    self.state = Some(next_state);
                    let state = self.state.as_ref().expect("entity state");
                    self.behavior.on_persisted(state, ctx, &sender);
                    self.drain_stash(ctx, stash);
                }
                StateStoreReply::Failed { error } => {
                    panic!("state persist failed for {}: {}", self.id, error);
                }
                StateStoreReply::Loaded { .. } => {
                    self.phase = Phase::Persisting {
                        next_state,
                        stash,
                        sender,
                    };
                }
            },
            Phase::Ready => {}
        }
    }
}

impl<B: DurableStateBehavior> Actor for DurableState<B> {
    type Msg = DsMsg<B::Cmd>;

    fn pre_start(&mut self, ctx: &Context<Self::Msg>) {
        self.store.tell_from(
            StateStoreMsg::Load {
                entity_id: self.id.to_string(),
            },
            Some(ctx.myself().into()),
        );
    }

    fn recv(&mut self, ctx: &Context<Self::Msg>, msg: Self::Msg, sender: Sender) -> Next<Self::Msg> {
        match msg {
            DsMsg::Command(cmd) => match &mut self.phase {
                Phase::Ready => self.process_command(ctx, cmd, sender),
                Phase::Loading { stash } | Phase::Persisting { stash, .. } => {
                    stash.push((cmd, sender));
                }
            },
            DsMsg::Store(reply) => self.handle_store_reply(ctx, reply),
        }
        Next::Same
    }
}
