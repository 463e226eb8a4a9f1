use std::collections::VecDeque;

use crate::actor::{Actor, ActorRef, BoxActorProd, Context, Next, Props, Sender};
use crate::persist::store::{EventStoreMsg, EventStoreReply};
use crate::persist::{PersistenceId, PersistentPayload};
use crate::Message;

/// Behavior contract for an event-sourced entity.
///
/// On start all events of the entity's stream are loaded and folded
/// into the state before any command is accepted. Each command's
/// returned events are appended to the journal before `on_persisted`
/// runs and before the next command is processed. Unrecognized
/// commands return no events and are ignored.
pub trait EventSourcedBehavior: Send + 'static {
    type Cmd: Message;
    type Evt: PersistentPayload;
    type State: Send + 'static;

    fn empty_state(&self) -> Self::State;

    /// Pure fold step, used both on replay and after persist.
    fn apply_event(&self, state: &mut Self::State, evt: Self::Evt);

    fn handle_command(
        &mut self,
        state: &Self::State,
        cmd: Self::Cmd,
        ctx: &Context<EsMsg<Self::Cmd>>,
        sender: &Sender,
    ) -> Vec<Self::Evt>;

    /// Runs after all events of a command have been appended.
    fn on_persisted(
        &mut self,
        _state: &Self::State,
        _ctx: &Context<EsMsg<Self::Cmd>>,
        _sender: &Sender,
    ) {
    }
}

/// Mailbox protocol of an event-sourced entity: application commands
/// plus the store replies the wrapper actor correlates.
#[derive(Clone, Debug)]
pub enum EsMsg<Cmd: Message> {
    Command(Cmd),
    Store(EventStoreReply),
}

impl<Cmd: Message> From<EventStoreReply> for EsMsg<Cmd> {
    fn from(reply: EventStoreReply) -> Self {
        EsMsg::Store(reply)
    }
}

enum Phase<B: EventSourcedBehavior> {
    Loading {
        stash: Vec<(B::Cmd, Sender)>,
    },
    Ready,
    Persisting {
        remaining: VecDeque<B::Evt>,
        stash: Vec<(B::Cmd, Sender)>,
        sender: Sender,
    },
}

/// Actor wrapper that drives an [`EventSourcedBehavior`].
///
/// Commands arriving while the entity is replaying or persisting are
/// stashed and processed in arrival order afterwards. Replay and
/// persistence failures panic, which escalates through supervision and
/// prevents the entity from running on inconsistent state.
pub struct EventSourced<B: EventSourcedBehavior> {
    behavior: B,
    id: PersistenceId,
    store: ActorRef<EventStoreMsg>,
    state: Option<B::State>,
    phase: Phase<B>,
}

impl<B: EventSourcedBehavior> EventSourced<B> {
    pub fn new(behavior: B, id: PersistenceId, store: ActorRef<EventStoreMsg>) -> EventSourced<B> {
        let state = Some(behavior.empty_state());
        EventSourced {
            behavior,
            id,
            store,
            state,
            phase: Phase::Loading { stash: Vec::new() },
        }
    }

    /// Props whose factory rebuilds the entity (and thus replays) on
    /// restart. The store must be an `EventStoreActor` instantiated
    /// with `W = EsMsg<B::Cmd>` so its replies reach this entity.
    pub fn props<F>(
        make: F,
        id: PersistenceId,
        store: ActorRef<EventStoreMsg>,
    ) -> BoxActorProd<EventSourced<B>>
    where
        F: Fn() -> B + Send + Sync + 'static,
    {
        Props::new_from(move || EventSourced::new(make(), id.clone(), store.clone()))
    }

    fn append_front(&self, ctx: &Context<EsMsg<B::Cmd>>, remaining: &VecDeque<B::Evt>) {
        if let Some(evt) = remaining.front() {
            let payload = serde_json::to_value(evt)
                .unwrap_or_else(|e| panic!("event serialization failed: {}", e));
            self.store.tell_from(
                EventStoreMsg::Append {
                    stream: self.id.to_string(),
                    payload,
                },
                Some(ctx.myself().into()),
            );
        }
    }

    fn process_command(&mut self, ctx: &Context<EsMsg<B::Cmd>>, cmd: B::Cmd, sender: Sender) {
        let state = self.state.as_ref().expect("entity state");
        let events = self.behavior.handle_command(state, cmd, ctx, &sender);

        if events.is_empty() {
            return;
        }

        let remaining: VecDeque<B::Evt> = events.into();
        self.append_front(ctx, &remaining);
        self.phase = Phase::Persisting {
            remaining,
            stash: Vec::new(),
            sender,
        };
    }

    fn drain_stash(&mut self, ctx: &Context<EsMsg<B::Cmd>>, stash: Vec<(B::Cmd, Sender)>) {
        for (cmd, sender) in stash {
            match &mut self.phase {
                Phase::Ready => self.process_command(ctx, cmd, sender),
                Phase::Persisting { stash, .. } => stash.push((cmd, sender)),
                Phase::Loading { stash } => stash.push((cmd, sender)),
            }
        }
    }
}

impl<B: EventSourcedBehavior> Actor for EventSourced<B> {
    type Msg = EsMsg<B::Cmd>;

    fn pre_start(&mut self, ctx: &Context<Self::Msg>) {
        self.store.tell_from(
            EventStoreMsg::Load {
                stream: self.id.to_string(),
            },
            Some(ctx.myself().into()),
        );
    }

    fn recv(&mut self, ctx: &Context<Self::Msg>, msg: Self::Msg, sender: Sender) -> Next<Self::Msg> {
        match msg {
            EsMsg::Command(cmd) => match &mut self.phase {
                Phase::Ready => self.process_command(ctx, cmd, sender),
                Phase::Loading { stash } | Phase::Persisting { stash, .. } => {
                    stash.push((cmd, sender));
                }
            },
            EsMsg::Store(reply) => self.handle_store_reply(ctx, reply),
        }
        Next::Same
    }
}

impl<B: EventSourcedBehavior> EventSourced<B> {
    fn handle_store_reply(&mut self, ctx: &Context<EsMsg<B::Cmd>>, reply: EventStoreReply) {
        match std::mem::replace(&mut self.phase, Phase::Ready) {
            Phase::Loading { stash } => match reply {
                EventStoreReply::Loaded { events } => {
                    let state = self.state.as_mut().expect("entity state");
                    for raw in events {
                        let evt: B::Evt = serde_json::from_str(&raw).unwrap_or_else(|e| {
                            panic!("event replay failed for {}: {}", self.id, e)
                        });
                        self.behavior.apply_event(state, evt);
                    }
                    self.drain_stash(ctx, stash);
                }
                EventStoreReply::Failed { error } => {
                    panic!("event replay failed for {}: {}", self.id, error);
                }
                EventStoreReply::Appended { .. } => {
                    self.phase = Phase::Loading { stash };
                }
            },
            Phase::Persisting {
                mut remaining,
                stash,
                sender,
            } => match reply {
                EventStoreReply::Appended { .. } => {
                    if let Some(evt) = remaining.pop_front() {
                        let state = self.state.as_mut().expect("entity state");
                        self.behavior.apply_event(state, evt);
                    }

                    if remaining.is_empty() {
                        let state = self.state.as_ref().expect("entity state");
                        self.behavior.on_persisted(state, ctx, &sender);
                        self.drain_stash(ctx, stash);
                    } else {
                        self.append_front(ctx, &remaining);
                        self.phase = Phase::Persisting {
                            remaining,
                            stash,
                            sender,
                        };
                    }
                }
                EventStoreReply::Failed { error } => {
                    panic!("event persist failed for {}: {}", self.id, error);
                }
                EventStoreReply::Loaded { .. } => {
                    self.phase = Phase::Persisting {
                        remaining,
                        stash,
                        sender,
                    };
                }
            },
            Phase::Ready => {}
        }
    }
}
