use std::collections::HashMap;
use std::marker::PhantomData;

use serde_json::Value;
use slog::warn;
use uuid::Uuid;

use crate::actor::{
    Actor, ActorFactoryArgs, ActorRef, ActorRefFactory, Context, Next, Sender,
};
use crate::persist::pool::{ConnectionPool, DbQuery, DbReply};
use crate::remote::envelope::now_ms;
use crate::Message;

const EVENTS_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS events (\
     stream_id TEXT NOT NULL, \
     seq INTEGER NOT NULL, \
     payload_json TEXT NOT NULL, \
     PRIMARY KEY (stream_id, seq))";

const STATE_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS state (\
     entity_id TEXT PRIMARY KEY, \
     payload_json TEXT NOT NULL, \
     updated_at INTEGER NOT NULL)";

/// Requests understood by [`EventStoreActor`], plus the pool replies it
/// correlates.
#[derive(Clone, Debug)]
pub enum EventStoreMsg {
    Append { stream: String, payload: Value },
    Load { stream: String },
    Db(DbReply),
}

impl From<DbReply> for EventStoreMsg {
    fn from(reply: DbReply) -> Self {
        EventStoreMsg::Db(reply)
    }
}

#[derive(Clone, Debug)]
pub enum EventStoreReply {
    Appended { seq: i64 },
    Loaded { events: Vec<String> },
    Failed { error: String },
}

enum EsPending {
    Setup,
    Append(Sender),
    Load(Sender),
}

/// Append-only event journal over a SQLite connection pool.
///
/// `AppendEvent(stream, payload) -> seq` with a per-stream monotonic
/// sequence, and `LoadEvents(stream) -> [payload]` in seq order.
/// Replies are wrapped in `W`; instantiate with the requester's
/// message enum (`W = EsMsg<Cmd>` for event-sourced entities).
pub struct EventStoreActor<W: Message + From<EventStoreReply>> {
    db_path: String,
    pool_size: usize,
    pool: Option<ActorRef<DbQuery>>,
    pending: HashMap<Uuid, EsPending>,
    // requests received before the schema query acked; replayed once
    // the store is ready so they cannot race table creation
    ready: bool,
    backlog: Vec<(EventStoreMsg, Sender)>,
    _marker: PhantomData<fn() -> W>,
}

impl<W: Message + From<EventStoreReply>> ActorFactoryArgs<(String, usize)> for EventStoreActor<W> {
    fn create_args((db_path, pool_size): (String, usize)) -> Self {
        EventStoreActor {
            db_path,
            pool_size,
            pool: None,
            pending: HashMap::new(),
            ready: false,
            backlog: Vec::new(),
            _marker: PhantomData,
        }
    }
}

impl<W: Message + From<EventStoreReply>> EventStoreActor<W> {
    fn send_query(&mut self, ctx: &Context<EventStoreMsg>, query: DbQuery, pending: EsPending) {
        self.pending.insert(query.id, pending);
        if let Some(pool) = &self.pool {
            pool.tell_from(query, Some(ctx.myself().into()));
        }
    }

    fn reply(&self, to: &Sender, reply: EventStoreReply) {
        if let Some(to) = to {
            let _ = to.try_tell(W::from(reply), None);
        }
    }
}

impl<W: Message + From<EventStoreReply>> Actor for EventStoreActor<W> {
    type Msg = EventStoreMsg;

    fn pre_start(&mut self, ctx: &Context<Self::Msg>) {
        self.pool = ctx
            .actor_of_args::<ConnectionPool<EventStoreMsg>, _>(
                "pool",
                (self.db_path.clone(), self.pool_size),
            )
            .ok();

        let setup = DbQuery::new(EVENTS_SCHEMA, vec![]);
        self.send_query(ctx, setup, EsPending::Setup);
    }

    fn recv(&mut self, ctx: &Context<Self::Msg>, msg: Self::Msg, sender: Sender) -> Next<Self::Msg> {
        match msg {
            EventStoreMsg::Append { .. } | EventStoreMsg::Load { .. } if !self.ready => {
                self.backlog.push((msg, sender));
            }
            EventStoreMsg::Append { stream, payload } => {
                let query = DbQuery::new(
                    "INSERT INTO events (stream_id, seq, payload_json) \
                     SELECT ?1, COALESCE(MAX(seq), 0) + 1, ?2 FROM events \
                     WHERE stream_id = ?1 \
                     RETURNING seq",
                    vec![Value::String(stream), payload],
                );
                self.send_query(ctx, query, EsPending::Append(sender));
            }
            EventStoreMsg::Load { stream } => {
                let query = DbQuery::new(
                    "SELECT payload_json FROM events WHERE stream_id = ?1 ORDER BY seq",
                    vec![Value::String(stream)],
                );
                self.send_query(ctx, query, EsPending::Load(sender));
            }
            EventStoreMsg::Db(reply) => {
                let (id, outcome) = match reply {
                    DbReply::Rows { id, rows } => (id, Ok(rows)),
                    DbReply::Error { id, error } => (id, Err(error)),
                };

                match (self.pending.remove(&id), outcome) {
                    (Some(EsPending::Setup), Ok(_)) => {
                        self.ready = true;
                        for (msg, sender) in std::mem::take(&mut self.backlog) {
                            let _ = self.recv(ctx, msg, sender);
                        }
                    }
                    (Some(EsPending::Setup), Err(e)) => {
                        warn!(ctx.system.log(), "event store schema setup failed: {}", e);
                        self.ready = true;
                        for (msg, sender) in std::mem::take(&mut self.backlog) {
                            let _ = self.recv(ctx, msg, sender);
                        }
                    }
                    (Some(EsPending::Append(to)), Ok(rows)) => {
                        let seq = rows
                            .first()
                            .and_then(|r| r.first())
                            .and_then(Value::as_i64)
                            .unwrap_or(0);
                        self.reply(&to, EventStoreReply::Appended { seq });
                    }
                    (Some(EsPending::Append(to)), Err(error)) => {
                        self.reply(&to, EventStoreReply::Failed { error });
                    }
                    (Some(EsPending::Load(to)), Ok(rows)) => {
                        let events = rows
                            .into_iter()
                            .filter_map(|mut r| match r.drain(..).next() {
                                Some(Value::String(s)) => Some(s),
                                Some(other) => Some(other.to_string()),
                                None => None,
                            })
                            .collect();
                        self.reply(&to, EventStoreReply::Loaded { events });
                    }
                    (Some(EsPending::Load(to)), Err(error)) => {
                        self.reply(&to, EventStoreReply::Failed { error });
                    }
                    (None, _) => {}
                }
            }
        }
        Next::Same
    }
}

/// Requests understood by [`StateStoreActor`].
#[derive(Clone, Debug)]
pub enum StateStoreMsg {
    Save { entity_id: String, payload: Value },
    Load { entity_id: String },
    Db(DbReply),
}

impl From<DbReply> for StateStoreMsg {
    fn from(reply: DbReply) -> Self {
        StateStoreMsg::Db(reply)
    }
}

#[derive(Clone, Debug)]
pub enum StateStoreReply {
    Saved,
    Loaded { payload: Option<String> },
    Failed { error: String },
}

enum StatePending {
    Setup,
    Save(Sender),
    Load(Sender),
}

/// Latest-state storage: `SaveState(id, payload)` upserts,
/// `LoadState(id)` returns the most recent payload, if any.
pub struct StateStoreActor<W: Message + From<StateStoreReply>> {
    db_path: String,
    pool_size: usize,
    pool: Option<ActorRef<DbQuery>>,
    pending: HashMap<Uuid, StatePending>,
    ready: bool,
    backlog: Vec<(StateStoreMsg, Sender)>,
    _marker: PhantomData<fn() -> W>,
}

impl<W: Message + From<StateStoreReply>> ActorFactoryArgs<(String, usize)> for StateStoreActor<W> {
    fn create_args((db_path, pool_size): (String, usize)) -> Self {
        StateStoreActor {
            db_path,
            pool_size,
            pool: None,
            pending: HashMap::new(),
            ready: false,
            backlog: Vec::new(),
            _marker: PhantomData,
        }
    }
}

impl<W: Message + From<StateStoreReply>> StateStoreActor<W> {
    fn send_query(&mut self, ctx: &Context<StateStoreMsg>, query: DbQuery, pending: StatePending) {
        self.pending.insert(query.id, pending);
        if let Some(pool) = &self.pool {
            pool.tell_from(query, Some(ctx.myself().into()));
        }
    }

    fn reply(&self, to: &Sender, reply: StateStoreReply) {
        if let Some(to) = to {
            let _ = to.try_tell(W::from(reply), None);
        }
    }
}

impl<W: Message + From<StateStoreReply>> Actor for StateStoreActor<W> {
    type Msg = StateStoreMsg;

    fn pre_start(&mut self, ctx: &Context<Self::Msg>) {
        self.pool = ctx
            .actor_of_args::<ConnectionPool<StateStoreMsg>, _>(
                "pool",
                (self.db_path.clone(), self.pool_size),
            )
            .ok();

        let setup = DbQuery::new(STATE_SCHEMA, vec![]);
        self.send_query(ctx, setup, StatePending::Setup);
    }

    fn recv(&mut self, ctx: &Context<Self::Msg>, msg: Self::Msg, sender: Sender) -> Next<Self::Msg> {
        match msg {
            StateStoreMsg::Save { .. } | StateStoreMsg::Load { .. } if !self.ready => {
                self.backlog.push((msg, sender));
            }
            StateStoreMsg::Save { entity_id, payload } => {
                let query = DbQuery::new(
                    "INSERT INTO state (entity_id, payload_json, updated_at) \
                     VALUES (?1, ?2, ?3) \
                     ON CONFLICT(entity_id) DO UPDATE SET \
                     payload_json = excluded.payload_json, \
                     updated_at = excluded.updated_at",
                    vec![
                        Value::String(entity_id),
                        payload,
                        Value::from(now_ms()),
                    ],
                );
                self.send_query(ctx, query, StatePending::Save(sender));
            }
            StateStoreMsg::Load { entity_id } => {
                let query = DbQuery::new(
                    "SELECT payload_json FROM state WHERE entity_id = ?1",
                    vec![Value::String(entity_id)],
                );
                self.send_query(ctx, query, StatePending::Load(sender));
            }
            StateStoreMsg::Db(reply) => {
                let (id, outcome) = match reply {
                    DbReply::Rows { id, rows } => (id, Ok(rows)),
                    DbReply::Error { id, error } => (id, Err(error)),
                };

                match (self.pending.remove(&id), outcome) {
                    (Some(StatePending::Setup), Ok(_)) => {
                        self.ready = true;
                        for (msg, sender) in std::mem::take(&mut self.backlog) {
                            let _ = self.recv(ctx, msg, sender);
                        }
                    }
                    (Some(StatePending::Setup), Err(e)) => {
                        warn!(ctx.system.log(), "state store schema setup failed: {}", e);
                        self.ready = true;
                        for (msg, sender) in std::mem::take(&mut self.backlog) {
                            let _ = self.recv(ctx, msg, sender);
                        }
                    }
                    (Some(StatePending::Save(to)), Ok(_)) => {
                        self.reply(&to, StateStoreReply::Saved);
                    }
                    (Some(StatePending::Save(to)), Err(error)) => {
                        self.reply(&to, StateStoreReply::Failed { error });
                    }
                    (Some(StatePending::Load(to)), Ok(rows)) => {
                        let payload = rows.into_iter().next().and_then(|mut r| {
                            match r.drain(..).next() {
                                Some(Value::String(s)) => Some(s),
                                Some(other) => Some(other.to_string()),
                                None => None,
                            }
                        });
                        self.reply(&to, StateStoreReply::Loaded { payload });
                    }
                    (Some(StatePending::Load(to)), Err(error)) => {
                        self.reply(&to, StateStoreReply::Failed { error });
                    }
                    (None, _) => {}
                }
            }
        }
        Next::Same
    }
}
