use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use movie::actors::*;
use movie::persist::{
    DsMsg, DurableState, DurableStateBehavior, EntityFactory, EntityMsg, EntityRef,
    EntityRegistry, EsMsg, EventSourced, EventSourcedBehavior, EventStoreActor, EventStoreMsg,
    EventStoreReply, PersistenceId, StateStoreActor,
};

#[derive(Clone, Debug)]
enum CounterCmd {
    Inc(i64),
    Get,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Incremented {
    amount: i64,
}

struct CounterBehavior;

impl EventSourcedBehavior for CounterBehavior {
    type Cmd = CounterCmd;
    type Evt = Incremented;
    type State = i64;

    fn empty_state(&self) -> i64 {
        0
    }

    fn apply_event(&self, state: &mut i64, evt: Incremented) {
        *state += evt.amount;
    }

    fn handle_command(
        &mut self,
        state: &i64,
        cmd: CounterCmd,
        _: &Context<EsMsg<CounterCmd>>,
        sender: &Sender,
    ) -> Vec<Incremented> {
        match cmd {
            CounterCmd::Inc(amount) => vec![Incremented { amount }],
            CounterCmd::Get => {
                if let Some(sender) = sender {
                    let _ = sender.try_tell(*state, None);
                }
                vec![]
            }
        }
    }
}

fn event_store(
    sys: &ActorSystem,
    db_path: &str,
) -> ActorRef<EventStoreMsg> {
    sys.actor_of_args::<EventStoreActor<EsMsg<CounterCmd>>, _>(
        "events",
        (db_path.to_string(), 2),
    )
    .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn event_sourced_counter_replays_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("events.db");
    let db_path = db_path.to_str().unwrap();

    // first incarnation: two increments
    {
        let sys = ActorSystem::with_name("es-one").unwrap();
        let store = event_store(&sys, db_path);

        let entity = sys
            .actor_of_props(
                "counter",
                EventSourced::props(
                    || CounterBehavior,
                    PersistenceId::new("Counter", "c1"),
                    store,
                ),
            )
            .unwrap();

        entity.tell(EsMsg::Command(CounterCmd::Inc(2)), None);
        entity.tell(EsMsg::Command(CounterCmd::Inc(3)), None);

        let value: i64 = entity
            .ask(&sys, EsMsg::Command(CounterCmd::Get), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(value, 5);
    }

    // second incarnation over the same db: state is rebuilt from the
    // journal before the first command runs
    {
        let sys = ActorSystem::with_name("es-two").unwrap();
        let store = event_store(&sys, db_path);

        let entity = sys
            .actor_of_props(
                "counter",
                EventSourced::props(
                    || CounterBehavior,
                    PersistenceId::new("Counter", "c1"),
                    store,
                ),
            )
            .unwrap();

        let value: i64 = entity
            .ask(&sys, EsMsg::Command(CounterCmd::Get), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(value, 5);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn streams_are_isolated_by_persistence_id() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("events.db");
    let db_path = db_path.to_str().unwrap();

    let sys = ActorSystem::with_name("es-iso").unwrap();
    let store = event_store(&sys, db_path);

    let a = sys
        .actor_of_props(
            "a",
            EventSourced::props(
                || CounterBehavior,
                PersistenceId::new("Counter", "a"),
                store.clone(),
            ),
        )
        .unwrap();
    let b = sys
        .actor_of_props(
            "b",
            EventSourced::props(
                || CounterBehavior,
                PersistenceId::new("Counter", "b"),
                store,
            ),
        )
        .unwrap();

    a.tell(EsMsg::Command(CounterCmd::Inc(10)), None);
    b.tell(EsMsg::Command(CounterCmd::Inc(1)), None);

    let va: i64 = a
        .ask(&sys, EsMsg::Command(CounterCmd::Get), Duration::from_secs(5))
        .await
        .unwrap();
    let vb: i64 = b
        .ask(&sys, EsMsg::Command(CounterCmd::Get), Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(va, 10);
    assert_eq!(vb, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn store_appends_return_monotonic_sequences() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("events.db");

    let sys = ActorSystem::with_name("es-seq").unwrap();
    let store = sys
        .actor_of_args::<EventStoreActor<EventStoreReply>, _>(
            "events",
            (db_path.to_str().unwrap().to_string(), 2),
        )
        .unwrap();

    for expected_seq in 1..=3 {
        let reply: EventStoreReply = store
            .ask(
                &sys,
                EventStoreMsg::Append {
                    stream: "s1".to_string(),
                    payload: serde_json::json!({ "n": expected_seq }),
                },
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        match reply {
            EventStoreReply::Appended { seq } => assert_eq!(seq, expected_seq),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    let reply: EventStoreReply = store
        .ask(
            &sys,
            EventStoreMsg::Load {
                stream: "s1".to_string(),
            },
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    match reply {
        EventStoreReply::Loaded { events } => {
            assert_eq!(events.len(), 3);
            assert!(events[0].contains("1"));
        }
        other => panic!("unexpected reply: {:?}", other),
    }
}

// entity registry: get-or-spawn with deterministic child names

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn entity_registry_spawns_and_caches() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("events.db");
    let db_path = db_path.to_str().unwrap();

    let sys = ActorSystem::with_name("es-reg").unwrap();
    let store = event_store(&sys, db_path);

    let factory: EntityFactory<EventSourced<CounterBehavior>> = Arc::new(move |entity_id| {
        EventSourced::props(
            || CounterBehavior,
            PersistenceId::new("Counter", entity_id),
            store.clone(),
        )
    });

    let registry = sys
        .actor_of_args::<EntityRegistry<EventSourced<CounterBehavior>>, _>(
            "counters",
            ("Counter".to_string(), factory),
        )
        .unwrap();

    let first: EntityRef<EsMsg<CounterCmd>> = registry
        .ask(
            &sys,
            EntityMsg::Get {
                entity_id: "c7".to_string(),
            },
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert_eq!(first.0.name(), "entity-counter-c7");

    first.0.tell(EsMsg::Command(CounterCmd::Inc(4)), None);

    let second: EntityRef<EsMsg<CounterCmd>> = registry
        .ask(
            &sys,
            EntityMsg::Get {
                entity_id: "c7".to_string(),
            },
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    // same child is returned, with the state the first handle built up
    assert_eq!(first.0.path(), second.0.path());
    let value: i64 = second
        .0
        .ask(&sys, EsMsg::Command(CounterCmd::Get), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(value, 4);
}

// durable state

#[derive(Clone, Debug)]
enum KvCmd {
    Put(String),
    Read,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct KvState {
    value: String,
}

struct KvBehavior;

impl DurableStateBehavior for KvBehavior {
    type Cmd = KvCmd;
    type State = KvState;

    fn empty_state(&self) -> KvState {
        KvState {
            value: String::new(),
        }
    }

    fn handle_command(
        &mut self,
        state: &KvState,
        cmd: KvCmd,
        _: &Context<DsMsg<KvCmd>>,
        sender: &Sender,
    ) -> Option<KvState> {
        match cmd {
            KvCmd::Put(value) => Some(KvState { value }),
            KvCmd::Read => {
                if let Some(sender) = sender {
                    let _ = sender.try_tell(state.clone(), None);
                }
                None
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn durable_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("state.db");
    let db_path = db_path.to_str().unwrap();

    {
        let sys = ActorSystem::with_name("ds-one").unwrap();
        let store = sys
            .actor_of_args::<StateStoreActor<DsMsg<KvCmd>>, _>(
                "state",
                (db_path.to_string(), 2),
            )
            .unwrap();

        let entity = sys
            .actor_of_props(
                "kv",
                DurableState::props(|| KvBehavior, PersistenceId::new("Kv", "k1"), store),
            )
            .unwrap();

        entity.tell(DsMsg::Command(KvCmd::Put("hello".to_string())), None);

        let state: KvState = entity
            .ask(&sys, DsMsg::Command(KvCmd::Read), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(state.value, "hello");
    }

    {
        let sys = ActorSystem::with_name("ds-two").unwrap();
        let store = sys
            .actor_of_args::<StateStoreActor<DsMsg<KvCmd>>, _>(
                "state",
                (db_path.to_string(), 2),
            )
            .unwrap();

        let entity = sys
            .actor_of_props(
                "kv",
                DurableState::props(|| KvBehavior, PersistenceId::new("Kv", "k1"), store),
            )
            .unwrap();

        let state: KvState = entity
            .ask(&sys, DsMsg::Command(KvCmd::Read), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(state.value, "hello");
    }
}

// commands sent while persisting are stashed, not lost or reordered

struct SlowProbeBehavior {
    probe: mpsc::UnboundedSender<i64>,
}

impl EventSourcedBehavior for SlowProbeBehavior {
    type Cmd = CounterCmd;
    type Evt = Incremented;
    type State = i64;

    fn empty_state(&self) -> i64 {
        0
    }

    fn apply_event(&self, state: &mut i64, evt: Incremented) {
        *state += evt.amount;
    }

    fn handle_command(
        &mut self,
        _: &i64,
        cmd: CounterCmd,
        _: &Context<EsMsg<CounterCmd>>,
        _: &Sender,
    ) -> Vec<Incremented> {
        match cmd {
            CounterCmd::Inc(amount) => vec![Incremented { amount }],
            CounterCmd::Get => vec![],
        }
    }

    fn on_persisted(&mut self, state: &i64, _: &Context<EsMsg<CounterCmd>>, _: &Sender) {
        let _ = self.probe.send(*state);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn events_apply_in_command_order() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("events.db");
    let db_path = db_path.to_str().unwrap().to_string();

    let sys = ActorSystem::with_name("es-order").unwrap();
    let store = sys
        .actor_of_args::<EventStoreActor<EsMsg<CounterCmd>>, _>("events", (db_path, 2))
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let entity = sys
        .actor_of_props(
            "counter",
            EventSourced::props(
                move || SlowProbeBehavior { probe: tx.clone() },
                PersistenceId::new("Counter", "ord"),
                store,
            ),
        )
        .unwrap();

    for i in 1..=5 {
        entity.tell(EsMsg::Command(CounterCmd::Inc(i)), None);
    }

    // post-persist states are the running prefix sums, in order
    let mut states = Vec::new();
    for _ in 0..5 {
        states.push(rx.recv().await.unwrap());
    }
    assert_eq!(states, vec![1, 3, 6, 10, 15]);
}
