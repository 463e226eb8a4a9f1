use std::time::Duration;

use tokio::sync::mpsc;

use movie::actors::*;

#[derive(Clone, Debug)]
enum CounterMsg {
    Add(u32),
    Report,
}

struct Counter {
    seen: Vec<u32>,
    probe: mpsc::UnboundedSender<Vec<u32>>,
}

impl ActorFactoryArgs<mpsc::UnboundedSender<Vec<u32>>> for Counter {
    fn create_args(probe: mpsc::UnboundedSender<Vec<u32>>) -> Self {
        Counter {
            seen: Vec::new(),
            probe,
        }
    }
}

impl Actor for Counter {
    type Msg = CounterMsg;

    fn recv(&mut self, _: &Context<Self::Msg>, msg: Self::Msg, _: Sender) -> Next<Self::Msg> {
        match msg {
            CounterMsg::Add(n) => self.seen.push(n),
            CounterMsg::Report => {
                let _ = self.probe.send(self.seen.clone());
            }
        }
        Next::Same
    }
}

#[derive(Default)]
struct Dumb;

impl ActorFactory for Dumb {
    fn create() -> Self {
        Dumb
    }
}

impl Actor for Dumb {
    type Msg = u32;

    fn recv(&mut self, _: &Context<Self::Msg>, _: Self::Msg, _: Sender) -> Next<Self::Msg> {
        Next::Same
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn actor_create_validates_names() {
    let sys = ActorSystem::new().unwrap();

    assert!(sys.actor_of::<Dumb>("valid-name").is_ok());

    assert!(sys.actor_of::<Dumb>("/").is_err());
    assert!(sys.actor_of::<Dumb>("*").is_err());
    assert!(sys.actor_of::<Dumb>("a/b/c").is_err());
    assert!(sys.actor_of::<Dumb>("@").is_err());
    assert!(sys.actor_of::<Dumb>("#").is_err());
    assert!(sys.actor_of::<Dumb>("abc*").is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_names_are_rejected() {
    let sys = ActorSystem::new().unwrap();

    assert!(sys.actor_of::<Dumb>("me").is_ok());
    assert!(matches!(
        sys.actor_of::<Dumb>("me"),
        Err(CreateError::AlreadyExists(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn messages_from_one_sender_arrive_in_order() {
    let sys = ActorSystem::new().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let actor = sys.actor_of_args::<Counter, _>("counter", tx).unwrap();

    for i in 0..1000 {
        actor.tell(CounterMsg::Add(i), None);
    }
    actor.tell(CounterMsg::Report, None);

    let seen = rx.recv().await.unwrap();
    let expected: Vec<u32> = (0..1000).collect();
    assert_eq!(seen, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn try_tell_rejects_wrong_type() {
    let sys = ActorSystem::new().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let actor = sys.actor_of_args::<Counter, _>("counter", tx).unwrap();
    let basic: BasicActorRef = actor.into();

    assert!(basic.try_tell(CounterMsg::Add(1), None).is_ok());
    assert!(basic.try_tell("wrong type".to_string(), None).is_err());

    basic.try_tell(CounterMsg::Report, None).unwrap();
    assert_eq!(rx.recv().await.unwrap(), vec![1]);
}

// behavior swap: the first message replaces the behavior for all
// subsequent messages
struct FlipFlop {
    probe: mpsc::UnboundedSender<&'static str>,
}

impl ActorFactoryArgs<mpsc::UnboundedSender<&'static str>> for FlipFlop {
    fn create_args(probe: mpsc::UnboundedSender<&'static str>) -> Self {
        FlipFlop { probe }
    }
}

struct Flipped {
    probe: mpsc::UnboundedSender<&'static str>,
}

impl Actor for FlipFlop {
    type Msg = ();

    fn recv(&mut self, _: &Context<Self::Msg>, _: Self::Msg, _: Sender) -> Next<Self::Msg> {
        let _ = self.probe.send("first");
        Next::Become(Box::new(Flipped {
            probe: self.probe.clone(),
        }))
    }
}

impl Actor for Flipped {
    type Msg = ();

    fn recv(&mut self, _: &Context<Self::Msg>, _: Self::Msg, _: Sender) -> Next<Self::Msg> {
        let _ = self.probe.send("second");
        Next::Same
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn become_swaps_behavior() {
    let sys = ActorSystem::new().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let actor = sys.actor_of_args::<FlipFlop, _>("flip", tx).unwrap();
    actor.tell((), None);
    actor.tell((), None);
    actor.tell((), None);

    assert_eq!(rx.recv().await.unwrap(), "first");
    assert_eq!(rx.recv().await.unwrap(), "second");
    assert_eq!(rx.recv().await.unwrap(), "second");
}

// watching: Terminated is delivered exactly once to the watcher
struct Watcher {
    target: BasicActorRef,
    probe: mpsc::UnboundedSender<String>,
}

impl ActorFactoryArgs<(BasicActorRef, mpsc::UnboundedSender<String>)> for Watcher {
    fn create_args((target, probe): (BasicActorRef, mpsc::UnboundedSender<String>)) -> Self {
        Watcher { target, probe }
    }
}

impl Actor for Watcher {
    type Msg = ();

    fn pre_start(&mut self, ctx: &Context<Self::Msg>) {
        ctx.watch(&self.target);
    }

    fn sys_recv(&mut self, _: &Context<Self::Msg>, msg: SystemMsg, _: Sender) {
        if let SystemMsg::Terminated(terminated) = msg {
            let _ = self.probe.send(terminated.name().to_string());
        }
    }

    fn recv(&mut self, _: &Context<Self::Msg>, _: Self::Msg, _: Sender) -> Next<Self::Msg> {
        Next::Same
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn watcher_receives_terminated_exactly_once() {
    let sys = ActorSystem::new().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let target = sys.actor_of::<Dumb>("target").unwrap();
    let target_basic: BasicActorRef = target.clone().into();
    sys.actor_of_args::<Watcher, _>("watcher", (target_basic, tx))
        .unwrap();

    // give the watch a moment to register before stopping
    tokio::time::sleep(Duration::from_millis(50)).await;
    sys.stop(&target);

    assert_eq!(rx.recv().await.unwrap(), "target");
    assert!(
        tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .is_err(),
        "Terminated must only be delivered once"
    );
}

// stopping a parent cascades to its children before PostStop
struct Parent {
    probe: mpsc::UnboundedSender<String>,
}

impl ActorFactoryArgs<mpsc::UnboundedSender<String>> for Parent {
    fn create_args(probe: mpsc::UnboundedSender<String>) -> Self {
        Parent { probe }
    }
}

impl Actor for Parent {
    type Msg = ();

    fn pre_start(&mut self, ctx: &Context<Self::Msg>) {
        ctx.actor_of_args::<Child, _>("child-a", self.probe.clone())
            .unwrap();
        ctx.actor_of_args::<Child, _>("child-b", self.probe.clone())
            .unwrap();
    }

    fn post_stop(&mut self) {
        let _ = self.probe.send("parent".to_string());
    }

    fn recv(&mut self, _: &Context<Self::Msg>, _: Self::Msg, _: Sender) -> Next<Self::Msg> {
        Next::Same
    }
}

struct Child {
    probe: mpsc::UnboundedSender<String>,
}

impl ActorFactoryArgs<mpsc::UnboundedSender<String>> for Child {
    fn create_args(probe: mpsc::UnboundedSender<String>) -> Self {
        Child { probe }
    }
}

impl Actor for Child {
    type Msg = ();

    fn post_stop(&mut self) {
        let _ = self.probe.send("child".to_string());
    }

    fn recv(&mut self, _: &Context<Self::Msg>, _: Self::Msg, _: Sender) -> Next<Self::Msg> {
        Next::Same
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_drains_children_before_post_stop() {
    let sys = ActorSystem::new().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let parent = sys.actor_of_args::<Parent, _>("parent", tx).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    sys.stop(&parent);

    let mut order = Vec::new();
    for _ in 0..3 {
        order.push(rx.recv().await.unwrap());
    }

    assert_eq!(order[0], "child");
    assert_eq!(order[1], "child");
    assert_eq!(order[2], "parent");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tells_to_stopped_actor_do_not_panic() {
    let sys = ActorSystem::new().unwrap();
    let actor = sys.actor_of::<Dumb>("doomed").unwrap();

    sys.stop(&actor);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // routed to dead letters, not an error at the call site
    actor.tell(1u32, None);
    actor.tell(2u32, None);
}
