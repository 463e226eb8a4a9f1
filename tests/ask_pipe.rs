use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use movie::actors::*;
use movie::future::FutureState;

struct Echo;

impl ActorFactory for Echo {
    fn create() -> Self {
        Echo
    }
}

impl Actor for Echo {
    type Msg = String;

    fn recv(&mut self, _: &Context<Self::Msg>, msg: Self::Msg, sender: Sender) -> Next<Self::Msg> {
        if let Some(sender) = sender {
            let _ = sender.try_tell(format!("echo: {}", msg), None);
        }
        Next::Same
    }
}

struct Silent;

impl ActorFactory for Silent {
    fn create() -> Self {
        Silent
    }
}

impl Actor for Silent {
    type Msg = String;

    fn recv(&mut self, _: &Context<Self::Msg>, _: Self::Msg, _: Sender) -> Next<Self::Msg> {
        Next::Same
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn local_echo_via_ask() {
    let sys = ActorSystem::new().unwrap();
    let actor = sys.actor_of::<Echo>("echo").unwrap();

    let reply: String = actor
        .ask(&sys, "hi".to_string(), Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(reply, "echo: hi");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ask_times_out_when_no_reply() {
    let sys = ActorSystem::new().unwrap();
    let actor = sys.actor_of::<Silent>("silent").unwrap();

    let started = Instant::now();
    let result: Result<String, Fault> = actor
        .ask(&sys, "anyone?".to_string(), Duration::from_millis(100))
        .await;

    assert_eq!(result, Err(Fault::Timeout));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_secs(1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ask_fails_when_target_terminates() {
    let sys = ActorSystem::new().unwrap();
    let actor = sys.actor_of::<Silent>("doomed").unwrap();

    let future = actor.ask::<String>(&sys, "hello".to_string(), Duration::from_secs(5));
    sys.stop(&actor);

    assert_eq!(future.await, Err(Fault::TargetTerminated));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ask_future_state_transitions() {
    let sys = ActorSystem::new().unwrap();
    let actor = sys.actor_of::<Echo>("echo").unwrap();

    let future = actor.ask::<String>(&sys, "state".to_string(), Duration::from_secs(1));
    let value = future.clone().await.unwrap();
    assert_eq!(value, "echo: state");
    assert_eq!(future.state(), FutureState::Success);
}

// pipe: future completions arrive back as messages

#[derive(Clone, Debug)]
enum Collected {
    Value(String),
    Failed(String),
}

impl From<movie::future::PipeResult<String>> for Collected {
    fn from(result: movie::future::PipeResult<String>) -> Self {
        match result {
            movie::future::PipeResult::Success(v) => Collected::Value(v),
            movie::future::PipeResult::Failure(f) => Collected::Failed(f.to_string()),
        }
    }
}

struct PipeTarget {
    probe: mpsc::UnboundedSender<Collected>,
}

impl ActorFactoryArgs<mpsc::UnboundedSender<Collected>> for PipeTarget {
    fn create_args(probe: mpsc::UnboundedSender<Collected>) -> Self {
        PipeTarget { probe }
    }
}

impl Actor for PipeTarget {
    type Msg = Collected;

    fn recv(&mut self, _: &Context<Self::Msg>, msg: Self::Msg, _: Sender) -> Next<Self::Msg> {
        let _ = self.probe.send(msg);
        Next::Same
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pipe_forwards_success_and_failure() {
    let sys = ActorSystem::new().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let target = sys.actor_of_args::<PipeTarget, _>("target", tx).unwrap();

    let (p1, f1) = movie::future::promise::<String>();
    movie::future::pipe(&f1, target.clone(), None);
    p1.success("done".to_string());

    match rx.recv().await.unwrap() {
        Collected::Value(v) => assert_eq!(v, "done"),
        other => panic!("unexpected: {:?}", other),
    }

    let (p2, f2) = movie::future::promise::<String>();
    movie::future::pipe(&f2, target.clone(), None);
    p2.failure(Fault::App("boom".to_string()));

    match rx.recv().await.unwrap() {
        Collected::Failed(reason) => assert!(reason.contains("boom")),
        other => panic!("unexpected: {:?}", other),
    }

    // cancellation surfaces as failure
    let (p3, f3) = movie::future::promise::<String>();
    movie::future::pipe(&f3, target, None);
    p3.cancel();

    match rx.recv().await.unwrap() {
        Collected::Failed(reason) => assert!(reason.contains("cancelled")),
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pipe_map_uses_custom_constructors() {
    let sys = ActorSystem::new().unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let target = sys.actor_of_args::<PipeTarget, _>("target", tx).unwrap();

    let (p, f) = movie::future::promise::<String>();
    movie::future::pipe_map(
        &f,
        target,
        None,
        |v| Collected::Value(format!("mapped: {}", v)),
        |fault| Collected::Failed(fault.to_string()),
    );
    p.success("x".to_string());

    match rx.recv().await.unwrap() {
        Collected::Value(v) => assert_eq!(v, "mapped: x"),
        other => panic!("unexpected: {:?}", other),
    }
}
