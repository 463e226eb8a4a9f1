use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use movie::actors::*;

#[derive(Clone, Debug)]
enum ChildMsg {
    Boom,
    Incr,
    Get,
}

struct Failing {
    count: u32,
    probe: mpsc::UnboundedSender<Instant>,
}

impl ActorFactoryArgs<mpsc::UnboundedSender<Instant>> for Failing {
    fn create_args(probe: mpsc::UnboundedSender<Instant>) -> Self {
        Failing { count: 0, probe }
    }
}

impl Actor for Failing {
    type Msg = ChildMsg;

    fn post_start(&mut self, _: &Context<Self::Msg>) {
        let _ = self.probe.send(Instant::now());
    }

    fn recv(&mut self, _: &Context<Self::Msg>, msg: Self::Msg, sender: Sender) -> Next<Self::Msg> {
        match msg {
            ChildMsg::Boom => panic!("// TEST PANIC //"),
            ChildMsg::Incr => {
                self.count += 1;
                Next::Same
            }
            ChildMsg::Get => {
                if let Some(sender) = sender {
                    let _ = sender.try_tell(self.count, None);
                }
                Next::Same
            }
        }
    }
}

#[derive(Clone, Debug)]
struct SupCfg {
    strategy: Strategy,
    scope: Scope,
    max_restarts: u32,
}

struct Sup {
    cfg: SupCfg,
    child_tx: mpsc::UnboundedSender<ActorRef<ChildMsg>>,
    start_probe: mpsc::UnboundedSender<Instant>,
    term_probe: mpsc::UnboundedSender<String>,
}

type SupArgs = (
    SupCfg,
    mpsc::UnboundedSender<ActorRef<ChildMsg>>,
    mpsc::UnboundedSender<Instant>,
    mpsc::UnboundedSender<String>,
);

impl ActorFactoryArgs<SupArgs> for Sup {
    fn create_args((cfg, child_tx, start_probe, term_probe): SupArgs) -> Self {
        Sup {
            cfg,
            child_tx,
            start_probe,
            term_probe,
        }
    }
}

impl Actor for Sup {
    type Msg = ();

    fn pre_start(&mut self, ctx: &Context<Self::Msg>) {
        let child = ctx
            .actor_of_args::<Failing, _>("child", self.start_probe.clone())
            .unwrap();
        let _ = self.child_tx.send(child);
    }

    fn supervision(&self) -> SupervisionConfig {
        SupervisionConfig {
            strategy: self.cfg.strategy,
            scope: self.cfg.scope,
            max_restarts: self.cfg.max_restarts,
            window: Duration::from_secs(1),
            backoff_min: Duration::from_millis(20),
            backoff_max: Duration::from_secs(1),
            backoff_factor: 2.0,
            jitter: 0.0,
        }
    }

    fn sys_recv(&mut self, _: &Context<Self::Msg>, msg: SystemMsg, _: Sender) {
        if let SystemMsg::Terminated(terminated) = msg {
            let _ = self.term_probe.send(terminated.name().to_string());
        }
    }

    fn recv(&mut self, _: &Context<Self::Msg>, _: Self::Msg, _: Sender) -> Next<Self::Msg> {
        Next::Same
    }
}

fn restart_cfg(max_restarts: u32) -> SupCfg {
    SupCfg {
        strategy: Strategy::Restart,
        scope: Scope::OneForOne,
        max_restarts,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn restart_backs_off_then_stops_over_budget() {
    let sys = ActorSystem::new().unwrap();
    let (child_tx, mut child_rx) = mpsc::unbounded_channel();
    let (start_tx, mut start_rx) = mpsc::unbounded_channel();
    let (term_tx, mut term_rx) = mpsc::unbounded_channel();

    sys.actor_of_args::<Sup, _>("sup", (restart_cfg(2), child_tx, start_tx, term_tx))
        .unwrap();

    let child = child_rx.recv().await.unwrap();
    let initial_start = start_rx.recv().await.unwrap();

    // three failing messages within 100 ms
    let sent_at = Instant::now();
    child.tell(ChildMsg::Boom, None);
    child.tell(ChildMsg::Boom, None);
    child.tell(ChildMsg::Boom, None);

    // first restart is delayed >= 20ms, second >= 40ms
    let restart1 = tokio::time::timeout(Duration::from_secs(2), start_rx.recv())
        .await
        .expect("first restart")
        .unwrap();
    let restart2 = tokio::time::timeout(Duration::from_secs(2), start_rx.recv())
        .await
        .expect("second restart")
        .unwrap();

    assert!(restart1 > initial_start);
    assert!(restart1.duration_since(sent_at) >= Duration::from_millis(20));
    assert!(restart2.duration_since(restart1) >= Duration::from_millis(40));

    // the third failure exceeds the budget: the child is stopped and
    // the parent sees Terminated
    let terminated = tokio::time::timeout(Duration::from_secs(2), term_rx.recv())
        .await
        .expect("terminated")
        .unwrap();
    assert_eq!(terminated, "child");

    // no further restarts happen
    assert!(
        tokio::time::timeout(Duration::from_millis(200), start_rx.recv())
            .await
            .is_err()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn resume_keeps_state_and_drops_failing_message() {
    let sys = ActorSystem::new().unwrap();
    let (child_tx, mut child_rx) = mpsc::unbounded_channel();
    let (start_tx, mut start_rx) = mpsc::unbounded_channel();
    let (term_tx, _term_rx) = mpsc::unbounded_channel();

    let cfg = SupCfg {
        strategy: Strategy::Resume,
        scope: Scope::OneForOne,
        max_restarts: 10,
    };
    sys.actor_of_args::<Sup, _>("sup", (cfg, child_tx, start_tx, term_tx))
        .unwrap();

    let child = child_rx.recv().await.unwrap();
    let _ = start_rx.recv().await.unwrap();

    child.tell(ChildMsg::Incr, None);
    child.tell(ChildMsg::Incr, None);
    child.tell(ChildMsg::Boom, None);
    child.tell(ChildMsg::Incr, None);

    let count: u32 = child
        .ask(&sys, ChildMsg::Get, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(count, 3, "state survives a Resume");

    // resumed, not restarted
    assert!(
        tokio::time::timeout(Duration::from_millis(200), start_rx.recv())
            .await
            .is_err()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_strategy_terminates_failed_child() {
    let sys = ActorSystem::new().unwrap();
    let (child_tx, mut child_rx) = mpsc::unbounded_channel();
    let (start_tx, _start_rx) = mpsc::unbounded_channel();
    let (term_tx, mut term_rx) = mpsc::unbounded_channel();

    let cfg = SupCfg {
        strategy: Strategy::Stop,
        scope: Scope::OneForOne,
        max_restarts: 10,
    };
    sys.actor_of_args::<Sup, _>("sup", (cfg, child_tx, start_tx, term_tx))
        .unwrap();

    let child = child_rx.recv().await.unwrap();
    child.tell(ChildMsg::Boom, None);

    let terminated = tokio::time::timeout(Duration::from_secs(2), term_rx.recv())
        .await
        .expect("terminated")
        .unwrap();
    assert_eq!(terminated, "child");
}

// an AllForOne supervisor restarts the sibling when one child fails
struct TwoChildSup {
    probe: mpsc::UnboundedSender<String>,
    child_tx: mpsc::UnboundedSender<ActorRef<ChildMsg>>,
}

type TwoChildArgs = (
    mpsc::UnboundedSender<String>,
    mpsc::UnboundedSender<ActorRef<ChildMsg>>,
);

impl ActorFactoryArgs<TwoChildArgs> for TwoChildSup {
    fn create_args((probe, child_tx): TwoChildArgs) -> Self {
        TwoChildSup { probe, child_tx }
    }
}

impl Actor for TwoChildSup {
    type Msg = ();

    fn pre_start(&mut self, ctx: &Context<Self::Msg>) {
        let a = ctx
            .actor_of_args::<NamedChild, _>("child-a", ("a".to_string(), self.probe.clone()))
            .unwrap();
        ctx.actor_of_args::<NamedChild, _>("child-b", ("b".to_string(), self.probe.clone()))
            .unwrap();
        let _ = self.child_tx.send(a);
    }

    fn supervision(&self) -> SupervisionConfig {
        SupervisionConfig {
            strategy: Strategy::Restart,
            scope: Scope::AllForOne,
            max_restarts: 5,
            window: Duration::from_secs(1),
            backoff_min: Duration::from_millis(10),
            backoff_max: Duration::from_millis(100),
            backoff_factor: 2.0,
            jitter: 0.0,
        }
    }

    fn recv(&mut self, _: &Context<Self::Msg>, _: Self::Msg, _: Sender) -> Next<Self::Msg> {
        Next::Same
    }
}

struct NamedChild {
    name: String,
    probe: mpsc::UnboundedSender<String>,
    started: bool,
}

impl ActorFactoryArgs<(String, mpsc::UnboundedSender<String>)> for NamedChild {
    fn create_args((name, probe): (String, mpsc::UnboundedSender<String>)) -> Self {
        NamedChild {
            name,
            probe,
            started: false,
        }
    }
}

impl Actor for NamedChild {
    type Msg = ChildMsg;

    fn post_restart(&mut self, _: &Context<Self::Msg>) {
        let _ = self.probe.send(format!("restarted-{}", self.name));
    }

    fn post_start(&mut self, _: &Context<Self::Msg>) {
        if !self.started {
            self.started = true;
        }
    }

    fn recv(&mut self, _: &Context<Self::Msg>, msg: Self::Msg, _: Sender) -> Next<Self::Msg> {
        if let ChildMsg::Boom = msg {
            panic!("// TEST PANIC //");
        }
        Next::Same
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn all_for_one_applies_to_siblings() {
    let sys = ActorSystem::new().unwrap();
    let (probe_tx, mut probe_rx) = mpsc::unbounded_channel();
    let (child_tx, mut child_rx) = mpsc::unbounded_channel();

    sys.actor_of_args::<TwoChildSup, _>("sup", (probe_tx, child_tx))
        .unwrap();

    let child_a = child_rx.recv().await.unwrap();
    child_a.tell(ChildMsg::Boom, None);

    let mut restarted = Vec::new();
    for _ in 0..2 {
        let evt = tokio::time::timeout(Duration::from_secs(2), probe_rx.recv())
            .await
            .expect("restart event")
            .unwrap();
        restarted.push(evt);
    }
    restarted.sort();

    assert_eq!(restarted, vec!["restarted-a", "restarted-b"]);
}
