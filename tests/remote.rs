use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serial_test::serial;
use tokio::sync::mpsc;

use movie::actors::*;
use movie::remote::{enable_remoting, messages, RemoteExtension, Remoting};

#[derive(Clone, Debug, Serialize, Deserialize)]
enum CounterMsg {
    Inc(u64),
    Get,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct CounterState {
    seen: Vec<u64>,
}

struct Counter {
    seen: Vec<u64>,
}

impl ActorFactory for Counter {
    fn create() -> Self {
        Counter { seen: Vec::new() }
    }
}

impl Actor for Counter {
    type Msg = CounterMsg;

    fn recv(&mut self, _: &Context<Self::Msg>, msg: Self::Msg, sender: Sender) -> Next<Self::Msg> {
        match msg {
            CounterMsg::Inc(n) => self.seen.push(n),
            CounterMsg::Get => {
                if let Some(sender) = sender {
                    let _ = sender.try_tell(
                        CounterState {
                            seen: self.seen.clone(),
                        },
                        None,
                    );
                }
            }
        }
        Next::Same
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct SlowPing {
    delay_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Pong;

struct Slow;

impl ActorFactory for Slow {
    fn create() -> Self {
        Slow
    }
}

impl Actor for Slow {
    type Msg = SlowPing;

    fn recv(&mut self, ctx: &Context<Self::Msg>, msg: Self::Msg, sender: Sender) -> Next<Self::Msg> {
        // long work leaves the handler: reply from a scheduled task
        let delay = Duration::from_millis(msg.delay_ms);
        if let Some(sender) = sender {
            if let Ok(handle) = ctx.run(async move {
                tokio::time::sleep(delay).await;
                let _ = sender.try_tell(Pong, None);
            }) {
                handle.forget();
            }
        }
        Next::Same
    }
}

fn register_messages() {
    messages().clear();
    messages().register::<CounterMsg>("counter");
    messages().register::<CounterState>("counter-state");
    messages().register::<SlowPing>("slow-ping");
    messages().register::<Pong>("pong");
}

fn remoted_pair() -> (ActorSystem, ActorSystem, u16) {
    let server = ActorSystem::with_name("server").unwrap();
    let address = enable_remoting(&server, "127.0.0.1", 0, 8).unwrap();
    let port = address.port.unwrap();

    let client = ActorSystem::with_name("client").unwrap();
    enable_remoting(&client, "127.0.0.1", 0, 8).unwrap();

    (server, client, port)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn remote_tell_preserves_send_order() {
    register_messages();
    let (server, client, port) = remoted_pair();

    server.actor_of::<Counter>("counter").unwrap();

    let ext: RemoteExtension = client.extension(&Remoting);
    let remote = ext
        .actor_ref::<CounterMsg>(&format!("movie.tcp://server@127.0.0.1:{}/user/counter", port))
        .await
        .unwrap();

    for i in 0..1000 {
        remote.tell(CounterMsg::Inc(i), None);
    }

    let state: CounterState = remote
        .ask(CounterMsg::Get, Duration::from_secs(5))
        .await
        .unwrap();

    let expected: Vec<u64> = (0..1000).collect();
    assert_eq!(state.seen, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn remote_ask_round_trips() {
    register_messages();
    let (server, client, port) = remoted_pair();

    server.actor_of::<Slow>("slow").unwrap();

    let ext: RemoteExtension = client.extension(&Remoting);
    let remote = ext
        .actor_ref::<SlowPing>(&format!("movie.tcp://server@127.0.0.1:{}/user/slow", port))
        .await
        .unwrap();

    let pong: Pong = remote
        .ask(SlowPing { delay_ms: 10 }, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(pong, Pong);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn remote_ask_times_out_and_clears_pending() {
    register_messages();
    let (server, client, port) = remoted_pair();

    server.actor_of::<Slow>("slow").unwrap();

    let ext: RemoteExtension = client.extension(&Remoting);
    let path = format!("movie.tcp://server@127.0.0.1:{}/user/slow", port);
    let remote = ext.actor_ref::<SlowPing>(&path).await.unwrap();

    let started = Instant::now();
    let result: Result<Pong, Fault> = remote
        .ask(SlowPing { delay_ms: 500 }, Duration::from_millis(100))
        .await;

    assert_eq!(result, Err(Fault::Timeout));
    assert!(started.elapsed() < Duration::from_millis(400));

    // the correlation entry is removed promptly after expiry
    tokio::time::sleep(Duration::from_millis(10)).await;
    let pool = ext
        .pool_for(&format!("127.0.0.1:{}", port))
        .await
        .unwrap();
    let parsed = movie::actor::ActorPath::parse(&path).unwrap();
    assert_eq!(pool.stripe_for(&parsed).pending_ask_count(), 0);

    // the late reply arrives ~400ms later and is dropped without error
    tokio::time::sleep(Duration::from_millis(600)).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn unknown_target_paths_go_to_dead_letters() {
    register_messages();
    let (server, client, port) = remoted_pair();

    // subscribe a probe to the server's dead letters channel
    let (tx, mut rx) = mpsc::unbounded_channel();
    let probe = server
        .actor_of_args::<DeadLetterProbe, _>("dl-probe", tx)
        .unwrap();
    server.dead_letters().tell(
        Subscribe {
            topic: All.into(),
            actor: Box::new(probe),
        },
        None,
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    let ext: RemoteExtension = client.extension(&Remoting);
    let remote = ext
        .actor_ref::<CounterMsg>(&format!(
            "movie.tcp://server@127.0.0.1:{}/user/nobody-home",
            port
        ))
        .await
        .unwrap();
    remote.tell(CounterMsg::Inc(1), None);

    let dl = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("dead letter")
        .unwrap();
    assert!(dl.contains("nobody-home"));
}

struct DeadLetterProbe {
    probe: mpsc::UnboundedSender<String>,
}

impl ActorFactoryArgs<mpsc::UnboundedSender<String>> for DeadLetterProbe {
    fn create_args(probe: mpsc::UnboundedSender<String>) -> Self {
        DeadLetterProbe { probe }
    }
}

impl Actor for DeadLetterProbe {
    type Msg = DeadLetter;

    fn recv(&mut self, _: &Context<Self::Msg>, msg: Self::Msg, _: Sender) -> Next<Self::Msg> {
        let _ = self.probe.send(msg.recipient);
        Next::Same
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn pool_reports_stripe_stats() {
    register_messages();
    let (_server, client, port) = remoted_pair();

    let ext: RemoteExtension = client.extension(&Remoting);
    let pool = ext
        .pool_for(&format!("127.0.0.1:{}", port))
        .await
        .unwrap();

    let stats = pool.stats();
    assert_eq!(stats.stripes, 8);
    assert_eq!(stats.connected, 8);
    assert!(pool.is_connected());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn remote_stop_signal_stops_target() {
    register_messages();
    let (server, client, port) = remoted_pair();

    let target = server.actor_of::<Counter>("stoppable").unwrap();

    // watch the target locally to observe the remote stop
    let (tx, mut rx) = mpsc::unbounded_channel();
    let basic: BasicActorRef = target.into();
    server
        .actor_of_args::<Watcher, _>("watcher", (basic, tx))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let ext: RemoteExtension = client.extension(&Remoting);
    let remote = ext
        .actor_ref::<CounterMsg>(&format!(
            "movie.tcp://server@127.0.0.1:{}/user/stoppable",
            port
        ))
        .await
        .unwrap();
    remote.send_system(movie::remote::RemoteSystemMsg::Stop);

    let name = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("terminated")
        .unwrap();
    assert_eq!(name, "stoppable");
}

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
