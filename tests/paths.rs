use std::time::Duration;

use movie::actor::ActorPath;
use movie::actors::*;

struct Dumb;

impl ActorFactory for Dumb {
    fn create() -> Self {
        Dumb
    }
}

impl Actor for Dumb {
    type Msg = ();

    fn recv(&mut self, _: &Context<Self::Msg>, _: Self::Msg, _: Sender) -> Next<Self::Msg> {
        Next::Same
    }
}

struct Nest;

impl ActorFactory for Nest {
    fn create() -> Self {
        Nest
    }
}

impl Actor for Nest {
    type Msg = ();

    fn pre_start(&mut self, ctx: &Context<Self::Msg>) {
        ctx.actor_of::<Dumb>("inner").unwrap();
    }

    fn recv(&mut self, _: &Context<Self::Msg>, _: Self::Msg, _: Sender) -> Next<Self::Msg> {
        Next::Same
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn spawned_actors_have_hierarchical_paths() {
    let sys = ActorSystem::with_name("paths").unwrap();

    let actor = sys.actor_of::<Nest>("outer").unwrap();
    assert_eq!(actor.path().to_string(), "movie://paths/user/outer");
    assert_eq!(actor.parent().path().to_string(), "movie://paths/user");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn registry_resolves_from_spawn_until_stop() {
    let sys = ActorSystem::with_name("reg").unwrap();

    let actor = sys.actor_of::<Nest>("a").unwrap();
    let path = ActorPath::parse("movie://reg/user/a").unwrap();

    // resolvable immediately after a named spawn returns
    let id = sys.registry().resolve(&path).expect("registered");
    assert_eq!(id, actor.uri().uid);
    assert_eq!(
        sys.registry().path_for(id).unwrap().to_string(),
        "movie://reg/user/a"
    );

    // children registered under their parent's segments
    tokio::time::sleep(Duration::from_millis(50)).await;
    let inner = ActorPath::parse("movie://reg/user/a/inner").unwrap();
    assert!(sys.registry().resolve(&inner).is_some());

    // a remote rendering of the same logical path resolves identically
    let remote = ActorPath::parse("movie.tcp://reg@10.0.0.9:2552/user/a").unwrap();
    assert_eq!(sys.registry().resolve(&remote), Some(id));

    sys.stop(&actor);
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(sys.registry().resolve(&path).is_none());
    assert!(sys.registry().resolve(&inner).is_none());
    assert!(sys.registry().path_for(id).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn anonymous_actors_use_anon_segments() {
    let sys = ActorSystem::with_name("anon").unwrap();

    let a = sys.tmp_actor_of::<Dumb>().unwrap();
    let b = sys.tmp_actor_of::<Dumb>().unwrap();

    assert!(a.name().starts_with("$anon-"));
    assert!(b.name().starts_with("$anon-"));
    assert_ne!(a.name(), b.name());
    assert_eq!(a.path().segments()[0], "temp");
}
