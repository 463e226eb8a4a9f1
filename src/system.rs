pub(crate) mod extension;
pub(crate) mod logger;
pub(crate) mod timer;

use std::fmt;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    mpsc, Arc, Mutex, RwLock,
};
use std::time::{Duration, Instant, SystemTime};

use slog::Logger;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    actor::*,
    config::{load_config, Config},
    executor::{get_executor_handle, run_on, ExecutorHandle, ExecutorError, Run, TaskHandle},
    kernel::provider::{create_root, Provider},
    system::extension::Extensions,
    system::logger::{default_log, DeadLetterLogger},
    system::timer::{BasicTimer, Job, OnceJob, RepeatJob, TimerRef},
    validate::validate_name,
    AnyMessage, Message,
};

pub use self::extension::{Extension, ExtensionId};
pub use self::timer::{ScheduleId, Timer};

/// System signals delivered ahead of user messages.
#[derive(Clone, Debug)]
pub enum SystemMsg {
    /// Runs `pre_start`/`post_start` and releases the mailbox.
    ActorInit,

    /// Lifecycle commands: stop, restart, resume.
    Command(SystemCmd),

    /// A child failed while processing a user message.
    Failed {
        actor: BasicActorRef,
        error: Arc<str>,
    },

    /// Subscribe the given actor to this actor's termination.
    Watch(BasicActorRef),

    /// Remove the given actor from the watcher set.
    Unwatch(BasicActorRef),

    /// The given actor has fully stopped. Delivered to the parent and
    /// to every watcher exactly once.
    Terminated(BasicActorRef),
}

#[derive(Clone, Debug)]
pub enum SystemCmd {
    Stop,
    Restart,
    Resume,
}

impl From<SystemCmd> for SystemMsg {
    fn from(cmd: SystemCmd) -> Self {
        SystemMsg::Command(cmd)
    }
}

/// Lifecycle events published on the system events channel.
#[derive(Clone, Debug)]
pub enum SystemEvent {
    ActorCreated(ActorCreated),
    ActorRestarted(ActorRestarted),
    ActorTerminated(ActorTerminated),
}

#[derive(Clone, Debug)]
pub struct ActorCreated {
    pub actor: BasicActorRef,
}

#[derive(Clone, Debug)]
pub struct ActorRestarted {
    pub actor: BasicActorRef,
}

#[derive(Clone, Debug)]
pub struct ActorTerminated {
    pub actor: BasicActorRef,
}

impl From<ActorCreated> for SystemEvent {
    fn from(evt: ActorCreated) -> Self {
        SystemEvent::ActorCreated(evt)
    }
}

impl From<ActorRestarted> for SystemEvent {
    fn from(evt: ActorRestarted) -> Self {
        SystemEvent::ActorRestarted(evt)
    }
}

impl From<ActorTerminated> for SystemEvent {
    fn from(evt: ActorTerminated) -> Self {
        SystemEvent::ActorTerminated(evt)
    }
}

#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Failed to create actor system. Cause: Sub module failed to start ({0})")]
    ModuleFailed(String),
    #[error("Failed to create actor system. Cause: Invalid actor system name ({0})")]
    InvalidName(String),
}

pub struct SystemSettings {
    pub msg_process_limit: u32,
}

#[derive(Clone)]
pub struct SysActors {
    pub root: BasicActorRef,
    pub user: BasicActorRef,
    pub sysm: BasicActorRef,
    pub temp: BasicActorRef,
}

#[derive(Clone)]
pub struct SysChannels {
    pub sys_events: ActorRef<ChannelMsg<SystemEvent>>,
    pub dead_letters: ActorRef<DLChannelMsg>,
}

#[derive(Default)]
pub struct SystemBuilder {
    name: Option<String>,
    cfg: Option<Config>,
    log: Option<Logger>,
}

impl SystemBuilder {
    pub fn new() -> Self {
        SystemBuilder::default()
    }

    pub fn create(self) -> Result<ActorSystem, SystemError> {
        let name = self.name.unwrap_or_else(|| "movie".to_string());
        let cfg = self.cfg.unwrap_or_else(load_config);
        let log = self.log.unwrap_or_else(|| default_log(&cfg));

        ActorSystem::create(name.as_ref(), log, cfg)
    }

    pub fn name(self, name: &str) -> Self {
        SystemBuilder {
            name: Some(name.to_string()),
            ..self
        }
    }

    pub fn cfg(self, cfg: Config) -> Self {
        SystemBuilder {
            cfg: Some(cfg),
            ..self
        }
    }

    pub fn log(self, log: Logger) -> Self {
        SystemBuilder {
            log: Some(log),
            ..self
        }
    }
}

struct SystemCore {
    id: Uuid,
    name: String,
    address: Address,
    config: Config,
    debug: bool,
    log: Logger,
    sys_settings: SystemSettings,
    started_at: SystemTime,
    started_at_moment: Instant,
    counter: AtomicU64,
    registry: PathRegistry,
    provider: Mutex<Option<Provider>>,
    executor: ExecutorHandle,
    extensions: Extensions,
    timer: Mutex<Option<TimerRef>>,
    sys_actors: RwLock<Option<SysActors>>,
    sys_channels: RwLock<Option<SysChannels>>,
    shutdown_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

/// The actor runtime and common services coordinator
///
/// The `ActorSystem` provides a runtime on which actors are executed.
/// It also provides common services such as channels, scheduling,
/// remoting and persistence. Create only one instance of `ActorSystem`
/// per application.
#[derive(Clone)]
pub struct ActorSystem {
    core: Arc<SystemCore>,
}

impl ActorSystem {
    /// Create a new `ActorSystem` instance
    pub fn new() -> Result<ActorSystem, SystemError> {
        let cfg = load_config();
        let log = default_log(&cfg);

        ActorSystem::create("movie", log, cfg)
    }

    /// Create a new `ActorSystem` instance with provided name
    pub fn with_name(name: &str) -> Result<ActorSystem, SystemError> {
        let cfg = load_config();
        let log = default_log(&cfg);

        ActorSystem::create(name, log, cfg)
    }

    /// Create a new `ActorSystem` instance bypassing default config
    /// behavior
    pub fn with_config(name: &str, cfg: Config) -> Result<ActorSystem, SystemError> {
        let log = default_log(&cfg);

        ActorSystem::create(name, log, cfg)
    }

    pub(crate) fn create(name: &str, log: Logger, cfg: Config) -> Result<ActorSystem, SystemError> {
        validate_name(name).map_err(|_| SystemError::InvalidName(name.into()))?;

        let debug = cfg.get_bool_or("debug", false);
        if debug {
            slog::debug!(log, "Starting actor system: System[{}]", name);
        }

        let executor = get_executor_handle(&cfg);
        let registry = PathRegistry::new();

        let (shutdown_tx, shutdown_rx) = mpsc::channel();

        let core = SystemCore {
            id: Uuid::new_v4(),
            name: name.to_string(),
            address: Address::local(name),
            sys_settings: SystemSettings {
                msg_process_limit: cfg.get_int_or("mailbox.msg_process_limit", 1000) as u32,
            },
            debug,
            log: log.clone(),
            started_at: SystemTime::now(),
            started_at_moment: Instant::now(),
            counter: AtomicU64::new(0),
            registry: registry.clone(),
            provider: Mutex::new(None),
            executor,
            extensions: Extensions::new(),
            timer: Mutex::new(None),
            sys_actors: RwLock::new(None),
            sys_channels: RwLock::new(None),
            shutdown_rx: Mutex::new(Some(shutdown_rx)),
            config: cfg,
        };

        let sys = ActorSystem {
            core: Arc::new(core),
        };

        let timer = BasicTimer::start(sys.config(), &sys.core.executor);
        *sys.core.timer.lock().expect("timer poisoned") = Some(timer);

        let provider = Provider::new(registry, log.clone());
        *sys.core.provider.lock().expect("provider poisoned") = Some(provider);

        // initial actor hierarchy: root plus the user/system/temp
        // guardians
        let sys_actors = create_root(&sys, shutdown_tx);
        *sys.core.sys_actors.write().expect("sys actors poisoned") = Some(sys_actors);

        // system channels
        let sys_events = sys_actor_of::<EventsChannel>(&sys, "sys_events")?;
        let dead_letters = sys_actor_of::<Channel<DeadLetter>>(&sys, "dead_letters")?;
        *sys.core.sys_channels.write().expect("sys channels poisoned") = Some(SysChannels {
            sys_events,
            dead_letters: dead_letters.clone(),
        });

        // dead letter logger
        sys_actor_of_args::<DeadLetterLogger, _>(&sys, "dl_logger", (dead_letters, log.clone()))?;

        if sys.config().get_bool_or("remoting.enabled", false) {
            crate::remote::enable_remoting_from_config(&sys)
                .map_err(|e| SystemError::ModuleFailed(format!("remoting: {}", e)))?;
        }

        slog::debug!(log, "Actor system [{}] [{}] started", sys.id(), name);

        Ok(sys)
    }

    /// Returns the system start time
    pub fn start_date(&self) -> SystemTime {
        self.core.started_at
    }

    /// Returns the number of seconds since the system started
    pub fn uptime(&self) -> u64 {
        Instant::now()
            .duration_since(self.core.started_at_moment)
            .as_secs()
    }

    /// Returns the local address of the system, used in actor
    /// addressing.
    pub fn address(&self) -> &Address {
        &self.core.address
    }

    /// Returns the UUID assigned to the system
    pub fn id(&self) -> Uuid {
        self.core.id
    }

    /// Returns the name of the system
    pub fn name(&self) -> String {
        self.core.name.clone()
    }

    pub(crate) fn next_id(&self) -> ActorId {
        self.core.counter.fetch_add(1, Ordering::Relaxed)
    }

    pub fn print_tree(&self) -> Vec<String> {
        fn print_node(
            sys: &ActorSystem,
            node: &BasicActorRef,
            indent: &str,
            log: &mut Vec<String>,
        ) {
            if node.is_root() {
                log.push(sys.name());

                for actor in node.children() {
                    print_node(sys, &actor, "", log);
                }
            } else {
                log.push(format!("{}└─ {}", indent, node.name()));

                for actor in node.children() {
                    print_node(sys, &actor, &(indent.to_string() + "   "), log);
                }
            }
        }

        let mut log: Vec<String> = Vec::new();
        let root = self.root();
        print_node(self, &root, "", &mut log);
        log
    }

    /// Returns the system root's actor reference
    pub fn root(&self) -> BasicActorRef {
        self.sys_actors().root
    }

    /// Returns the user root actor reference
    pub fn user_root(&self) -> BasicActorRef {
        self.sys_actors().user
    }

    /// Returns the system root actor reference
    pub fn sys_root(&self) -> BasicActorRef {
        self.sys_actors().sysm
    }

    /// Returns the temp root actor reference
    pub fn temp_root(&self) -> BasicActorRef {
        self.sys_actors().temp
    }

    fn sys_actors(&self) -> SysActors {
        self.core
            .sys_actors
            .read()
            .expect("sys actors poisoned")
            .clone()
            .expect("actor system not initialized")
    }

    /// Returns a reference to the system events channel
    pub fn sys_events(&self) -> ActorRef<ChannelMsg<SystemEvent>> {
        self.core
            .sys_channels
            .read()
            .expect("sys channels poisoned")
            .as_ref()
            .expect("actor system not initialized")
            .sys_events
            .clone()
    }

    /// Returns a reference to the dead letters channel
    pub fn dead_letters(&self) -> ActorRef<DLChannelMsg> {
        self.dead_letters_opt().expect("actor system not initialized")
    }

    pub(crate) fn dead_letters_opt(&self) -> Option<ActorRef<DLChannelMsg>> {
        self.core
            .sys_channels
            .read()
            .expect("sys channels poisoned")
            .as_ref()
            .map(|c| c.dead_letters.clone())
    }

    pub fn publish_event(&self, evt: SystemEvent) {
        let chan = self
            .core
            .sys_channels
            .read()
            .expect("sys channels poisoned")
            .as_ref()
            .map(|c| c.sys_events.clone());

        if let Some(chan) = chan {
            let topic = Topic::from(&evt);
            chan.tell(Publish { topic, msg: evt }, None);
        }
    }

    /// Returns the `Config` used by the system
    pub fn config(&self) -> &Config {
        &self.core.config
    }

    pub(crate) fn sys_settings(&self) -> &SystemSettings {
        &self.core.sys_settings
    }

    /// Path registry for location-transparent lookups.
    pub fn registry(&self) -> &PathRegistry {
        &self.core.registry
    }

    pub(crate) fn provider(&self) -> Provider {
        self.core
            .provider
            .lock()
            .expect("provider poisoned")
            .clone()
            .expect("actor system not initialized")
    }

    #[inline]
    pub fn log(&self) -> Logger {
        self.core.log.clone()
    }

    pub fn debug(&self) -> bool {
        self.core.debug
    }

    /// Returns the extension for the given id, creating it on first
    /// use.
    pub fn extension<I>(&self, id: &I) -> I::Ext
    where
        I: ExtensionId,
    {
        self.core.extensions.get_or_create(id, self)
    }

    pub(crate) fn send_job(&self, job: Job) {
        if let Some(timer) = self.core.timer.lock().expect("timer poisoned").as_ref() {
            timer.send(job);
        }
    }

    /// Create an actor under the system root
    pub fn sys_actor_of_props<A>(
        &self,
        name: &str,
        props: BoxActorProd<A>,
    ) -> Result<ActorRef<A::Msg>, CreateError>
    where
        A: Actor,
    {
        self.provider()
            .create_actor(props, name, &self.sys_root(), self)
    }

    /// Shutdown the actor system
    ///
    /// Attempts a graceful shutdown of the system and all actors.
    /// Actors will receive a stop message, executing `actor.post_stop`.
    ///
    /// Blocks until all user actors have successfully stopped, then
    /// stops extensions in reverse creation order.
    pub fn shutdown(&self) {
        self.stop(self.user_root());
        let rx = self
            .core
            .shutdown_rx
            .lock()
            .expect("shutdown rx poisoned")
            .take();
        if let Some(rx) = rx {
            let _ = rx.recv_timeout(Duration::from_secs(10));
        }

        self.core.extensions.stop_all(self);

        self.stop(self.temp_root());
        self.stop(self.sys_root());

        // stop the scheduler tick
        self.core.timer.lock().expect("timer poisoned").take();
    }
}

fn sys_actor_of<A>(sys: &ActorSystem, name: &str) -> Result<ActorRef<<A as Actor>::Msg>, SystemError>
where
    A: ActorFactory,
{
    sys.sys_actor_of_props(name, Props::new::<A>())
        .map_err(|_| SystemError::ModuleFailed(name.into()))
}

fn sys_actor_of_args<A, Args>(
    sys: &ActorSystem,
    name: &str,
    args: Args,
) -> Result<ActorRef<<A as Actor>::Msg>, SystemError>
where
    Args: ActorArgs,
    A: ActorFactoryArgs<Args>,
{
    sys.sys_actor_of_props(name, Props::new_args::<A, _>(args))
        .map_err(|_| SystemError::ModuleFailed(name.into()))
}

impl ActorRefFactory for ActorSystem {
    fn actor_of_props<A>(
        &self,
        name: &str,
        props: BoxActorProd<A>,
    ) -> Result<ActorRef<A::Msg>, CreateError>
    where
        A: Actor,
    {
        self.provider()
            .create_actor(props, name, &self.user_root(), self)
    }

    fn actor_of<A>(&self, name: &str) -> Result<ActorRef<<A as Actor>::Msg>, CreateError>
    where
        A: ActorFactory,
    {
        self.actor_of_props(name, Props::new::<A>())
    }

    fn actor_of_args<A, Args>(
        &self,
        name: &str,
        args: Args,
    ) -> Result<ActorRef<<A as Actor>::Msg>, CreateError>
    where
        Args: ActorArgs,
        A: ActorFactoryArgs<Args>,
    {
        self.actor_of_props(name, Props::new_args::<A, _>(args))
    }

    fn stop(&self, actor: impl ActorReference) {
        actor.sys_tell(SystemCmd::Stop.into());
    }
}

impl TmpActorRefFactory for ActorSystem {
    fn tmp_actor_of_props<A>(&self, props: BoxActorProd<A>) -> Result<ActorRef<A::Msg>, CreateError>
    where
        A: Actor,
    {
        let name = format!("$anon-{}", self.next_id());
        self.provider()
            .create_actor(props, &name, &self.temp_root(), self)
    }
}

impl Run for ActorSystem {
    fn run<Fut>(&self, future: Fut) -> Result<TaskHandle<Fut::Output>, ExecutorError>
    where
        Fut: std::future::Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        run_on(&self.core.executor, future)
    }
}

impl Timer for ActorSystem {
    fn schedule<T, M>(
        &self,
        initial_delay: Duration,
        interval: Duration,
        receiver: ActorRef<M>,
        sender: Sender,
        msg: T,
    ) -> ScheduleId
    where
        T: Message + Into<M>,
        M: Message,
    {
        let id = Uuid::new_v4();
        let msg: M = msg.into();

        let job = RepeatJob {
            id,
            send_at: Instant::now() + initial_delay,
            interval,
            receiver: receiver.into(),
            sender,
            msg: AnyMessage::new(msg, false),
        };

        self.send_job(Job::Repeat(job));
        id
    }

    fn schedule_once<T, M>(
        &self,
        delay: Duration,
        receiver: ActorRef<M>,
        sender: Sender,
        msg: T,
    ) -> ScheduleId
    where
        T: Message + Into<M>,
        M: Message,
    {
        let id = Uuid::new_v4();
        let msg: M = msg.into();

        let job = OnceJob {
            id,
            send_at: Instant::now() + delay,
            receiver: receiver.into(),
            sender,
            msg: AnyMessage::new(msg, true),
        };

        self.send_job(Job::Once(job));
        id
    }

    fn cancel_schedule(&self, id: Uuid) {
        self.send_job(Job::Cancel(id));
    }
}

impl fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "ActorSystem[Name: {}, Start Time: {:?}, Uptime: {} seconds]",
            self.name(),
            self.start_date(),
            self.uptime()
        )
    }
}
