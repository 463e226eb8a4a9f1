use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, RwLock,
};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::{
    actor::supervision::{FailureWindow, Scope, Strategy, SupervisionConfig},
    actor::*,
    executor::{Run, TaskHandle},
    future::{ask, Fault, PipeResult},
    kernel::kernel_ref::{dispatch, dispatch_any, KernelRef},
    kernel::mailbox::{AnySender, MailboxSender},
    system::timer::{Job, OnceJob, RepeatJob},
    system::{ActorSystem, ScheduleId, SystemCmd, SystemMsg, Timer},
    AnyMessage, Envelope, Message,
};

#[derive(Clone)]
pub struct ActorCell {
    inner: Arc<ActorCellInner>,
}

struct ActorCellInner {
    uri: ActorUri,
    parent: Option<BasicActorRef>,
    children: Children,
    watchers: Mutex<Vec<BasicActorRef>>,
    restarts: Mutex<HashMap<String, FailureWindow>>,
    is_terminating: AtomicBool,
    is_restarting: AtomicBool,
    sys_sender: MailboxSender<SystemMsg>,
    any_sender: Arc<dyn AnySender>,
    kernel: Mutex<Option<KernelRef>>,
    system: ActorSystem,
}

impl ActorCell {
    pub(crate) fn new(
        uri: ActorUri,
        parent: Option<BasicActorRef>,
        system: &ActorSystem,
        any_sender: Arc<dyn AnySender>,
        sys_sender: MailboxSender<SystemMsg>,
    ) -> ActorCell {
        ActorCell {
            inner: Arc::new(ActorCellInner {
                uri,
                parent,
                children: Children::new(),
                watchers: Mutex::new(Vec::new()),
                restarts: Mutex::new(HashMap::new()),
                is_terminating: AtomicBool::new(false),
                is_restarting: AtomicBool::new(false),
                sys_sender,
                any_sender,
                kernel: Mutex::new(None),
                system: system.clone(),
            }),
        }
    }

    pub(crate) fn init(&self, kernel: &KernelRef) {
        *self.inner.kernel.lock().expect("cell kernel poisoned") = Some(kernel.clone());
    }

    pub(crate) fn kernel(&self) -> KernelRef {
        self.inner
            .kernel
            .lock()
            .expect("cell kernel poisoned")
            .clone()
            .expect("actor cell not initialized")
    }

    fn kernel_opt(&self) -> Option<KernelRef> {
        self.inner.kernel.lock().expect("cell kernel poisoned").clone()
    }

    pub fn uri(&self) -> &ActorUri {
        &self.inner.uri
    }

    pub fn path(&self) -> &ActorPath {
        &self.inner.uri.path
    }

    pub fn is_root(&self) -> bool {
        self.inner.uri.path.is_root()
    }

    /// True when this actor lives under the `/user` guardian.
    pub fn is_user(&self) -> bool {
        self.inner
            .uri
            .path
            .segments()
            .first()
            .map(|s| s == "user")
            .unwrap_or(false)
    }

    pub(crate) fn system(&self) -> &ActorSystem {
        &self.inner.system
    }

    pub fn myself(&self) -> BasicActorRef {
        BasicActorRef::new(self.clone())
    }

    pub fn parent(&self) -> BasicActorRef {
        self.inner.parent.as_ref().expect("root has no parent").clone()
    }

    pub(crate) fn parent_opt(&self) -> Option<BasicActorRef> {
        self.inner.parent.clone()
    }

    pub fn user_root(&self) -> BasicActorRef {
        self.inner.system.user_root()
    }

    pub fn has_children(&self) -> bool {
        self.inner.children.count() > 0
    }

    pub fn is_child(&self, actor: &BasicActorRef) -> bool {
        self.inner.children.get(actor.name()).is_some()
    }

    pub fn children(&self) -> impl Iterator<Item = BasicActorRef> {
        self.inner.children.snapshot().into_iter()
    }

    pub(crate) fn add_child(&self, actor: BasicActorRef) {
        self.inner.children.add(actor.name(), actor.clone());
    }

    pub(crate) fn is_terminating(&self) -> bool {
        self.inner.is_terminating.load(Ordering::Relaxed)
    }

    pub(crate) fn add_watcher(&self, watcher: BasicActorRef) {
        let mut watchers = self.inner.watchers.lock().expect("watchers poisoned");
        if !watchers.iter().any(|w| w.path() == watcher.path()) {
            watchers.push(watcher);
        }
    }

    pub(crate) fn remove_watcher(&self, watcher: &BasicActorRef) {
        let mut watchers = self.inner.watchers.lock().expect("watchers poisoned");
        watchers.retain(|w| w.path() != watcher.path());
    }

    pub(crate) fn drain_watchers(&self) -> Vec<BasicActorRef> {
        let mut watchers = self.inner.watchers.lock().expect("watchers poisoned");
        watchers.drain(..).collect()
    }

    pub(crate) fn stop(&self, actor: &BasicActorRef) {
        actor.sys_tell(SystemCmd::Stop.into());
    }

    /// Begins the stop drain.
    ///
    /// Returns true when the actor has no children and the caller may
    /// finish stopping immediately; otherwise all children are told to
    /// stop and termination completes through `death_watch`.
    pub(crate) fn start_terminating(&self) -> bool {
        self.inner.is_terminating.store(true, Ordering::Relaxed);

        let children = self.inner.children.snapshot();
        if children.is_empty() {
            true
        } else {
            for child in children {
                self.stop(&child);
            }
            false
        }
    }

    /// Begins a restart. Children are stopped first; returns true when
    /// the kernel can recreate the actor immediately.
    pub(crate) fn start_restarting(&self) -> bool {
        let children = self.inner.children.snapshot();
        if children.is_empty() {
            true
        } else {
            self.inner.is_restarting.store(true, Ordering::Relaxed);
            for child in children {
                self.stop(&child);
            }
            false
        }
    }

    /// Invoked when a child (or watched actor) has terminated.
    pub(crate) fn death_watch(&self, terminated: &BasicActorRef) -> DeathWatchOutcome {
        if !self.is_child(terminated) {
            return DeathWatchOutcome::NotChild;
        }

        self.inner.children.remove(terminated.name());
        self.inner
            .restarts
            .lock()
            .expect("restarts poisoned")
            .remove(terminated.name());

        if self.inner.children.count() == 0 {
            if self.inner.is_terminating.load(Ordering::Relaxed) {
                return DeathWatchOutcome::ReadyToStop;
            }

            if self.inner.is_restarting.swap(false, Ordering::Relaxed) {
                return DeathWatchOutcome::ReadyToRestart;
            }
        }

        DeathWatchOutcome::Pending
    }

    /// Reports a user-message failure to the parent for supervision.
    pub(crate) fn report_failure(&self, error: Arc<str>) {
        if let Some(parent) = self.inner.parent.as_ref() {
            parent.sys_tell(SystemMsg::Failed {
                actor: self.myself(),
                error,
            });
        }
    }

    /// Applies this actor's supervision config to a failed child.
    pub(crate) fn handle_failure(
        &self,
        failed: BasicActorRef,
        error: Arc<str>,
        cfg: SupervisionConfig,
    ) {
        if !self.is_child(&failed) {
            // the child terminated while the failure was in flight
            return;
        }

        match cfg.strategy {
            Strategy::Resume => failed.sys_tell(SystemCmd::Resume.into()),
            Strategy::Stop => {
                for target in self.scope_targets(&failed, cfg.scope) {
                    self.stop(&target);
                }
            }
            Strategy::Restart => {
                let failures = {
                    let mut restarts = self.inner.restarts.lock().expect("restarts poisoned");
                    restarts
                        .entry(failed.name().to_string())
                        .or_default()
                        .record(Instant::now(), cfg.window)
                };

                if failures > cfg.max_restarts {
                    for target in self.scope_targets(&failed, cfg.scope) {
                        self.stop(&target);
                    }
                } else {
                    let delay = cfg.backoff_delay(failures.saturating_sub(1));
                    for target in self.scope_targets(&failed, cfg.scope) {
                        self.restart_child_after(target, delay);
                    }
                }
            }
            Strategy::Escalate => self.escalate_failure(error),
        }
    }

    fn scope_targets(&self, failed: &BasicActorRef, scope: Scope) -> Vec<BasicActorRef> {
        match scope {
            Scope::OneForOne => vec![failed.clone()],
            Scope::AllForOne => self.inner.children.snapshot(),
        }
    }

    fn restart_child_after(&self, child: BasicActorRef, delay: Duration) {
        if delay.is_zero() {
            child.sys_tell(SystemCmd::Restart.into());
            return;
        }

        let task = self.inner.system.run(async move {
            tokio::time::sleep(delay).await;
            child.sys_tell(SystemCmd::Restart.into());
        });
        if let Ok(handle) = task {
            handle.forget();
        }
    }

    fn escalate_failure(&self, error: Arc<str>) {
        if let Some(parent) = self.inner.parent.as_ref() {
            parent.sys_tell(SystemMsg::Failed {
                actor: self.myself(),
                error,
            });
        }
    }

    pub(crate) fn send_sys_msg(&self, msg: Envelope<SystemMsg>) -> MsgResult<Envelope<SystemMsg>> {
        match self.kernel_opt() {
            Some(kernel) => dispatch(msg, &self.inner.sys_sender, &kernel),
            None => Err(MsgError::new(msg)),
        }
    }

    pub(crate) fn send_any_msg(&self, msg: &mut AnyMessage, sender: Sender) -> Result<(), ()> {
        match self.kernel_opt() {
            Some(kernel) => dispatch_any(msg, sender, &self.inner.any_sender, &kernel)
                .map_err(|_| ()),
            None => Err(()),
        }
    }
}

impl fmt::Debug for ActorCell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ActorCell[{:?}]", self.uri())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DeathWatchOutcome {
    NotChild,
    Pending,
    ReadyToStop,
    ReadyToRestart,
}

/// An `ActorCell` paired with the actor's typed mailbox sender.
pub struct ExtendedCell<Msg: Message> {
    cell: ActorCell,
    sender: MailboxSender<Msg>,
}

impl<Msg: Message> Clone for ExtendedCell<Msg> {
    fn clone(&self) -> Self {
        ExtendedCell {
            cell: self.cell.clone(),
            sender: self.sender.clone(),
        }
    }
}

impl<Msg: Message> ExtendedCell<Msg> {
    pub(crate) fn new(cell: ActorCell, sender: MailboxSender<Msg>) -> ExtendedCell<Msg> {
        ExtendedCell { cell, sender }
    }

    pub(crate) fn cell_clone(&self) -> ActorCell {
        self.cell.clone()
    }

    pub(crate) fn send_msg(&self, msg: Envelope<Msg>) -> MsgResult<Envelope<Msg>> {
        let result = match self.cell.kernel_opt() {
            Some(kernel) => dispatch(msg, &self.sender, &kernel),
            None => Err(MsgError::new(msg)),
        };

        result.map_err(|e| {
            let sys = self.cell.system();
            if let Some(dl) = sys.dead_letters_opt() {
                dl.tell(
                    Publish {
                        topic: "dead_letter".into(),
                        msg: DeadLetter {
                            msg: format!("{:?}", e.msg.msg),
                            sender: e.msg.sender.clone(),
                            recipient: self.cell.path().to_string(),
                        },
                    },
                    None,
                );
            }
            e
        })
    }
}

impl<Msg: Message> Deref for ExtendedCell<Msg> {
    type Target = ActorCell;

    fn deref(&self) -> &ActorCell {
        &self.cell
    }
}

impl<Msg: Message> fmt::Debug for ExtendedCell<Msg> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ExtendedCell[{:?}]", self.uri())
    }
}

/// Provides context, including the actor system, during actor execution.
///
/// `Context` is passed to an actor's functions, such as `recv`.
///
/// Operations performed are in most cases done so from the actor's
/// perspective. For example, creating a child actor using
/// `ctx.actor_of` will create the child under the current actor within
/// the hierarchy.
pub struct Context<Msg: Message> {
    pub myself: ActorRef<Msg>,
    pub system: ActorSystem,
    kernel: KernelRef,
}

impl<Msg> Context<Msg>
where
    Msg: Message,
{
    pub(crate) fn new(myself: ActorRef<Msg>, system: ActorSystem, kernel: KernelRef) -> Context<Msg> {
        Context {
            myself,
            system,
            kernel,
        }
    }

    /// Returns the `ActorRef` of the current actor.
    pub fn myself(&self) -> ActorRef<Msg> {
        self.myself.clone()
    }

    pub(crate) fn kernel(&self) -> &KernelRef {
        &self.kernel
    }

    /// Subscribes the current actor to the termination of `actor`.
    ///
    /// `SystemMsg::Terminated` is delivered exactly once when the
    /// watched actor stops.
    pub fn watch(&self, actor: &BasicActorRef) {
        actor.sys_tell(SystemMsg::Watch(self.myself.clone().into()));
    }

    pub fn unwatch(&self, actor: &BasicActorRef) {
        actor.sys_tell(SystemMsg::Unwatch(self.myself.clone().into()));
    }

    /// Sends `msg` to `receiver` and returns a future holding the typed
    /// reply. A hidden temporary actor receives the reply; the future
    /// fails with `Fault::Timeout` at the deadline and
    /// `Fault::TargetTerminated` if the target stops first.
    pub fn ask<M, R>(
        &self,
        receiver: &ActorRef<M>,
        msg: M,
        timeout: Duration,
    ) -> crate::future::Future<R>
    where
        M: Message,
        R: Message,
    {
        ask(&self.system, receiver, msg, timeout)
    }

    /// Forwards the completion of `future` to `target` as a
    /// `PipeResult` message sent from this actor.
    pub fn pipe<T, Tgt>(&self, future: &crate::future::Future<T>, target: Tgt)
    where
        T: Message,
        Tgt: Tell<PipeResult<T>>,
    {
        crate::future::pipe(future, target, Some(self.myself.clone().into()));
    }

    /// Forwards the completion of `future` to `target`, mapped through
    /// the provided constructors.
    pub fn pipe_map<T, M, Tgt, FS, FF>(
        &self,
        future: &crate::future::Future<T>,
        target: Tgt,
        on_success: FS,
        on_failure: FF,
    ) where
        T: Message,
        M: Message,
        Tgt: Tell<M>,
        FS: FnOnce(T) -> M + Send + 'static,
        FF: FnOnce(Fault) -> M + Send + 'static,
    {
        crate::future::pipe_map(
            future,
            target,
            Some(self.myself.clone().into()),
            on_success,
            on_failure,
        );
    }
}

impl<Msg> ActorRefFactory for Context<Msg>
where
    Msg: Message,
{
    fn actor_of_props<A>(
        &self,
        name: &str,
        props: BoxActorProd<A>,
    ) -> Result<ActorRef<A::Msg>, CreateError>
    where
        A: Actor,
    {
        self.system.provider().create_actor(
            props,
            name,
            &self.myself.clone().into(),
            &self.system,
        )
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

impl<Msg> TmpActorRefFactory for Context<Msg>
where
    Msg: Message,
{
    fn tmp_actor_of_props<A>(&self, props: BoxActorProd<A>) -> Result<ActorRef<A::Msg>, CreateError>
    where
        A: Actor,
    {
        self.system.tmp_actor_of_props(props)
    }
}

impl<Msg> Timer for Context<Msg>
where
    Msg: Message,
{
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

        self.system.send_job(Job::Repeat(job));
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

        self.system.send_job(Job::Once(job));
        id
    }

    fn cancel_schedule(&self, id: ScheduleId) {
        self.system.send_job(Job::Cancel(id));
    }
}

impl<Msg> Run for Context<Msg>
where
    Msg: Message,
{
    fn run<Fut>(&self, future: Fut) -> Result<TaskHandle<Fut::Output>, crate::executor::ExecutorError>
    where
        Fut: std::future::Future + Send + 'static,
        Fut::Output: Send + 'static,
    {
        self.system.run(future)
    }
}

#[derive(Clone)]
pub(crate) struct Children {
    actors: Arc<RwLock<HashMap<String, BasicActorRef>>>,
}

impl Children {
    pub fn new() -> Children {
        Children {
            actors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn add(&self, name: &str, actor: BasicActorRef) {
        self.actors
            .write()
            .expect("children poisoned")
            .insert(name.to_string(), actor);
    }

    pub fn remove(&self, name: &str) {
        self.actors.write().expect("children poisoned").remove(name);
    }

    pub fn get(&self, name: &str) -> Option<BasicActorRef> {
        self.actors
            .read()
            .expect("children poisoned")
            .get(name)
            .cloned()
    }

    pub fn count(&self) -> usize {
        self.actors.read().expect("children poisoned").len()
    }

    pub fn snapshot(&self) -> Vec<BasicActorRef> {
        self.actors
            .read()
            .expect("children poisoned")
            .values()
            .cloned()
            .collect()
    }
}
