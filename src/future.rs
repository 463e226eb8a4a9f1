use std::fmt;
use std::pin::Pin;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Condvar, Mutex,
};
use std::task::{Context as PollContext, Poll, Waker};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::{
    actor::{
        ActorFactoryArgs, ActorPath, ActorReference, BasicActorRef, Context, Next, Props, Sender,
        Tell, TmpActorRefFactory,
    },
    actor::Actor,
    executor::Run,
    system::SystemMsg,
    Message,
};

/// Failure payload carried by [`Future`]s across the runtime.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum Fault {
    #[error("timed out")]
    Timeout,
    #[error("target terminated before replying")]
    TargetTerminated,
    #[error("cancelled")]
    Cancelled,
    #[error("remote delivery failed: {0}")]
    Remote(String),
    #[error("store failure: {0}")]
    Store(String),
    #[error("{0}")]
    App(String),
}

/// Terminal state of a completed future.
#[derive(Clone, Debug)]
pub enum Completion<T: Message> {
    Success(T),
    Failure(Fault),
    Cancelled,
}

/// Observable state, for inspection without consuming the value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FutureState {
    Pending,
    Success,
    Failure,
    Cancelled,
}

struct Subscription<T: Message> {
    cancelled: Arc<AtomicBool>,
    f: Box<dyn FnOnce(&Completion<T>) + Send>,
}

enum Inner<T: Message> {
    Pending {
        subs: Vec<Subscription<T>>,
        wakers: Vec<Waker>,
    },
    Done(Completion<T>),
}

struct Shared<T: Message> {
    state: Mutex<Inner<T>>,
    cv: Condvar,
}

/// A single-completion value.
///
/// Completed exactly once through its [`Promise`]. Subscriptions
/// registered before completion fire in registration order exactly once
/// at completion; subscriptions registered after completion fire
/// synchronously. Also implements `std::future::Future`, so it can be
/// awaited on the runtime.
pub struct Future<T: Message> {
    shared: Arc<Shared<T>>,
}

impl<T: Message> Clone for Future<T> {
    fn clone(&self) -> Self {
        Future {
            shared: self.shared.clone(),
        }
    }
}

/// Write side of a [`Future`]. Exactly one of
/// `success`/`failure`/`cancel` is effective; the `try_*` variants are
/// idempotent no-ops once completed.
pub struct Promise<T: Message> {
    shared: Arc<Shared<T>>,
}

impl<T: Message> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Promise {
            shared: self.shared.clone(),
        }
    }
}

pub fn promise<T: Message>() -> (Promise<T>, Future<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(Inner::Pending {
            subs: Vec::new(),
            wakers: Vec::new(),
        }),
        cv: Condvar::new(),
    });
    (
        Promise {
            shared: shared.clone(),
        },
        Future { shared },
    )
}

impl<T: Message> Promise<T> {
    pub fn future(&self) -> Future<T> {
        Future {
            shared: self.shared.clone(),
        }
    }

    pub fn success(&self, value: T) {
        let _ = self.try_success(value);
    }

    pub fn failure(&self, fault: Fault) {
        let _ = self.try_failure(fault);
    }

    pub fn cancel(&self) {
        let _ = self.try_cancel();
    }

    pub fn try_success(&self, value: T) -> bool {
        self.complete(Completion::Success(value))
    }

    pub fn try_failure(&self, fault: Fault) -> bool {
        self.complete(Completion::Failure(fault))
    }

    pub fn try_cancel(&self) -> bool {
        self.complete(Completion::Cancelled)
    }

    fn complete(&self, completion: Completion<T>) -> bool {
        let (subs, wakers) = {
            let mut state = self.shared.state.lock().expect("future poisoned");
            match &mut *state {
                Inner::Done(_) => return false,
                Inner::Pending { subs, wakers } => {
                    let subs = std::mem::take(subs);
                    let wakers = std::mem::take(wakers);
                    *state = Inner::Done(completion.clone());
                    (subs, wakers)
                }
            }
        };

        self.shared.cv.notify_all();

        for sub in subs {
            if !sub.cancelled.load(Ordering::Relaxed) {
                (sub.f)(&completion);
            }
        }

        for waker in wakers {
            waker.wake();
        }

        true
    }
}

/// Allows a registered subscription to be cancelled before it fires.
#[derive(Clone)]
pub struct SubscriptionToken {
    cancelled: Arc<AtomicBool>,
}

impl SubscriptionToken {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl<T: Message> Future<T> {
    pub fn state(&self) -> FutureState {
        match &*self.shared.state.lock().expect("future poisoned") {
            Inner::Pending { .. } => FutureState::Pending,
            Inner::Done(Completion::Success(_)) => FutureState::Success,
            Inner::Done(Completion::Failure(_)) => FutureState::Failure,
            Inner::Done(Completion::Cancelled) => FutureState::Cancelled,
        }
    }

    /// Registers a callback fired exactly once on completion.
    pub fn on_complete<F>(&self, f: F) -> SubscriptionToken
    where
        F: FnOnce(&Completion<T>) + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let token = SubscriptionToken {
            cancelled: cancelled.clone(),
        };

        let mut f = Some(f);
        let fire_now = {
            let mut state = self.shared.state.lock().expect("future poisoned");
            match &mut *state {
                Inner::Pending { subs, .. } => {
                    subs.push(Subscription {
                        cancelled,
                        f: Box::new(f.take().expect("subscription present")),
                    });
                    None
                }
                Inner::Done(completion) => Some(completion.clone()),
            }
        };

        if let (Some(completion), Some(f)) = (fire_now, f.take()) {
            if !token.is_cancelled() {
                f(&completion);
            }
        }

        token
    }

    pub fn on_success<F>(&self, f: F) -> SubscriptionToken
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.on_complete(move |c| {
            if let Completion::Success(v) = c {
                f(v.clone())
            }
        })
    }

    pub fn on_failure<F>(&self, f: F) -> SubscriptionToken
    where
        F: FnOnce(Fault) + Send + 'static,
    {
        self.on_complete(move |c| {
            if let Completion::Failure(fault) = c {
                f(fault.clone())
            }
        })
    }

    pub fn on_cancel<F>(&self, f: F) -> SubscriptionToken
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_complete(move |c| {
            if let Completion::Cancelled = c {
                f()
            }
        })
    }

    /// Blocks the calling thread until completion or `timeout`.
    ///
    /// This is the only blocking entry point of the runtime; inside
    /// message handlers use `pipe` instead.
    pub fn wait(&self, timeout: Duration) -> Result<T, Fault> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock().expect("future poisoned");
        loop {
            match &*state {
                Inner::Done(Completion::Success(v)) => return Ok(v.clone()),
                Inner::Done(Completion::Failure(fault)) => return Err(fault.clone()),
                Inner::Done(Completion::Cancelled) => return Err(Fault::Cancelled),
                Inner::Pending { .. } => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Fault::Timeout);
                    }
                    let (next, timed_out) = self
                        .shared
                        .cv
                        .wait_timeout(state, deadline - now)
                        .expect("future poisoned");
                    state = next;
                    if timed_out.timed_out() {
                        if let Inner::Pending { .. } = &*state {
                            return Err(Fault::Timeout);
                        }
                    }
                }
            }
        }
    }
}

impl<T: Message> std::future::Future for Future<T> {
    type Output = Result<T, Fault>;

    fn poll(self: Pin<&mut Self>, cx: &mut PollContext<'_>) -> Poll<Self::Output> {
        let mut state = self.shared.state.lock().expect("future poisoned");
        match &mut *state {
            Inner::Done(Completion::Success(v)) => Poll::Ready(Ok(v.clone())),
            Inner::Done(Completion::Failure(fault)) => Poll::Ready(Err(fault.clone())),
            Inner::Done(Completion::Cancelled) => Poll::Ready(Err(Fault::Cancelled)),
            Inner::Pending { wakers, .. } => {
                wakers.push(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<T: Message> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Future[{:?}]", self.state())
    }
}

/// The hidden reply actor behind `ask`.
struct AskActor<R: Message> {
    promise: Promise<R>,
    target_path: ActorPath,
}

impl<R: Message> ActorFactoryArgs<(Promise<R>, ActorPath)> for AskActor<R> {
    fn create_args((promise, target_path): (Promise<R>, ActorPath)) -> Self {
        AskActor {
            promise,
            target_path,
        }
    }
}

impl<R: Message> Actor for AskActor<R> {
    type Msg = R;

    fn recv(&mut self, _: &Context<R>, msg: R, _: Sender) -> Next<R> {
        self.promise.try_success(msg);
        Next::Stopped
    }

    fn sys_recv(&mut self, ctx: &Context<R>, msg: SystemMsg, _: Sender) {
        if let SystemMsg::Terminated(terminated) = msg {
            if terminated.path() == &self.target_path {
                self.promise.try_failure(Fault::TargetTerminated);
                ctx.myself().sys_tell(crate::system::SystemCmd::Stop.into());
            }
        }
    }

    // leave the target's watcher set on every terminal outcome
    fn pre_stop(&mut self, ctx: &Context<R>) {
        if let Some(target) = ctx.system.registry().resolve_ref(&self.target_path) {
            target.sys_tell(SystemMsg::Unwatch(ctx.myself().into()));
        }
    }

    fn post_stop(&mut self) {
        // no-op when the promise already completed
        self.promise.try_cancel();
    }
}

/// Sends a message to `receiver` and returns a future completed by the
/// reply.
///
/// A hidden temporary actor under `/temp` receives the reply and
/// completes the future. The future fails with `Fault::Timeout` at the
/// deadline, with `Fault::TargetTerminated` if the target stops before
/// replying, and is cancelled if the temporary actor is stopped
/// externally. The temporary actor is stopped on every terminal
/// outcome.
pub fn ask<Msg, Ctx, R, T>(ctx: &Ctx, receiver: &T, msg: Msg, timeout: Duration) -> Future<R>
where
    Msg: Message,
    R: Message,
    Ctx: TmpActorRefFactory + Run,
    T: Tell<Msg>,
{
    let (tx, future) = promise::<R>();

    let props = Props::new_args::<AskActor<R>, _>((tx.clone(), receiver.path().clone()));
    let temp = match ctx.tmp_actor_of_props(props) {
        Ok(temp) => temp,
        Err(e) => {
            tx.failure(Fault::App(format!("failed to start ask actor: {}", e)));
            return future;
        }
    };

    let temp_basic = BasicActorRef::from(temp);
    receiver.sys_tell(SystemMsg::Watch(temp_basic.clone()));
    receiver.tell(msg, Some(temp_basic.clone()));

    let deadline_promise = tx;
    let task = ctx.run(async move {
        tokio::time::sleep(timeout).await;
        if deadline_promise.try_failure(Fault::Timeout) {
            temp_basic.sys_tell(crate::system::SystemCmd::Stop.into());
        }
    });
    if let Ok(handle) = task {
        handle.forget();
    }

    future
}

/// Default envelope used by `pipe` when no mappers are provided.
#[derive(Clone, Debug)]
pub enum PipeResult<T: Message> {
    Success(T),
    Failure(Fault),
}

/// Forwards the completion of `future` to `target` as a `PipeResult`.
/// Cancellation is surfaced as `Failure(Fault::Cancelled)`.
pub fn pipe<T, Tgt>(future: &Future<T>, target: Tgt, sender: Sender) -> SubscriptionToken
where
    T: Message,
    Tgt: Tell<PipeResult<T>>,
{
    future.on_complete(move |completion| {
        let msg = match completion {
            Completion::Success(v) => PipeResult::Success(v.clone()),
            Completion::Failure(fault) => PipeResult::Failure(fault.clone()),
            Completion::Cancelled => PipeResult::Failure(Fault::Cancelled),
        };
        target.tell(msg, sender);
    })
}

/// Forwards the completion of `future` to `target`, mapped through the
/// caller-provided constructors.
pub fn pipe_map<T, M, Tgt, FS, FF>(
    future: &Future<T>,
    target: Tgt,
    sender: Sender,
    on_success: FS,
    on_failure: FF,
) -> SubscriptionToken
where
    T: Message,
    M: Message,
    Tgt: Tell<M>,
    FS: FnOnce(T) -> M + Send + 'static,
    FF: FnOnce(Fault) -> M + Send + 'static,
{
    future.on_complete(move |completion| {
        let msg = match completion {
            Completion::Success(v) => on_success(v.clone()),
            Completion::Failure(fault) => on_failure(fault.clone()),
            Completion::Cancelled => on_failure(Fault::Cancelled),
        };
        target.tell(msg, sender);
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_once() {
        let (p, f) = promise::<u32>();
        assert!(p.try_success(1));
        assert!(!p.try_success(2));
        assert!(!p.try_failure(Fault::Timeout));
        assert!(!p.try_cancel());
        assert_eq!(f.wait(Duration::from_millis(10)).unwrap(), 1);
        assert_eq!(f.state(), FutureState::Success);
    }

    #[test]
    fn subscriptions_fire_in_order() {
        let (p, f) = promise::<u32>();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let seen = seen.clone();
            f.on_success(move |v| seen.lock().unwrap().push((i, v)));
        }

        p.success(7);
        assert_eq!(&*seen.lock().unwrap(), &[(0, 7), (1, 7), (2, 7)]);

        // after completion: fires synchronously
        let seen2 = seen.clone();
        f.on_success(move |v| seen2.lock().unwrap().push((9, v)));
        assert_eq!(seen.lock().unwrap().len(), 4);
    }

    #[test]
    fn cancelled_subscription_does_not_fire() {
        let (p, f) = promise::<u32>();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        let token = f.on_success(move |_| fired2.store(true, Ordering::Relaxed));
        token.cancel();
        p.success(1);
        assert!(!fired.load(Ordering::Relaxed));
    }

    #[test]
    fn wait_times_out() {
        let (_p, f) = promise::<u32>();
        assert_eq!(f.wait(Duration::from_millis(20)), Err(Fault::Timeout));
    }

    #[test]
    fn failure_and_cancel_states() {
        let (p, f) = promise::<u32>();
        p.failure(Fault::App("boom".into()));
        assert_eq!(
            f.wait(Duration::from_millis(10)),
            Err(Fault::App("boom".into()))
        );

        let (p2, f2) = promise::<u32>();
        p2.cancel();
        assert_eq!(f2.wait(Duration::from_millis(10)), Err(Fault::Cancelled));
        assert_eq!(f2.state(), FutureState::Cancelled);
    }
}
