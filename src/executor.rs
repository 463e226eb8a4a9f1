use std::{pin::Pin, sync::Arc};

use futures::{
    channel::oneshot::{channel, Receiver},
    task::{Context as PollContext, Poll},
    Future, FutureExt,
};
use thiserror::Error;

pub type ExecutorHandle = Arc<dyn TaskExecutor>;

#[derive(Clone, Debug, Error)]
pub enum ExecutorError {
    #[error("failed to spawn task: {0}")]
    Spawn(String),
    #[error("task was cancelled before completing")]
    Canceled,
    #[error("task failed: {0}")]
    Join(String),
}

pub trait Task: Future<Output = ()> + Send {}
impl<T: Future<Output = ()> + Send> Task for T {}

pub trait TaskExecutor: Send + Sync {
    fn spawn(&self, future: Pin<Box<dyn Task>>) -> Result<Box<dyn TaskExec<()>>, ExecutorError>;
}

pub trait TaskExec<T: Send>: Future<Output = Result<T, ExecutorError>> + Unpin + Send {
    fn abort(self: Box<Self>);
    fn forget(self: Box<Self>);
}

/// Handle to a value being produced on the executor.
///
/// Await it for the result, `abort` to cancel, or `forget` to let the
/// task run detached.
pub struct TaskHandle<T: Send> {
    handle: Box<dyn TaskExec<()>>,
    recv: Receiver<T>,
}

impl<T: Send> TaskHandle<T> {
    pub fn new(handle: Box<dyn TaskExec<()>>, recv: Receiver<T>) -> Self {
        Self { handle, recv }
    }

    pub fn abort(self) {
        self.handle.abort()
    }

    pub fn forget(self) {
        self.handle.forget()
    }
}

impl<T: Send> Future for TaskHandle<T> {
    type Output = Result<T, ExecutorError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut PollContext<'_>) -> Poll<Self::Output> {
        match self.recv.poll_unpin(cx) {
            Poll::Ready(Ok(val)) => Poll::Ready(Ok(val)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ExecutorError::Canceled)),
            Poll::Pending => {
                // surface task failure even if the value never arrives
                match Pin::new(&mut *self.handle).poll(cx) {
                    Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
                    _ => Poll::Pending,
                }
            }
        }
    }
}

/// Runs futures on the system's executor.
pub trait Run {
    fn run<Fut>(&self, future: Fut) -> Result<TaskHandle<Fut::Output>, ExecutorError>
    where
        Fut: Future + Send + 'static,
        Fut::Output: Send + 'static;
}

pub fn get_executor_handle(_cfg: &crate::config::Config) -> ExecutorHandle {
    Arc::new(TokioExecutor(tokio::runtime::Handle::current()))
}

pub struct TokioExecutor(pub tokio::runtime::Handle);

impl TaskExecutor for TokioExecutor {
    fn spawn(&self, future: Pin<Box<dyn Task>>) -> Result<Box<dyn TaskExec<()>>, ExecutorError> {
        Ok(Box::new(TokioJoinHandle(self.0.spawn(future))))
    }
}

struct TokioJoinHandle(tokio::task::JoinHandle<()>);

impl Future for TokioJoinHandle {
    type Output = Result<(), ExecutorError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut PollContext<'_>) -> Poll<Self::Output> {
        Future::poll(Pin::new(&mut self.0), cx).map_err(|e| ExecutorError::Join(e.to_string()))
    }
}

impl TaskExec<()> for TokioJoinHandle {
    fn abort(self: Box<Self>) {
        self.0.abort();
    }

    fn forget(self: Box<Self>) {
        drop(self);
    }
}

/// Spawns `future`, wiring its output through a one-shot channel into a
/// [`TaskHandle`].
pub(crate) fn run_on<Fut>(
    exec: &ExecutorHandle,
    future: Fut,
) -> Result<TaskHandle<Fut::Output>, ExecutorError>
where
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    let (tx, rx) = channel();
    let wrapped = Box::pin(async move {
        let out = future.await;
        let _ = tx.send(out);
    });
    let handle = exec.spawn(wrapped)?;
    Ok(TaskHandle::new(handle, rx))
}
