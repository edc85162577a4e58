use super::EventLoop;
use crate::deferred::Deferred;
use crate::error::Fault;

use std::future::Future;
use tokio::runtime::Handle;

/// An async I/O issuer backed by a tokio runtime.
///
/// Work runs on tokio; its outcome is settled on the event loop through a
/// [`Completer`](super::Completer). Cancelling the awaiting unit aborts the
/// tokio task, and anything it had already produced is discarded.
///
/// # Example
///
/// ```rust,ignore
/// let offload = Offload::new(runtime.handle().clone());
/// let user = offload.issue(&event_loop, async move {
///     pool.fetch_user(id).await.map_err(|e| Fault::operation(e.to_string()))
/// });
///
/// // inside the fetch hook
/// let user = user.await?;
/// ```
#[derive(Clone)]
pub struct Offload {
    handle: Handle,
}

impl Offload {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the tokio runtime of the calling context, if there is one
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    /// Run `future` on tokio and settle the returned deferred with its output
    pub fn issue<T, F>(&self, event_loop: &EventLoop, future: F) -> Deferred<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, Fault>> + Send + 'static,
    {
        let (deferred, completer) = event_loop.register::<T>();
        let op = completer.op();

        let task = self.handle.spawn(async move {
            completer.complete(future.await);
        });

        let abort = task.abort_handle();
        event_loop.set_canceller(op, move || abort.abort());
        deferred
    }

    /// Run a blocking closure on tokio's blocking pool
    pub fn issue_blocking<T, F>(&self, event_loop: &EventLoop, work: F) -> Deferred<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, Fault> + Send + 'static,
    {
        let (deferred, completer) = event_loop.register::<T>();
        let blocking = self.handle.spawn_blocking(work);

        self.handle.spawn(async move {
            match blocking.await {
                Ok(outcome) => completer.complete(outcome),
                Err(err) => completer.reject(Fault::internal(format!(
                    "offloaded work did not finish: {}",
                    err
                ))),
            }
        });
        deferred
    }
}
