use super::context::{self, SuspensionSink};
use super::event_loop::{LoopShared, Message};
use super::{OpId, UnitId};
use crate::deferred::{Outcome, Suspension};
use crate::error::{Fault, RuntimeError};

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::task::{Context, Poll, Wake, Waker};

/// Status of an execution unit.
///
/// Transitions are monotonic:
/// `NotStarted → Running → (Suspended ↔ Running)* → Completed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum UnitStatus {
    NotStarted,
    Running,
    Suspended,
    Completed,
    Failed,
}

impl UnitStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, UnitStatus::Completed | UnitStatus::Failed)
    }
}

type Body<T> = Pin<Box<dyn Future<Output = Outcome<T>>>>;

/// Waker of one unit. Waking posts `Wake(id)` to the owning loop once per
/// suspension; repeated wakes before the next poll are coalesced.
struct UnitWaker {
    id: UnitId,
    notified: AtomicBool,
    tx: Sender<Message>,
}

impl Wake for UnitWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        if !self.notified.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(Message::Wake(self.id));
        }
    }
}

/// The loop's view of a unit, independent of its output type.
pub(crate) trait Schedulable {
    fn status(&self) -> UnitStatus;

    /// Poll the unit if it was woken since its last poll. Returns whether a
    /// poll happened.
    fn poll_if_notified(self: Rc<Self>) -> bool;

    /// Deliver a timeout and deregister the operation the unit awaits
    fn time_out(self: Rc<Self>, fault: Fault) -> Result<(), RuntimeError>;

    fn cancel(self: Rc<Self>) -> Result<(), RuntimeError>;
}

pub(crate) struct UnitCore<T> {
    id: UnitId,
    status: Cell<UnitStatus>,
    body: RefCell<Option<Body<T>>>,
    awaiting: RefCell<Option<Rc<dyn Suspension>>>,
    result: RefCell<Option<Outcome<T>>>,
    waker: Arc<UnitWaker>,
    event_loop: Weak<LoopShared>,
}

impl<T: 'static> UnitCore<T> {
    /// Poll the body once, within the caller's control.
    fn drive(self: &Rc<Self>) {
        let mut body = self.body.borrow_mut();
        let Some(future) = body.as_mut() else {
            return;
        };

        self.status.set(UnitStatus::Running);
        self.waker.notified.store(false, Ordering::Release);
        self.awaiting.borrow_mut().take();

        let waker = Waker::from(Arc::clone(&self.waker));
        let mut cx = Context::from_waker(&waker);
        let sink: Rc<dyn SuspensionSink> = Rc::clone(self) as Rc<dyn SuspensionSink>;

        match context::enter(sink, || future.as_mut().poll(&mut cx)) {
            Poll::Pending => {
                self.status.set(UnitStatus::Suspended);
                tracing::trace!(unit = %self.id, "Execution unit suspended");
            }
            Poll::Ready(outcome) => {
                *body = None;
                drop(body);
                self.finish(outcome);
            }
        }
    }

    fn finish(&self, outcome: Outcome<T>) {
        match &outcome {
            Ok(_) => {
                self.status.set(UnitStatus::Completed);
                tracing::debug!(unit = %self.id, "Execution unit completed");
            }
            Err(fault) => {
                self.status.set(UnitStatus::Failed);
                tracing::debug!(unit = %self.id, error = %fault, "Execution unit failed");
            }
        }
        *self.result.borrow_mut() = Some(outcome);
    }

    fn expect_suspended(&self) -> Result<Rc<dyn Suspension>, RuntimeError> {
        let status = self.status.get();
        if status != UnitStatus::Suspended {
            tracing::error!(unit = %self.id, %status, "Execution unit is not suspended");
            return Err(RuntimeError::NotSuspended { status });
        }
        self.awaiting.borrow().clone().ok_or_else(|| {
            tracing::error!(unit = %self.id, "Execution unit is not awaiting a deferred result");
            RuntimeError::NotAwaiting
        })
    }

    fn throw_into(self: &Rc<Self>, fault: Fault) -> Result<(), RuntimeError> {
        let suspension = self.expect_suspended()?;
        if !suspension.deliver_fault(fault) {
            return Err(RuntimeError::NotAwaiting);
        }
        self.drive();
        Ok(())
    }

    /// `throw_into`, also dropping the awaited operation so its late
    /// completion is discarded.
    fn timeout_unit(self: &Rc<Self>, fault: Fault) -> Result<(), RuntimeError> {
        let suspension = self.expect_suspended()?;
        if !suspension.deliver_fault(fault) {
            return Err(RuntimeError::NotAwaiting);
        }
        self.forget(suspension.op());
        self.drive();
        Ok(())
    }

    fn forget(&self, op: Option<OpId>) {
        if let (Some(op), Some(shared)) = (op, self.event_loop.upgrade()) {
            shared.forget_op(op);
        }
    }

    fn cancel_unit(self: &Rc<Self>) -> Result<(), RuntimeError> {
        match self.status.get() {
            UnitStatus::NotStarted => {
                self.body.borrow_mut().take();
                tracing::debug!(unit = %self.id, "Execution unit cancelled before start");
                self.finish(Err(Fault::Cancelled));
                Ok(())
            }
            UnitStatus::Suspended => {
                let suspension = self.expect_suspended()?;
                let op = suspension.cancel().inspect_err(|_| {
                    tracing::debug!(unit = %self.id, "Cancel lost the race with a delivered outcome");
                })?;
                self.forget(op);
                tracing::debug!(unit = %self.id, "Execution unit cancelled while suspended");
                self.drive();
                Ok(())
            }
            status @ UnitStatus::Running => Err(RuntimeError::NotSuspended { status }),
            UnitStatus::Completed | UnitStatus::Failed => Err(RuntimeError::AlreadyFinished),
        }
    }
}

impl<T: 'static> SuspensionSink for UnitCore<T> {
    fn suspend_on(&self, suspension: Rc<dyn Suspension>) {
        *self.awaiting.borrow_mut() = Some(suspension);
    }
}

impl<T: 'static> Schedulable for UnitCore<T> {
    fn status(&self) -> UnitStatus {
        self.status.get()
    }

    fn poll_if_notified(self: Rc<Self>) -> bool {
        if self.status.get() != UnitStatus::Suspended || !self.waker.notified.load(Ordering::Acquire)
        {
            return false;
        }
        self.drive();
        true
    }

    fn time_out(self: Rc<Self>, fault: Fault) -> Result<(), RuntimeError> {
        self.timeout_unit(fault)
    }

    fn cancel(self: Rc<Self>) -> Result<(), RuntimeError> {
        self.cancel_unit()
    }
}

/// A cooperative, pausable unit of execution for one request.
///
/// Created not-started by [`EventLoop::spawn`](super::EventLoop::spawn).
/// Cloning yields another handle to the same unit.
pub struct ExecutionUnit<T> {
    core: Rc<UnitCore<T>>,
}

impl<T> Clone for ExecutionUnit<T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<T: 'static> ExecutionUnit<T> {
    pub(crate) fn new<F>(
        id: UnitId,
        future: F,
        tx: Sender<Message>,
        event_loop: Weak<LoopShared>,
    ) -> Self
    where
        F: Future<Output = Outcome<T>> + 'static,
    {
        Self {
            core: Rc::new(UnitCore {
                id,
                status: Cell::new(UnitStatus::NotStarted),
                body: RefCell::new(Some(Box::pin(future))),
                awaiting: RefCell::new(None),
                result: RefCell::new(None),
                waker: Arc::new(UnitWaker {
                    id,
                    notified: AtomicBool::new(false),
                    tx,
                }),
                event_loop,
            }),
        }
    }

    pub(crate) fn schedulable(&self) -> Rc<dyn Schedulable> {
        Rc::clone(&self.core) as Rc<dyn Schedulable>
    }

    pub fn id(&self) -> UnitId {
        self.core.id
    }

    pub fn status(&self) -> UnitStatus {
        self.core.status.get()
    }

    pub fn is_started(&self) -> bool {
        self.status() != UnitStatus::NotStarted
    }

    pub fn is_suspended(&self) -> bool {
        self.status() == UnitStatus::Suspended
    }

    /// Whether the unit has finished, successfully or not
    pub fn is_completed(&self) -> bool {
        self.status().is_finished()
    }

    pub fn is_failed(&self) -> bool {
        self.status() == UnitStatus::Failed
    }

    /// Run the body until its first suspension point or completion
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::AlreadyStarted`] unless the unit is not-started.
    pub fn start(&self) -> Result<(), RuntimeError> {
        if self.status() != UnitStatus::NotStarted {
            tracing::error!(unit = %self.id(), status = %self.status(), "Execution unit started twice");
            return Err(RuntimeError::AlreadyStarted);
        }
        self.core.drive();
        Ok(())
    }

    /// Hand a value to the suspended unit and continue it immediately.
    ///
    /// The pending `await` returns `value`. A later settlement of the awaited
    /// deferred is ignored by this unit.
    ///
    /// # Errors
    ///
    /// Fails if the unit is not suspended on a deferred, or if `value` is not
    /// the awaited type.
    pub fn resume<V: 'static>(&self, value: V) -> Result<(), RuntimeError> {
        let suspension = self.core.expect_suspended()?;
        suspension.deliver_value(Box::new(value)).inspect_err(|err| {
            tracing::error!(unit = %self.id(), error = %err, "Resume rejected");
        })?;
        self.core.drive();
        Ok(())
    }

    /// Raise `fault` at the unit's suspension point and continue it immediately
    ///
    /// # Errors
    ///
    /// Fails if the unit is not suspended on a deferred.
    pub fn throw_into(&self, fault: Fault) -> Result<(), RuntimeError> {
        self.core.throw_into(fault)
    }

    /// Cancel the unit.
    ///
    /// A not-started unit fails with [`Fault::Cancelled`] without running. A
    /// suspended unit has its awaited deferred rejected with `Cancelled`, its
    /// pending work deregistered, and is driven so its own error handling and
    /// cleanup run.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::AlreadyFinished`] for a finished unit, and
    /// [`RuntimeError::NotAwaiting`] when the awaited outcome has already
    /// arrived and the unit will complete on its next poll.
    pub fn cancel(&self) -> Result<(), RuntimeError> {
        self.core.cancel_unit()
    }

    /// The successful output
    ///
    /// # Errors
    ///
    /// `NotCompleted` before completion, `NoOutput` if the unit failed.
    pub fn output(&self) -> Result<T, RuntimeError>
    where
        T: Clone,
    {
        match &*self.core.result.borrow() {
            None => Err(RuntimeError::NotCompleted),
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(_)) => Err(RuntimeError::NoOutput),
        }
    }

    /// The failure
    ///
    /// # Errors
    ///
    /// `NotCompleted` before completion, `NoError` if the unit succeeded.
    pub fn error(&self) -> Result<Fault, RuntimeError> {
        match &*self.core.result.borrow() {
            None => Err(RuntimeError::NotCompleted),
            Some(Ok(_)) => Err(RuntimeError::NoError),
            Some(Err(fault)) => Ok(fault.clone()),
        }
    }

    /// Consume the completion outcome
    ///
    /// # Errors
    ///
    /// `NotCompleted` before completion or after the outcome was taken.
    pub fn take_result(&self) -> Result<Outcome<T>, RuntimeError> {
        self.core
            .result
            .borrow_mut()
            .take()
            .ok_or(RuntimeError::NotCompleted)
    }
}

impl<T> std::fmt::Debug for ExecutionUnit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionUnit")
            .field("id", &self.core.id)
            .field("status", &self.core.status.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::deferred::Deferred;
    use crate::error::{Fault, RuntimeError};
    use crate::runtime::{EventLoop, UnitStatus};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_runs_to_completion_without_suspending() {
        let lp = EventLoop::new();
        let unit = lp.spawn(async { Ok::<_, Fault>(5) });

        assert_eq!(unit.status(), UnitStatus::NotStarted);
        unit.start().unwrap();

        assert_eq!(unit.status(), UnitStatus::Completed);
        assert_eq!(unit.output().unwrap(), 5);
        assert_eq!(unit.error().unwrap_err(), RuntimeError::NoError);
    }

    #[test]
    fn test_start_twice_is_an_error() {
        let lp = EventLoop::new();
        let unit = lp.spawn(async { Ok::<_, Fault>(()) });
        unit.start().unwrap();
        assert_eq!(unit.start(), Err(RuntimeError::AlreadyStarted));
    }

    #[test]
    fn test_resume_returns_value_at_suspension_point() {
        let lp = EventLoop::new();
        let deferred = Deferred::<i32>::new();
        let trace = Rc::new(RefCell::new(Vec::new()));

        let d = deferred.clone();
        let t = Rc::clone(&trace);
        let unit = lp.spawn(async move {
            t.borrow_mut().push("before");
            let value = d.await?;
            t.borrow_mut().push("after");
            Ok::<_, Fault>(value * 2)
        });

        unit.start().unwrap();
        assert!(unit.is_suspended());
        assert_eq!(*trace.borrow(), vec!["before"]);
        assert_eq!(unit.output().unwrap_err(), RuntimeError::NotCompleted);

        unit.resume(21).unwrap();

        assert_eq!(*trace.borrow(), vec!["before", "after"]);
        assert_eq!(unit.output().unwrap(), 42);

        // The original operation settling later is harmless.
        deferred.fulfill(1).unwrap();
        assert_eq!(unit.output().unwrap(), 42);
    }

    #[test]
    fn test_throw_into_raises_at_suspension_point() {
        let lp = EventLoop::new();
        let deferred = Deferred::<i32>::new();
        let reached = Rc::new(RefCell::new(false));

        let d = deferred.clone();
        let r = Rc::clone(&reached);
        let unit = lp.spawn(async move {
            let outcome = d.await;
            *r.borrow_mut() = true;
            outcome
        });

        unit.start().unwrap();
        unit.throw_into(Fault::operation("boom")).unwrap();

        assert!(*reached.borrow());
        assert!(unit.is_failed());
        assert!(matches!(unit.error().unwrap(), Fault::Operation(msg) if msg == "boom"));
    }

    #[test]
    fn test_resume_with_wrong_type_is_rejected() {
        let lp = EventLoop::new();
        let deferred = Deferred::<i32>::new();
        let d = deferred.clone();
        let unit = lp.spawn(async move { d.await });

        unit.start().unwrap();
        assert!(matches!(
            unit.resume("not a number"),
            Err(RuntimeError::TypeMismatch { .. })
        ));
        assert!(unit.is_suspended());
    }

    #[test]
    fn test_resume_when_not_suspended_is_an_error() {
        let lp = EventLoop::new();
        let unit = lp.spawn(async { Ok::<_, Fault>(1) });

        assert!(matches!(
            unit.resume(1),
            Err(RuntimeError::NotSuspended {
                status: UnitStatus::NotStarted
            })
        ));
        unit.start().unwrap();
        assert!(matches!(
            unit.throw_into(Fault::Cancelled),
            Err(RuntimeError::NotSuspended {
                status: UnitStatus::Completed
            })
        ));
    }

    #[test]
    fn test_cancel_before_start_skips_body() {
        let lp = EventLoop::new();
        let ran = Rc::new(RefCell::new(false));
        let r = Rc::clone(&ran);
        let unit = lp.spawn(async move {
            *r.borrow_mut() = true;
            Ok::<_, Fault>(())
        });

        unit.cancel().unwrap();

        assert!(!*ran.borrow());
        assert!(unit.error().unwrap().is_cancelled());
        assert_eq!(unit.cancel(), Err(RuntimeError::AlreadyFinished));
    }

    #[test]
    fn test_cancel_rejects_awaited_deferred() {
        let lp = EventLoop::new();
        let deferred = Deferred::<i32>::new();
        let d = deferred.clone();
        let unit = lp.spawn(async move { d.await });

        unit.start().unwrap();
        unit.cancel().unwrap();

        assert!(unit.error().unwrap().is_cancelled());
        assert_eq!(deferred.fulfill(3), Err(RuntimeError::AlreadySettled));
    }

    #[test]
    fn test_cancel_after_outcome_delivered_is_rejected() {
        let lp = EventLoop::new();
        let deferred = Deferred::<i32>::new();
        let d = deferred.clone();
        let unit = lp.spawn(async move { d.await });
        unit.start().unwrap();

        // Settled, but the wake has not been processed yet.
        deferred.fulfill(4).unwrap();
        assert!(unit.is_suspended());
        assert_eq!(unit.cancel(), Err(RuntimeError::NotAwaiting));

        lp.turn();
        assert_eq!(unit.output().unwrap(), 4);
    }
}
