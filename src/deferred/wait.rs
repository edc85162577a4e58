use super::{Deferred, Outcome};
use crate::error::{Fault, RuntimeError};
use crate::runtime::{OpId, context};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// The pending side of a suspension, as seen by the execution unit that owns it.
///
/// Type-erased so a unit can hold the wait of any `Deferred<T>`.
pub(crate) trait Suspension {
    /// Deliver a resume value. Fails if the value is not the awaited type.
    fn deliver_value(&self, value: Box<dyn Any>) -> Result<(), RuntimeError>;

    /// Deliver a failure at the suspension point. Returns `false` if an
    /// outcome was already delivered.
    fn deliver_fault(&self, fault: Fault) -> bool;

    /// Reject the awaited deferred with [`Fault::Cancelled`] and return its
    /// work registration, if any.
    ///
    /// Fails with `NotAwaiting` if an outcome already reached this
    /// suspension and only the wake is outstanding.
    fn cancel(&self) -> Result<Option<OpId>, RuntimeError>;

    /// Work registration of the awaited deferred
    fn op(&self) -> Option<OpId>;
}

/// One-shot mailbox between a deferred's continuation and the awaiting future.
///
/// Whichever of settlement, `resume`, or `throw_into` arrives first wins; the
/// rest are dropped, so an abandoned continuation never resumes a unit twice.
struct WaitSlot<T> {
    delivered: RefCell<Option<Outcome<T>>>,
    closed: Cell<bool>,
    waker: RefCell<Option<Waker>>,
    deferred: Deferred<T>,
}

impl<T: 'static> WaitSlot<T> {
    fn deliver(&self, outcome: Outcome<T>) -> bool {
        if self.closed.replace(true) {
            return false;
        }
        *self.delivered.borrow_mut() = Some(outcome);
        if let Some(waker) = self.waker.borrow_mut().take() {
            waker.wake();
        }
        true
    }
}

impl<T: Clone + 'static> Suspension for WaitSlot<T> {
    fn deliver_value(&self, value: Box<dyn Any>) -> Result<(), RuntimeError> {
        let value = value.downcast::<T>().map_err(|_| RuntimeError::TypeMismatch {
            expected: std::any::type_name::<T>(),
        })?;
        if self.deliver(Ok(*value)) {
            Ok(())
        } else {
            Err(RuntimeError::NotAwaiting)
        }
    }

    fn deliver_fault(&self, fault: Fault) -> bool {
        self.deliver(Err(fault))
    }

    fn cancel(&self) -> Result<Option<OpId>, RuntimeError> {
        if self.closed.get() {
            return Err(RuntimeError::NotAwaiting);
        }
        if self.deferred.is_pending() {
            // The continuation registered in `Wait::poll` carries the
            // rejection into this slot.
            let _ = self.deferred.reject(Fault::Cancelled);
        } else if !self.deliver(Err(Fault::Cancelled)) {
            return Err(RuntimeError::NotAwaiting);
        }
        Ok(self.deferred.op())
    }

    fn op(&self) -> Option<OpId> {
        self.deferred.op()
    }
}

/// Future returned by awaiting a [`Deferred`].
pub struct Wait<T> {
    deferred: Deferred<T>,
    slot: Option<Rc<WaitSlot<T>>>,
}

impl<T> Wait<T> {
    pub(crate) fn new(deferred: Deferred<T>) -> Self {
        Self {
            deferred,
            slot: None,
        }
    }
}

impl<T: Clone + 'static> Future for Wait<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if let Some(slot) = &this.slot {
            if let Some(outcome) = slot.delivered.borrow_mut().take() {
                return Poll::Ready(outcome);
            }
            if !slot.closed.get() {
                *slot.waker.borrow_mut() = Some(cx.waker().clone());
                context::suspend_on(Rc::clone(slot) as Rc<dyn Suspension>);
                return Poll::Pending;
            }
            // Delivered and already taken by an earlier poll; fall through to
            // the deferred's own outcome.
        }

        if let Some(outcome) = this.deferred.peek() {
            return Poll::Ready((*outcome).clone());
        }

        if this.slot.is_some() {
            // Closed by resume/throw_into and consumed, but the deferred is
            // still pending: nothing more will arrive here.
            return Poll::Ready(Err(Fault::Abandoned));
        }

        let slot = Rc::new(WaitSlot {
            delivered: RefCell::new(None),
            closed: Cell::new(false),
            waker: RefCell::new(Some(cx.waker().clone())),
            deferred: this.deferred.clone(),
        });

        let weak = Rc::downgrade(&slot);
        this.deferred.on_settle(move |outcome| {
            if let Some(slot) = weak.upgrade() {
                slot.deliver(outcome.clone());
            }
        });

        context::suspend_on(Rc::clone(&slot) as Rc<dyn Suspension>);
        this.slot = Some(slot);
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::task::Wake;

    struct CountingWaker(std::sync::atomic::AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    fn poll_once<F: Future + Unpin>(future: &mut F, waker: &Arc<CountingWaker>) -> Poll<F::Output> {
        let waker = Waker::from(Arc::clone(waker));
        let mut cx = Context::from_waker(&waker);
        Pin::new(future).poll(&mut cx)
    }

    #[test]
    fn test_ready_when_already_settled() {
        let deferred = Deferred::new();
        deferred.fulfill(42).unwrap();
        let waker = Arc::new(CountingWaker(Default::default()));

        let mut wait = deferred.wait();
        assert!(matches!(poll_once(&mut wait, &waker), Poll::Ready(Ok(42))));
    }

    #[test]
    fn test_pending_then_woken_by_fulfill() {
        let deferred = Deferred::new();
        let waker = Arc::new(CountingWaker(Default::default()));

        let mut wait = deferred.wait();
        assert!(poll_once(&mut wait, &waker).is_pending());

        deferred.fulfill("row".to_string()).unwrap();
        assert_eq!(waker.0.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(matches!(poll_once(&mut wait, &waker), Poll::Ready(Ok(ref v)) if v == "row"));
    }

    #[test]
    fn test_rejection_surfaces_as_error() {
        let deferred = Deferred::<u8>::new();
        let waker = Arc::new(CountingWaker(Default::default()));

        let mut wait = deferred.wait();
        assert!(poll_once(&mut wait, &waker).is_pending());
        deferred.reject(Fault::timeout(std::time::Duration::from_millis(30))).unwrap();

        assert!(matches!(
            poll_once(&mut wait, &waker),
            Poll::Ready(Err(Fault::Timeout { after_ms: 30 }))
        ));
    }

    #[test]
    fn test_dropped_wait_ignores_settlement() {
        let deferred = Deferred::<u8>::new();
        let waker = Arc::new(CountingWaker(Default::default()));

        let mut wait = deferred.wait();
        assert!(poll_once(&mut wait, &waker).is_pending());
        drop(wait);

        deferred.fulfill(1).unwrap();
        assert_eq!(waker.0.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
