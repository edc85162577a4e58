//! Deferred Results
//!
//! A [`Deferred`] is a single-assignment cell for the outcome of one
//! asynchronous operation. The issuer of the operation settles it exactly
//! once with [`Deferred::fulfill`] or [`Deferred::reject`]; the request that
//! needs the outcome awaits it from inside an execution unit.
//!
//! ```rust,ignore
//! let rows: Deferred<Vec<Row>> = db.query("select * from users");
//!
//! // inside a hook
//! let rows = rows.await?;
//! ```
//!
//! Settling twice is a programming error: the second call returns
//! [`RuntimeError::AlreadySettled`] and is logged, it never overwrites the
//! first outcome.

mod wait;

pub use wait::Wait;
pub(crate) use wait::Suspension;

use crate::error::{Fault, RuntimeError};
use crate::runtime::OpId;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::IntoFuture;
use std::rc::Rc;

/// The settled value or failure of an operation
pub type Outcome<T> = std::result::Result<T, Fault>;

type Continuation<T> = Box<dyn FnOnce(&Outcome<T>)>;

/// Settlement state of a [`Deferred`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Settlement {
    Pending,
    Fulfilled,
    Rejected,
}

enum State<T> {
    Pending(Vec<Continuation<T>>),
    Settled(Rc<Outcome<T>>),
}

struct Inner<T> {
    state: RefCell<State<T>>,
    /// Work registration in the event loop, if the loop issued this deferred
    op: Cell<Option<OpId>>,
}

/// Single-assignment future for one asynchronous operation's outcome.
///
/// Cloning yields another handle to the same cell.
pub struct Deferred<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Deferred<T> {
    /// Create a new pending deferred
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                state: RefCell::new(State::Pending(Vec::new())),
                op: Cell::new(None),
            }),
        }
    }

    pub(crate) fn with_op(op: OpId) -> Self {
        let deferred = Self::new();
        deferred.inner.op.set(Some(op));
        deferred
    }

    pub(crate) fn op(&self) -> Option<OpId> {
        self.inner.op.get()
    }

    pub fn settlement(&self) -> Settlement {
        match &*self.inner.state.borrow() {
            State::Pending(_) => Settlement::Pending,
            State::Settled(outcome) if outcome.is_ok() => Settlement::Fulfilled,
            State::Settled(_) => Settlement::Rejected,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.settlement() == Settlement::Pending
    }

    /// Settle with a value and run queued continuations in registration order
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::AlreadySettled`] if the deferred has already settled.
    pub fn fulfill(&self, value: T) -> Result<(), RuntimeError> {
        self.settle(Ok(value))
    }

    /// Settle with a failure and run queued continuations in registration order
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::AlreadySettled`] if the deferred has already settled.
    pub fn reject(&self, fault: Fault) -> Result<(), RuntimeError> {
        self.settle(Err(fault))
    }

    fn settle(&self, outcome: Outcome<T>) -> Result<(), RuntimeError> {
        let (queue, outcome) = {
            let mut state = self.inner.state.borrow_mut();
            match &mut *state {
                State::Settled(_) => {
                    tracing::error!(
                        op = ?self.inner.op.get(),
                        "Attempted to settle a deferred result twice"
                    );
                    return Err(RuntimeError::AlreadySettled);
                }
                State::Pending(queue) => {
                    let queue = std::mem::take(queue);
                    let outcome = Rc::new(outcome);
                    *state = State::Settled(Rc::clone(&outcome));
                    (queue, outcome)
                }
            }
        };

        // The state borrow is released here, so a continuation that tries to
        // settle again observes `Settled` and gets `AlreadySettled`.
        for continuation in queue {
            continuation(&outcome);
        }
        Ok(())
    }

    /// Register a continuation.
    ///
    /// Runs immediately if the deferred has already settled.
    pub fn on_settle<F>(&self, continuation: F)
    where
        F: FnOnce(&Outcome<T>) + 'static,
    {
        let settled = {
            let mut state = self.inner.state.borrow_mut();
            match &mut *state {
                State::Pending(queue) => {
                    queue.push(Box::new(continuation));
                    return;
                }
                State::Settled(outcome) => Rc::clone(outcome),
            }
        };
        continuation(&settled);
    }

    pub(crate) fn peek(&self) -> Option<Rc<Outcome<T>>> {
        match &*self.inner.state.borrow() {
            State::Pending(_) => None,
            State::Settled(outcome) => Some(Rc::clone(outcome)),
        }
    }

    /// Suspension point: resolves with the settled outcome.
    ///
    /// Inside an execution unit the pending wait is recorded on the unit, so
    /// the unit can be resumed or have a failure thrown into it at exactly
    /// this point.
    pub fn wait(&self) -> Wait<T>
    where
        T: Clone,
    {
        Wait::new(self.clone())
    }
}

impl<T: Clone + 'static> IntoFuture for Deferred<T> {
    type Output = Outcome<T>;
    type IntoFuture = Wait<T>;

    fn into_future(self) -> Self::IntoFuture {
        Wait::new(self)
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settlement = match &*self.inner.state.borrow() {
            State::Pending(queue) => format!("Pending({} continuations)", queue.len()),
            State::Settled(outcome) if outcome.is_ok() => "Fulfilled".to_string(),
            State::Settled(_) => "Rejected".to_string(),
        };
        f.debug_struct("Deferred")
            .field("state", &settlement)
            .field("op", &self.inner.op.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fulfill_runs_continuations_in_order() {
        let deferred = Deferred::<i32>::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = Rc::clone(&seen);
            deferred.on_settle(move |outcome| {
                seen.borrow_mut().push((tag, outcome.as_ref().ok().copied()));
            });
        }

        deferred.fulfill(7).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![("first", Some(7)), ("second", Some(7)), ("third", Some(7))]
        );
        assert_eq!(deferred.settlement(), Settlement::Fulfilled);
    }

    #[test]
    fn test_second_settlement_is_an_error() {
        let deferred = Deferred::<i32>::new();
        deferred.fulfill(1).unwrap();

        assert_eq!(deferred.fulfill(2), Err(RuntimeError::AlreadySettled));
        assert_eq!(
            deferred.reject(Fault::Cancelled),
            Err(RuntimeError::AlreadySettled)
        );
        assert!(matches!(*deferred.peek().unwrap(), Ok(1)));
    }

    #[test]
    fn test_reject_delivers_fault() {
        let deferred = Deferred::<i32>::new();
        let seen = Rc::new(Cell::new(false));
        let flag = Rc::clone(&seen);
        deferred.on_settle(move |outcome| {
            flag.set(matches!(outcome, Err(Fault::Operation(msg)) if msg == "db down"));
        });

        deferred.reject(Fault::operation("db down")).unwrap();

        assert!(seen.get());
        assert_eq!(deferred.settlement(), Settlement::Rejected);
    }

    #[test]
    fn test_late_continuation_fires_immediately() {
        let deferred = Deferred::<&'static str>::new();
        deferred.fulfill("done").unwrap();

        let seen = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&seen);
        deferred.on_settle(move |outcome| {
            *slot.borrow_mut() = outcome.as_ref().ok().copied();
        });

        assert_eq!(*seen.borrow(), Some("done"));
    }

    #[test]
    fn test_reentrant_settle_is_rejected() {
        let deferred = Deferred::<i32>::new();
        let reentrant = deferred.clone();
        let result = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&result);

        deferred.on_settle(move |_| {
            *slot.borrow_mut() = Some(reentrant.fulfill(99));
        });
        deferred.fulfill(1).unwrap();

        assert_eq!(*result.borrow(), Some(Err(RuntimeError::AlreadySettled)));
        assert!(matches!(*deferred.peek().unwrap(), Ok(1)));
    }
}
