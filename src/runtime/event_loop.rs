use super::completer::Completer;
use super::timer::{TimerAction, TimerEntry};
use super::unit::{ExecutionUnit, Schedulable};
use super::{OpId, UnitId};
use crate::deferred::{Deferred, Outcome};
use crate::error::{Fault, RuntimeError};

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::ops::AddAssign;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

/// Messages delivered to the loop, possibly from other threads.
pub(crate) enum Message {
    /// A unit's waker fired
    Wake(UnitId),
    /// An issuer finished an operation
    Complete {
        op: OpId,
        payload: Result<Box<dyn Any + Send>, Fault>,
    },
}

/// A registered operation waiting for its outcome.
trait PendingOp {
    fn settle(&self, payload: Result<Box<dyn Any + Send>, Fault>);
}

impl<T: 'static> PendingOp for Deferred<T> {
    fn settle(&self, payload: Result<Box<dyn Any + Send>, Fault>) {
        let result = match payload {
            Ok(value) => match value.downcast::<T>() {
                Ok(value) => self.fulfill(*value),
                // Attributed to this operation only, never to the loop.
                Err(_) => self.reject(Fault::internal(format!(
                    "completion payload is not a {}",
                    std::any::type_name::<T>()
                ))),
            },
            Err(fault) => self.reject(fault),
        };
        if let Err(err) = result {
            tracing::error!(op = ?self.op(), error = %err, "Failed to settle operation");
        }
    }
}

struct Registration {
    pending: Box<dyn PendingOp>,
    /// Stops in-flight work when the operation is cancelled
    canceller: Option<Box<dyn FnOnce()>>,
}

pub(crate) struct LoopShared {
    tx: Sender<Message>,
    rx: Receiver<Message>,
    units: RefCell<HashMap<UnitId, Rc<dyn Schedulable>>>,
    operations: RefCell<HashMap<OpId, Registration>>,
    timers: RefCell<BinaryHeap<TimerEntry>>,
    next_id: Cell<u64>,
    max_poll_wait: Cell<Duration>,
}

impl LoopShared {
    fn next_id(&self) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    /// Remove a work registration; its eventual completion is discarded.
    pub(crate) fn forget_op(&self, op: OpId) {
        let registration = self.operations.borrow_mut().remove(&op);
        if let Some(registration) = registration {
            tracing::debug!(%op, "Operation deregistered");
            if let Some(cancel) = registration.canceller {
                cancel();
            }
        }
    }
}

/// Counters describing the work done by the loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Unit polls triggered by wakes
    pub polls: usize,
    /// Operations settled from completions
    pub completions: usize,
    /// Completions for operations no longer registered
    pub discarded: usize,
    pub timers_fired: usize,
    /// Units left suspended with nothing able to wake them
    pub stalled: usize,
}

impl LoopStats {
    fn is_idle(&self) -> bool {
        self.polls == 0 && self.completions == 0 && self.discarded == 0 && self.timers_fired == 0
    }
}

impl AddAssign for LoopStats {
    fn add_assign(&mut self, other: Self) {
        self.polls += other.polls;
        self.completions += other.completions;
        self.discarded += other.discarded;
        self.timers_fired += other.timers_fired;
        self.stalled = other.stalled;
    }
}

/// Single-threaded reactor owning the work registry and the run queue.
///
/// Cloning yields another handle to the same loop.
///
/// # Example
///
/// ```rust
/// use hookline::EventLoop;
///
/// let lp = EventLoop::new();
/// let (deferred, completer) = lp.register::<u32>();
///
/// let unit = lp.spawn(async move { deferred.await });
/// unit.start().unwrap();
/// assert!(unit.is_suspended());
///
/// std::thread::spawn(move || completer.fulfill(42));
/// lp.run();
///
/// assert_eq!(unit.output().unwrap(), 42);
/// ```
#[derive(Clone)]
pub struct EventLoop {
    shared: Rc<LoopShared>,
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            shared: Rc::new(LoopShared {
                tx,
                rx,
                units: RefCell::new(HashMap::new()),
                operations: RefCell::new(HashMap::new()),
                timers: RefCell::new(BinaryHeap::new()),
                next_id: Cell::new(1),
                max_poll_wait: Cell::new(Duration::from_millis(50)),
            }),
        }
    }

    /// Bound a single blocking wait inside [`run`](Self::run)
    pub fn with_max_poll_wait(self, wait: Duration) -> Self {
        self.shared.max_poll_wait.set(wait);
        self
    }

    /// Create a not-started execution unit owned by this loop
    pub fn spawn<T, F>(&self, future: F) -> ExecutionUnit<T>
    where
        T: 'static,
        F: Future<Output = Outcome<T>> + 'static,
    {
        let id = UnitId(self.shared.next_id());
        let unit = ExecutionUnit::new(
            id,
            future,
            self.shared.tx.clone(),
            Rc::downgrade(&self.shared),
        );
        self.shared
            .units
            .borrow_mut()
            .insert(id, unit.schedulable());
        tracing::trace!(unit = %id, "Execution unit spawned");
        unit
    }

    /// Register a pending operation.
    ///
    /// The returned [`Completer`] may move to another thread; completing it
    /// settles the deferred on this loop's next turn.
    pub fn register<T: Send + 'static>(&self) -> (Deferred<T>, Completer<T>) {
        let (deferred, op) = self.register_local::<T>();
        (deferred, Completer::new(op, self.shared.tx.clone()))
    }

    fn register_local<T: 'static>(&self) -> (Deferred<T>, OpId) {
        let op = OpId(self.shared.next_id());
        let deferred = Deferred::with_op(op);
        self.shared.operations.borrow_mut().insert(
            op,
            Registration {
                pending: Box::new(deferred.clone()),
                canceller: None,
            },
        );
        tracing::trace!(%op, "Operation registered");
        (deferred, op)
    }

    /// Attach a hook that stops in-flight work if the operation is cancelled
    pub(crate) fn set_canceller(&self, op: OpId, cancel: impl FnOnce() + 'static) {
        if let Some(registration) = self.shared.operations.borrow_mut().get_mut(&op) {
            registration.canceller = Some(Box::new(cancel));
        }
    }

    /// A deferred fulfilled once `duration` has elapsed
    pub fn sleep(&self, duration: Duration) -> Deferred<()> {
        let (deferred, op) = self.register_local::<()>();
        self.push_timer(Instant::now() + duration, TimerAction::Settle(op));
        deferred
    }

    /// Race `unit` against a timer: if the unit is still suspended when it
    /// fires, [`Fault::Timeout`] is thrown in at its suspension point.
    pub fn arm_timeout(&self, unit: UnitId, after: Duration) {
        self.push_timer(Instant::now() + after, TimerAction::Timeout { unit, after });
    }

    fn push_timer(&self, deadline: Instant, action: TimerAction) {
        let seq = self.shared.next_id();
        self.shared.timers.borrow_mut().push(TimerEntry {
            deadline,
            seq,
            action,
        });
    }

    /// Cancel a unit owned by this loop
    ///
    /// # Errors
    ///
    /// `UnknownUnit` if the unit is not live, otherwise as
    /// [`ExecutionUnit::cancel`].
    pub fn cancel(&self, unit: UnitId) -> Result<(), RuntimeError> {
        let schedulable = self.shared.units.borrow().get(&unit).cloned();
        match schedulable {
            Some(schedulable) => schedulable.cancel(),
            None => Err(RuntimeError::UnknownUnit(unit.0)),
        }
    }

    /// Number of units that have not finished
    pub fn live_units(&self) -> usize {
        self.shared
            .units
            .borrow()
            .values()
            .filter(|unit| !unit.status().is_finished())
            .count()
    }

    pub fn pending_operations(&self) -> usize {
        self.shared.operations.borrow().len()
    }

    pub fn pending_timers(&self) -> usize {
        self.shared.timers.borrow().len()
    }

    /// One non-blocking iteration: fire due timers, then process every
    /// queued message in arrival order.
    pub fn turn(&self) -> LoopStats {
        let mut stats = LoopStats::default();
        self.fire_timers(Instant::now(), &mut stats);
        while let Ok(message) = self.shared.rx.try_recv() {
            self.dispatch(message, &mut stats);
        }
        self.reap();
        stats
    }

    /// Turn until an iteration does no work. Never blocks.
    pub fn run_until_stalled(&self) -> LoopStats {
        let mut total = LoopStats::default();
        loop {
            let stats = self.turn();
            if stats.is_idle() {
                break;
            }
            total += stats;
        }
        total.stalled = self.live_units();
        total
    }

    /// Drive the loop until no live units and no pending work remain.
    ///
    /// Returns early, with `stalled` set, when units are left suspended but
    /// no registered operation or timer could ever wake them.
    pub fn run(&self) -> LoopStats {
        self.drive(|| false)
    }

    /// Drive the loop only until `unit` has finished.
    ///
    /// Other units make progress meanwhile but are not waited for.
    pub fn run_until_complete<T: 'static>(&self, unit: &ExecutionUnit<T>) -> LoopStats {
        self.drive(|| unit.is_completed())
    }

    fn drive(&self, done: impl Fn() -> bool) -> LoopStats {
        let mut total = LoopStats::default();
        loop {
            total += self.turn();
            if done() {
                break;
            }

            let live = self.live_units();
            let idle = self.pending_operations() == 0 && self.pending_timers() == 0;
            if live == 0 && idle {
                break;
            }
            if idle {
                tracing::warn!(units = live, "Event loop stalled: suspended units have no pending work");
                total.stalled = live;
                return total;
            }

            let wait = self.next_wait();
            match self.shared.rx.recv_timeout(wait) {
                Ok(message) => {
                    let mut stats = LoopStats::default();
                    self.dispatch(message, &mut stats);
                    total += stats;
                }
                Err(RecvTimeoutError::Timeout) => {}
                // The loop holds a sender itself, so this cannot happen.
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        total.stalled = 0;
        total
    }

    /// Cancel every live unit and drive them through their cleanup.
    ///
    /// Returns the number of units cancelled.
    pub fn shutdown(&self) -> usize {
        let units: Vec<(UnitId, Rc<dyn Schedulable>)> = self
            .shared
            .units
            .borrow()
            .iter()
            .map(|(id, unit)| (*id, Rc::clone(unit)))
            .collect();

        let mut cancelled = 0;
        for (id, unit) in units {
            match unit.cancel() {
                Ok(()) => cancelled += 1,
                Err(RuntimeError::AlreadyFinished) => {}
                Err(err) => tracing::warn!(unit = %id, error = %err, "Unit could not be cancelled"),
            }
        }
        self.run_until_stalled();
        tracing::info!(cancelled, "Event loop shut down");
        cancelled
    }

    fn next_wait(&self) -> Duration {
        let max = self.shared.max_poll_wait.get();
        match self.shared.timers.borrow().peek() {
            Some(entry) => entry
                .deadline
                .saturating_duration_since(Instant::now())
                .min(max),
            None => max,
        }
    }

    fn fire_timers(&self, now: Instant, stats: &mut LoopStats) {
        loop {
            let due = {
                let mut timers = self.shared.timers.borrow_mut();
                match timers.peek() {
                    Some(entry) if entry.deadline <= now => timers.pop(),
                    _ => None,
                }
            };
            let Some(entry) = due else {
                break;
            };
            stats.timers_fired += 1;

            match entry.action {
                TimerAction::Settle(op) => {
                    self.complete(op, Ok(Box::new(()) as Box<dyn Any + Send>), stats);
                }
                TimerAction::Timeout { unit, after } => {
                    let schedulable = self.shared.units.borrow().get(&unit).cloned();
                    match schedulable {
                        Some(schedulable) if !schedulable.status().is_finished() => {
                            tracing::warn!(%unit, ?after, "Execution unit timed out");
                            if let Err(err) = schedulable.time_out(Fault::timeout(after)) {
                                tracing::debug!(%unit, error = %err, "Timeout could not be delivered");
                            }
                        }
                        _ => tracing::trace!(%unit, "Timeout fired for a finished unit"),
                    }
                }
            }
        }
    }

    fn dispatch(&self, message: Message, stats: &mut LoopStats) {
        match message {
            Message::Wake(id) => {
                let unit = self.shared.units.borrow().get(&id).cloned();
                if let Some(unit) = unit {
                    if unit.poll_if_notified() {
                        stats.polls += 1;
                    }
                }
            }
            Message::Complete { op, payload } => self.complete(op, payload, stats),
        }
    }

    fn complete(&self, op: OpId, payload: Result<Box<dyn Any + Send>, Fault>, stats: &mut LoopStats) {
        let registration = self.shared.operations.borrow_mut().remove(&op);
        match registration {
            Some(registration) => {
                stats.completions += 1;
                registration.pending.settle(payload);
            }
            None => {
                stats.discarded += 1;
                tracing::debug!(%op, "Discarding completion for a deregistered operation");
            }
        }
    }

    /// Drop finished units, along with timers that can no longer do anything
    fn reap(&self) {
        let mut finished = Vec::new();
        self.shared.units.borrow_mut().retain(|id, unit| {
            let done = unit.status().is_finished();
            if done {
                finished.push(*id);
            }
            !done
        });

        let operations = self.shared.operations.borrow();
        self.shared.timers.borrow_mut().retain(|entry| match entry.action {
            TimerAction::Timeout { unit, .. } => !finished.contains(&unit),
            TimerAction::Settle(op) => operations.contains_key(&op),
        });
    }
}
