use crate::deferred::Suspension;

use std::cell::RefCell;
use std::rc::Rc;

/// Receiver of suspension records while a unit is being polled.
pub(crate) trait SuspensionSink {
    fn suspend_on(&self, suspension: Rc<dyn Suspension>);
}

thread_local! {
    /// The execution unit currently being polled on this thread.
    ///
    /// Set for the duration of one poll so that a `Wait` deep inside a hook
    /// can record itself on its unit without threading a handle through
    /// every call.
    static CURRENT_UNIT: RefCell<Option<Rc<dyn SuspensionSink>>> = const { RefCell::new(None) };
}

/// Run `f` with `unit` installed as the current unit, restoring the previous
/// one afterwards (units may be started from inside other units).
pub(crate) fn enter<R>(unit: Rc<dyn SuspensionSink>, f: impl FnOnce() -> R) -> R {
    let previous = CURRENT_UNIT.with(|cell| cell.replace(Some(unit)));
    let out = f();
    CURRENT_UNIT.with(|cell| cell.replace(previous));
    out
}

/// Record a pending wait on the current unit. No-op outside a unit.
pub(crate) fn suspend_on(suspension: Rc<dyn Suspension>) {
    let current = CURRENT_UNIT.with(|cell| cell.borrow().clone());
    if let Some(unit) = current {
        unit.suspend_on(suspension);
    }
}
