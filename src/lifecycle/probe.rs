use super::Phase;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Default)]
struct ProbeState {
    phase: Option<Phase>,
    visited: Vec<Phase>,
    errors: Vec<String>,
    rendered: bool,
    finished: bool,
}

/// Read-only view of a running lifecycle.
///
/// Cloned out of the driver before the unit starts, so tooling can watch a
/// request while it is suspended.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    state: Rc<RefCell<ProbeState>>,
}

impl Probe {
    pub fn new() -> Self {
        Self::default()
    }

    /// The phase currently active, `None` before the first hook
    pub fn phase(&self) -> Option<Phase> {
        self.state.borrow().phase
    }

    /// Every phase entered so far, in order
    pub fn visited(&self) -> Vec<Phase> {
        self.state.borrow().visited.clone()
    }

    /// Messages of the failures recorded by the driver
    pub fn errors(&self) -> Vec<String> {
        self.state.borrow().errors.clone()
    }

    pub fn rendered(&self) -> bool {
        self.state.borrow().rendered
    }

    /// Whether `after_response` has returned
    pub fn is_finished(&self) -> bool {
        self.state.borrow().finished
    }

    pub(crate) fn enter(&self, phase: Phase) {
        let mut state = self.state.borrow_mut();
        state.phase = Some(phase);
        state.visited.push(phase);
    }

    pub(crate) fn record_error(&self, message: String) {
        self.state.borrow_mut().errors.push(message);
    }

    pub(crate) fn mark_rendered(&self) {
        self.state.borrow_mut().rendered = true;
    }

    pub(crate) fn finish(&self) {
        self.state.borrow_mut().finished = true;
    }
}
