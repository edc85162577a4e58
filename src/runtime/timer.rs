use super::{OpId, UnitId};

use std::cmp::Ordering;
use std::time::{Duration, Instant};

/// What happens when a timer fires
#[derive(Debug, Clone, Copy)]
pub(crate) enum TimerAction {
    /// Fulfill the sleep operation registered under this id
    Settle(OpId),
    /// Throw a timeout into the unit if it is still suspended
    Timeout { unit: UnitId, after: Duration },
}

/// An entry in the loop's timer queue.
///
/// Stored in a `BinaryHeap`, which pops the earliest deadline first because
/// the ordering is reversed.
pub(crate) struct TimerEntry {
    pub(crate) deadline: Instant,
    /// Insertion sequence, keeps equal deadlines in FIFO order
    pub(crate) seq: u64,
    pub(crate) action: TimerAction,
}

impl Eq for TimerEntry {}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
