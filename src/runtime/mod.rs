//! Event Loop and Execution Units
//!
//! A single-threaded cooperative runtime. Every request runs inside an
//! [`ExecutionUnit`]; a unit suspends only where it awaits a
//! [`Deferred`](crate::Deferred), and the [`EventLoop`] resumes it once the
//! deferred settles.
//!
//! ```text
//! issuer thread ──Completer──▶ channel ──▶ EventLoop::turn
//!                                             │ settle Deferred
//!                                             ▼
//!                                     continuation wakes unit
//!                                             │ Wake(id)
//!                                             ▼
//!                                    ExecutionUnit polled again
//! ```
//!
//! Nothing here is `Send`: the loop, its units, and their deferreds live on
//! one thread. Only [`Completer`] crosses threads, carrying an outcome back
//! through the loop's channel.

mod completer;
pub(crate) mod context;
mod event_loop;
mod offload;
mod timer;
mod unit;

pub use completer::Completer;
pub use event_loop::{EventLoop, LoopStats};
pub use offload::Offload;
pub use unit::{ExecutionUnit, UnitStatus};

use std::fmt;

/// Identifier of a pending operation in the loop's work registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub(crate) u64);

/// Identifier of an execution unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(pub(crate) u64);

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit-{}", self.0)
    }
}
