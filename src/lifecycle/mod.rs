//! Lifecycle Driver
//!
//! Runs a [`Handler`](crate::Handler) through the fixed sequence of
//! [`Phase`]s and enforces the error and cleanup contract.
//!
//! ```text
//! BOOTING → BOOTED → BEFORE_REQUEST → AFTER_REQUEST
//!   → BEFORE_FETCH → FETCH → AFTER_FETCH
//!   → (render)
//!   → BEFORE_RESPONSE
//!   → ERROR            only when a hook or render failed
//!   → AFTER_RESPONSE   always, exactly once
//! ```

mod driver;
mod logger;
mod phase;
mod probe;

pub use driver::LifecycleDriver;
pub use logger::{ErrorLogger, TracingLogger};
pub use phase::Phase;
pub use probe::Probe;
