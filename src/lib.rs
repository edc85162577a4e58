//! # Hookline
//!
//! A per-request lifecycle engine with cooperative async suspension.
//!
//! Each request is driven through a fixed sequence of named hooks on a
//! [`Handler`]. Any hook may await a [`Deferred`] result, such as a database
//! query issued on another thread. The request's [`ExecutionUnit`] pauses
//! there and the [`EventLoop`] resumes it when the result settles. Cleanup
//! always runs exactly once, and a failure in cleanup never hides the
//! failure that caused it.
//!
//! ## Features
//!
//! - **Deferred results**: single-assignment outcomes with FIFO continuations
//! - **Single-threaded event loop**: timers, cross-thread completions, cancellation and timeouts
//! - **Execution units**: start, resume, throw into, cancel
//! - **Lifecycle driver**: ordered phases, error hook, guaranteed `after_response`
//! - **Handler registry**: immutable per-handler metadata and factories
//!
//! ## Quick Start
//!
//! ```rust
//! use hookline::prelude::*;
//!
//! struct Answer {
//!     pending: Deferred<u32>,
//!     value: u32,
//! }
//!
//! #[async_trait(?Send)]
//! impl Handler for Answer {
//!     async fn fetch(&mut self, _cx: &mut RequestContext) -> HookResult {
//!         self.value = self.pending.clone().await?;
//!         Ok(())
//!     }
//!
//!     async fn render(&mut self, _cx: &mut RequestContext) -> Result<Response, Fault> {
//!         Ok(Response::text(self.value.to_string()))
//!     }
//! }
//!
//! let engine = Engine::default();
//! let (pending, completer) = engine.event_loop().register::<u32>();
//!
//! let unit = engine.dispatch(
//!     Request::get("/answer"),
//!     Target::component(Answer { pending, value: 0 }),
//!     RouteParams::new(),
//! );
//! assert!(unit.is_suspended());
//!
//! std::thread::spawn(move || completer.fulfill(42));
//! engine.run();
//!
//! assert_eq!(unit.output().unwrap().body, "42");
//! ```

pub mod common;
pub mod component;
pub mod config;
pub mod deferred;
pub mod engine;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod registry;
pub mod runtime;
pub mod view;

// Re-export core types
pub use common::Response;
pub use component::{Callable, DataStore, Handler, HookResult, Reply, RequestContext, Target};
pub use config::{ConfigError, ConfigService, EngineConfig};
pub use deferred::{Deferred, Outcome, Settlement};
pub use engine::{AppContext, Engine, EngineBuilder};
pub use error::{Fault, Result, RuntimeError};
pub use http::{Request, RouteParams};
pub use lifecycle::{ErrorLogger, LifecycleDriver, Phase, Probe, TracingLogger};
pub use registry::{HandlerMeta, HandlerRegistry};
pub use runtime::{
    Completer, EventLoop, ExecutionUnit, LoopStats, Offload, OpId, UnitId, UnitStatus,
};
pub use view::ViewRenderer;

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;
pub use axum;

/// Prelude module for convenient imports
///
/// ```
/// use hookline::prelude::*;
/// ```
pub mod prelude {
    pub use crate::common::Response;
    pub use crate::component::{Callable, Handler, HookResult, Reply, RequestContext, Target};
    pub use crate::deferred::Deferred;
    pub use crate::engine::Engine;
    pub use crate::error::{Fault, RuntimeError};
    pub use crate::http::{Request, RouteParams, params};
    pub use crate::lifecycle::Phase;
    pub use crate::registry::{HandlerMeta, HandlerRegistry};
    pub use crate::runtime::{EventLoop, ExecutionUnit};
    pub use async_trait::async_trait;
    pub use axum::http::StatusCode;
}
