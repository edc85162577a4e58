//! Handler Contract
//!
//! A [`Handler`] is the application-supplied object a request is driven
//! through. Every hook has a no-op default; only [`Handler::render`] must be
//! written.
//!
//! ```text
//! booting → booted → before_request → after_request
//!         → before_fetch → fetch → after_fetch
//!         → render → before_response
//!         → error (only on failure)
//!         → after_response (always, exactly once)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use hookline::prelude::*;
//!
//! #[derive(Default)]
//! struct ShowPost {
//!     post: Option<Post>,
//! }
//!
//! #[async_trait(?Send)]
//! impl Handler for ShowPost {
//!     async fn fetch(&mut self, cx: &mut RequestContext) -> HookResult {
//!         let id = cx.param_as::<u64>("id")?;
//!         self.post = Some(posts::find(cx, id).await?);
//!         Ok(())
//!     }
//!
//!     async fn render(&mut self, cx: &mut RequestContext) -> Result<Response, Fault> {
//!         cx.json(&self.post)
//!     }
//! }
//! ```

mod callable;
mod context;
mod data;

pub use callable::{Callable, Reply, Target};
pub use context::RequestContext;
pub use data::DataStore;

use crate::common::Response;
use crate::error::Fault;
use async_trait::async_trait;

/// Result of a lifecycle hook
pub type HookResult = Result<(), Fault>;

/// Lifecycle hooks and render for one request.
///
/// Hooks run on the event loop thread and may await any
/// [`Deferred`](crate::Deferred); `fetch` is where that usually happens.
#[async_trait(?Send)]
pub trait Handler {
    /// Name used in logs and the handler registry
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    async fn booting(&mut self, _cx: &mut RequestContext) -> HookResult {
        Ok(())
    }

    async fn booted(&mut self, _cx: &mut RequestContext) -> HookResult {
        Ok(())
    }

    async fn before_request(&mut self, _cx: &mut RequestContext) -> HookResult {
        Ok(())
    }

    async fn after_request(&mut self, _cx: &mut RequestContext) -> HookResult {
        Ok(())
    }

    async fn before_fetch(&mut self, _cx: &mut RequestContext) -> HookResult {
        Ok(())
    }

    /// Load what the request needs. The usual place to await deferred results.
    async fn fetch(&mut self, _cx: &mut RequestContext) -> HookResult {
        Ok(())
    }

    async fn after_fetch(&mut self, _cx: &mut RequestContext) -> HookResult {
        Ok(())
    }

    async fn render(&mut self, cx: &mut RequestContext) -> Result<Response, Fault>;

    async fn before_response(&mut self, _cx: &mut RequestContext) -> HookResult {
        Ok(())
    }

    /// Observe a failure from an earlier hook or `render`.
    ///
    /// The failure is already recorded in [`RequestContext::errors`] and is
    /// re-raised to the caller after cleanup; a failure returned from here
    /// is logged only.
    async fn error(&mut self, _cx: &mut RequestContext, _fault: &Fault) -> HookResult {
        Ok(())
    }

    /// Cleanup. Runs exactly once whatever happened before it.
    async fn after_response(&mut self, _cx: &mut RequestContext) -> HookResult {
        Ok(())
    }
}
