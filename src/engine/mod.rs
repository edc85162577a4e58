//! Request-driving entry point.
//!
//! The [`Engine`] owns the event loop and the process-wide services. For
//! each request it builds a [`RequestContext`], wraps a
//! [`LifecycleDriver`] (or a plain [`Callable`]) in an
//! [`ExecutionUnit`], and starts it immediately: a request that never
//! suspends is already complete when `dispatch` returns.
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = Engine::builder()
//!     .config(EngineConfig::from_env()?)
//!     .registry(registry)
//!     .build();
//!
//! let unit = engine.dispatch_named("posts.show", Request::get("/posts/7"), params([("id", "7")]))?;
//! engine.run();
//! let response = unit.take_result()?;
//! ```

mod context;

pub use context::AppContext;

use crate::common::Response;
use crate::component::{Callable, RequestContext, Target};
use crate::config::{ConfigError, EngineConfig};
use crate::error::{Fault, RuntimeError};
use crate::http::{Request, RouteParams};
use crate::lifecycle::{ErrorLogger, LifecycleDriver, Probe, TracingLogger};
use crate::registry::HandlerRegistry;
use crate::runtime::{EventLoop, ExecutionUnit, LoopStats, Offload};
use crate::view::ViewRenderer;

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

/// Drives requests through their lifecycle on one event loop.
pub struct Engine {
    app: Rc<AppContext>,
    logger: Arc<dyn ErrorLogger>,
    registry: Arc<HandlerRegistry>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.app.event_loop
    }

    pub fn app(&self) -> &Rc<AppContext> {
        &self.app
    }

    pub fn config(&self) -> &EngineConfig {
        &self.app.config
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Start driving `request` through `target`.
    ///
    /// The unit is started before this returns. If it suspends, it is raced
    /// against the configured request timeout.
    pub fn dispatch(
        &self,
        request: Request,
        target: impl Into<Target>,
        params: RouteParams,
    ) -> ExecutionUnit<Response> {
        self.dispatch_probed(request, target, params).0
    }

    /// [`dispatch`](Self::dispatch), also returning a [`Probe`] on the
    /// lifecycle. The probe stays empty for a plain callable.
    pub fn dispatch_probed(
        &self,
        request: Request,
        target: impl Into<Target>,
        params: RouteParams,
    ) -> (ExecutionUnit<Response>, Probe) {
        let timeout = self.app.config.request_timeout;
        self.launch(request, target.into(), params, timeout)
    }

    /// Build the handler registered under `name` and dispatch to it.
    ///
    /// The handler's own timeout takes precedence over the engine-wide one.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::UnknownHandler`] if `name` is not registered.
    pub fn dispatch_named(
        &self,
        name: &str,
        request: Request,
        params: RouteParams,
    ) -> Result<ExecutionUnit<Response>, RuntimeError> {
        let (handler, meta) = self.registry.create(name)?;
        let timeout = meta.timeout.or(self.app.config.request_timeout);
        let (unit, _) = self.launch(request, Target::Component(handler), params, timeout);
        Ok(unit)
    }

    /// Dispatch and drive the loop until this request has an outcome.
    ///
    /// Other in-flight requests progress meanwhile but are not waited for.
    pub fn handle(
        &self,
        request: Request,
        target: impl Into<Target>,
        params: RouteParams,
    ) -> Result<Response, Fault> {
        let unit = self.dispatch(request, target, params);
        if !unit.is_completed() {
            self.event_loop().run_until_complete(&unit);
        }
        unit.take_result()
            .unwrap_or_else(|err| Err(Fault::internal(format!("request did not finish: {}", err))))
    }

    /// Drive the event loop until no request has work left
    pub fn run(&self) -> LoopStats {
        self.event_loop().run()
    }

    /// Cancel every in-flight request; their cleanup hooks still run
    pub fn shutdown(&self) -> usize {
        tracing::info!(live = self.event_loop().live_units(), "Shutting down engine...");
        self.event_loop().shutdown()
    }

    fn launch(
        &self,
        request: Request,
        target: Target,
        params: RouteParams,
        timeout: Option<Duration>,
    ) -> (ExecutionUnit<Response>, Probe) {
        let name = target.name();
        let (unit, probe) = match target {
            Target::Component(handler) => {
                let cx = RequestContext::new(Rc::clone(&self.app), request, params);
                let driver = LifecycleDriver::new(handler, cx, Arc::clone(&self.logger))
                    .log_phases(self.app.config.log_phases);
                let probe = driver.probe();
                (self.event_loop().spawn(driver.run()), probe)
            }
            Target::Callable(callable) => (self.spawn_callable(callable, request, params), Probe::new()),
        };

        if let Err(err) = unit.start() {
            tracing::error!(unit = %unit.id(), handler = name, error = %err, "Failed to start request");
        }

        match timeout {
            Some(after) if unit.is_suspended() => {
                tracing::debug!(unit = %unit.id(), handler = name, ?after, "Request suspended, timeout armed");
                self.event_loop().arm_timeout(unit.id(), after);
            }
            _ => {}
        }
        (unit, probe)
    }

    fn spawn_callable(
        &self,
        callable: Callable,
        request: Request,
        params: RouteParams,
    ) -> ExecutionUnit<Response> {
        self.event_loop()
            .spawn(async move { callable.invoke(request, params).await })
    }
}

/// Builder for an [`Engine`]
#[derive(Default)]
pub struct EngineBuilder {
    config: Option<EngineConfig>,
    logger: Option<Arc<dyn ErrorLogger>>,
    views: Option<Arc<dyn ViewRenderer>>,
    registry: Option<Arc<HandlerRegistry>>,
    offload: Option<Offload>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from `HOOKLINE_*` environment settings
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new().config(EngineConfig::from_env()?))
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.get_or_insert_with(EngineConfig::default).request_timeout = Some(timeout);
        self
    }

    /// Sink for error-hook and cleanup-hook failures (default: [`TracingLogger`])
    pub fn logger(mut self, logger: impl ErrorLogger + 'static) -> Self {
        self.logger = Some(Arc::new(logger));
        self
    }

    pub fn shared_logger(mut self, logger: Arc<dyn ErrorLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn views(mut self, views: impl ViewRenderer + 'static) -> Self {
        self.views = Some(Arc::new(views));
        self
    }

    pub fn registry(mut self, registry: Arc<HandlerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn offload(mut self, offload: Offload) -> Self {
        self.offload = Some(offload);
        self
    }

    pub fn build(self) -> Engine {
        let config = self.config.unwrap_or_default();
        let event_loop = EventLoop::new().with_max_poll_wait(config.max_poll_wait);
        tracing::info!(
            request_timeout = ?config.request_timeout,
            max_poll_wait = ?config.max_poll_wait,
            "Engine initialized"
        );

        Engine {
            app: Rc::new(AppContext {
                event_loop,
                views: self.views,
                offload: self.offload,
                config,
            }),
            logger: self.logger.unwrap_or_else(|| Arc::new(TracingLogger)),
            registry: self.registry.unwrap_or_default(),
        }
    }
}
