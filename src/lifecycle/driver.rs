use super::{ErrorLogger, Phase, Probe};
use crate::common::Response;
use crate::component::{Handler, HookResult, RequestContext};
use crate::error::Fault;

use serde_json::json;
use std::sync::Arc;

/// Drives one handler through its lifecycle.
///
/// One driver per request. [`run`](Self::run) is the body of the request's
/// execution unit: any hook may await a deferred result, which suspends the
/// unit at that hook until the event loop resumes it.
///
/// Failure contract:
/// - the first failure from a hook or `render` enters [`Phase::Error`],
///   is recorded on the context and handed to the handler's `error` hook;
/// - `after_response` always runs, exactly once;
/// - failures of the `error` and `after_response` hooks go to the
///   [`ErrorLogger`] and never replace the outcome;
/// - the caller receives the rendered response or the original failure.
pub struct LifecycleDriver {
    handler: Box<dyn Handler>,
    cx: RequestContext,
    logger: Arc<dyn ErrorLogger>,
    probe: Probe,
    log_phases: bool,
    /// Last step started: a phase name or `"render"`
    stage: &'static str,
}

impl LifecycleDriver {
    pub fn new(handler: Box<dyn Handler>, cx: RequestContext, logger: Arc<dyn ErrorLogger>) -> Self {
        Self {
            handler,
            cx,
            logger,
            probe: Probe::new(),
            log_phases: true,
            stage: "start",
        }
    }

    /// Log every phase transition at debug level
    pub fn log_phases(mut self, enabled: bool) -> Self {
        self.log_phases = enabled;
        self
    }

    pub fn probe(&self) -> Probe {
        self.probe.clone()
    }

    pub async fn run(mut self) -> Result<Response, Fault> {
        let handler = self.handler.name();
        let request_id = self.cx.request_id();
        tracing::debug!(
            %request_id,
            handler,
            method = %self.cx.request().method,
            path = %self.cx.request().path,
            "Lifecycle started"
        );

        let outcome = match self.drive().await {
            Ok(response) => Ok(response),
            Err(fault) => {
                self.fail(&fault).await;
                Err(fault)
            }
        };

        self.enter(Phase::AfterResponse);
        if let Err(cleanup) = self.call_hook(Phase::AfterResponse).await {
            self.report("after_response hook failed", Phase::AfterResponse, &cleanup, None);
        }
        self.probe.finish();

        match &outcome {
            Ok(response) => {
                tracing::info!(%request_id, handler, status = %response.status, "Request completed");
            }
            Err(fault) => {
                tracing::warn!(
                    %request_id,
                    handler,
                    status = %fault.status(),
                    error = %fault,
                    "Request failed"
                );
            }
        }
        outcome
    }

    async fn drive(&mut self) -> Result<Response, Fault> {
        for phase in Phase::BEFORE_RENDER {
            self.enter(phase);
            self.call_hook(phase).await?;
        }

        self.stage = "render";
        let response = self.handler.render(&mut self.cx).await?;
        self.probe.mark_rendered();

        self.enter(Phase::BeforeResponse);
        self.call_hook(Phase::BeforeResponse).await?;

        Ok(self.cx.finalize(response))
    }

    async fn call_hook(&mut self, phase: Phase) -> HookResult {
        let (handler, cx) = (&mut self.handler, &mut self.cx);
        match phase {
            Phase::Booting => handler.booting(cx).await,
            Phase::Booted => handler.booted(cx).await,
            Phase::BeforeRequest => handler.before_request(cx).await,
            Phase::AfterRequest => handler.after_request(cx).await,
            Phase::BeforeFetch => handler.before_fetch(cx).await,
            Phase::Fetch => handler.fetch(cx).await,
            Phase::AfterFetch => handler.after_fetch(cx).await,
            Phase::BeforeResponse => handler.before_response(cx).await,
            Phase::AfterResponse => handler.after_response(cx).await,
            // Needs the fault; dispatched by `fail`.
            Phase::Error => Ok(()),
        }
    }

    async fn fail(&mut self, fault: &Fault) {
        tracing::debug!(
            request_id = %self.cx.request_id(),
            handler = self.handler.name(),
            failed_in = self.stage,
            error = %fault,
            "Lifecycle failed"
        );

        self.enter(Phase::Error);
        self.cx.record_error(fault.clone());
        self.probe.record_error(fault.to_string());

        if let Err(hook_fault) = self.handler.error(&mut self.cx, fault).await {
            self.report("error hook failed", Phase::Error, &hook_fault, Some(fault));
        }
    }

    fn enter(&mut self, phase: Phase) {
        self.stage = phase.as_str();
        self.probe.enter(phase);
        if self.log_phases {
            tracing::debug!(
                request_id = %self.cx.request_id(),
                handler = self.handler.name(),
                %phase,
                "Entering phase"
            );
        }
    }

    fn report(&self, message: &str, phase: Phase, fault: &Fault, original: Option<&Fault>) {
        let mut context = json!({
            "request_id": self.cx.request_id().to_string(),
            "handler": self.handler.name(),
            "phase": phase.as_str(),
            "error": fault.to_string(),
        });
        if let Some(original) = original {
            context["original_error"] = json!(original.to_string());
        }
        self.logger.error(message, &context);
    }
}
