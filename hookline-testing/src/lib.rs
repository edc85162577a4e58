//! Fixtures for exercising hookline lifecycles in tests.
//!
//! - [`ScriptedHandler`] records every hook it runs into a shared
//!   [`Journal`] and can fail at any step on request.
//! - [`RecordingLogger`] captures what the driver reports instead of raising.

use async_trait::async_trait;
use hookline::{Deferred, ErrorLogger, Fault, Handler, HookResult, RequestContext, Response};
use serde_json::Value;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

/// Hook names in the order a successful run visits them
pub const STEPS: [&str; 10] = [
    "booting",
    "booted",
    "before_request",
    "after_request",
    "before_fetch",
    "fetch",
    "after_fetch",
    "render",
    "before_response",
    "after_response",
];

/// Steps where a failure reaches the error hook
pub const FAILABLE_STEPS: [&str; 9] = [
    "booting",
    "booted",
    "before_request",
    "after_request",
    "before_fetch",
    "fetch",
    "after_fetch",
    "render",
    "before_response",
];

/// Shared record of the hooks a handler ran
pub type Journal = Rc<RefCell<Vec<&'static str>>>;

/// A handler whose behaviour is configured per test.
///
/// ```rust,ignore
/// let handler = ScriptedHandler::new().fail_at("fetch");
/// let journal = handler.journal();
/// ```
pub struct ScriptedHandler {
    journal: Journal,
    fail_at: Option<&'static str>,
    fault: Option<Fault>,
    fail_error_hook: bool,
    fail_cleanup: bool,
    awaiting: Option<Deferred<i64>>,
    observed: Rc<RefCell<Vec<Fault>>>,
}

impl Default for ScriptedHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedHandler {
    pub fn new() -> Self {
        Self {
            journal: Rc::new(RefCell::new(Vec::new())),
            fail_at: None,
            fault: None,
            fail_error_hook: false,
            fail_cleanup: false,
            awaiting: None,
            observed: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Fail when `step` runs (a hook name or `"render"`)
    pub fn fail_at(mut self, step: &'static str) -> Self {
        self.fail_at = Some(step);
        self
    }

    /// The fault used by `fail_at`; defaults to an operation failure naming the step
    pub fn fail_with(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }

    pub fn fail_error_hook(mut self) -> Self {
        self.fail_error_hook = true;
        self
    }

    pub fn fail_cleanup(mut self) -> Self {
        self.fail_cleanup = true;
        self
    }

    /// Await `deferred` in `fetch` and render its value
    pub fn awaiting(mut self, deferred: Deferred<i64>) -> Self {
        self.awaiting = Some(deferred);
        self
    }

    pub fn journal(&self) -> Journal {
        Rc::clone(&self.journal)
    }

    /// Faults handed to the error hook
    pub fn observed(&self) -> Rc<RefCell<Vec<Fault>>> {
        Rc::clone(&self.observed)
    }

    fn step(&self, name: &'static str) -> HookResult {
        self.journal.borrow_mut().push(name);
        if self.fail_at == Some(name) {
            return Err(self
                .fault
                .clone()
                .unwrap_or_else(|| Fault::operation(format!("injected failure at {}", name))));
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl Handler for ScriptedHandler {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn booting(&mut self, _cx: &mut RequestContext) -> HookResult {
        self.step("booting")
    }

    async fn booted(&mut self, _cx: &mut RequestContext) -> HookResult {
        self.step("booted")
    }

    async fn before_request(&mut self, _cx: &mut RequestContext) -> HookResult {
        self.step("before_request")
    }

    async fn after_request(&mut self, _cx: &mut RequestContext) -> HookResult {
        self.step("after_request")
    }

    async fn before_fetch(&mut self, _cx: &mut RequestContext) -> HookResult {
        self.step("before_fetch")
    }

    async fn fetch(&mut self, cx: &mut RequestContext) -> HookResult {
        self.step("fetch")?;
        if let Some(deferred) = self.awaiting.clone() {
            let value = deferred.await?;
            self.journal.borrow_mut().push("fetch:resumed");
            cx.set("value", value);
        }
        Ok(())
    }

    async fn after_fetch(&mut self, _cx: &mut RequestContext) -> HookResult {
        self.step("after_fetch")
    }

    async fn render(&mut self, cx: &mut RequestContext) -> Result<Response, Fault> {
        self.step("render")?;
        let body = match cx.get("value") {
            Some(value) => value.to_string(),
            None => "ok".to_string(),
        };
        Ok(Response::text(body))
    }

    async fn before_response(&mut self, _cx: &mut RequestContext) -> HookResult {
        self.step("before_response")
    }

    async fn error(&mut self, _cx: &mut RequestContext, fault: &Fault) -> HookResult {
        self.journal.borrow_mut().push("error");
        self.observed.borrow_mut().push(fault.clone());
        if self.fail_error_hook {
            return Err(Fault::internal("error hook failed"));
        }
        Ok(())
    }

    async fn after_response(&mut self, _cx: &mut RequestContext) -> HookResult {
        self.journal.borrow_mut().push("after_response");
        if self.fail_cleanup {
            return Err(Fault::internal("cleanup failed"));
        }
        Ok(())
    }
}

/// An [`ErrorLogger`] that keeps every report
#[derive(Debug, Clone, Default)]
pub struct RecordingLogger {
    entries: Arc<Mutex<Vec<(String, Value)>>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(String, Value)> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries().into_iter().map(|(message, _)| message).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl ErrorLogger for RecordingLogger {
    fn error(&self, message: &str, context: &Value) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((message.to_string(), context.clone()));
        }
    }
}

/// Route `tracing` output to the test harness; safe to call more than once
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}
