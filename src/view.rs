//! View rendering collaborator.
//!
//! Templating lives outside the engine. Handlers reach a renderer through
//! [`RequestContext::view`](crate::RequestContext::view); the driver never
//! renders views itself.

use crate::error::Fault;
use serde_json::Value;

/// Renders a named template with a data mapping
pub trait ViewRenderer: Send + Sync {
    fn render(&self, template: &str, data: &Value) -> Result<String, Fault>;
}

impl<F> ViewRenderer for F
where
    F: Fn(&str, &Value) -> Result<String, Fault> + Send + Sync,
{
    fn render(&self, template: &str, data: &Value) -> Result<String, Fault> {
        self(template, data)
    }
}
