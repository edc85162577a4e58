use serde_json::Value;

/// External sink for failures that must be reported but never raised
pub trait ErrorLogger: Send + Sync {
    fn error(&self, message: &str, context: &Value);
}

/// Forwards to `tracing::error!`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl ErrorLogger for TracingLogger {
    fn error(&self, message: &str, context: &Value) {
        tracing::error!(context = %context, "{}", message);
    }
}
