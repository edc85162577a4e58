use axum::http::StatusCode;
use std::sync::Arc;
use thiserror::Error;

use crate::runtime::UnitStatus;

pub type Result<T> = std::result::Result<T, Fault>;

/// A failure travelling through a request's lifecycle.
///
/// Faults are cloneable so that a rejected [`Deferred`](crate::Deferred)
/// can hand the same failure to every continuation registered on it.
#[derive(Debug, Clone, Error)]
pub enum Fault {
    #[error("Operation timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Operation abandoned before it settled")]
    Abandoned,

    #[error("Aborted with status {status}: {message}")]
    Abort { status: StatusCode, message: String },

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("I/O failure ({kind}): {message}")]
    Io { kind: String, message: String },

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(Arc<anyhow::Error>),
}

impl Fault {
    /// Create an abort failure carrying an HTTP status
    pub fn abort(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Abort {
            status,
            message: message.into(),
        }
    }

    /// Create an async operation failure
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation(message.into())
    }

    /// Create an internal failure
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn timeout(after: std::time::Duration) -> Self {
        Self::Timeout {
            after_ms: after.as_millis() as u64,
        }
    }

    /// The HTTP status the response layer should use for this failure
    pub fn status(&self) -> StatusCode {
        match self {
            Fault::Abort { status, .. } => *status,
            Fault::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Fault::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Fault::Cancelled)
    }
}

impl From<anyhow::Error> for Fault {
    fn from(err: anyhow::Error) -> Self {
        Fault::Other(Arc::new(err))
    }
}

impl From<std::io::Error> for Fault {
    fn from(err: std::io::Error) -> Self {
        Fault::Io {
            kind: format!("{:?}", err.kind()),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Fault {
    fn from(err: serde_json::Error) -> Self {
        Fault::Internal(format!("JSON error: {}", err))
    }
}

impl axum::response::IntoResponse for Fault {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let message = match &self {
            Fault::Abort { message, .. } => message.clone(),
            other => other.to_string(),
        };

        (
            status,
            axum::Json(serde_json::json!({
                "statusCode": status.as_u16(),
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            })),
        )
            .into_response()
    }
}

/// Misuse of the runtime primitives.
///
/// These indicate a broken invariant in the caller, never a request failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    #[error("Deferred result already settled")]
    AlreadySettled,

    #[error("Execution unit already started")]
    AlreadyStarted,

    #[error("Execution unit is not suspended (status: {status})")]
    NotSuspended { status: UnitStatus },

    #[error("Execution unit is suspended but not awaiting a deferred result")]
    NotAwaiting,

    #[error("Execution unit has not completed")]
    NotCompleted,

    #[error("Execution unit failed and has no output")]
    NoOutput,

    #[error("Execution unit completed and has no error")]
    NoError,

    #[error("Execution unit already finished")]
    AlreadyFinished,

    #[error("Resume value does not match the awaited type: expected {expected}")]
    TypeMismatch { expected: &'static str },

    #[error("Unknown execution unit: {0}")]
    UnknownUnit(u64),

    #[error("Handler not registered: {name}")]
    UnknownHandler { name: String },
}

/// Invalid configuration values
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn test_abort_carries_status() {
        let fault = Fault::abort(StatusCode::NOT_FOUND, "missing");
        assert_eq!(fault.status(), StatusCode::NOT_FOUND);
        assert_eq!(fault.to_string(), "Aborted with status 404 Not Found: missing");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Fault::timeout(std::time::Duration::from_millis(5)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(Fault::Cancelled.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            Fault::operation("db down").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_anyhow_conversion() {
        let fault: Fault = anyhow::anyhow!("boom").into();
        assert_eq!(fault.to_string(), "boom");
    }

    #[test]
    fn test_into_response_uses_fault_status() {
        let response = Fault::abort(StatusCode::FORBIDDEN, "nope").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
