use crate::error::Fault;
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::Serialize;

/// The structured result of driving a request.
///
/// Carries everything the HTTP layer needs to write the response: status,
/// headers and a textual body.
///
/// # Example
/// ```
/// use hookline::Response;
/// use axum::http::StatusCode;
///
/// let ok = Response::text("hello");
/// assert_eq!(ok.status, StatusCode::OK);
///
/// let moved = Response::redirect("/login");
/// assert_eq!(moved.status, StatusCode::FOUND);
/// assert_eq!(moved.location(), Some("/login"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: String::new(),
        }
    }
}

impl Response {
    /// A `200 OK` plain-text response
    pub fn text(body: impl Into<String>) -> Self {
        Self::with_content_type(body.into(), "text/plain; charset=utf-8")
    }

    /// A `200 OK` HTML response
    pub fn html(body: impl Into<String>) -> Self {
        Self::with_content_type(body.into(), "text/html; charset=utf-8")
    }

    /// Serialize `data` into a `200 OK` JSON response
    ///
    /// # Errors
    ///
    /// Returns [`Fault::Internal`] if `data` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(data: &T) -> Result<Self, Fault> {
        let body = serde_json::to_string(data)?;
        Ok(Self::with_content_type(body, "application/json"))
    }

    /// A `302 Found` redirect
    pub fn redirect(location: &str) -> Self {
        Self::redirect_with(location, StatusCode::FOUND)
    }

    pub fn redirect_with(location: &str, status: StatusCode) -> Self {
        let mut response = Self {
            status,
            ..Self::default()
        };
        match HeaderValue::from_str(location) {
            Ok(value) => {
                response.headers.insert(LOCATION, value);
            }
            Err(_) => {
                tracing::warn!(location, "Redirect target is not a valid header value");
            }
        }
        response
    }

    fn with_content_type(body: String, content_type: &'static str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self {
            status: StatusCode::OK,
            headers,
            body,
        }
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get(LOCATION).and_then(|value| value.to_str().ok())
    }
}

impl From<String> for Response {
    fn from(body: String) -> Self {
        Self::text(body)
    }
}

impl From<&str> for Response {
    fn from(body: &str) -> Self {
        Self::text(body)
    }
}

impl axum::response::IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.headers, self.body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct User {
        id: u32,
        name: &'static str,
    }

    #[test]
    fn test_json_sets_content_type() {
        let response = Response::json(&User { id: 1, name: "ada" }).unwrap();
        assert_eq!(response.content_type(), Some("application/json"));
        assert_eq!(response.body, r#"{"id":1,"name":"ada"}"#);
    }

    #[test]
    fn test_redirect_with_custom_status() {
        let response = Response::redirect_with("/home", StatusCode::SEE_OTHER);
        assert_eq!(response.status, StatusCode::SEE_OTHER);
        assert_eq!(response.location(), Some("/home"));
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_into_axum_response_keeps_status_and_headers() {
        use axum::response::IntoResponse;

        let response = Response::text("created")
            .status(StatusCode::CREATED)
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );
    }
}
