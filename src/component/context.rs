use super::DataStore;
use crate::common::Response;
use crate::engine::AppContext;
use crate::error::Fault;
use crate::http::{Request, RouteParams};
use crate::runtime::{EventLoop, Offload};

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::rc::Rc;
use uuid::Uuid;

/// Everything a handler's hooks can see and mutate for one request.
///
/// Route parameters are fixed before the first hook runs. The data store,
/// the response status override and extra headers are shared by all hooks;
/// the driver applies the overrides onto whatever `render` produced.
pub struct RequestContext {
    request_id: Uuid,
    request: Request,
    params: RouteParams,
    pub data: DataStore,
    errors: Vec<Fault>,
    status: Option<StatusCode>,
    headers: HeaderMap,
    app: Rc<AppContext>,
}

impl RequestContext {
    pub fn new(app: Rc<AppContext>, request: Request, params: RouteParams) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            request,
            params,
            data: DataStore::new(),
            errors: Vec::new(),
            status: None,
            headers: HeaderMap::new(),
            app,
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn params(&self) -> &RouteParams {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Parse a route parameter, aborting with `400` if it is missing or malformed
    pub fn param_as<T: std::str::FromStr>(&self, name: &str) -> Result<T, Fault> {
        self.param(name)
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(|| {
                Fault::abort(
                    StatusCode::BAD_REQUEST,
                    format!("Invalid route parameter '{}'", name),
                )
            })
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.set(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.has(key)
    }

    pub fn merge(&mut self, values: Value) {
        self.data.merge(values);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Failures observed by the error hook, oldest first
    pub fn errors(&self) -> &[Fault] {
        &self.errors
    }

    pub(crate) fn record_error(&mut self, fault: Fault) {
        self.errors.push(fault);
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.app.event_loop
    }

    /// The tokio-backed issuer, if the engine was given one
    pub fn offload(&self) -> Option<&Offload> {
        self.app.offload.as_ref()
    }

    pub fn app(&self) -> &AppContext {
        &self.app
    }

    /// Override the status of the final response
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// Add a header to the final response
    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Serialize `data` as a JSON response
    pub fn json<T: Serialize + ?Sized>(&self, data: &T) -> Result<Response, Fault> {
        Response::json(data)
    }

    pub fn redirect(&self, location: &str) -> Response {
        Response::redirect(location)
    }

    /// A fatal request failure carrying `status`.
    ///
    /// Return it from a hook (`return Err(cx.abort(..))`) to stop the
    /// lifecycle; it reaches the caller after the error and cleanup hooks.
    pub fn abort(&self, status: StatusCode, message: impl Into<String>) -> Fault {
        Fault::abort(status, message)
    }

    /// Render `template` with the data store through the configured renderer
    pub fn view(&self, template: &str) -> Result<Response, Fault> {
        let renderer = self
            .app
            .views
            .as_ref()
            .ok_or_else(|| Fault::Render("no view renderer configured".to_string()))?;
        let body = renderer.render(template, &self.data.to_value())?;
        Ok(Response::html(body))
    }

    /// Apply the status override and extra headers onto `response`
    pub(crate) fn finalize(&mut self, mut response: Response) -> Response {
        if let Some(status) = self.status {
            response.status = status;
        }
        for (name, value) in self.headers.drain() {
            if let Some(name) = name {
                response.headers.insert(name, value);
            }
        }
        response
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("method", &self.request.method)
            .field("path", &self.request.path)
            .field("params", &self.params)
            .field("errors", &self.errors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::params;
    use std::sync::Arc;

    fn context() -> RequestContext {
        let app = Rc::new(AppContext::new(EventLoop::new()));
        RequestContext::new(app, Request::get("/posts/7"), params([("id", "7")]))
    }

    #[test]
    fn test_params_are_readable() {
        let cx = context();
        assert_eq!(cx.param("id"), Some("7"));
        assert_eq!(cx.param_as::<u64>("id").unwrap(), 7);

        let fault = cx.param_as::<u64>("slug").unwrap_err();
        assert_eq!(fault.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_finalize_applies_status_and_headers() {
        let mut cx = context();
        cx.set_status(StatusCode::CREATED);
        cx.insert_header(
            HeaderName::from_static("x-request-id"),
            HeaderValue::from_static("abc"),
        );

        let response = cx.finalize(Response::text("ok"));

        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.headers.get("x-request-id").unwrap(), "abc");
        assert_eq!(response.content_type(), Some("text/plain; charset=utf-8"));
    }

    #[test]
    fn test_view_uses_data_store() {
        let mut app = AppContext::new(EventLoop::new());
        app.views = Some(Arc::new(|template: &str, data: &Value| -> Result<String, Fault> {
            Ok(format!("<h1>{} {}</h1>", template, data["title"].as_str().unwrap_or("")))
        }));
        let mut cx = RequestContext::new(Rc::new(app), Request::get("/"), RouteParams::new());
        cx.set("title", "Hello");

        let response = cx.view("post").unwrap();
        assert_eq!(response.body, "<h1>post Hello</h1>");
        assert_eq!(response.content_type(), Some("text/html; charset=utf-8"));
    }

    #[test]
    fn test_view_without_renderer_is_a_render_fault() {
        let cx = context();
        assert!(matches!(cx.view("post"), Err(Fault::Render(_))));
    }

    #[test]
    fn test_abort_carries_status() {
        let cx = context();
        let fault = cx.abort(StatusCode::FORBIDDEN, "nope");
        assert_eq!(fault.status(), StatusCode::FORBIDDEN);
        assert_eq!(fault.to_string(), "Aborted with status 403 Forbidden: nope");
    }
}
