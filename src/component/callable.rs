use super::Handler;
use crate::common::Response;
use crate::error::Fault;
use crate::http::{Request, RouteParams};

use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

/// What a plain callable may return
#[derive(Debug, Clone)]
pub enum Reply {
    /// Returned verbatim
    Response(Response),
    /// Objects and arrays become a JSON body; scalars are coerced to text
    Json(Value),
    Text(String),
}

impl Reply {
    pub fn into_response(self) -> Response {
        match self {
            Reply::Response(response) => response,
            Reply::Json(value @ (Value::Object(_) | Value::Array(_))) => {
                let mut response = Response::text(value.to_string());
                response.headers.insert(
                    axum::http::header::CONTENT_TYPE,
                    axum::http::HeaderValue::from_static("application/json"),
                );
                response
            }
            Reply::Json(Value::Null) => Response::text(""),
            Reply::Json(Value::String(text)) | Reply::Text(text) => Response::text(text),
            Reply::Json(scalar) => Response::text(scalar.to_string()),
        }
    }
}

impl From<Response> for Reply {
    fn from(response: Response) -> Self {
        Reply::Response(response)
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Json(value)
    }
}

impl From<String> for Reply {
    fn from(text: String) -> Self {
        Reply::Text(text)
    }
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        Reply::Text(text.to_string())
    }
}

type CallableFuture = Pin<Box<dyn Future<Output = Result<Reply, Fault>>>>;

/// A request handler without lifecycle hooks.
///
/// Invoked with the request and route parameters; no phases run around it.
#[derive(Clone)]
pub struct Callable {
    f: Rc<dyn Fn(Request, RouteParams) -> CallableFuture>,
}

impl Callable {
    pub fn new<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Request, RouteParams) -> Fut + 'static,
        Fut: Future<Output = Result<R, Fault>> + 'static,
        R: Into<Reply>,
    {
        Self {
            f: Rc::new(move |request, params| {
                let fut = f(request, params);
                Box::pin(async move { fut.await.map(Into::into) })
            }),
        }
    }

    pub async fn invoke(&self, request: Request, params: RouteParams) -> Result<Response, Fault> {
        let reply = (self.f)(request, params).await?;
        Ok(reply.into_response())
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable").finish_non_exhaustive()
    }
}

/// What a request is dispatched to
pub enum Target {
    Component(Box<dyn Handler>),
    Callable(Callable),
}

impl Target {
    pub fn component<H: Handler + 'static>(handler: H) -> Self {
        Target::Component(Box::new(handler))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Target::Component(handler) => handler.name(),
            Target::Callable(_) => "callable",
        }
    }
}

impl From<Box<dyn Handler>> for Target {
    fn from(handler: Box<dyn Handler>) -> Self {
        Target::Component(handler)
    }
}

impl From<Callable> for Target {
    fn from(callable: Callable) -> Self {
        Target::Callable(callable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::params;
    use serde_json::json;

    fn block_on<F: Future>(future: F) -> F::Output {
        // The futures here never suspend.
        let waker = std::task::Waker::noop();
        let mut cx = std::task::Context::from_waker(waker);
        let mut future = std::pin::pin!(future);
        match future.as_mut().poll(&mut cx) {
            std::task::Poll::Ready(output) => output,
            std::task::Poll::Pending => panic!("future suspended"),
        }
    }

    #[test]
    fn test_object_reply_becomes_json() {
        let response = Reply::from(json!({ "id": 1 })).into_response();
        assert_eq!(response.body, r#"{"id":1}"#);
        assert_eq!(response.content_type(), Some("application/json"));
    }

    #[test]
    fn test_scalar_replies_are_coerced_to_text() {
        assert_eq!(Reply::from(json!(42)).into_response().body, "42");
        assert_eq!(Reply::from(json!("plain")).into_response().body, "plain");
        assert_eq!(Reply::from(json!(null)).into_response().body, "");
        assert_eq!(Reply::from(json!(true)).into_response().body, "true");
    }

    #[test]
    fn test_response_reply_is_verbatim() {
        let original = Response::redirect("/login");
        assert_eq!(Reply::from(original.clone()).into_response(), original);
    }

    #[test]
    fn test_callable_receives_params() {
        let callable = Callable::new(|request: Request, params: RouteParams| async move {
            Ok::<_, Fault>(format!("{} {}", request.path, params["name"]))
        });

        let response =
            block_on(callable.invoke(Request::get("/hello"), params([("name", "ada")]))).unwrap();
        assert_eq!(response.body, "/hello ada");
    }
}
