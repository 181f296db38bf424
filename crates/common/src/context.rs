//! Request-id propagation
//!
//! The request id is an explicit `RequestContext` value threaded through the
//! admission pipeline, embedded in the job envelope, and re-established
//! inside the worker. It is never ambient task-local state.

use axum::{
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Header carrying the request id on every request and response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request context, created by the middleware and read by handlers.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
        }
    }

    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        // The middleware inserts the context; a route mounted without it
        // still gets a fresh id rather than a panic.
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(RequestContext::generate))
    }
}

/// Axum middleware: adopt the inbound `X-Request-ID` or mint a fresh one,
/// expose it as a request extension, and stamp it on the response.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request
        .extensions_mut()
        .insert(RequestContext::new(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request as HttpRequest, middleware, routing::get, Router};
    use tower::ServiceExt;

    async fn echo_request_id(ctx: RequestContext) -> String {
        ctx.request_id
    }

    fn app() -> Router {
        Router::new()
            .route("/", get(echo_request_id))
            .layer(middleware::from_fn(request_id_middleware))
    }

    #[tokio::test]
    async fn test_inbound_request_id_is_adopted() {
        let response = app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/")
                    .header(REQUEST_ID_HEADER, "req-abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get(REQUEST_ID_HEADER).unwrap(),
            "req-abc-123"
        );
    }

    #[tokio::test]
    async fn test_missing_request_id_is_generated() {
        let response = app()
            .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let header = response.headers().get(REQUEST_ID_HEADER).unwrap();
        let value = header.to_str().unwrap();
        assert!(Uuid::parse_str(value).is_ok(), "expected a uuid: {}", value);
    }

    #[tokio::test]
    async fn test_oversized_request_id_is_replaced() {
        let oversized = "x".repeat(200);
        let response = app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/")
                    .header(REQUEST_ID_HEADER, &oversized)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let value = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert_ne!(value, oversized);
        assert!(Uuid::parse_str(&value).is_ok());
    }
}
