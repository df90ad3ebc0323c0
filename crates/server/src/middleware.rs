//! Per-request bookkeeping shared by every route.

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 128;

/// Correlation id of one exchange, available to handlers as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    /// Reuse the caller's id when it is short printable ASCII, otherwise mint one.
    fn from_headers(headers: &HeaderMap) -> Self {
        let supplied = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|id| {
                !id.is_empty()
                    && id.len() <= MAX_REQUEST_ID_LEN
                    && id.bytes().all(|b| b.is_ascii_graphic())
            });
        match supplied {
            Some(id) => Self(id.to_string()),
            None => Self(uuid::Uuid::new_v4().to_string()),
        }
    }
}

/// Attach a [`RequestId`] to the request and echo it on the response.
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let id = RequestId::from_headers(request.headers());
    request.extensions_mut().insert(id.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&id.0) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Access log and latency histogram keyed by route template, so model names
/// in the path do not fan out into separate series. For event streams the
/// elapsed time covers only the response head; token timing is recorded by
/// the generation handlers.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().clone();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let elapsed = started.elapsed();
    let stream = is_event_stream(&response);
    metrics::histogram!(
        "http_response_seconds",
        "route" => route.clone(),
        "status" => status.as_u16().to_string()
    )
    .record(elapsed.as_secs_f64());

    if status.is_server_error() {
        tracing::warn!(%method, %route, %status, elapsed_ms = %elapsed.as_millis(), stream, %request_id, "request failed");
    } else if is_operational(&route) {
        tracing::debug!(%method, %route, %status, elapsed_ms = %elapsed.as_millis(), %request_id, "operational request");
    } else {
        tracing::info!(%method, %route, %status, elapsed_ms = %elapsed.as_millis(), stream, %request_id, "inference request served");
    }
    response
}

/// Liveness, readiness and scrape traffic is logged at debug level.
fn is_operational(route: &str) -> bool {
    matches!(route, "/" | "/health" | "/ready" | "/metrics")
}

fn is_event_stream(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/event-stream"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::{Extension, Router};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|Extension(id): Extension<RequestId>| async move { id.0 }),
            )
            .layer(from_fn(log_requests))
            .layer(from_fn(request_id))
    }

    async fn call(id: Option<&str>) -> (String, String) {
        let mut builder = axum::http::Request::builder().uri("/whoami");
        if let Some(id) = id {
            builder = builder.header(REQUEST_ID_HEADER, id);
        }
        let response = app()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let echoed = response.headers()[REQUEST_ID_HEADER]
            .to_str()
            .unwrap()
            .to_string();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (echoed, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn handler_sees_the_echoed_id() {
        let (echoed, seen) = call(Some("req-42")).await;
        assert_eq!(echoed, "req-42");
        assert_eq!(seen, "req-42");

        let (echoed, seen) = call(None).await;
        assert_eq!(echoed, seen);
        assert!(uuid::Uuid::parse_str(&echoed).is_ok());
    }

    #[tokio::test]
    async fn oversized_or_spaced_ids_are_replaced() {
        let long = "a".repeat(MAX_REQUEST_ID_LEN + 1);
        for bad in [long.as_str(), "two words"] {
            let (echoed, _) = call(Some(bad)).await;
            assert_ne!(echoed, bad);
            assert!(uuid::Uuid::parse_str(&echoed).is_ok());
        }
    }

    #[test]
    fn health_and_scrape_routes_are_operational() {
        assert!(is_operational("/health"));
        assert!(is_operational("/metrics"));
        assert!(!is_operational("/models/{name}"));
        assert!(!is_operational("unmatched"));
    }
}
