//! Request logging middleware
//!
//! Every request is tagged with an `x-request-id` (UUID v4 unless the caller
//! supplied one) and logged once on completion with method, path, status and
//! latency.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use std::time::Instant;
use tower_http::request_id::{MakeRequestId, RequestId};
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone, Copy, Default)]
pub struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = info_span!(
        "http_request",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    async move {
        let started = Instant::now();
        let response = next.run(request).await;
        let status = response.status();
        let latency_ms = started.elapsed().as_millis() as u64;

        if status.is_server_error() {
            error!(status = status.as_u16(), latency_ms, "request failed");
        } else if status.is_client_error() {
            warn!(status = status.as_u16(), latency_ms, "request rejected");
        } else {
            info!(status = status.as_u16(), latency_ms, "request completed");
        }

        response
    }
    .instrument(span)
    .await
}
