//! HTTP surface: payment endpoints, provider webhooks and the health check.

pub mod payments;
pub mod webhooks;

use crate::error::AppError;
use crate::health::HealthChecker;
use crate::middleware::error::get_request_id_from_headers;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::services::reconciliation::PaymentReconciler;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};

#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<PaymentReconciler>,
    pub health: HealthChecker,
}

pub fn router(state: AppState, webhook_max_body_bytes: usize) -> Router {
    let webhook_routes = Router::new()
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        .route("/webhooks/razorpay", post(webhooks::razorpay_webhook))
        .layer(DefaultBodyLimit::max(webhook_max_body_bytes));

    Router::new()
        .route("/health", get(health))
        .route(
            "/api/payments",
            post(payments::create_payment).get(payments::list_payments),
        )
        .route("/api/payments/{id}/confirm", post(payments::confirm_payment))
        .merge(webhook_routes)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

/// GET /health
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.health.check_health().await;
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

pub(crate) fn tag_request(error: impl Into<AppError>, headers: &HeaderMap) -> AppError {
    let error = error.into();
    match get_request_id_from_headers(headers) {
        Some(id) => error.with_request_id(id),
        None => error,
    }
}
