use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{info, warn};

use super::{tag_request, AppState};
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::signature::{RAZORPAY_SIGNATURE_HEADER, STRIPE_SIGNATURE_HEADER};
use crate::services::reconciliation::ReconcileOutcome;

/// POST /webhooks/stripe
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    info!(provider = "stripe", bytes = body.len(), "Received webhook");
    let signature = header_str(&headers, STRIPE_SIGNATURE_HEADER);
    let result = state
        .reconciler
        .handle_stripe_webhook(&body, signature)
        .await;
    respond("stripe", result, &headers)
}

/// POST /webhooks/razorpay
pub async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    info!(provider = "razorpay", bytes = body.len(), "Received webhook");
    let signature = header_str(&headers, RAZORPAY_SIGNATURE_HEADER);
    let result = state
        .reconciler
        .handle_razorpay_webhook(&body, signature)
        .await;
    respond("razorpay", result, &headers)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn acknowledged() -> Response {
    (StatusCode::OK, Json(json!({ "received": true }))).into_response()
}

/// Once the event is authentic and matched to a payment the provider gets a
/// 200 whatever the business outcome, so it stops redelivering.
fn respond(
    provider: &'static str,
    result: PaymentResult<ReconcileOutcome>,
    headers: &HeaderMap,
) -> Response {
    match result {
        Ok(outcome) => {
            info!(
                provider,
                outcome = outcome.label(),
                payment_id = ?outcome.payment().map(|p| p.id),
                "Webhook acknowledged"
            );
            acknowledged()
        }
        Err(PaymentError::PaymentNotConfirmable { payment_id, status }) => {
            warn!(provider, payment_id, status = %status, "Webhook for unconfirmable payment");
            acknowledged()
        }
        Err(e) => tag_request(e, headers).into_response(),
    }
}
