use axum::{
    extract::{rejection::JsonRejection, rejection::PathRejection, Path, State},
    http::HeaderMap,
    Json,
};
use tracing::info;

use super::{tag_request, AppState};
use crate::error::{AppError, AppResult};
use crate::payments::types::{
    Caller, ConfirmPaymentRequest, CreatePaymentRequest, CreatePaymentResponse, Payment,
};

/// POST /api/payments
pub async fn create_payment(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    payload: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> AppResult<Json<CreatePaymentResponse>> {
    let Json(request) = payload
        .map_err(|e| tag_request(AppError::bad_request(e.body_text()), &headers))?;

    info!(
        user_id = caller.user_id,
        application_id = request.application_id,
        provider = %request.method,
        "Creating payment"
    );

    let response = state
        .reconciler
        .create_payment(&caller, request)
        .await
        .map_err(|e| tag_request(e, &headers))?;
    Ok(Json(response))
}

/// GET /api/payments
pub async fn list_payments(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
) -> AppResult<Json<Vec<Payment>>> {
    let payments = state
        .reconciler
        .list_payments(&caller)
        .await
        .map_err(|e| tag_request(e, &headers))?;
    Ok(Json(payments))
}

/// POST /api/payments/{id}/confirm
pub async fn confirm_payment(
    State(state): State<AppState>,
    caller: Caller,
    headers: HeaderMap,
    path: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ConfirmPaymentRequest>, JsonRejection>,
) -> AppResult<Json<Payment>> {
    let Path(payment_id) =
        path.map_err(|e| tag_request(AppError::bad_request(e.body_text()), &headers))?;
    let Json(request) = payload
        .map_err(|e| tag_request(AppError::bad_request(e.body_text()), &headers))?;

    info!(
        payment_id,
        user_id = caller.user_id,
        provider = %request.method(),
        "Confirming payment"
    );

    let payment = state
        .reconciler
        .confirm_payment(&caller, payment_id, request)
        .await
        .map_err(|e| tag_request(e, &headers))?;
    Ok(Json(payment))
}
