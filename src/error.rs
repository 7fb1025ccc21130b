//! Error handling for the HTTP surface
//!
//! Wraps the payment core's `PaymentError` together with request-level
//! failures (authentication, malformed requests) into one `AppError` that
//! carries a machine-readable `ErrorCode` and the HTTP status to answer with.

use crate::payments::error::PaymentError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling by API clients
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Client errors (4xx)
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,
    #[serde(rename = "ACCESS_DENIED")]
    AccessDenied,
    #[serde(rename = "PAYMENT_NOT_FOUND")]
    PaymentNotFound,
    #[serde(rename = "APPLICATION_NOT_FOUND")]
    ApplicationNotFound,
    #[serde(rename = "PAYMENT_NOT_CONFIRMABLE")]
    PaymentNotConfirmable,
    #[serde(rename = "INVALID_TRANSITION")]
    InvalidTransition,
    #[serde(rename = "PAYMENT_VERIFICATION_FAILED")]
    PaymentVerificationFailed,
    #[serde(rename = "INVALID_SIGNATURE")]
    InvalidSignature,
    #[serde(rename = "INVALID_PAYLOAD")]
    InvalidPayload,
    #[serde(rename = "INVALID_EVENT_TYPE")]
    InvalidEventType,

    // External errors (502, 503)
    #[serde(rename = "PAYMENT_PROVIDER_ERROR")]
    PaymentProviderError,
    #[serde(rename = "PROVIDER_UNAVAILABLE")]
    ProviderUnavailable,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Payment(PaymentError),
    /// Caller identity missing or unreadable.
    Unauthorized { reason: String },
    /// Request could not be decoded into the expected shape.
    BadRequest { message: String },
    Internal { message: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Unauthorized {
            reason: reason.into(),
        })
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::BadRequest {
            message: message.into(),
        })
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Payment(err) => err.http_status_code(),
            AppErrorKind::Unauthorized { .. } => 401,
            AppErrorKind::BadRequest { .. } => 400,
            AppErrorKind::Internal { .. } => 500,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Payment(err) => match err {
                PaymentError::Validation { .. } => ErrorCode::ValidationError,
                PaymentError::ProviderUnconfigured { .. } => ErrorCode::ProviderUnavailable,
                PaymentError::ProviderRequestFailed { .. }
                | PaymentError::ProviderResponseInvalid { .. } => ErrorCode::PaymentProviderError,
                PaymentError::SignatureInvalid { .. } => ErrorCode::InvalidSignature,
                PaymentError::InvalidPayload { .. } => ErrorCode::InvalidPayload,
                PaymentError::InvalidEventType { .. } => ErrorCode::InvalidEventType,
                PaymentError::PaymentNotFound { .. } => ErrorCode::PaymentNotFound,
                PaymentError::ApplicationNotFound { .. } => ErrorCode::ApplicationNotFound,
                PaymentError::PaymentNotConfirmable { .. } => ErrorCode::PaymentNotConfirmable,
                PaymentError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
                PaymentError::AccessDenied { .. } => ErrorCode::AccessDenied,
                PaymentError::PaymentVerificationFailed { .. } => {
                    ErrorCode::PaymentVerificationFailed
                }
                PaymentError::Storage { .. } => ErrorCode::DatabaseError,
            },
            AppErrorKind::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppErrorKind::BadRequest { .. } => ErrorCode::ValidationError,
            AppErrorKind::Internal { .. } => ErrorCode::InternalError,
        }
    }

    /// Get user-friendly error message. Never includes provider or storage detail.
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Payment(err) => err.user_message(),
            AppErrorKind::Unauthorized { .. } => "Authentication required".to_string(),
            AppErrorKind::BadRequest { message } => message.clone(),
            AppErrorKind::Internal { .. } => {
                "An internal server error occurred. Please try again later.".to_string()
            }
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Payment(err) => err.is_retryable(),
            AppErrorKind::Unauthorized { .. } | AppErrorKind::BadRequest { .. } => false,
            AppErrorKind::Internal { .. } => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            AppErrorKind::Payment(err) => write!(f, "{}", err),
            AppErrorKind::Unauthorized { reason } => write!(f, "Unauthorized: {}", reason),
            AppErrorKind::BadRequest { message } => write!(f, "Bad request: {}", message),
            AppErrorKind::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for AppError {}

impl From<PaymentError> for AppError {
    fn from(err: PaymentError) -> Self {
        AppError::new(AppErrorKind::Payment(err))
    }
}

/// Result type for handlers that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
