use crate::database::error::DatabaseError;
use crate::payments::state::PaymentStatus;
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Provider {provider} is not configured")]
    ProviderUnconfigured { provider: String },

    #[error("Provider request failed: provider={provider}, message={message}")]
    ProviderRequestFailed {
        provider: String,
        message: String,
        status_code: Option<u16>,
    },

    #[error("Invalid provider response: provider={provider}, message={message}")]
    ProviderResponseInvalid { provider: String, message: String },

    #[error("Webhook signature invalid: {reason}")]
    SignatureInvalid { reason: String },

    #[error("Invalid payload: {message}")]
    InvalidPayload { message: String },

    #[error("Invalid event type: {message}")]
    InvalidEventType { message: String },

    #[error("Payment not found: {reference}")]
    PaymentNotFound { reference: String },

    #[error("Application not found: {application_id}")]
    ApplicationNotFound { application_id: i64 },

    #[error("Payment {payment_id} cannot be confirmed while {status}")]
    PaymentNotConfirmable {
        payment_id: i64,
        status: PaymentStatus,
    },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("Access denied: {reason}")]
    AccessDenied { reason: String },

    #[error("Payment verification failed: {reason}")]
    PaymentVerificationFailed { reason: String },

    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl PaymentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::ProviderRequestFailed { status_code, .. } => match status_code {
                Some(code) => *code == 429 || *code >= 500,
                None => true,
            },
            PaymentError::Storage { .. } => true,
            _ => false,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::Validation { .. } => 400,
            PaymentError::ProviderUnconfigured { .. } => 503,
            PaymentError::ProviderRequestFailed { .. } => 502,
            PaymentError::ProviderResponseInvalid { .. } => 502,
            PaymentError::SignatureInvalid { .. } => 400,
            PaymentError::InvalidPayload { .. } => 400,
            PaymentError::InvalidEventType { .. } => 400,
            PaymentError::PaymentNotFound { .. } => 404,
            PaymentError::ApplicationNotFound { .. } => 404,
            PaymentError::PaymentNotConfirmable { .. } => 409,
            PaymentError::InvalidTransition { .. } => 409,
            PaymentError::AccessDenied { .. } => 403,
            PaymentError::PaymentVerificationFailed { .. } => 400,
            PaymentError::Storage { .. } => 500,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PaymentError::Validation { message, .. } => message.clone(),
            PaymentError::ProviderUnconfigured { .. } => {
                "Payment method is not available".to_string()
            }
            PaymentError::ProviderRequestFailed { .. }
            | PaymentError::ProviderResponseInvalid { .. } => {
                "Payment provider returned an error".to_string()
            }
            PaymentError::SignatureInvalid { .. } => "Invalid signature".to_string(),
            PaymentError::InvalidPayload { .. } => "Invalid payload".to_string(),
            PaymentError::InvalidEventType { .. } => "Invalid event type".to_string(),
            PaymentError::PaymentNotFound { .. } => "Payment not found".to_string(),
            PaymentError::ApplicationNotFound { .. } => "Application not found".to_string(),
            PaymentError::PaymentNotConfirmable { status, .. } => {
                format!("Payment cannot be confirmed while {}", status)
            }
            PaymentError::InvalidTransition { .. } => {
                "Payment is not in a state that allows this operation".to_string()
            }
            PaymentError::AccessDenied { .. } => "Access denied".to_string(),
            PaymentError::PaymentVerificationFailed { .. } => {
                "Payment verification failed".to_string()
            }
            PaymentError::Storage { .. } => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
        }
    }

    /// What is kept on the payment record when intent creation fails: the
    /// failure class and HTTP status, never the provider's own wording.
    pub fn provider_failure_summary(&self) -> JsonValue {
        match self {
            PaymentError::ProviderRequestFailed {
                provider,
                status_code,
                ..
            } => json!({
                "provider": provider,
                "reason": "request_failed",
                "status_code": status_code,
            }),
            PaymentError::ProviderResponseInvalid { provider, .. } => json!({
                "provider": provider,
                "reason": "invalid_response",
            }),
            PaymentError::ProviderUnconfigured { provider } => json!({
                "provider": provider,
                "reason": "unconfigured",
            }),
            _ => json!({ "reason": "internal" }),
        }
    }

    pub(crate) fn request_failed(
        provider: &str,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        PaymentError::ProviderRequestFailed {
            provider: provider.to_string(),
            message: message.into(),
            status_code,
        }
    }

    pub(crate) fn invalid_response(provider: &str, message: impl Into<String>) -> Self {
        PaymentError::ProviderResponseInvalid {
            provider: provider.to_string(),
            message: message.into(),
        }
    }
}

impl From<DatabaseError> for PaymentError {
    fn from(err: DatabaseError) -> Self {
        PaymentError::Storage {
            message: err.to_string(),
        }
    }
}
