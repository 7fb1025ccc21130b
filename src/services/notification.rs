use crate::database::error::DatabaseError;
use crate::payments::state::PaymentStatus;
use crate::payments::types::Payment;
use async_trait::async_trait;
use bigdecimal::{BigDecimal, RoundingMode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink storage failed: {0}")]
    Storage(#[from] DatabaseError),

    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub user_id: i64,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<i64>,
    pub description: String,
    pub metadata: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserNotification {
    pub user_id: i64,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub metadata: JsonValue,
}

/// Append-only audit trail.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log(&self, entry: AuditEntry) -> Result<(), SinkError>;
}

/// User-facing notification delivery.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: UserNotification) -> Result<(), SinkError>;
}

/// What side effects need to know about a payment that changed state.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentEvent {
    pub payment_id: i64,
    pub user_id: i64,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: PaymentStatus,
}

impl PaymentEvent {
    pub fn from_payment(payment: &Payment) -> Self {
        Self {
            payment_id: payment.id,
            user_id: payment.user_id,
            amount: payment.amount.clone(),
            currency: payment.currency.clone(),
            status: payment.status,
        }
    }

    fn display_amount(&self) -> String {
        format!(
            "{} {}",
            self.amount.with_scale_round(2, RoundingMode::HalfUp),
            self.currency
        )
    }

    pub fn audit_entry(&self) -> AuditEntry {
        AuditEntry {
            user_id: self.user_id,
            action: "payment".to_string(),
            resource: "payment".to_string(),
            resource_id: Some(self.payment_id),
            description: format!("Payment {}: {}", self.status, self.display_amount()),
            metadata: json!({
                "payment_id": self.payment_id,
                "amount": self.amount.with_scale_round(2, RoundingMode::HalfUp).to_string(),
                "status": self.status.as_str(),
            }),
        }
    }

    pub fn notification(&self) -> UserNotification {
        UserNotification {
            user_id: self.user_id,
            kind: "payment".to_string(),
            title: "Payment Update".to_string(),
            message: format!(
                "Payment of {} has been {}",
                self.display_amount(),
                self.status
            ),
            metadata: json!({
                "payment_id": self.payment_id,
                "status": self.status.as_str(),
            }),
        }
    }
}
