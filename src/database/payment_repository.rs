use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::PaymentStore;
use crate::payments::state::{PaymentStatus, StatusTransition};
use crate::payments::types::{ExternalRef, NewPayment, Payment, PaymentMethod};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

const PAYMENT_COLUMNS: &str = "id, application_id, user_id, amount, currency, method, status, \
     transaction_id, payment_intent_id, razorpay_order_id, metadata, created_at, updated_at";

/// Raw `payments` row; enums are stored as text.
#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub id: i64,
    pub application_id: i64,
    pub user_id: i64,
    pub amount: BigDecimal,
    pub currency: String,
    pub method: String,
    pub status: String,
    pub transaction_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub razorpay_order_id: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let method = PaymentMethod::from_str(&row.method)
            .map_err(|e| DatabaseError::decode(format!("payment {}: {}", row.id, e)))?;
        let status = PaymentStatus::from_str(&row.status)
            .map_err(|e| DatabaseError::decode(format!("payment {}: {}", row.id, e)))?;
        Ok(Payment {
            id: row.id,
            application_id: row.application_id,
            user_id: row.user_id,
            amount: row.amount,
            currency: row.currency,
            method,
            status,
            transaction_id: row.transaction_id,
            payment_intent_id: row.payment_intent_id,
            razorpay_order_id: row.razorpay_order_id,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_payment(row: Option<PaymentRow>) -> Result<Option<Payment>, DatabaseError> {
    row.map(Payment::try_from).transpose()
}

pub struct PaymentRepository {
    pool: PgPool,
}

impl PaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PaymentStore for PaymentRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<Payment>, DatabaseError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = $1",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        into_payment(row)
    }

    async fn find_by_external_ref(
        &self,
        reference: &ExternalRef,
    ) -> Result<Option<Payment>, DatabaseError> {
        let column = match reference {
            ExternalRef::StripeIntent(_) => "payment_intent_id",
            ExternalRef::RazorpayOrder(_) => "razorpay_order_id",
        };
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE {} = $1 AND method = $2",
            PAYMENT_COLUMNS, column
        ))
        .bind(reference.as_str())
        .bind(reference.method().as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        into_payment(row)
    }

    async fn create(&self, payment: &NewPayment) -> Result<Payment, DatabaseError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "INSERT INTO payments (application_id, user_id, amount, currency, method, status, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(payment.application_id)
        .bind(payment.user_id)
        .bind(&payment.amount)
        .bind(&payment.currency)
        .bind(payment.method.as_str())
        .bind(PaymentStatus::Pending.as_str())
        .bind(&payment.metadata)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Payment::try_from(row)
    }

    async fn save(&self, payment: &Payment) -> Result<Payment, DatabaseError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "UPDATE payments SET metadata = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(payment.id)
        .bind(&payment.metadata)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        match into_payment(row)? {
            Some(saved) => Ok(saved),
            None => Err(DatabaseError::new(DatabaseErrorKind::NotFound {
                entity: "Payment".to_string(),
                id: payment.id.to_string(),
            })),
        }
    }

    async fn transition(
        &self,
        id: i64,
        transition: &StatusTransition,
    ) -> Result<Option<Payment>, DatabaseError> {
        let (intent_id, order_id) = match transition.external_ref() {
            Some(ExternalRef::StripeIntent(v)) => (Some(v.as_str()), None),
            Some(ExternalRef::RazorpayOrder(v)) => (None, Some(v.as_str())),
            None => (None, None),
        };
        let expected_method = transition.external_ref().map(|r| r.method().as_str());

        // `||` on jsonb is a shallow object merge.
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "UPDATE payments
             SET status = $3,
                 transaction_id = COALESCE($4, transaction_id),
                 payment_intent_id = COALESCE($5, payment_intent_id),
                 razorpay_order_id = COALESCE($6, razorpay_order_id),
                 metadata = metadata || COALESCE($7, '{{}}'::jsonb),
                 updated_at = NOW()
             WHERE id = $1 AND status = $2 AND ($8::text IS NULL OR method = $8)
             RETURNING {}",
            PAYMENT_COLUMNS
        ))
        .bind(id)
        .bind(transition.from().as_str())
        .bind(transition.to().as_str())
        .bind(transition.transaction_id())
        .bind(intent_id)
        .bind(order_id)
        .bind(transition.metadata())
        .bind(expected_method)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        into_payment(row)
    }

    async fn list_for_user(&self, user_id: Option<i64>) -> Result<Vec<Payment>, DatabaseError> {
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments
             WHERE ($1::bigint IS NULL OR user_id = $1)
             ORDER BY created_at DESC, id DESC",
            PAYMENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        rows.into_iter().map(Payment::try_from).collect()
    }
}
