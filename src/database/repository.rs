use crate::database::error::DatabaseError;
use crate::payments::state::StatusTransition;
use crate::payments::types::{ExternalRef, NewPayment, Payment};
use async_trait::async_trait;

/// Authoritative storage for payment records.
///
/// `transition` is the only way to change `status`. Implementations must apply
/// it atomically and only while the stored status still equals
/// `transition.from()`; a lost race yields `Ok(None)`.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<Payment>, DatabaseError>;

    async fn find_by_external_ref(
        &self,
        reference: &ExternalRef,
    ) -> Result<Option<Payment>, DatabaseError>;

    async fn create(&self, payment: &NewPayment) -> Result<Payment, DatabaseError>;

    /// Writes the non-status fields that may change after creation
    /// (currently `metadata`).
    async fn save(&self, payment: &Payment) -> Result<Payment, DatabaseError>;

    async fn transition(
        &self,
        id: i64,
        transition: &StatusTransition,
    ) -> Result<Option<Payment>, DatabaseError>;

    /// Newest first. `None` lists every user's payments.
    async fn list_for_user(&self, user_id: Option<i64>) -> Result<Vec<Payment>, DatabaseError>;
}

/// Read-only view of visa applications, used for ownership checks.
#[async_trait]
pub trait ApplicationDirectory: Send + Sync {
    async fn application_owner(&self, application_id: i64) -> Result<Option<i64>, DatabaseError>;
}
