use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::database::repository::{ApplicationDirectory, PaymentStore};
use crate::payments::state::{merge_metadata, PaymentStatus, StatusTransition};
use crate::payments::types::{ExternalRef, NewPayment, Payment};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct PaymentTable {
    next_id: i64,
    rows: BTreeMap<i64, Payment>,
}

/// `PaymentStore` backed by a map behind a `tokio::sync::RwLock`.
///
/// The write lock is held across the status check and the update, which
/// gives `transition` the same compare-and-set behaviour as the SQL store.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    table: Arc<RwLock<PaymentTable>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn not_found(id: i64) -> DatabaseError {
    DatabaseError::new(DatabaseErrorKind::NotFound {
        entity: "Payment".to_string(),
        id: id.to_string(),
    })
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Payment>, DatabaseError> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn find_by_external_ref(
        &self,
        reference: &ExternalRef,
    ) -> Result<Option<Payment>, DatabaseError> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .find(|p| p.external_ref().as_ref() == Some(reference))
            .cloned())
    }

    async fn create(&self, payment: &NewPayment) -> Result<Payment, DatabaseError> {
        let mut table = self.table.write().await;
        table.next_id += 1;
        let now = Utc::now();
        let record = Payment {
            id: table.next_id,
            application_id: payment.application_id,
            user_id: payment.user_id,
            amount: payment.amount.clone(),
            currency: payment.currency.clone(),
            method: payment.method,
            status: PaymentStatus::Pending,
            transaction_id: None,
            payment_intent_id: None,
            razorpay_order_id: None,
            metadata: payment.metadata.clone(),
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(record.id, record.clone());
        Ok(record)
    }

    async fn save(&self, payment: &Payment) -> Result<Payment, DatabaseError> {
        let mut table = self.table.write().await;
        let stored = table
            .rows
            .get_mut(&payment.id)
            .ok_or_else(|| not_found(payment.id))?;
        stored.metadata = payment.metadata.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn transition(
        &self,
        id: i64,
        transition: &StatusTransition,
    ) -> Result<Option<Payment>, DatabaseError> {
        let mut table = self.table.write().await;
        let Some(stored) = table.rows.get_mut(&id) else {
            return Ok(None);
        };
        if stored.status != transition.from() {
            return Ok(None);
        }
        if let Some(reference) = transition.external_ref() {
            if reference.method() != stored.method {
                return Ok(None);
            }
            match reference {
                ExternalRef::StripeIntent(v) => stored.payment_intent_id = Some(v.clone()),
                ExternalRef::RazorpayOrder(v) => stored.razorpay_order_id = Some(v.clone()),
            }
        }
        if let Some(transaction_id) = transition.transaction_id() {
            stored.transaction_id = Some(transaction_id.to_string());
        }
        if let Some(metadata) = transition.metadata() {
            merge_metadata(&mut stored.metadata, metadata);
        }
        stored.status = transition.to();
        stored.updated_at = Utc::now();
        Ok(Some(stored.clone()))
    }

    async fn list_for_user(&self, user_id: Option<i64>) -> Result<Vec<Payment>, DatabaseError> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .rev()
            .filter(|p| user_id.map_or(true, |uid| p.user_id == uid))
            .cloned()
            .collect())
    }
}

/// Application ownership map for tests and local runs.
#[derive(Default, Clone)]
pub struct InMemoryApplicationDirectory {
    owners: Arc<RwLock<HashMap<i64, i64>>>,
}

impl InMemoryApplicationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, application_id: i64, owner_id: i64) {
        self.owners.write().await.insert(application_id, owner_id);
    }
}

#[async_trait]
impl ApplicationDirectory for InMemoryApplicationDirectory {
    async fn application_owner(&self, application_id: i64) -> Result<Option<i64>, DatabaseError> {
        Ok(self.owners.read().await.get(&application_id).copied())
    }
}
