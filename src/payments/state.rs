//! Payment lifecycle.
//!
//! ```text
//! pending -> processing -> completed -> refunded
//!                       \-> failed
//! ```
//!
//! `StatusTransition` is the only value a store accepts for mutating the
//! status column. It can only be built for an edge of the graph above, and
//! stores apply it as a conditional update guarded on `from`.

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::ExternalRef;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub const fn valid_transitions(&self) -> &'static [PaymentStatus] {
        match self {
            PaymentStatus::Pending => &[PaymentStatus::Processing],
            PaymentStatus::Processing => &[PaymentStatus::Completed, PaymentStatus::Failed],
            // Reserved for the refund operation.
            PaymentStatus::Completed => &[PaymentStatus::Refunded],
            PaymentStatus::Failed | PaymentStatus::Refunded => &[],
        }
    }

    pub const fn can_transition_to(&self, target: PaymentStatus) -> bool {
        let edges = self.valid_transitions();
        let mut i = 0;
        while i < edges.len() {
            if edges[i] as u8 == target as u8 {
                return true;
            }
            i += 1;
        }
        false
    }

    /// `completed` counts as terminal for reconciliation even though the
    /// refund edge leaves it.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed | PaymentStatus::Failed | PaymentStatus::Refunded
        )
    }

    /// Statuses that a confirm call or webhook may move out of.
    pub fn is_confirmable(&self) -> bool {
        matches!(self, PaymentStatus::Processing)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "processing" => Ok(PaymentStatus::Processing),
            "completed" => Ok(PaymentStatus::Completed),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            _ => Err(PaymentError::Validation {
                message: format!("unknown payment status: {}", value),
                field: Some("status".to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
    from: PaymentStatus,
    to: PaymentStatus,
    transaction_id: Option<String>,
    external_ref: Option<ExternalRef>,
    metadata: Option<JsonValue>,
}

impl StatusTransition {
    /// Checked at runtime. Used for edges chosen from data, such as refunds.
    pub fn new(from: PaymentStatus, to: PaymentStatus) -> PaymentResult<Self> {
        if !from.can_transition_to(to) {
            return Err(PaymentError::InvalidTransition { from, to });
        }
        Ok(Self::edge(from, to))
    }

    /// Unchecked; callers pass an edge already asserted against the graph.
    fn edge(from: PaymentStatus, to: PaymentStatus) -> Self {
        Self {
            from,
            to,
            transaction_id: None,
            external_ref: None,
            metadata: None,
        }
    }

    /// pending -> processing once the provider handed back its reference.
    pub fn start_processing(external_ref: ExternalRef) -> Self {
        const { assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Processing)) };
        Self {
            external_ref: Some(external_ref),
            ..Self::edge(PaymentStatus::Pending, PaymentStatus::Processing)
        }
    }

    pub fn complete(transaction_id: impl Into<String>) -> Self {
        const { assert!(PaymentStatus::Processing.can_transition_to(PaymentStatus::Completed)) };
        Self {
            transaction_id: Some(transaction_id.into()),
            ..Self::edge(PaymentStatus::Processing, PaymentStatus::Completed)
        }
    }

    pub fn fail() -> Self {
        const { assert!(PaymentStatus::Processing.can_transition_to(PaymentStatus::Failed)) };
        Self::edge(PaymentStatus::Processing, PaymentStatus::Failed)
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn from(&self) -> PaymentStatus {
        self.from
    }

    pub fn to(&self) -> PaymentStatus {
        self.to
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn external_ref(&self) -> Option<&ExternalRef> {
        self.external_ref.as_ref()
    }

    pub fn metadata(&self) -> Option<&JsonValue> {
        self.metadata.as_ref()
    }
}

/// Shallow object merge. Keys in `patch` overwrite keys in `base`; a non-object
/// `base` is replaced.
pub fn merge_metadata(base: &mut JsonValue, patch: &JsonValue) {
    let Some(patch) = patch.as_object() else {
        return;
    };
    if !base.is_object() {
        *base = JsonValue::Object(serde_json::Map::new());
    }
    if let Some(target) = base.as_object_mut() {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}
