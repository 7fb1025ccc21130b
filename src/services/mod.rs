//! Services module for payment business logic

pub mod notification;
pub mod reconciliation;

pub use notification::{AuditSink, NotificationSink, PaymentEvent};
pub use reconciliation::{PaymentReconciler, ReconcileOutcome};
