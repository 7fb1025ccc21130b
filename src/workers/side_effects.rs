use crate::services::notification::{AuditSink, NotificationSink, PaymentEvent};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

enum Job {
    Event(PaymentEvent),
    Flush(oneshot::Sender<()>),
}

/// Handle for queueing audit/notification work off the request path.
///
/// Delivery is at-most-once: `dispatch` never waits, and an event that does
/// not fit in the queue is dropped with a warning.
#[derive(Clone)]
pub struct SideEffectDispatcher {
    sender: mpsc::Sender<Job>,
}

pub struct SideEffectWorker {
    receiver: mpsc::Receiver<Job>,
    audit: Arc<dyn AuditSink>,
    notifications: Arc<dyn NotificationSink>,
}

impl SideEffectDispatcher {
    pub fn new(
        capacity: usize,
        audit: Arc<dyn AuditSink>,
        notifications: Arc<dyn NotificationSink>,
    ) -> (Self, SideEffectWorker) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self { sender },
            SideEffectWorker {
                receiver,
                audit,
                notifications,
            },
        )
    }

    /// Builds the dispatcher and runs its worker on the current runtime.
    pub fn spawn(
        capacity: usize,
        audit: Arc<dyn AuditSink>,
        notifications: Arc<dyn NotificationSink>,
    ) -> (Self, JoinHandle<()>) {
        let (dispatcher, worker) = Self::new(capacity, audit, notifications);
        let handle = tokio::spawn(worker.run());
        (dispatcher, handle)
    }

    /// Returns false if the event was dropped.
    pub fn dispatch(&self, event: PaymentEvent) -> bool {
        let payment_id = event.payment_id;
        match self.sender.try_send(Job::Event(event)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(payment_id, "side-effect queue full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(payment_id, "side-effect worker stopped, dropping event");
                false
            }
        }
    }

    /// Waits until every event queued before this call has been handled.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Job::Flush(tx)).await.is_err() {
            return;
        }
        let _ = rx.await;
    }
}

impl SideEffectWorker {
    pub async fn run(mut self) {
        info!("Side-effect worker started");
        while let Some(job) = self.receiver.recv().await {
            match job {
                Job::Event(event) => self.handle(event).await,
                Job::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        info!("Side-effect worker stopped");
    }

    async fn handle(&self, event: PaymentEvent) {
        debug!(
            payment_id = event.payment_id,
            status = %event.status,
            "running payment side effects"
        );

        if let Err(e) = self.audit.log(event.audit_entry()).await {
            warn!(payment_id = event.payment_id, error = %e, "audit log write failed");
        }
        if let Err(e) = self.notifications.notify(event.notification()).await {
            warn!(payment_id = event.payment_id, error = %e, "payment notification failed");
        }
    }
}
