//! Payment Reconciliation Service
//!
//! Creates provider intents/orders and keeps the local payment record in step
//! with the provider, whether the news arrives from the client (confirm) or
//! from the provider (webhook). Every status change goes through
//! `PaymentStore::transition`, so concurrent deliveries of the same terminal
//! event apply exactly once and fire side effects exactly once.

use crate::database::repository::{ApplicationDirectory, PaymentStore};
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::factory::PaymentGateways;
use crate::payments::providers::razorpay::{RazorpayEventKind, RazorpayPaymentEntity};
use crate::payments::providers::stripe::{StripeEventKind, StripePaymentIntent};
use crate::payments::signature::SignatureVerifier;
use crate::payments::state::{merge_metadata, PaymentStatus, StatusTransition};
use crate::payments::types::{
    normalize_amount, normalize_currency, Caller, ConfirmPaymentRequest, CreatePaymentRequest,
    CreatePaymentResponse, ExternalRef, IntentRequest, NewPayment, Payment, PaymentMethod,
    ProviderState,
};
use crate::services::notification::PaymentEvent;
use crate::workers::side_effects::SideEffectDispatcher;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

// ============================================================================
// Outcome Types
// ============================================================================

/// Result of feeding a terminal event into the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The transition was written and side effects were queued.
    Applied(Payment),
    /// The payment was already in the target state; nothing was written.
    AlreadyApplied(Payment),
    /// The payment had already reached a different terminal state.
    Conflict(Payment),
    /// The event kind is not one the reconciler acts on.
    Ignored,
}

impl ReconcileOutcome {
    pub fn payment(&self) -> Option<&Payment> {
        match self {
            ReconcileOutcome::Applied(p)
            | ReconcileOutcome::AlreadyApplied(p)
            | ReconcileOutcome::Conflict(p) => Some(p),
            ReconcileOutcome::Ignored => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied(_) => "applied",
            ReconcileOutcome::AlreadyApplied(_) => "already_applied",
            ReconcileOutcome::Conflict(_) => "conflict",
            ReconcileOutcome::Ignored => "ignored",
        }
    }
}

// ============================================================================
// Reconciler
// ============================================================================

pub struct PaymentReconciler {
    store: Arc<dyn PaymentStore>,
    applications: Arc<dyn ApplicationDirectory>,
    gateways: PaymentGateways,
    verifier: SignatureVerifier,
    side_effects: SideEffectDispatcher,
}

impl PaymentReconciler {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        applications: Arc<dyn ApplicationDirectory>,
        gateways: PaymentGateways,
        verifier: SignatureVerifier,
        side_effects: SideEffectDispatcher,
    ) -> Self {
        Self {
            store,
            applications,
            gateways,
            verifier,
            side_effects,
        }
    }

    pub fn side_effects(&self) -> &SideEffectDispatcher {
        &self.side_effects
    }

    /// Creates a pending record, asks the provider for an intent/order and
    /// moves the record to `processing`. On provider failure the record stays
    /// `pending` with the error noted in its metadata.
    pub async fn create_payment(
        &self,
        caller: &Caller,
        request: CreatePaymentRequest,
    ) -> PaymentResult<CreatePaymentResponse> {
        let amount = normalize_amount(&request.amount)?;
        let currency = normalize_currency(request.currency.as_deref())?;

        let owner_id = self
            .applications
            .application_owner(request.application_id)
            .await?
            .ok_or(PaymentError::ApplicationNotFound {
                application_id: request.application_id,
            })?;
        if !caller.is_staff() && owner_id != caller.user_id {
            return Err(PaymentError::AccessDenied {
                reason: format!(
                    "user {} does not own application {}",
                    caller.user_id, request.application_id
                ),
            });
        }

        let gateway = self.gateways.get(request.method)?;
        if !gateway.is_configured() {
            return Err(PaymentError::ProviderUnconfigured {
                provider: request.method.to_string(),
            });
        }

        let mut payment = self
            .store
            .create(&NewPayment {
                application_id: request.application_id,
                user_id: caller.user_id,
                amount: amount.clone(),
                currency: currency.clone(),
                method: request.method,
                metadata: json!({}),
            })
            .await?;

        let mut metadata = BTreeMap::new();
        metadata.insert("payment_id".to_string(), payment.id.to_string());
        metadata.insert(
            "application_id".to_string(),
            request.application_id.to_string(),
        );
        metadata.insert("user_id".to_string(), caller.user_id.to_string());

        let intent = match gateway
            .create_intent(IntentRequest {
                payment_id: payment.id,
                amount: amount.clone(),
                currency: currency.clone(),
                metadata,
            })
            .await
        {
            Ok(intent) => intent,
            Err(e) => {
                warn!(
                    payment_id = payment.id,
                    provider = %request.method,
                    error = %e,
                    "provider intent creation failed; payment left pending"
                );
                merge_metadata(
                    &mut payment.metadata,
                    &json!({ "provider_error": e.provider_failure_summary() }),
                );
                if let Err(save_err) = self.store.save(&payment).await {
                    error!(payment_id = payment.id, error = %save_err, "failed to record provider error");
                }
                return Err(e);
            }
        };

        let transition = StatusTransition::start_processing(ExternalRef::for_method(
            request.method,
            intent.external_ref.clone(),
        ))
        .with_metadata(json!({ "provider_status": intent.provider_status }));

        let payment = self
            .store
            .transition(payment.id, &transition)
            .await?
            .ok_or_else(|| PaymentError::Storage {
                message: format!("payment {} changed during creation", payment.id),
            })?;

        info!(
            payment_id = payment.id,
            provider = %payment.method,
            status = %payment.status,
            reference = ?payment.external_ref().map(|r| r.masked()),
            "payment created"
        );

        let mut response = CreatePaymentResponse {
            payment_id: payment.id,
            amount: payment.amount.clone(),
            currency: payment.currency.clone(),
            status: payment.status,
            payment_intent_id: None,
            client_secret: None,
            razorpay_order_id: None,
            razorpay_key_id: None,
        };
        match payment.method {
            PaymentMethod::Stripe => {
                response.payment_intent_id = payment.payment_intent_id.clone();
                response.client_secret = intent.client_secret;
            }
            PaymentMethod::Razorpay => {
                response.razorpay_order_id = payment.razorpay_order_id.clone();
                response.razorpay_key_id = intent.public_key;
            }
        }
        Ok(response)
    }

    /// Client-initiated confirmation. Ownership is checked before any
    /// provider call or signature check.
    pub async fn confirm_payment(
        &self,
        caller: &Caller,
        payment_id: i64,
        request: ConfirmPaymentRequest,
    ) -> PaymentResult<Payment> {
        let payment = self
            .store
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound {
                reference: payment_id.to_string(),
            })?;

        if !payment.is_owned_by(caller.user_id) && !caller.is_staff() {
            warn!(
                payment_id,
                user_id = caller.user_id,
                "confirm rejected: caller does not own payment"
            );
            return Err(PaymentError::AccessDenied {
                reason: format!("user {} does not own payment {}", caller.user_id, payment_id),
            });
        }

        if request.method() != payment.method {
            return Err(PaymentError::Validation {
                message: format!(
                    "payment {} uses {}, confirmation is for {}",
                    payment_id,
                    payment.method,
                    request.method()
                ),
                field: None,
            });
        }

        if payment.status.is_terminal() {
            info!(payment_id, status = %payment.status, "confirm on settled payment");
            return Ok(payment);
        }
        if !payment.status.is_confirmable() {
            return Err(PaymentError::PaymentNotConfirmable {
                payment_id,
                status: payment.status,
            });
        }

        match request {
            ConfirmPaymentRequest::Stripe { payment_intent_id } => {
                self.confirm_stripe(payment, &payment_intent_id).await
            }
            ConfirmPaymentRequest::Razorpay {
                razorpay_order_id,
                razorpay_payment_id,
                razorpay_signature,
            } => {
                self.confirm_razorpay(
                    payment,
                    &razorpay_order_id,
                    &razorpay_payment_id,
                    &razorpay_signature,
                )
                .await
            }
        }
    }

    async fn confirm_stripe(&self, payment: Payment, intent_id: &str) -> PaymentResult<Payment> {
        if payment.payment_intent_id.as_deref() != Some(intent_id) {
            return Err(PaymentError::PaymentVerificationFailed {
                reason: format!("intent {} does not belong to payment {}", intent_id, payment.id),
            });
        }

        let gateway = self.gateways.get(PaymentMethod::Stripe)?;
        let status = match gateway.fetch_status(intent_id).await {
            Ok(status) => status,
            Err(e @ PaymentError::ProviderUnconfigured { .. }) => return Err(e),
            Err(e) => {
                warn!(payment_id = payment.id, error = %e, "stripe status lookup failed");
                return Err(PaymentError::PaymentVerificationFailed {
                    reason: e.to_string(),
                });
            }
        };

        let metadata = json!({ "provider_status": status.provider_status, "confirmed_by": "client" });
        let transition = match status.state {
            ProviderState::Completed => StatusTransition::complete(intent_id),
            ProviderState::Failed => StatusTransition::fail(),
            ProviderState::Processing => {
                info!(
                    payment_id = payment.id,
                    provider_status = %status.provider_status,
                    "stripe payment still in flight"
                );
                return Ok(payment);
            }
        };

        let outcome = self
            .apply(&payment, transition.with_metadata(metadata), "confirm")
            .await?;
        Ok(outcome_payment(outcome, payment))
    }

    async fn confirm_razorpay(
        &self,
        payment: Payment,
        order_id: &str,
        razorpay_payment_id: &str,
        signature: &str,
    ) -> PaymentResult<Payment> {
        let reason = if payment.razorpay_order_id.as_deref() != Some(order_id) {
            format!("order {} does not belong to payment {}", order_id, payment.id)
        } else {
            match self
                .verifier
                .verify_razorpay_checkout(order_id, razorpay_payment_id, signature)
            {
                Ok(()) => {
                    let transition = StatusTransition::complete(razorpay_payment_id).with_metadata(
                        json!({
                            "razorpay_payment_id": razorpay_payment_id,
                            "confirmed_by": "client",
                        }),
                    );
                    let outcome = self.apply(&payment, transition, "confirm").await?;
                    return Ok(outcome_payment(outcome, payment));
                }
                Err(e @ PaymentError::ProviderUnconfigured { .. }) => return Err(e),
                Err(e) => e.to_string(),
            }
        };

        warn!(payment_id = payment.id, reason = %reason, "razorpay verification failed");
        let transition = StatusTransition::fail().with_metadata(json!({
            "razorpay_payment_id": razorpay_payment_id,
            "verification_error": reason,
        }));
        self.apply(&payment, transition, "confirm").await?;
        Err(PaymentError::PaymentVerificationFailed { reason })
    }

    /// Verifies and applies a Stripe webhook delivered as raw bytes.
    pub async fn handle_stripe_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> PaymentResult<ReconcileOutcome> {
        let event = self.verifier.construct_stripe_event(body, signature)?;

        let (intent, transition): (StripePaymentIntent, StatusTransition) = match event.kind {
            StripeEventKind::PaymentIntentSucceeded(intent) => {
                let t = StatusTransition::complete(intent.id.clone());
                (intent, t)
            }
            StripeEventKind::PaymentIntentFailed(intent)
            | StripeEventKind::PaymentIntentCanceled(intent) => (intent, StatusTransition::fail()),
            StripeEventKind::Unhandled => {
                info!(event_type = %event.event_type, "ignoring stripe event");
                return Ok(ReconcileOutcome::Ignored);
            }
        };

        let payment = self
            .find_by_reference(ExternalRef::StripeIntent(intent.id.clone()))
            .await?;
        let mut metadata = json!({
            "stripe_event_id": event.id,
            "provider_status": intent.status,
        });
        if let Some(message) = intent.failure_message() {
            merge_metadata(&mut metadata, &json!({ "failure_message": message }));
        }

        let outcome = self
            .apply(&payment, transition.with_metadata(metadata), &event.event_type)
            .await?;
        Ok(outcome)
    }

    /// Verifies and applies a Razorpay webhook delivered as raw bytes.
    pub async fn handle_razorpay_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> PaymentResult<ReconcileOutcome> {
        let event = self.verifier.verify_razorpay_webhook(body, signature)?;

        let (entity, transition): (RazorpayPaymentEntity, StatusTransition) = match event.kind {
            RazorpayEventKind::PaymentCaptured(entity) => {
                let t = StatusTransition::complete(entity.id.clone());
                (entity, t)
            }
            RazorpayEventKind::PaymentFailed(entity) => (entity, StatusTransition::fail()),
            RazorpayEventKind::Unhandled => {
                info!(event_type = %event.event_type, "ignoring razorpay event");
                return Ok(ReconcileOutcome::Ignored);
            }
        };

        let payment = self
            .find_by_reference(ExternalRef::RazorpayOrder(entity.order_id.clone()))
            .await?;
        let mut metadata = json!({ "razorpay_payment_id": entity.id });
        if let Some(status) = &entity.status {
            merge_metadata(&mut metadata, &json!({ "provider_status": status }));
        }
        if let Some(description) = &entity.error_description {
            merge_metadata(&mut metadata, &json!({ "failure_message": description }));
        }

        self.apply(&payment, transition.with_metadata(metadata), &event.event_type)
            .await
    }

    /// Staff see every payment; applicants only their own.
    pub async fn list_payments(&self, caller: &Caller) -> PaymentResult<Vec<Payment>> {
        let filter = if caller.is_staff() {
            None
        } else {
            Some(caller.user_id)
        };
        Ok(self.store.list_for_user(filter).await?)
    }

    async fn find_by_reference(&self, reference: ExternalRef) -> PaymentResult<Payment> {
        self.store
            .find_by_external_ref(&reference)
            .await?
            .ok_or_else(|| {
                warn!(reference = %reference.masked(), "no payment for provider reference");
                PaymentError::PaymentNotFound {
                    reference: reference.masked(),
                }
            })
    }

    /// Applies a terminal transition with a single conditional write. Side
    /// effects are queued only when this call performed the write.
    async fn apply(
        &self,
        payment: &Payment,
        transition: StatusTransition,
        source: &str,
    ) -> PaymentResult<ReconcileOutcome> {
        if let Some(outcome) = settled_outcome(payment, transition.to(), source) {
            return Ok(outcome);
        }
        if payment.status != transition.from() {
            return Err(PaymentError::PaymentNotConfirmable {
                payment_id: payment.id,
                status: payment.status,
            });
        }

        match self.store.transition(payment.id, &transition).await? {
            Some(updated) => {
                info!(
                    payment_id = updated.id,
                    provider = %updated.method,
                    status = %updated.status,
                    source,
                    "payment status updated"
                );
                self.side_effects
                    .dispatch(PaymentEvent::from_payment(&updated));
                Ok(ReconcileOutcome::Applied(updated))
            }
            None => {
                // Lost the race; report whatever won.
                let current = self
                    .store
                    .find_by_id(payment.id)
                    .await?
                    .ok_or_else(|| PaymentError::PaymentNotFound {
                        reference: payment.id.to_string(),
                    })?;
                settled_outcome(&current, transition.to(), source).ok_or(
                    PaymentError::PaymentNotConfirmable {
                        payment_id: current.id,
                        status: current.status,
                    },
                )
            }
        }
    }
}

fn settled_outcome(
    payment: &Payment,
    target: PaymentStatus,
    source: &str,
) -> Option<ReconcileOutcome> {
    if payment.status == target {
        info!(
            payment_id = payment.id,
            status = %payment.status,
            source,
            "duplicate terminal event"
        );
        return Some(ReconcileOutcome::AlreadyApplied(payment.clone()));
    }
    if payment.status.is_terminal() {
        warn!(
            payment_id = payment.id,
            status = %payment.status,
            attempted = %target,
            source,
            "terminal event conflicts with recorded status"
        );
        return Some(ReconcileOutcome::Conflict(payment.clone()));
    }
    None
}

fn outcome_payment(outcome: ReconcileOutcome, fallback: Payment) -> Payment {
    match outcome {
        ReconcileOutcome::Applied(p)
        | ReconcileOutcome::AlreadyApplied(p)
        | ReconcileOutcome::Conflict(p) => p,
        ReconcileOutcome::Ignored => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::{InMemoryApplicationDirectory, InMemoryPaymentStore};
    use crate::payments::provider::PaymentGateway;
    use crate::payments::providers::{RazorpayConfig, StripeConfig};
    use crate::payments::types::{ProviderIntent, ProviderStatus, UserRole};
    use crate::payments::utils::hmac_sha256_hex;
    use crate::services::notification::{
        AuditEntry, AuditSink, NotificationSink, SinkError, UserNotification,
    };
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Sinks {
        audits: Mutex<Vec<AuditEntry>>,
        notifications: Mutex<Vec<UserNotification>>,
    }

    #[async_trait]
    impl AuditSink for Sinks {
        async fn log(&self, entry: AuditEntry) -> Result<(), SinkError> {
            self.audits.lock().await.push(entry);
            Ok(())
        }
    }

    #[async_trait]
    impl NotificationSink for Sinks {
        async fn notify(&self, n: UserNotification) -> Result<(), SinkError> {
            self.notifications.lock().await.push(n);
            Ok(())
        }
    }

    struct FixedGateway {
        method: PaymentMethod,
        status: ProviderState,
        calls: Mutex<u32>,
        fail_create: bool,
    }

    impl FixedGateway {
        fn new(method: PaymentMethod, status: ProviderState) -> Self {
            Self {
                method,
                status,
                calls: Mutex::new(0),
                fail_create: false,
            }
        }
    }

    #[async_trait]
    impl PaymentGateway for FixedGateway {
        fn method(&self) -> PaymentMethod {
            self.method
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn create_intent(&self, request: IntentRequest) -> PaymentResult<ProviderIntent> {
            *self.calls.lock().await += 1;
            if self.fail_create {
                return Err(PaymentError::request_failed("stub", "boom", Some(500)));
            }
            let (external_ref, client_secret, public_key) = match self.method {
                PaymentMethod::Stripe => (
                    format!("pi_{}", request.payment_id),
                    Some(format!("pi_{}_secret", request.payment_id)),
                    None,
                ),
                PaymentMethod::Razorpay => (
                    format!("order_{}", request.payment_id),
                    None,
                    Some("rzp_test_key".to_string()),
                ),
            };
            Ok(ProviderIntent {
                external_ref,
                client_secret,
                public_key,
                provider_status: "created".to_string(),
            })
        }

        async fn fetch_status(&self, _external_ref: &str) -> PaymentResult<ProviderStatus> {
            *self.calls.lock().await += 1;
            Ok(ProviderStatus {
                state: self.status,
                provider_status: "stub".to_string(),
            })
        }
    }

    struct Harness {
        reconciler: PaymentReconciler,
        store: InMemoryPaymentStore,
        sinks: Arc<Sinks>,
        stripe: Arc<FixedGateway>,
    }

    async fn harness_with(stripe: FixedGateway) -> Harness {
        let store = InMemoryPaymentStore::new();
        let applications = InMemoryApplicationDirectory::new();
        applications.insert(3, 7).await;
        let sinks = Arc::new(Sinks::default());
        let (dispatcher, _handle) = SideEffectDispatcher::spawn(16, sinks.clone(), sinks.clone());
        let stripe = Arc::new(stripe);
        let gateways = PaymentGateways::new()
            .with_gateway(stripe.clone())
            .with_gateway(Arc::new(FixedGateway::new(
                PaymentMethod::Razorpay,
                ProviderState::Processing,
            )));
        let verifier = SignatureVerifier::new(
            &StripeConfig {
                webhook_secret: Some("whsec_test".to_string()),
                ..StripeConfig::default()
            },
            &RazorpayConfig {
                key_id: Some("rzp_test_key".to_string()),
                key_secret: Some("rzp_key_secret".to_string()),
                webhook_secret: Some("rzp_webhook_secret".to_string()),
                ..RazorpayConfig::default()
            },
        );
        Harness {
            reconciler: PaymentReconciler::new(
                Arc::new(store.clone()),
                Arc::new(applications),
                gateways,
                verifier,
                dispatcher,
            ),
            store,
            sinks,
            stripe,
        }
    }

    async fn harness() -> Harness {
        harness_with(FixedGateway::new(PaymentMethod::Stripe, ProviderState::Completed)).await
    }

    fn owner() -> Caller {
        Caller::new(7, UserRole::Applicant)
    }

    fn create_request(method: PaymentMethod) -> CreatePaymentRequest {
        CreatePaymentRequest {
            application_id: 3,
            amount: BigDecimal::from(160),
            currency: None,
            method,
        }
    }

    #[tokio::test]
    async fn create_moves_to_processing_with_reference() {
        let h = harness().await;
        let response = h
            .reconciler
            .create_payment(&owner(), create_request(PaymentMethod::Stripe))
            .await
            .unwrap();
        assert_eq!(response.status, PaymentStatus::Processing);
        assert_eq!(response.currency, "USD");
        assert_eq!(response.payment_intent_id.as_deref(), Some("pi_1"));
        assert_eq!(response.client_secret.as_deref(), Some("pi_1_secret"));
        assert!(response.razorpay_order_id.is_none());

        let stored = h.store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(stored.metadata["provider_status"], "created");
        assert!(stored.has_consistent_reference());
    }

    #[tokio::test]
    async fn razorpay_create_returns_order_and_key() {
        let h = harness().await;
        let response = h
            .reconciler
            .create_payment(&owner(), create_request(PaymentMethod::Razorpay))
            .await
            .unwrap();
        assert_eq!(response.razorpay_order_id.as_deref(), Some("order_1"));
        assert_eq!(response.razorpay_key_id.as_deref(), Some("rzp_test_key"));
        assert!(response.client_secret.is_none());
    }

    #[tokio::test]
    async fn provider_failure_leaves_payment_pending() {
        let mut gateway = FixedGateway::new(PaymentMethod::Stripe, ProviderState::Completed);
        gateway.fail_create = true;
        let h = harness_with(gateway).await;

        let err = h
            .reconciler
            .create_payment(&owner(), create_request(PaymentMethod::Stripe))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::ProviderRequestFailed { .. }));

        let stored = h.store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Pending);
        assert!(stored.payment_intent_id.is_none());
        assert_eq!(
            stored.metadata["provider_error"],
            json!({ "provider": "stub", "reason": "request_failed", "status_code": 500 })
        );
        assert!(!stored.metadata.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn applicant_cannot_pay_for_someone_elses_application() {
        let h = harness().await;
        let err = h
            .reconciler
            .create_payment(
                &Caller::new(8, UserRole::Applicant),
                create_request(PaymentMethod::Stripe),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::AccessDenied { .. }));
        assert!(h.store.is_empty().await);
    }

    #[tokio::test]
    async fn unknown_application_is_not_found() {
        let h = harness().await;
        let mut request = create_request(PaymentMethod::Stripe);
        request.application_id = 99;
        let err = h
            .reconciler
            .create_payment(&owner(), request)
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::ApplicationNotFound { .. }));
    }

    #[tokio::test]
    async fn confirm_by_stranger_is_denied_before_provider_call() {
        let h = harness().await;
        h.reconciler
            .create_payment(&owner(), create_request(PaymentMethod::Stripe))
            .await
            .unwrap();
        let calls_before = *h.stripe.calls.lock().await;

        let err = h
            .reconciler
            .confirm_payment(
                &Caller::new(8, UserRole::Applicant),
                1,
                ConfirmPaymentRequest::Stripe {
                    payment_intent_id: "pi_1".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::AccessDenied { .. }));
        assert_eq!(*h.stripe.calls.lock().await, calls_before);
    }

    #[tokio::test]
    async fn stripe_confirm_completes_once() {
        let h = harness().await;
        h.reconciler
            .create_payment(&owner(), create_request(PaymentMethod::Stripe))
            .await
            .unwrap();

        let confirm = || ConfirmPaymentRequest::Stripe {
            payment_intent_id: "pi_1".to_string(),
        };
        let payment = h
            .reconciler
            .confirm_payment(&owner(), 1, confirm())
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.transaction_id.as_deref(), Some("pi_1"));

        let again = h
            .reconciler
            .confirm_payment(&owner(), 1, confirm())
            .await
            .unwrap();
        assert_eq!(again.status, PaymentStatus::Completed);

        h.reconciler.side_effects().flush().await;
        assert_eq!(h.sinks.audits.lock().await.len(), 1);
        assert_eq!(h.sinks.notifications.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn stripe_confirm_while_in_flight_leaves_processing() {
        let h =
            harness_with(FixedGateway::new(PaymentMethod::Stripe, ProviderState::Processing)).await;
        h.reconciler
            .create_payment(&owner(), create_request(PaymentMethod::Stripe))
            .await
            .unwrap();
        let payment = h
            .reconciler
            .confirm_payment(
                &owner(),
                1,
                ConfirmPaymentRequest::Stripe {
                    payment_intent_id: "pi_1".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Processing);
    }

    #[tokio::test]
    async fn stripe_confirm_with_foreign_intent_fails_verification() {
        let h = harness().await;
        h.reconciler
            .create_payment(&owner(), create_request(PaymentMethod::Stripe))
            .await
            .unwrap();
        let err = h
            .reconciler
            .confirm_payment(
                &owner(),
                1,
                ConfirmPaymentRequest::Stripe {
                    payment_intent_id: "pi_other".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::PaymentVerificationFailed { .. }));
        let stored = h.store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Processing);
    }

    #[tokio::test]
    async fn razorpay_confirm_with_valid_signature_completes() {
        let h = harness().await;
        h.reconciler
            .create_payment(&owner(), create_request(PaymentMethod::Razorpay))
            .await
            .unwrap();
        let signature = hmac_sha256_hex(b"order_1|pay_77", "rzp_key_secret").unwrap();
        let payment = h
            .reconciler
            .confirm_payment(
                &owner(),
                1,
                ConfirmPaymentRequest::Razorpay {
                    razorpay_order_id: "order_1".to_string(),
                    razorpay_payment_id: "pay_77".to_string(),
                    razorpay_signature: signature,
                },
            )
            .await
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.transaction_id.as_deref(), Some("pay_77"));
    }

    #[tokio::test]
    async fn razorpay_confirm_with_bad_signature_marks_failed() {
        let h = harness().await;
        h.reconciler
            .create_payment(&owner(), create_request(PaymentMethod::Razorpay))
            .await
            .unwrap();
        let err = h
            .reconciler
            .confirm_payment(
                &owner(),
                1,
                ConfirmPaymentRequest::Razorpay {
                    razorpay_order_id: "order_1".to_string(),
                    razorpay_payment_id: "pay_77".to_string(),
                    razorpay_signature: "forged".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::PaymentVerificationFailed { .. }));

        let stored = h.store.find_by_id(1).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);
        assert!(stored.transaction_id.is_none());

        h.reconciler.side_effects().flush().await;
        assert_eq!(h.sinks.audits.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn pending_payment_cannot_be_confirmed() {
        let mut gateway = FixedGateway::new(PaymentMethod::Stripe, ProviderState::Completed);
        gateway.fail_create = true;
        let h = harness_with(gateway).await;
        let _ = h
            .reconciler
            .create_payment(&owner(), create_request(PaymentMethod::Stripe))
            .await;

        let err = h
            .reconciler
            .confirm_payment(
                &owner(),
                1,
                ConfirmPaymentRequest::Stripe {
                    payment_intent_id: "pi_1".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PaymentError::PaymentNotConfirmable {
                status: PaymentStatus::Pending,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn list_scopes_applicants_to_their_own_payments() {
        let h = harness().await;
        h.reconciler
            .create_payment(&owner(), create_request(PaymentMethod::Stripe))
            .await
            .unwrap();
        h.reconciler
            .create_payment(
                &Caller::new(1, UserRole::Admin),
                create_request(PaymentMethod::Stripe),
            )
            .await
            .unwrap();

        assert_eq!(h.reconciler.list_payments(&owner()).await.unwrap().len(), 1);
        assert_eq!(
            h.reconciler
                .list_payments(&Caller::new(2, UserRole::Consultant))
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn unmatched_webhook_reference_is_reported_masked() {
        let h = harness().await;
        let body = json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": {
                "id": "pay_unknown",
                "order_id": "order_NotOursAtAll123",
            } } }
        })
        .to_string();
        let signature = hmac_sha256_hex(body.as_bytes(), "rzp_webhook_secret").unwrap();

        let err = h
            .reconciler
            .handle_razorpay_webhook(body.as_bytes(), Some(&signature))
            .await
            .unwrap_err();
        match err {
            PaymentError::PaymentNotFound { reference } => {
                assert_eq!(reference, "razorpay:order_****");
                assert!(!reference.contains("NotOursAtAll123"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
