//! Shared harness for the HTTP-level tests: the real router over the
//! in-memory store, stub gateways and sinks that record what they receive.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, Router};
use hmac::{Hmac, Mac};
use http::{Request, StatusCode};
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::util::ServiceExt;

use visa_payments::api::{router, AppState};
use visa_payments::database::memory::{InMemoryApplicationDirectory, InMemoryPaymentStore};
use visa_payments::health::HealthChecker;
use visa_payments::payments::error::{PaymentError, PaymentResult};
use visa_payments::payments::provider::PaymentGateway;
use visa_payments::payments::providers::{RazorpayConfig, StripeConfig};
use visa_payments::payments::types::{
    IntentRequest, PaymentMethod, ProviderIntent, ProviderState, ProviderStatus,
};
use visa_payments::payments::{PaymentGateways, SignatureVerifier};
use visa_payments::services::notification::{
    AuditEntry, AuditSink, NotificationSink, SinkError, UserNotification,
};
use visa_payments::services::PaymentReconciler;
use visa_payments::workers::SideEffectDispatcher;

pub const STRIPE_WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const RAZORPAY_KEY_ID: &str = "rzp_test_key";
pub const RAZORPAY_KEY_SECRET: &str = "rzp_test_key_secret";
pub const RAZORPAY_WEBHOOK_SECRET: &str = "rzp_test_webhook_secret";
pub const WEBHOOK_MAX_BODY_BYTES: usize = 64 * 1024;

/// Application 3 belongs to user 7.
pub const APPLICATION_ID: i64 = 3;
pub const OWNER_ID: i64 = 7;

#[derive(Default)]
pub struct RecordingSinks {
    pub audits: Mutex<Vec<AuditEntry>>,
    pub notifications: Mutex<Vec<UserNotification>>,
}

#[async_trait]
impl AuditSink for RecordingSinks {
    async fn log(&self, entry: AuditEntry) -> Result<(), SinkError> {
        self.audits.lock().await.push(entry);
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for RecordingSinks {
    async fn notify(&self, notification: UserNotification) -> Result<(), SinkError> {
        self.notifications.lock().await.push(notification);
        Ok(())
    }
}

/// Gateway that never leaves the process. References are derived from the
/// local payment id: `pi_test_{id}` and `order_test_{id}`.
pub struct StubGateway {
    method: PaymentMethod,
    state: std::sync::Mutex<ProviderState>,
    fail_create: std::sync::atomic::AtomicBool,
    pub create_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

impl StubGateway {
    pub fn new(method: PaymentMethod) -> Self {
        Self {
            method,
            state: std::sync::Mutex::new(ProviderState::Processing),
            fail_create: std::sync::atomic::AtomicBool::new(false),
            create_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_state(&self, state: ProviderState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn fail_next_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    fn is_configured(&self) -> bool {
        true
    }

    async fn create_intent(&self, request: IntentRequest) -> PaymentResult<ProviderIntent> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.swap(false, Ordering::SeqCst) {
            return Err(PaymentError::ProviderRequestFailed {
                provider: self.method.to_string(),
                message: "upstream returned 500".to_string(),
                status_code: Some(500),
            });
        }
        Ok(match self.method {
            PaymentMethod::Stripe => ProviderIntent {
                external_ref: format!("pi_test_{}", request.payment_id),
                client_secret: Some(format!("pi_test_{}_secret_abc", request.payment_id)),
                public_key: None,
                provider_status: "requires_payment_method".to_string(),
            },
            PaymentMethod::Razorpay => ProviderIntent {
                external_ref: format!("order_test_{}", request.payment_id),
                client_secret: None,
                public_key: Some(RAZORPAY_KEY_ID.to_string()),
                provider_status: "created".to_string(),
            },
        })
    }

    async fn fetch_status(&self, _external_ref: &str) -> PaymentResult<ProviderStatus> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let state = *self.state.lock().unwrap();
        let provider_status = match state {
            ProviderState::Completed => "succeeded",
            ProviderState::Failed => "canceled",
            ProviderState::Processing => "processing",
        };
        Ok(ProviderStatus {
            state,
            provider_status: provider_status.to_string(),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: InMemoryPaymentStore,
    pub applications: InMemoryApplicationDirectory,
    pub sinks: Arc<RecordingSinks>,
    pub dispatcher: SideEffectDispatcher,
    pub stripe: Arc<StubGateway>,
    pub razorpay: Arc<StubGateway>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestApp {
    pub async fn new() -> Self {
        let store = InMemoryPaymentStore::new();
        let applications = InMemoryApplicationDirectory::new();
        applications.insert(APPLICATION_ID, OWNER_ID).await;

        let sinks = Arc::new(RecordingSinks::default());
        let (dispatcher, _worker) = SideEffectDispatcher::spawn(64, sinks.clone(), sinks.clone());

        let stripe = Arc::new(StubGateway::new(PaymentMethod::Stripe));
        let razorpay = Arc::new(StubGateway::new(PaymentMethod::Razorpay));
        let gateways = PaymentGateways::new()
            .with_gateway(stripe.clone())
            .with_gateway(razorpay.clone());

        let verifier = SignatureVerifier::new(
            &StripeConfig {
                webhook_secret: Some(STRIPE_WEBHOOK_SECRET.to_string()),
                ..StripeConfig::default()
            },
            &RazorpayConfig {
                key_id: Some(RAZORPAY_KEY_ID.to_string()),
                key_secret: Some(RAZORPAY_KEY_SECRET.to_string()),
                webhook_secret: Some(RAZORPAY_WEBHOOK_SECRET.to_string()),
                ..RazorpayConfig::default()
            },
        );

        let reconciler = Arc::new(PaymentReconciler::new(
            Arc::new(store.clone()),
            Arc::new(applications.clone()),
            gateways.clone(),
            verifier,
            dispatcher.clone(),
        ));
        let state = AppState {
            reconciler,
            health: HealthChecker::new(None, gateways.configured_methods()),
        };

        Self {
            router: router(state, WEBHOOK_MAX_BODY_BYTES),
            store,
            applications,
            sinks,
            dispatcher,
            stripe,
            razorpay,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse { status, body }
    }

    pub async fn post_json(&self, uri: &str, caller: Option<(i64, &str)>, body: Value) -> TestResponse {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some((user_id, role)) = caller {
            builder = builder
                .header("x-user-id", user_id.to_string())
                .header("x-user-role", role);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn get(&self, uri: &str, caller: Option<(i64, &str)>) -> TestResponse {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some((user_id, role)) = caller {
            builder = builder
                .header("x-user-id", user_id.to_string())
                .header("x-user-role", role);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_webhook(
        &self,
        uri: &str,
        signature_header: &str,
        signature: Option<&str>,
        body: Vec<u8>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header(signature_header, signature);
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    /// Creates a payment for the application owner and returns the response body.
    pub async fn create_payment(&self, method: &str, amount: Value) -> Value {
        let response = self
            .post_json(
                "/api/payments",
                Some((OWNER_ID, "applicant")),
                json!({
                    "application_id": APPLICATION_ID,
                    "amount": amount,
                    "method": method,
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.body);
        response.body
    }

    /// Waits for queued audit/notification work to finish.
    pub async fn settle(&self) {
        self.dispatcher.flush().await;
    }

    pub async fn audit_count(&self) -> usize {
        self.sinks.audits.lock().await.len()
    }

    pub async fn notification_count(&self) -> usize {
        self.sinks.notifications.lock().await.len()
    }
}

pub fn hmac_hex(payload: &[u8], secret: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// `Stripe-Signature` header value for `body` signed at `timestamp`.
pub fn stripe_signature(body: &[u8], secret: &str, timestamp: i64) -> String {
    let mut signed = format!("{}.", timestamp).into_bytes();
    signed.extend_from_slice(body);
    format!("t={},v1={}", timestamp, hmac_hex(&signed, secret))
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn stripe_event(event_id: &str, event_type: &str, intent_id: &str, status: &str) -> Vec<u8> {
    json!({
        "id": event_id,
        "object": "event",
        "type": event_type,
        "data": {
            "object": {
                "id": intent_id,
                "object": "payment_intent",
                "status": status,
                "amount": 16000,
                "currency": "usd",
            }
        }
    })
    .to_string()
    .into_bytes()
}

pub fn razorpay_event(event: &str, order_id: &str, payment_id: &str, status: &str) -> Vec<u8> {
    json!({
        "entity": "event",
        "event": event,
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "order_id": order_id,
                    "status": status,
                    "amount": 16000,
                    "currency": "INR",
                }
            }
        }
    })
    .to_string()
    .into_bytes()
}
