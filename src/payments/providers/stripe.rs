use crate::logging::mask_secret;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentGateway;
use crate::payments::types::{
    IntentRequest, PaymentMethod, ProviderIntent, ProviderState, ProviderStatus,
};
use crate::payments::utils::{to_minor_units, HttpAuth, PaymentHttpClient, RequestBody};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::info;

const PROVIDER: &str = "stripe";

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: Option<String>,
    pub publishable_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub webhook_tolerance_secs: i64,
}

impl Default for StripeConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            publishable_key: None,
            webhook_secret: None,
            base_url: "https://api.stripe.com/v1".to_string(),
            timeout_secs: 15,
            max_retries: 0,
            webhook_tolerance_secs: 300,
        }
    }
}

impl StripeConfig {
    /// Missing keys are not an error here; the gateway reports itself as
    /// unconfigured when used.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            secret_key: non_empty_env("STRIPE_SECRET_KEY"),
            publishable_key: non_empty_env("STRIPE_PUBLISHABLE_KEY"),
            webhook_secret: non_empty_env("STRIPE_WEBHOOK_SECRET"),
            base_url: std::env::var("STRIPE_BASE_URL").unwrap_or(defaults.base_url),
            timeout_secs: std::env::var("STRIPE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(defaults.timeout_secs),
            max_retries: std::env::var("PAYMENT_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(defaults.max_retries),
            webhook_tolerance_secs: std::env::var("STRIPE_WEBHOOK_TOLERANCE_SECS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(defaults.webhook_tolerance_secs),
        }
    }
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub struct StripeGateway {
    config: StripeConfig,
    http: PaymentHttpClient,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> PaymentResult<Self> {
        let http = PaymentHttpClient::new(
            PROVIDER,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(StripeConfig::from_env())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn secret_key(&self) -> PaymentResult<&str> {
        self.config
            .secret_key
            .as_deref()
            .ok_or_else(|| PaymentError::ProviderUnconfigured {
                provider: PROVIDER.to_string(),
            })
    }

    fn intent_form(request: &IntentRequest) -> PaymentResult<Vec<(String, String)>> {
        let mut form = vec![
            ("amount".to_string(), to_minor_units(&request.amount)?.to_string()),
            ("currency".to_string(), request.currency.to_lowercase()),
        ];
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }
        Ok(form)
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Stripe
    }

    fn is_configured(&self) -> bool {
        self.config.secret_key.is_some()
    }

    async fn create_intent(&self, request: IntentRequest) -> PaymentResult<ProviderIntent> {
        let secret_key = self.secret_key()?;
        let form = Self::intent_form(&request)?;

        let intent: StripePaymentIntent = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/payment_intents"),
                HttpAuth::Bearer(secret_key),
                RequestBody::Form(&form),
            )
            .await?;

        if intent.id.trim().is_empty() {
            return Err(PaymentError::invalid_response(
                PROVIDER,
                "payment intent id missing from response",
            ));
        }
        if intent.client_secret.is_none() {
            return Err(PaymentError::invalid_response(
                PROVIDER,
                "client_secret missing from response",
            ));
        }

        info!(
            payment_id = request.payment_id,
            provider = PROVIDER,
            intent_id = %mask_secret(&intent.id),
            status = %intent.status,
            "stripe payment intent created"
        );

        Ok(ProviderIntent {
            external_ref: intent.id,
            client_secret: intent.client_secret,
            public_key: self.config.publishable_key.clone(),
            provider_status: intent.status,
        })
    }

    async fn fetch_status(&self, external_ref: &str) -> PaymentResult<ProviderStatus> {
        let secret_key = self.secret_key()?;
        let intent: StripePaymentIntent = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/payment_intents/{}", external_ref)),
                HttpAuth::Bearer(secret_key),
                RequestBody::Empty,
            )
            .await?;

        if intent.id != external_ref {
            return Err(PaymentError::invalid_response(
                PROVIDER,
                format!("requested intent {} but received {}", external_ref, intent.id),
            ));
        }

        Ok(ProviderStatus {
            state: intent.state(),
            provider_status: intent.status,
        })
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StripePaymentIntent {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub latest_charge: Option<String>,
    #[serde(default)]
    pub last_payment_error: Option<JsonValue>,
}

impl StripePaymentIntent {
    pub fn state(&self) -> ProviderState {
        map_intent_status(&self.status, self.last_payment_error.is_some())
    }

    pub fn failure_message(&self) -> Option<String> {
        self.last_payment_error
            .as_ref()
            .and_then(|e| e.get("message"))
            .and_then(JsonValue::as_str)
            .map(str::to_string)
    }
}

/// `requires_payment_method` is the status both before the first attempt and
/// after a declined one; only the latter carries `last_payment_error`.
pub fn map_intent_status(status: &str, has_payment_error: bool) -> ProviderState {
    match status {
        "succeeded" => ProviderState::Completed,
        "canceled" => ProviderState::Failed,
        "requires_payment_method" if has_payment_error => ProviderState::Failed,
        _ => ProviderState::Processing,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StripeEventKind {
    PaymentIntentSucceeded(StripePaymentIntent),
    PaymentIntentFailed(StripePaymentIntent),
    PaymentIntentCanceled(StripePaymentIntent),
    Unhandled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StripeWebhookEvent {
    pub id: String,
    pub event_type: String,
    pub kind: StripeEventKind,
}

#[derive(Deserialize)]
struct StripeEventEnvelope {
    id: String,
    data: StripeEventData,
}

#[derive(Deserialize)]
struct StripeEventData {
    object: JsonValue,
}

impl StripeWebhookEvent {
    /// Decodes a verified event body. The event type is read first and only
    /// the kinds the reconciler acts on are decoded further.
    pub fn from_slice(body: &[u8]) -> PaymentResult<Self> {
        let raw: JsonValue =
            serde_json::from_slice(body).map_err(|e| PaymentError::InvalidPayload {
                message: format!("stripe event is not valid JSON: {}", e),
            })?;
        let event_type = raw
            .get("type")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| PaymentError::InvalidEventType {
                message: "stripe event has no type".to_string(),
            })?;
        let envelope: StripeEventEnvelope =
            serde_json::from_value(raw).map_err(|e| PaymentError::InvalidPayload {
                message: format!("malformed stripe event: {}", e),
            })?;

        let decode_intent = |object: JsonValue| {
            serde_json::from_value::<StripePaymentIntent>(object).map_err(|e| {
                PaymentError::InvalidPayload {
                    message: format!("malformed payment intent in {}: {}", event_type, e),
                }
            })
        };

        let kind = match event_type.as_str() {
            "payment_intent.succeeded" => {
                StripeEventKind::PaymentIntentSucceeded(decode_intent(envelope.data.object)?)
            }
            "payment_intent.payment_failed" => {
                StripeEventKind::PaymentIntentFailed(decode_intent(envelope.data.object)?)
            }
            "payment_intent.canceled" => {
                StripeEventKind::PaymentIntentCanceled(decode_intent(envelope.data.object)?)
            }
            _ => StripeEventKind::Unhandled,
        };

        Ok(Self {
            id: envelope.id,
            event_type,
            kind,
        })
    }
}
