use crate::logging::mask_secret;
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentGateway;
use crate::payments::providers::stripe::non_empty_env;
use crate::payments::types::{
    IntentRequest, PaymentMethod, ProviderIntent, ProviderState, ProviderStatus,
};
use crate::payments::utils::{
    hmac_sha256_hex, to_minor_units, HttpAuth, PaymentHttpClient, RequestBody,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::time::Duration;
use tracing::info;

const PROVIDER: &str = "razorpay";

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: Option<String>,
    pub key_secret: Option<String>,
    pub webhook_secret: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for RazorpayConfig {
    fn default() -> Self {
        Self {
            key_id: None,
            key_secret: None,
            webhook_secret: None,
            base_url: "https://api.razorpay.com/v1".to_string(),
            timeout_secs: 15,
            max_retries: 0,
        }
    }
}

impl RazorpayConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            key_id: non_empty_env("RAZORPAY_KEY_ID"),
            key_secret: non_empty_env("RAZORPAY_KEY_SECRET"),
            webhook_secret: non_empty_env("RAZORPAY_WEBHOOK_SECRET"),
            base_url: std::env::var("RAZORPAY_BASE_URL").unwrap_or(defaults.base_url),
            timeout_secs: std::env::var("RAZORPAY_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(defaults.timeout_secs),
            max_retries: std::env::var("PAYMENT_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(defaults.max_retries),
        }
    }
}

/// HMAC-SHA256 hex digest, the scheme Razorpay uses for both checkout
/// callbacks (`order_id|payment_id` with the key secret) and webhooks (raw
/// body with the webhook secret).
pub fn compute_signature(payload: &[u8], secret: &str) -> PaymentResult<String> {
    hmac_sha256_hex(payload, secret)
}

pub fn checkout_payload(order_id: &str, payment_id: &str) -> String {
    format!("{}|{}", order_id, payment_id)
}

pub struct RazorpayGateway {
    config: RazorpayConfig,
    http: PaymentHttpClient,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> PaymentResult<Self> {
        let http = PaymentHttpClient::new(
            PROVIDER,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
        )?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> PaymentResult<Self> {
        Self::new(RazorpayConfig::from_env())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn credentials(&self) -> PaymentResult<(&str, &str)> {
        match (
            self.config.key_id.as_deref(),
            self.config.key_secret.as_deref(),
        ) {
            (Some(key_id), Some(key_secret)) => Ok((key_id, key_secret)),
            _ => Err(PaymentError::ProviderUnconfigured {
                provider: PROVIDER.to_string(),
            }),
        }
    }

    fn order_payload(request: &IntentRequest) -> PaymentResult<JsonValue> {
        Ok(json!({
            "amount": to_minor_units(&request.amount)?,
            "currency": request.currency,
            "receipt": format!("payment_{}", request.payment_id),
            "notes": request.metadata,
        }))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Razorpay
    }

    fn is_configured(&self) -> bool {
        self.credentials().is_ok()
    }

    async fn create_intent(&self, request: IntentRequest) -> PaymentResult<ProviderIntent> {
        let (key_id, key_secret) = self.credentials()?;
        let payload = Self::order_payload(&request)?;

        let order: RazorpayOrder = self
            .http
            .request_json(
                reqwest::Method::POST,
                &self.endpoint("/orders"),
                HttpAuth::Basic {
                    username: key_id,
                    password: key_secret,
                },
                RequestBody::Json(&payload),
            )
            .await?;

        if order.id.trim().is_empty() {
            return Err(PaymentError::invalid_response(
                PROVIDER,
                "order id missing from response",
            ));
        }

        info!(
            payment_id = request.payment_id,
            provider = PROVIDER,
            order_id = %mask_secret(&order.id),
            status = %order.status,
            "razorpay order created"
        );

        Ok(ProviderIntent {
            external_ref: order.id,
            client_secret: None,
            public_key: Some(key_id.to_string()),
            provider_status: order.status,
        })
    }

    async fn fetch_status(&self, external_ref: &str) -> PaymentResult<ProviderStatus> {
        let (key_id, key_secret) = self.credentials()?;
        let order: RazorpayOrder = self
            .http
            .request_json(
                reqwest::Method::GET,
                &self.endpoint(&format!("/orders/{}", external_ref)),
                HttpAuth::Basic {
                    username: key_id,
                    password: key_secret,
                },
                RequestBody::Empty,
            )
            .await?;

        Ok(ProviderStatus {
            state: map_order_status(&order.status),
            provider_status: order.status,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RazorpayOrder {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Orders never fail on their own; a failed attempt leaves them `attempted`.
pub fn map_order_status(status: &str) -> ProviderState {
    match status {
        "paid" => ProviderState::Completed,
        _ => ProviderState::Processing,
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RazorpayPaymentEntity {
    pub id: String,
    pub order_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Razorpay nests the entity under `payment.entity`; older integrations and
/// test fixtures send it flat under `payment`.
#[derive(Deserialize)]
#[serde(untagged)]
enum PaymentEntityShape {
    Wrapped { entity: RazorpayPaymentEntity },
    Flat(RazorpayPaymentEntity),
}

impl From<PaymentEntityShape> for RazorpayPaymentEntity {
    fn from(shape: PaymentEntityShape) -> Self {
        match shape {
            PaymentEntityShape::Wrapped { entity } | PaymentEntityShape::Flat(entity) => entity,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RazorpayEventKind {
    PaymentCaptured(RazorpayPaymentEntity),
    PaymentFailed(RazorpayPaymentEntity),
    Unhandled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RazorpayWebhookEvent {
    pub event_type: String,
    pub kind: RazorpayEventKind,
}

impl RazorpayWebhookEvent {
    pub fn from_slice(body: &[u8]) -> PaymentResult<Self> {
        let raw: JsonValue =
            serde_json::from_slice(body).map_err(|e| PaymentError::InvalidPayload {
                message: format!("razorpay event is not valid JSON: {}", e),
            })?;
        let event_type = raw
            .get("event")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| PaymentError::InvalidEventType {
                message: "razorpay event has no event field".to_string(),
            })?;
        let payload = raw
            .get("payload")
            .filter(|p| p.is_object())
            .ok_or_else(|| PaymentError::InvalidPayload {
                message: "razorpay event has no payload object".to_string(),
            })?;

        let decode_payment = || {
            let payment = payload
                .get("payment")
                .cloned()
                .ok_or_else(|| PaymentError::InvalidPayload {
                    message: format!("{} has no payment entity", event_type),
                })?;
            serde_json::from_value::<PaymentEntityShape>(payment)
                .map(RazorpayPaymentEntity::from)
                .map_err(|e| PaymentError::InvalidPayload {
                    message: format!("malformed payment entity in {}: {}", event_type, e),
                })
        };

        let kind = match event_type.as_str() {
            "payment.captured" => RazorpayEventKind::PaymentCaptured(decode_payment()?),
            "payment.failed" => RazorpayEventKind::PaymentFailed(decode_payment()?),
            _ => RazorpayEventKind::Unhandled,
        };

        Ok(Self { event_type, kind })
    }
}
