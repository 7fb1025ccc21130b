//! Authenticity checks for provider callbacks.
//!
//! Every check runs on the exact bytes received. Nothing here parses a body
//! before its signature has been verified.

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::providers::razorpay::{checkout_payload, RazorpayWebhookEvent};
use crate::payments::providers::stripe::StripeWebhookEvent;
use crate::payments::providers::{RazorpayConfig, StripeConfig};
use crate::payments::utils::{hmac_sha256_hex, secure_eq, verify_hmac_sha256_hex};

pub const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";
pub const RAZORPAY_SIGNATURE_HEADER: &str = "x-razorpay-signature";

#[derive(Debug, Clone, Default)]
pub struct SignatureVerifier {
    stripe_webhook_secret: Option<String>,
    stripe_tolerance_secs: i64,
    razorpay_key_secret: Option<String>,
    razorpay_webhook_secret: Option<String>,
}

impl SignatureVerifier {
    pub fn new(stripe: &StripeConfig, razorpay: &RazorpayConfig) -> Self {
        Self {
            stripe_webhook_secret: stripe.webhook_secret.clone(),
            stripe_tolerance_secs: stripe.webhook_tolerance_secs,
            razorpay_key_secret: razorpay.key_secret.clone(),
            razorpay_webhook_secret: razorpay.webhook_secret.clone(),
        }
    }

    /// Checkout callback: `HMAC_SHA256(order_id|payment_id, key_secret)`.
    pub fn verify_razorpay_checkout(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> PaymentResult<()> {
        let secret = self
            .razorpay_key_secret
            .as_deref()
            .ok_or_else(|| unconfigured("razorpay"))?;
        let payload = checkout_payload(order_id, payment_id);
        if verify_hmac_sha256_hex(payload.as_bytes(), secret, signature) {
            Ok(())
        } else {
            Err(PaymentError::SignatureInvalid {
                reason: "checkout signature mismatch".to_string(),
            })
        }
    }

    /// Webhook: HMAC-SHA256 of the raw body with the webhook secret, which is
    /// distinct from the API key secret.
    pub fn verify_razorpay_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> PaymentResult<RazorpayWebhookEvent> {
        let secret = self
            .razorpay_webhook_secret
            .as_deref()
            .ok_or_else(|| unconfigured("razorpay"))?;
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PaymentError::SignatureInvalid {
                reason: "missing X-Razorpay-Signature header".to_string(),
            })?;
        if !verify_hmac_sha256_hex(body, secret, signature) {
            return Err(PaymentError::SignatureInvalid {
                reason: "webhook signature mismatch".to_string(),
            });
        }
        RazorpayWebhookEvent::from_slice(body)
    }

    /// Verifies the `Stripe-Signature` envelope against the current time and
    /// decodes the event.
    pub fn construct_stripe_event(
        &self,
        body: &[u8],
        header: Option<&str>,
    ) -> PaymentResult<StripeWebhookEvent> {
        self.construct_stripe_event_at(body, header, chrono::Utc::now().timestamp())
    }

    pub fn construct_stripe_event_at(
        &self,
        body: &[u8],
        header: Option<&str>,
        now: i64,
    ) -> PaymentResult<StripeWebhookEvent> {
        let secret = self
            .stripe_webhook_secret
            .as_deref()
            .ok_or_else(|| unconfigured("stripe"))?;
        let header = header
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| PaymentError::SignatureInvalid {
                reason: "missing Stripe-Signature header".to_string(),
            })?;

        let parsed = StripeSignatureHeader::parse(header)?;
        if now.abs_diff(parsed.timestamp) > self.stripe_tolerance_secs.unsigned_abs() {
            return Err(PaymentError::SignatureInvalid {
                reason: format!(
                    "timestamp {} outside tolerance of {}s",
                    parsed.timestamp, self.stripe_tolerance_secs
                ),
            });
        }

        let mut signed_payload = format!("{}.", parsed.timestamp).into_bytes();
        signed_payload.extend_from_slice(body);
        let expected = hmac_sha256_hex(&signed_payload, secret)?;
        let matched = parsed
            .signatures
            .iter()
            .any(|candidate| secure_eq(expected.as_bytes(), candidate.as_bytes()));
        if !matched {
            return Err(PaymentError::SignatureInvalid {
                reason: "no v1 signature matched".to_string(),
            });
        }

        StripeWebhookEvent::from_slice(body)
    }
}

fn unconfigured(provider: &str) -> PaymentError {
    PaymentError::ProviderUnconfigured {
        provider: provider.to_string(),
    }
}

#[derive(Debug, PartialEq)]
struct StripeSignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

impl StripeSignatureHeader {
    /// `t=1492774577,v1=5257a869...,v0=...`; unknown schemes are ignored.
    fn parse(header: &str) -> PaymentResult<Self> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => timestamp = value.parse::<i64>().ok(),
                "v1" => signatures.push(value.to_string()),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| PaymentError::SignatureInvalid {
            reason: "signature header has no timestamp".to_string(),
        })?;
        if signatures.is_empty() {
            return Err(PaymentError::SignatureInvalid {
                reason: "signature header has no v1 signature".to_string(),
            });
        }
        Ok(Self {
            timestamp,
            signatures,
        })
    }
}
