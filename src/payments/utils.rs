use crate::payments::error::{PaymentError, PaymentResult};
use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use sha2::Sha256;
use std::time::Duration;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Copy)]
pub enum HttpAuth<'a> {
    Bearer(&'a str),
    Basic { username: &'a str, password: &'a str },
}

#[derive(Clone, Copy)]
pub enum RequestBody<'a> {
    Empty,
    Json(&'a JsonValue),
    Form(&'a [(String, String)]),
}

#[derive(Clone)]
pub struct PaymentHttpClient {
    provider: &'static str,
    client: Client,
    timeout: Duration,
    max_retries: u32,
}

impl PaymentHttpClient {
    pub fn new(provider: &'static str, timeout: Duration, max_retries: u32) -> PaymentResult<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            PaymentError::request_failed(
                provider,
                format!("failed to initialize HTTP client: {}", e),
                None,
            )
        })?;

        Ok(Self {
            provider,
            client,
            timeout,
            max_retries,
        })
    }

    /// Sends one request and decodes the JSON body.
    ///
    /// Transport errors and 5xx/429 answers are retried up to `max_retries`
    /// times with exponential backoff; with the default of zero a single
    /// attempt is made.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        auth: HttpAuth<'_>,
        body: RequestBody<'_>,
    ) -> PaymentResult<T> {
        let mut attempt = 0;
        loop {
            let mut request = self
                .client
                .request(method.clone(), url)
                .timeout(self.timeout);

            request = match auth {
                HttpAuth::Bearer(token) => request.bearer_auth(token),
                HttpAuth::Basic { username, password } => {
                    request.basic_auth(username, Some(password))
                }
            };
            request = match body {
                RequestBody::Empty => request,
                RequestBody::Json(payload) => request.json(payload),
                RequestBody::Form(fields) => request.form(fields),
            };

            let error = match request.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let text = resp.text().await.map_err(|e| {
                        PaymentError::invalid_response(
                            self.provider,
                            format!("failed to read response body: {}", e),
                        )
                    })?;

                    if status.is_success() {
                        return serde_json::from_str::<T>(&text).map_err(|e| {
                            PaymentError::invalid_response(
                                self.provider,
                                format!("invalid provider JSON response: {}", e),
                            )
                        });
                    }

                    let code = provider_error_code(&text);
                    warn!(
                        provider = self.provider,
                        status = status.as_u16(),
                        code = code.as_deref().unwrap_or("-"),
                        body = %truncate_for_log(&text),
                        "provider rejected request"
                    );
                    let message = match code {
                        Some(code) => format!("HTTP {} ({})", status.as_u16(), code),
                        None => format!("HTTP {}", status.as_u16()),
                    };
                    PaymentError::request_failed(self.provider, message, Some(status.as_u16()))
                }
                Err(e) => PaymentError::request_failed(
                    self.provider,
                    format!("provider request failed: {}", e),
                    None,
                ),
            };

            if !error.is_retryable() || attempt >= self.max_retries {
                return Err(error);
            }
            warn!(
                provider = self.provider,
                attempt = attempt + 1,
                error = %error,
                "provider call failed, retrying"
            );
            tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
            attempt += 1;
        }
    }
}

const LOGGED_BODY_LIMIT: usize = 256;

/// The machine-readable code from a provider error body. Stripe and Razorpay
/// both nest it under `error`; Stripe falls back to `error.type`.
pub fn provider_error_code(body: &str) -> Option<String> {
    let value: JsonValue = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .get("code")
        .or_else(|| error.get("type"))
        .and_then(JsonValue::as_str)
        .filter(|code| !code.is_empty())
        .map(|code| code.chars().take(64).collect())
}

fn truncate_for_log(body: &str) -> String {
    if body.chars().count() <= LOGGED_BODY_LIMIT {
        body.to_string()
    } else {
        let head: String = body.chars().take(LOGGED_BODY_LIMIT).collect();
        format!("{}...", head)
    }
}

/// Lowercase hex HMAC-SHA256 of `payload`.
pub fn hmac_sha256_hex(payload: &[u8], secret: &str) -> PaymentResult<String> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| PaymentError::SignatureInvalid {
            reason: format!("invalid HMAC key: {}", e),
        })?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_hmac_sha256_hex(payload: &[u8], secret: &str, signature: &str) -> bool {
    match hmac_sha256_hex(payload, secret) {
        Ok(computed) => secure_eq(computed.as_bytes(), signature.trim().as_bytes()),
        Err(_) => false,
    }
}

pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Converts a major-unit amount to the integer minor units both providers
/// expect. Rounds half-up to cents first, then multiplies by 100 regardless
/// of currency, so zero-decimal currencies are over-scaled.
pub fn to_minor_units(amount: &BigDecimal) -> PaymentResult<i64> {
    let minor = amount.with_scale_round(2, RoundingMode::HalfUp) * BigDecimal::from(100);
    minor
        .with_scale(0)
        .to_i64()
        .ok_or_else(|| PaymentError::Validation {
            message: format!("amount out of range: {}", amount),
            field: Some("amount".to_string()),
        })
}
