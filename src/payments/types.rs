use crate::payments::error::PaymentError;
use crate::payments::state::PaymentStatus;
use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{DateTime, Utc};
use crate::logging::mask_secret;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

pub const DEFAULT_CURRENCY: &str = "USD";

// ISO 4217 alpha code
static CURRENCY_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z]{3}$").expect("currency pattern compiles"));

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Stripe,
    Razorpay,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Stripe => "stripe",
            PaymentMethod::Razorpay => "razorpay",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "stripe" => Ok(PaymentMethod::Stripe),
            "razorpay" => Ok(PaymentMethod::Razorpay),
            _ => Err(PaymentError::Validation {
                message: format!("unsupported payment method: {}", value),
                field: Some("method".to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    Consultant,
    Applicant,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Consultant => "consultant",
            UserRole::Applicant => "applicant",
        }
    }
}

impl FromStr for UserRole {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "consultant" => Ok(UserRole::Consultant),
            "applicant" => Ok(UserRole::Applicant),
            _ => Err(PaymentError::Validation {
                message: format!("unknown role: {}", value),
                field: Some("role".to_string()),
            }),
        }
    }
}

/// Authenticated identity of whoever is calling the payment API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: i64,
    pub role: UserRole,
}

impl Caller {
    pub fn new(user_id: i64, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.role, UserRole::Admin | UserRole::Consultant)
    }
}

/// A provider-side identifier that the local record is indexed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExternalRef {
    StripeIntent(String),
    RazorpayOrder(String),
}

impl ExternalRef {
    pub fn for_method(method: PaymentMethod, value: impl Into<String>) -> Self {
        match method {
            PaymentMethod::Stripe => ExternalRef::StripeIntent(value.into()),
            PaymentMethod::Razorpay => ExternalRef::RazorpayOrder(value.into()),
        }
    }

    pub fn method(&self) -> PaymentMethod {
        match self {
            ExternalRef::StripeIntent(_) => PaymentMethod::Stripe,
            ExternalRef::RazorpayOrder(_) => PaymentMethod::Razorpay,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ExternalRef::StripeIntent(v) | ExternalRef::RazorpayOrder(v) => v,
        }
    }
}

impl ExternalRef {
    /// Provider-prefixed form with the identifier cut to a short prefix, for
    /// log lines and error messages.
    pub fn masked(&self) -> String {
        format!("{}:{}", self.method(), mask_secret(self.as_str()))
    }
}

impl std::fmt::Display for ExternalRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.method(), self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub id: i64,
    pub application_id: i64,
    pub user_id: i64,
    pub amount: BigDecimal,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub razorpay_order_id: Option<String>,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// The provider reference matching `method`, if one was assigned.
    pub fn external_ref(&self) -> Option<ExternalRef> {
        let value = match self.method {
            PaymentMethod::Stripe => self.payment_intent_id.as_ref(),
            PaymentMethod::Razorpay => self.razorpay_order_id.as_ref(),
        }?;
        Some(ExternalRef::for_method(self.method, value.clone()))
    }

    pub fn has_consistent_reference(&self) -> bool {
        match self.method {
            PaymentMethod::Stripe => self.razorpay_order_id.is_none(),
            PaymentMethod::Razorpay => self.payment_intent_id.is_none(),
        }
    }

    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.user_id == user_id
    }
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub application_id: i64,
    pub user_id: i64,
    pub amount: BigDecimal,
    pub currency: String,
    pub method: PaymentMethod,
    pub metadata: JsonValue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePaymentRequest {
    pub application_id: i64,
    #[serde(deserialize_with = "deserialize_amount")]
    pub amount: BigDecimal,
    #[serde(default)]
    pub currency: Option<String>,
    pub method: PaymentMethod,
}

/// Provider-specific proof supplied by the client after checkout.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConfirmPaymentRequest {
    Razorpay {
        razorpay_order_id: String,
        razorpay_payment_id: String,
        razorpay_signature: String,
    },
    Stripe {
        payment_intent_id: String,
    },
}

impl ConfirmPaymentRequest {
    pub fn method(&self) -> PaymentMethod {
        match self {
            ConfirmPaymentRequest::Stripe { .. } => PaymentMethod::Stripe,
            ConfirmPaymentRequest::Razorpay { .. } => PaymentMethod::Razorpay,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreatePaymentResponse {
    pub payment_id: i64,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_intent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub razorpay_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub razorpay_key_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub payment_id: i64,
    pub amount: BigDecimal,
    pub currency: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderIntent {
    pub external_ref: String,
    pub client_secret: Option<String>,
    /// Public identifier the client needs to open checkout, when the provider has one.
    pub public_key: Option<String>,
    pub provider_status: String,
}

/// Provider status folded into the vocabulary the state machine understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderStatus {
    pub state: ProviderState,
    pub provider_status: String,
}

pub fn normalize_currency(currency: Option<&str>) -> Result<String, PaymentError> {
    let code = match currency.map(str::trim) {
        None | Some("") => return Ok(DEFAULT_CURRENCY.to_string()),
        Some(code) => code.to_uppercase(),
    };
    if !CURRENCY_CODE.is_match(&code) {
        return Err(PaymentError::Validation {
            message: format!("invalid currency code: {}", code),
            field: Some("currency".to_string()),
        });
    }
    Ok(code)
}

/// Largest accepted amount is just under 10^12 major units.
const MAX_AMOUNT_INTEGER_DIGITS: i64 = 12;
const MAX_AMOUNT_SCALE: i64 = 32;

/// Bounds the magnitude and precision of an amount using only its digit
/// count and exponent, so no rescaling happens on hostile input.
fn check_amount_bounds(amount: &BigDecimal) -> Result<(), PaymentError> {
    let (_, scale) = amount.as_bigint_and_exponent();
    if scale > MAX_AMOUNT_SCALE {
        return Err(PaymentError::Validation {
            message: "amount has too many decimal places".to_string(),
            field: Some("amount".to_string()),
        });
    }
    let integer_digits = (amount.digits() as i64).saturating_sub(scale);
    if integer_digits > MAX_AMOUNT_INTEGER_DIGITS {
        return Err(PaymentError::Validation {
            message: "amount exceeds the maximum allowed".to_string(),
            field: Some("amount".to_string()),
        });
    }
    Ok(())
}

/// Rejects non-positive or out-of-range amounts and normalises to two
/// decimal places.
pub fn normalize_amount(amount: &BigDecimal) -> Result<BigDecimal, PaymentError> {
    check_amount_bounds(amount)?;
    if *amount <= BigDecimal::from(0) {
        return Err(PaymentError::Validation {
            message: "amount must be greater than zero".to_string(),
            field: Some("amount".to_string()),
        });
    }
    let rounded = amount.with_scale_round(2, RoundingMode::HalfUp);
    if rounded <= BigDecimal::from(0) {
        return Err(PaymentError::Validation {
            message: "amount must be at least 0.01".to_string(),
            field: Some("amount".to_string()),
        });
    }
    Ok(rounded)
}

/// Accepts `160`, `160.00` or `"160.00"` without going through `f64`.
fn deserialize_amount<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let raw = JsonValue::deserialize(deserializer)?;
    let text = match raw {
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s,
        other => {
            return Err(D::Error::custom(format!(
                "amount must be a number, got {}",
                other
            )))
        }
    };
    BigDecimal::from_str(text.trim())
        .map_err(|_| D::Error::custom(format!("invalid decimal amount: {}", text)))
}
