//! Real provider gateways against a mocked HTTP API.

use bigdecimal::BigDecimal;
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;
use wiremock::matchers::{
    basic_auth, bearer_token, body_partial_json, body_string_contains, method, path,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

use visa_payments::payments::error::PaymentError;
use visa_payments::payments::provider::PaymentGateway;
use visa_payments::payments::providers::{
    RazorpayConfig, RazorpayGateway, StripeConfig, StripeGateway,
};
use visa_payments::payments::types::{IntentRequest, ProviderState};

fn intent_request(currency: &str) -> IntentRequest {
    let mut metadata = BTreeMap::new();
    metadata.insert("application_id".to_string(), "3".to_string());
    IntentRequest {
        payment_id: 1,
        amount: BigDecimal::from_str("160.00").unwrap(),
        currency: currency.to_string(),
        metadata,
    }
}

fn stripe(server: &MockServer) -> StripeGateway {
    StripeGateway::new(StripeConfig {
        secret_key: Some("sk_test_123".to_string()),
        publishable_key: Some("pk_test_123".to_string()),
        base_url: server.uri(),
        ..StripeConfig::default()
    })
    .unwrap()
}

fn razorpay(server: &MockServer) -> RazorpayGateway {
    RazorpayGateway::new(RazorpayConfig {
        key_id: Some("rzp_test_key".to_string()),
        key_secret: Some("rzp_test_secret".to_string()),
        base_url: server.uri(),
        ..RazorpayConfig::default()
    })
    .unwrap()
}

#[tokio::test]
async fn stripe_intent_is_created_in_minor_units() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payment_intents"))
        .and(bearer_token("sk_test_123"))
        .and(body_string_contains("amount=16000"))
        .and(body_string_contains("currency=usd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_123",
            "object": "payment_intent",
            "status": "requires_payment_method",
            "client_secret": "pi_123_secret_456",
            "amount": 16000,
            "currency": "usd",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let intent = stripe(&server)
        .create_intent(intent_request("USD"))
        .await
        .unwrap();

    assert_eq!(intent.external_ref, "pi_123");
    assert_eq!(intent.client_secret.as_deref(), Some("pi_123_secret_456"));
    assert_eq!(intent.public_key.as_deref(), Some("pk_test_123"));
    assert_eq!(intent.provider_status, "requires_payment_method");
}

#[tokio::test]
async fn stripe_without_secret_key_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let gateway = StripeGateway::new(StripeConfig {
        base_url: server.uri(),
        ..StripeConfig::default()
    })
    .unwrap();
    assert!(!gateway.is_configured());

    let err = gateway
        .create_intent(intent_request("USD"))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::ProviderUnconfigured { .. }));
}

#[tokio::test]
async fn stripe_error_status_is_a_request_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/payment_intents"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": {
                "type": "card_error",
                "code": "card_declined",
                "message": "Your card was declined."
            }
        })))
        .mount(&server)
        .await;

    let err = stripe(&server)
        .create_intent(intent_request("USD"))
        .await
        .unwrap_err();
    match err {
        PaymentError::ProviderRequestFailed {
            status_code,
            message,
            ..
        } => {
            assert_eq!(status_code, Some(402));
            assert_eq!(message, "HTTP 402 (card_declined)");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn stripe_declined_intent_is_reported_failed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/payment_intents/pi_123"))
        .and(bearer_token("sk_test_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_123",
            "status": "requires_payment_method",
            "last_payment_error": { "message": "Your card was declined." },
        })))
        .mount(&server)
        .await;

    let status = stripe(&server).fetch_status("pi_123").await.unwrap();
    assert_eq!(status.state, ProviderState::Failed);
    assert_eq!(status.provider_status, "requires_payment_method");
}

#[tokio::test]
async fn stripe_succeeded_intent_is_completed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/payment_intents/pi_123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "pi_123",
            "status": "succeeded",
        })))
        .mount(&server)
        .await;

    let status = stripe(&server).fetch_status("pi_123").await.unwrap();
    assert_eq!(status.state, ProviderState::Completed);
}

#[tokio::test]
async fn razorpay_order_is_created_with_basic_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(basic_auth("rzp_test_key", "rzp_test_secret"))
        .and(body_partial_json(json!({
            "amount": 16000,
            "currency": "INR",
            "receipt": "payment_1",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "order_123",
            "entity": "order",
            "status": "created",
            "amount": 16000,
            "currency": "INR",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let intent = razorpay(&server)
        .create_intent(intent_request("INR"))
        .await
        .unwrap();

    assert_eq!(intent.external_ref, "order_123");
    assert_eq!(intent.public_key.as_deref(), Some("rzp_test_key"));
    assert!(intent.client_secret.is_none());
}

#[tokio::test]
async fn razorpay_malformed_response_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let err = razorpay(&server)
        .create_intent(intent_request("INR"))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::ProviderResponseInvalid { .. }));
}

#[tokio::test]
async fn razorpay_paid_order_is_completed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orders/order_123"))
        .and(basic_auth("rzp_test_key", "rzp_test_secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "order_123",
            "status": "paid",
        })))
        .mount(&server)
        .await;

    let status = razorpay(&server).fetch_status("order_123").await.unwrap();
    assert_eq!(status.state, ProviderState::Completed);
    assert_eq!(status.provider_status, "paid");
}
