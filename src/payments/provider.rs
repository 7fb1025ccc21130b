use crate::payments::error::PaymentResult;
use crate::payments::types::{IntentRequest, PaymentMethod, ProviderIntent, ProviderStatus};
use async_trait::async_trait;

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn method(&self) -> PaymentMethod;

    /// False when credentials are missing. Calls on an unconfigured gateway
    /// fail with `ProviderUnconfigured` without any network traffic.
    fn is_configured(&self) -> bool;

    async fn create_intent(&self, request: IntentRequest) -> PaymentResult<ProviderIntent>;

    async fn fetch_status(&self, external_ref: &str) -> PaymentResult<ProviderStatus>;
}
