use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::provider::PaymentGateway;
use crate::payments::providers::{RazorpayConfig, RazorpayGateway, StripeConfig, StripeGateway};
use crate::payments::types::PaymentMethod;
use std::collections::HashMap;
use std::sync::Arc;

/// One gateway per payment method.
#[derive(Clone, Default)]
pub struct PaymentGateways {
    gateways: HashMap<PaymentMethod, Arc<dyn PaymentGateway>>,
}

impl PaymentGateways {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(stripe: StripeConfig, razorpay: RazorpayConfig) -> PaymentResult<Self> {
        Ok(Self::new()
            .with_gateway(Arc::new(StripeGateway::new(stripe)?))
            .with_gateway(Arc::new(RazorpayGateway::new(razorpay)?)))
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.method(), gateway);
        self
    }

    pub fn get(&self, method: PaymentMethod) -> PaymentResult<Arc<dyn PaymentGateway>> {
        self.gateways
            .get(&method)
            .cloned()
            .ok_or_else(|| PaymentError::ProviderUnconfigured {
                provider: method.to_string(),
            })
    }

    pub fn configured_methods(&self) -> Vec<PaymentMethod> {
        let mut methods: Vec<PaymentMethod> = self
            .gateways
            .values()
            .filter(|g| g.is_configured())
            .map(|g| g.method())
            .collect();
        methods.sort_by_key(|m| m.as_str());
        methods
    }
}
