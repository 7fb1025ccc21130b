pub mod razorpay;
pub mod stripe;

pub use razorpay::{RazorpayConfig, RazorpayGateway};
pub use stripe::{StripeConfig, StripeGateway};
