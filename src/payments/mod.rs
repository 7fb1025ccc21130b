pub mod error;
pub mod factory;
pub mod provider;
pub mod providers;
pub mod signature;
pub mod state;
pub mod types;
pub mod utils;

pub use error::{PaymentError, PaymentResult};
pub use factory::PaymentGateways;
pub use provider::PaymentGateway;
pub use signature::SignatureVerifier;
pub use state::{PaymentStatus, StatusTransition};
pub use types::{Caller, ExternalRef, Payment, PaymentMethod, UserRole};
