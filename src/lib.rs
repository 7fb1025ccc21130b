//! Visa application payment backend.
//!
//! Creates Stripe payment intents and Razorpay orders for visa applications,
//! then reconciles the local payment record with the provider through client
//! confirmation and signed webhooks.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;
pub mod workers;
