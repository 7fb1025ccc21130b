//! Health check module
//! Reports database connectivity and which payment providers are usable

use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::error;

use crate::database;
use crate::payments::types::PaymentMethod;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
    Warning,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        !matches!(self.status, HealthState::Unhealthy)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn warning(response_time_ms: Option<u128>, details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            response_time_ms,
            details,
        }
    }
}

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    db_pool: Option<sqlx::PgPool>,
    configured_methods: Vec<PaymentMethod>,
}

impl HealthChecker {
    /// `db_pool` is `None` when the service runs on the in-memory store.
    pub fn new(db_pool: Option<sqlx::PgPool>, configured_methods: Vec<PaymentMethod>) -> Self {
        Self {
            db_pool,
            configured_methods,
        }
    }

    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();
        let mut overall = HealthState::Healthy;

        match &self.db_pool {
            Some(pool) => {
                let started = Instant::now();
                match timeout(Duration::from_secs(5), database::ping(pool)).await {
                    Ok(Ok(())) => {
                        health_status.checks.insert(
                            "database".to_string(),
                            ComponentHealth::up(Some(started.elapsed().as_millis())),
                        );
                    }
                    Ok(Err(e)) => {
                        overall = HealthState::Unhealthy;
                        health_status.checks.insert(
                            "database".to_string(),
                            ComponentHealth::down(Some("query failed".to_string())),
                        );
                        error!(error = %e, "Database health check failed");
                    }
                    Err(_) => {
                        overall = HealthState::Unhealthy;
                        health_status.checks.insert(
                            "database".to_string(),
                            ComponentHealth::down(Some("Timeout".to_string())),
                        );
                        error!("Database health check timed out");
                    }
                }
            }
            None => {
                health_status.checks.insert(
                    "database".to_string(),
                    ComponentHealth::warning(None, Some("in-memory store".to_string())),
                );
            }
        }

        let providers = if self.configured_methods.is_empty() {
            if overall == HealthState::Healthy {
                overall = HealthState::Degraded;
            }
            ComponentHealth::warning(None, Some("no payment provider configured".to_string()))
        } else {
            let names: Vec<&str> = self.configured_methods.iter().map(|m| m.as_str()).collect();
            ComponentHealth {
                details: Some(names.join(",")),
                ..ComponentHealth::up(None)
            }
        };
        health_status
            .checks
            .insert("payment_providers".to_string(), providers);

        health_status.status = overall;
        health_status
    }
}
