//! Environment-driven configuration for the payments service.
//!
//! Provider credentials are optional: a provider without them stays
//! registered but reports itself unconfigured when used.

use crate::payments::providers::{RazorpayConfig, StripeConfig};
use std::env;
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub payments: PaymentsConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
    pub run_migrations: bool,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log format options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Payment provider and reconciliation settings
#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    pub stripe: StripeConfig,
    pub razorpay: RazorpayConfig,
    pub webhook_max_body_bytes: usize,
    pub side_effect_queue_capacity: usize,
}

/// Reads `name`, falling back to `default` when unset, and parses it.
fn env_or<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(default),
    }
}

impl AppConfig {
    /// Loads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            payments: PaymentsConfig::from_env()?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.logging.validate()?;
        self.payments.validate()
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env_or("SERVER_HOST", "127.0.0.1".to_string())?,
            port: env_or("SERVER_PORT", 8000)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue("SERVER_PORT cannot be 0".to_string()));
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidValue("SERVER_HOST cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVariable("DATABASE_URL".to_string()))?;
        Ok(DatabaseConfig {
            url,
            max_connections: env_or("DB_MAX_CONNECTIONS", 20)?,
            min_connections: env_or("DB_MIN_CONNECTIONS", 5)?,
            connection_timeout: env_or("DB_CONNECTION_TIMEOUT", 30)?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|v| v.trim().parse().ok()),
            run_migrations: env_or("DB_RUN_MIGRATIONS", true)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.url.starts_with("postgres://") && !self.url.starts_with("postgresql://") {
            return Err(ConfigError::InvalidValue(
                "DATABASE_URL must be a postgres:// URL".to_string(),
            ));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }
        if self.min_connections > self.max_connections {
            return Err(ConfigError::ValidationFailed(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }
        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let format = match env::var("LOG_FORMAT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            _ => LogFormat::Plain,
        };
        Ok(LoggingConfig {
            level: env_or("LOG_LEVEL", "INFO".to_string())?,
            format,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.level.to_uppercase().as_str() {
            "TRACE" | "DEBUG" | "INFO" | "WARN" | "ERROR" => Ok(()),
            _ => Err(ConfigError::InvalidValue("LOG_LEVEL".to_string())),
        }
    }
}

impl PaymentsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(PaymentsConfig {
            stripe: StripeConfig::from_env(),
            razorpay: RazorpayConfig::from_env(),
            webhook_max_body_bytes: env_or("WEBHOOK_MAX_BODY_BYTES", 64 * 1024)?,
            side_effect_queue_capacity: env_or("SIDE_EFFECT_QUEUE_CAPACITY", 256)?,
        })
    }

    /// Missing provider credentials are allowed; that provider is simply
    /// unavailable at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, url) in [
            ("STRIPE_BASE_URL", &self.stripe.base_url),
            ("RAZORPAY_BASE_URL", &self.razorpay.base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be a valid URL",
                    name
                )));
            }
        }

        if self.stripe.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("STRIPE_TIMEOUT_SECS".to_string()));
        }
        if self.razorpay.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "RAZORPAY_TIMEOUT_SECS".to_string(),
            ));
        }
        if self.stripe.webhook_tolerance_secs <= 0 {
            return Err(ConfigError::InvalidValue(
                "STRIPE_WEBHOOK_TOLERANCE_SECS".to_string(),
            ));
        }
        if self.webhook_max_body_bytes == 0 {
            return Err(ConfigError::InvalidValue(
                "WEBHOOK_MAX_BODY_BYTES".to_string(),
            ));
        }
        if self.side_effect_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "SIDE_EFFECT_QUEUE_CAPACITY".to_string(),
            ));
        }
        if self.razorpay.key_id.is_some() != self.razorpay.key_secret.is_some() {
            return Err(ConfigError::ValidationFailed(
                "RAZORPAY_KEY_ID and RAZORPAY_KEY_SECRET must be set together".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            stripe: StripeConfig::default(),
            razorpay: RazorpayConfig::default(),
            webhook_max_body_bytes: 64 * 1024,
            side_effect_queue_capacity: 256,
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
