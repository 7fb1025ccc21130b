pub mod application_repository;
pub mod audit_repository;
pub mod error;
pub mod memory;
pub mod notification_repository;
pub mod payment_repository;
pub mod repository;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{error as log_error, info, warn};

use self::error::{DatabaseError, DatabaseErrorKind};
use crate::config::DatabaseConfig;

const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
const MAX_CONNECTION_LIFETIME: Duration = Duration::from_secs(1800);

/// Pool sizing and timeouts derived from [`DatabaseConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
}

impl From<&DatabaseConfig> for PoolSettings {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            acquire_timeout: Duration::from_secs(config.connection_timeout),
            idle_timeout: Duration::from_secs(
                config.idle_timeout.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
            ),
        }
    }
}

/// Opens the payments pool and proves it with one acquired connection.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    let settings = PoolSettings::from(config);
    info!(
        max_connections = settings.max_connections,
        min_connections = settings.min_connections,
        acquire_timeout = ?settings.acquire_timeout,
        "Connecting to payments database"
    );

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout)
        .idle_timeout(settings.idle_timeout)
        .max_lifetime(MAX_CONNECTION_LIFETIME)
        .connect(&config.url)
        .await
        .map_err(|e| {
            log_error!(error = %e, "Failed to open database pool");
            DatabaseError::from_sqlx(e)
        })?;

    pool.acquire().await.map_err(|e| {
        log_error!(error = %e, "Database pool opened but no connection could be acquired");
        DatabaseError::from_sqlx(e)
    })?;

    Ok(pool)
}

/// Applies the SQL files under `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<(), DatabaseError> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        log_error!(error = %e, "Failed to run migrations");
        DatabaseError::new(DatabaseErrorKind::Unknown {
            message: format!("migration failed: {}", e),
        })
    })?;
    info!("Database migrations applied");
    Ok(())
}

pub async fn ping(pool: &PgPool) -> Result<(), DatabaseError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(|e| {
            warn!(error = %e, "Database ping failed");
            DatabaseError::from_sqlx(e)
        })
}

/// (open connections, idle connections)
pub fn pool_usage(pool: &PgPool) -> (u32, usize) {
    (pool.size(), pool.num_idle())
}
