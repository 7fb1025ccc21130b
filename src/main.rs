use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use visa_payments::api::{router, AppState};
use visa_payments::config::AppConfig;
use visa_payments::database::application_repository::ApplicationRepository;
use visa_payments::database::audit_repository::AuditLogRepository;
use visa_payments::database::notification_repository::NotificationRepository;
use visa_payments::database::payment_repository::PaymentRepository;
use visa_payments::database::{self, run_migrations};
use visa_payments::health::HealthChecker;
use visa_payments::logging::init_tracing;
use visa_payments::payments::{PaymentGateways, SignatureVerifier};
use visa_payments::services::PaymentReconciler;
use visa_payments::workers::SideEffectDispatcher;

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config.logging);
    config.validate().context("invalid configuration")?;

    let db_pool = database::connect(&config.database)
        .await
        .context("failed to connect to database")?;
    if config.database.run_migrations {
        run_migrations(&db_pool)
            .await
            .context("failed to apply migrations")?;
    }
    let (size, idle) = database::pool_usage(&db_pool);
    info!(size, idle, "Database pool ready");

    let gateways = PaymentGateways::from_config(
        config.payments.stripe.clone(),
        config.payments.razorpay.clone(),
    )
    .context("failed to build payment gateways")?;
    let configured = gateways.configured_methods();
    if configured.is_empty() {
        warn!("No payment provider is configured; payment creation will be rejected");
    } else {
        info!(providers = ?configured, "Payment providers configured");
    }
    let verifier = SignatureVerifier::new(&config.payments.stripe, &config.payments.razorpay);

    let (side_effects, worker_handle) = SideEffectDispatcher::spawn(
        config.payments.side_effect_queue_capacity,
        Arc::new(AuditLogRepository::new(db_pool.clone())),
        Arc::new(NotificationRepository::new(db_pool.clone())),
    );

    let reconciler = Arc::new(PaymentReconciler::new(
        Arc::new(PaymentRepository::new(db_pool.clone())),
        Arc::new(ApplicationRepository::new(db_pool.clone())),
        gateways,
        verifier,
        side_effects.clone(),
    ));

    let app = router(
        AppState {
            reconciler,
            health: HealthChecker::new(Some(db_pool.clone()), configured),
        },
        config.payments.webhook_max_body_bytes,
    );

    let addr: SocketAddr = config
        .server
        .bind_address()
        .parse()
        .context("invalid SERVER_HOST/SERVER_PORT")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Drain audit/notification work queued by in-flight requests.
    if tokio::time::timeout(Duration::from_secs(5), side_effects.flush())
        .await
        .is_err()
    {
        error!("Timed out flushing side effects");
    }
    drop(side_effects);
    if tokio::time::timeout(Duration::from_secs(5), worker_handle)
        .await
        .is_err()
    {
        error!("Timed out waiting for side-effect worker shutdown");
    }

    db_pool.close().await;
    info!("Server shutdown complete");
    Ok(())
}
