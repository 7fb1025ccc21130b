//! Tracing initialisation and log hygiene helpers

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` wins over `LOG_LEVEL` when set.
///
/// Calling this twice is harmless: the second install fails quietly, which
/// keeps integration tests that share a process from panicking.
pub fn init_tracing(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_lowercase()));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Plain => registry
            .with(fmt::layer().with_target(false).with_line_number(true))
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {}", e);
    }
}

/// Keeps a short prefix of a bearer-like value so it can be correlated in
/// logs without being usable.
pub fn mask_secret(value: &str) -> String {
    const VISIBLE: usize = 6;
    let visible: String = value.chars().take(VISIBLE).collect();
    if value.chars().count() <= VISIBLE {
        "****".to_string()
    } else {
        format!("{}****", visible)
    }
}
