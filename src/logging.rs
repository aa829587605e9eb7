//! # Structured Logging Module
//!
//! Environment-aware tracing setup for debugging queue runs and retry timing
//! inside embedding applications.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; if the host application already installed a
/// global subscriber this becomes a no-op.
pub fn init_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_filter(EnvFilter::new(log_level)),
        );

        if subscriber.try_init().is_err() {
            // A global subscriber is already set by the host - continue with it
            tracing::debug!("global tracing subscriber already initialized");
        }

        tracing::info!(environment = %environment, "outbox logging initialized");
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("OUTBOX_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_detection_prefers_outbox_env() {
        std::env::set_var("OUTBOX_ENV", "test_override");
        assert_eq!(get_environment(), "test_override");
        std::env::remove_var("OUTBOX_ENV");
    }

    #[test]
    fn log_level_mapping() {
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("unknown"), "debug");
    }
}
