use crate::error::{OutboxError, Result};
use crate::submission::retry::BackoffConfig;

/// Runtime configuration for the outbox core.
///
/// Values come from `Default` or from `OUTBOX_*` environment variables via
/// [`OutboxConfig::from_env`]. Records that carry no retry policy of their own
/// fall back to the knobs here.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Queue used when a submission does not name one.
    pub default_queue: String,
    /// Prefix for every key written through the storage capability.
    pub storage_prefix: String,
    /// Default retry ceiling for silent submissions without a policy.
    pub default_max_retries: u32,
    /// Default base delay in milliseconds for backoff.
    pub default_backoff_delay_ms: u64,
    /// Default exponential multiplier for backoff.
    pub default_backoff_multiplier: f64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            default_queue: "default".to_string(),
            storage_prefix: "outbox.".to_string(),
            default_max_retries: 3,
            default_backoff_delay_ms: 1000,
            default_backoff_multiplier: 2.0,
        }
    }
}

impl OutboxConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(queue) = std::env::var("OUTBOX_DEFAULT_QUEUE") {
            config.default_queue = queue;
        }

        if let Ok(prefix) = std::env::var("OUTBOX_STORAGE_PREFIX") {
            config.storage_prefix = prefix;
        }

        if let Ok(max_retries) = std::env::var("OUTBOX_MAX_RETRIES") {
            config.default_max_retries = max_retries.parse().map_err(|e| {
                OutboxError::Configuration(format!("Invalid max_retries: {e}"))
            })?;
        }

        if let Ok(delay) = std::env::var("OUTBOX_BACKOFF_DELAY_MS") {
            config.default_backoff_delay_ms = delay.parse().map_err(|e| {
                OutboxError::Configuration(format!("Invalid backoff_delay_ms: {e}"))
            })?;
        }

        if let Ok(multiplier) = std::env::var("OUTBOX_BACKOFF_MULTIPLIER") {
            config.default_backoff_multiplier = multiplier.parse().map_err(|e| {
                OutboxError::Configuration(format!("Invalid backoff_multiplier: {e}"))
            })?;
        }

        Ok(config)
    }

    /// Backoff settings applied to records that carry none of their own.
    pub fn default_backoff(&self) -> BackoffConfig {
        BackoffConfig {
            delay_ms: self.default_backoff_delay_ms,
            multiplier: self.default_backoff_multiplier,
            jitter_low: None,
            jitter_high: None,
        }
    }
}
