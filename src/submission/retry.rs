//! Retry policy and backoff calculation.
//!
//! The delay for the retry scheduled after `n` already-performed retries is
//! `delay * multiplier^n`, optionally widened by a uniform jitter drawn from
//! `[delay * jitter_low, delay * jitter_high]` and added to the base, then
//! floored to an integer number of milliseconds.

use crate::error::OutboxError;
use serde::{Deserialize, Serialize};

/// Serializable predicate deciding whether a transport error is retryable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ErrorMatcher {
    /// Every transport error is retryable.
    Any,
    /// Retryable when the error message matches this regular expression.
    MessagePattern(String),
}

impl ErrorMatcher {
    pub fn matches(&self, error: &OutboxError) -> bool {
        // Only transport failures are ever retryable; validation and
        // serialization errors always propagate.
        if !matches!(error, OutboxError::Transport(_)) {
            return false;
        }
        match self {
            Self::Any => true,
            Self::MessagePattern(pattern) => regex::Regex::new(pattern)
                .map(|re| re.is_match(&error.to_string()))
                .unwrap_or(false),
        }
    }
}

/// Backoff settings carried by a retry policy.
///
/// A missing `jitter_low` defaults to 0.0 and a missing `jitter_high` to 1.0;
/// jitter is only applied when at least one bound is configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Base delay in milliseconds.
    pub delay_ms: u64,
    /// Exponential multiplier; 1.0 yields a constant delay.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter_high: Option<f64>,
}

fn default_multiplier() -> f64 {
    1.0
}

impl BackoffConfig {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            multiplier: 1.0,
            jitter_low: None,
            jitter_high: None,
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_jitter(mut self, low: f64, high: f64) -> Self {
        self.jitter_low = Some(low);
        self.jitter_high = Some(high);
        self
    }

    /// Delay in milliseconds for the retry scheduled after `retries_done`
    /// already-performed retries.
    pub fn next_delay_ms(&self, retries_done: u32) -> u64 {
        let base = self.delay_ms as f64 * self.multiplier.powi(retries_done as i32);
        let total = base + self.jitter_ms();
        total.floor().max(0.0) as u64
    }

    fn jitter_ms(&self) -> f64 {
        if self.jitter_low.is_none() && self.jitter_high.is_none() {
            return 0.0;
        }
        let low = self.jitter_low.unwrap_or(0.0);
        let high = self.jitter_high.unwrap_or(1.0);
        let (low, high) = if low <= high { (low, high) } else { (high, low) };
        let lower = self.delay_ms as f64 * low;
        let upper = self.delay_ms as f64 * high;
        if upper <= lower {
            return lower;
        }
        use rand::Rng;
        rand::thread_rng().gen_range(lower..=upper)
    }
}

/// Retry policy attached to a silent submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub matcher: ErrorMatcher,
    pub max_retries: u32,
    pub backoff: BackoffConfig,
}

impl RetryPolicy {
    pub fn new(matcher: ErrorMatcher, max_retries: u32, backoff: BackoffConfig) -> Self {
        Self {
            matcher,
            max_retries,
            backoff,
        }
    }

    /// Whether another retry may be scheduled for `error` after
    /// `retries_done` retries have already run.
    pub fn allows_retry(&self, error: &OutboxError, retries_done: u32) -> bool {
        retries_done < self.max_retries && self.matcher.matches(error)
    }
}
