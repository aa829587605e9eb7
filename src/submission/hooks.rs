//! Per-record lifecycle hooks, bound at enqueue time.

use crate::error::OutboxError;
use std::fmt;
use std::sync::Arc;

/// Payload handed to retry hooks when a backoff timer is scheduled.
#[derive(Debug, Clone)]
pub struct RetryEvent {
    pub record_id: String,
    pub queue: String,
    pub retry_count: u32,
    pub delay_ms: u64,
}

type GuardFn = dyn Fn() -> bool + Send + Sync;
type RetryFn = dyn Fn(&RetryEvent) + Send + Sync;
type FallbackFn = dyn Fn(&OutboxError) + Send + Sync;

/// Ordered hook lists for one record. Guards may veto enqueueing by
/// returning false; fallback handlers run on terminal failure.
#[derive(Clone, Default)]
pub struct RecordHooks {
    pub(crate) before_enqueue: Vec<Arc<GuardFn>>,
    pub(crate) enqueued: Vec<Arc<GuardFn>>,
    pub(crate) retry: Vec<Arc<RetryFn>>,
    pub(crate) fallback: Vec<Arc<FallbackFn>>,
}

impl fmt::Debug for RecordHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordHooks")
            .field("before_enqueue", &self.before_enqueue.len())
            .field("enqueued", &self.enqueued.len())
            .field("retry", &self.retry.len())
            .field("fallback", &self.fallback.len())
            .finish()
    }
}

impl RecordHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_before_enqueue(mut self, guard: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.before_enqueue.push(Arc::new(guard));
        self
    }

    pub fn on_enqueued(mut self, guard: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.enqueued.push(Arc::new(guard));
        self
    }

    pub fn on_retry(mut self, handler: impl Fn(&RetryEvent) + Send + Sync + 'static) -> Self {
        self.retry.push(Arc::new(handler));
        self
    }

    pub fn on_fallback(mut self, handler: impl Fn(&OutboxError) + Send + Sync + 'static) -> Self {
        self.fallback.push(Arc::new(handler));
        self
    }

    /// Binding a fallback means the caller takes responsibility for the
    /// outcome, so terminal failures need not stay persisted for resumption.
    pub fn has_fallback(&self) -> bool {
        !self.fallback.is_empty()
    }

    /// Run the before-enqueue guards in order; any false vetoes.
    pub(crate) fn run_before_enqueue(&self) -> bool {
        self.before_enqueue.iter().all(|guard| guard())
    }

    /// Run the enqueued guards in order; any false vetoes.
    pub(crate) fn run_enqueued(&self) -> bool {
        self.enqueued.iter().all(|guard| guard())
    }

    pub(crate) fn run_retry(&self, event: &RetryEvent) {
        for handler in &self.retry {
            handler(event);
        }
    }

    pub(crate) fn run_fallback(&self, error: &OutboxError) {
        for handler in &self.fallback {
            handler(error);
        }
    }
}
