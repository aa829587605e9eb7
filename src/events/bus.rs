use crate::error::Result;
use crate::queue::substitution::SubstitutionMap;
use crate::request::RequestDescriptor;
use crate::submission::Behavior;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::warn;

/// Emitted once after persisted queues are re-loaded on process boot.
#[derive(Debug, Clone)]
pub struct BootEvent {
    /// Queue name and number of records resumed into it.
    pub queues: Vec<(String, usize)>,
    pub emitted_at: DateTime<Utc>,
}

/// Emitted on every queue-runner completion transition.
///
/// `response` and `substitution` are set on success; `error` on failure. The
/// `complete` hook receives both shapes.
#[derive(Debug, Clone)]
pub struct CompletionEvent {
    pub queue: String,
    pub record_id: String,
    pub behavior: Behavior,
    pub descriptor: RequestDescriptor,
    pub retry_count: u32,
    pub response: Option<serde_json::Value>,
    pub substitution: Option<SubstitutionMap>,
    pub error: Option<String>,
    pub emitted_at: DateTime<Utc>,
}

type BootHandler = Arc<dyn Fn(&BootEvent) -> Result<()> + Send + Sync>;
type CompletionHandler = Arc<dyn Fn(&CompletionEvent) -> Result<()> + Send + Sync>;

/// Global lifecycle hooks.
#[derive(Clone, Default)]
pub struct EventBus {
    boot: Arc<RwLock<Vec<BootHandler>>>,
    success: Arc<RwLock<Vec<CompletionHandler>>>,
    error: Arc<RwLock<Vec<CompletionHandler>>>,
    complete: Arc<RwLock<Vec<CompletionHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_boot(&self, handler: impl Fn(&BootEvent) -> Result<()> + Send + Sync + 'static) {
        self.boot.write().push(Arc::new(handler));
    }

    pub fn on_success(
        &self,
        handler: impl Fn(&CompletionEvent) -> Result<()> + Send + Sync + 'static,
    ) {
        self.success.write().push(Arc::new(handler));
    }

    pub fn on_error(
        &self,
        handler: impl Fn(&CompletionEvent) -> Result<()> + Send + Sync + 'static,
    ) {
        self.error.write().push(Arc::new(handler));
    }

    pub fn on_complete(
        &self,
        handler: impl Fn(&CompletionEvent) -> Result<()> + Send + Sync + 'static,
    ) {
        self.complete.write().push(Arc::new(handler));
    }

    pub(crate) fn emit_boot(&self, event: &BootEvent) {
        let handlers = self.boot.read().clone();
        for handler in handlers {
            if let Err(error) = handler(event) {
                warn!(%error, "boot handler failed, continuing");
            }
        }
    }

    pub(crate) fn emit_success(&self, event: &CompletionEvent) {
        Self::dispatch(&self.success, event, "success");
        Self::dispatch(&self.complete, event, "complete");
    }

    pub(crate) fn emit_error(&self, event: &CompletionEvent) {
        Self::dispatch(&self.error, event, "error");
        Self::dispatch(&self.complete, event, "complete");
    }

    fn dispatch(
        handlers: &Arc<RwLock<Vec<CompletionHandler>>>,
        event: &CompletionEvent,
        hook: &str,
    ) {
        let handlers = handlers.read().clone();
        for handler in handlers {
            if let Err(error) = handler(event) {
                warn!(%error, hook, record_id = %event.record_id, "event handler failed, continuing");
            }
        }
    }
}
