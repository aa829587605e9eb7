use crate::queue::queue::SubmissionQueue;
use crate::queue::substitution::SubstitutionMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Explicit owner of the queue table and the per-queue cumulative
/// substitution maps. Runners and the enqueue path go through this context;
/// there is no module-level global state.
///
/// Locks are short and never held across an await point: runners snapshot
/// what they need, release, then perform async work.
#[derive(Clone, Default)]
pub struct SchedulerContext {
    queues: Arc<Mutex<HashMap<String, SubmissionQueue>>>,
    cumulative: Arc<Mutex<HashMap<String, SubstitutionMap>>>,
}

impl SchedulerContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with exclusive access to the named queue, creating it if
    /// needed.
    pub fn with_queue<T>(&self, name: &str, f: impl FnOnce(&mut SubmissionQueue) -> T) -> T {
        let mut queues = self.queues.lock();
        let queue = queues
            .entry(name.to_string())
            .or_insert_with(|| SubmissionQueue::new(name));
        f(queue)
    }

    /// Run `f` on the named queue if it exists.
    pub fn with_existing_queue<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut SubmissionQueue) -> T,
    ) -> Option<T> {
        let mut queues = self.queues.lock();
        queues.get_mut(name).map(f)
    }

    /// Claim the run loop for a queue. Returns true when the caller should
    /// spawn a runner; a queue already being driven stays single-flight.
    pub fn claim_runner(&self, name: &str) -> bool {
        self.with_queue(name, |queue| {
            if queue.running || queue.is_empty() {
                false
            } else {
                queue.running = true;
                true
            }
        })
    }

    pub fn queue_names(&self) -> Vec<String> {
        self.queues.lock().keys().cloned().collect()
    }

    /// Snapshot of the cumulative substitution map carried forward along a
    /// queue.
    pub fn cumulative(&self, queue: &str) -> SubstitutionMap {
        self.cumulative
            .lock()
            .get(queue)
            .cloned()
            .unwrap_or_default()
    }

    /// Merge substitutions from a resolved record so every later record in
    /// the chain sees them, not just the immediate successor.
    pub fn merge_cumulative(&self, queue: &str, map: &SubstitutionMap) {
        if map.is_empty() {
            return;
        }
        let mut cumulative = self.cumulative.lock();
        let entry = cumulative.entry(queue.to_string()).or_default();
        for (id, value) in map {
            entry.insert(id.clone(), value.clone());
        }
    }
}
