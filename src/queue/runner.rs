//! Queue runner.
//!
//! One runner task drives one named queue: it sends the head record, waits
//! for the transport, and interprets the outcome. Success pops the record,
//! resolves its placeholders against the real response, patches live state,
//! and folds the substitutions into the queue's cumulative map so every
//! later record sees them. A retryable failure schedules a backoff timer
//! and re-sends the same head; a terminal failure runs fallbacks and
//! advances. Record N+1 never starts before record N has fully resolved or
//! been discarded.

use crate::error::OutboxError;
use crate::events::bus::{CompletionEvent, EventBus};
use crate::persistence::store::PersistenceStore;
use crate::placeholder::PlaceholderRegistry;
use crate::queue::scheduler::SchedulerContext;
use crate::queue::substitution::{
    apply_to_descriptor, apply_to_value, pair_virtual_response, SubstitutionMap,
};
use crate::request::{RequestDescriptor, Transport};
use crate::state_update::StateUpdate;
use crate::submission::hooks::{RecordHooks, RetryEvent};
use crate::submission::{
    Behavior, FactoryRegistry, RecordState, RegenerateDescriptor, RetryPolicy, SubmissionRecord,
};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Capabilities shared by every runner and the enqueue path.
pub(crate) struct RunnerShared {
    pub scheduler: SchedulerContext,
    pub transport: Arc<dyn Transport>,
    pub store: Option<Arc<PersistenceStore>>,
    pub events: EventBus,
    pub registry: PlaceholderRegistry,
    pub factories: FactoryRegistry,
    pub state_update: Option<Arc<dyn StateUpdate>>,
}

/// Start a runner for the queue unless one is already driving it.
pub(crate) fn kick(shared: &Arc<RunnerShared>, queue_name: &str) {
    if shared.scheduler.claim_runner(queue_name) {
        let shared = shared.clone();
        let queue_name = queue_name.to_string();
        tokio::spawn(async move {
            run_queue(shared, queue_name).await;
        });
    }
}

/// Snapshot of the head record taken under the queue lock, so the send can
/// happen without holding it.
struct SendJob {
    record_id: String,
    descriptor: RequestDescriptor,
    behavior: Behavior,
    retry_policy: Option<RetryPolicy>,
    retry_count: u32,
    hooks: RecordHooks,
}

async fn run_queue(shared: Arc<RunnerShared>, queue_name: String) {
    loop {
        let Some(job) = prepare_head(&shared, &queue_name) else {
            return;
        };

        debug!(queue = %queue_name, record_id = %job.record_id,
               method = %job.descriptor.method, url = %job.descriptor.url,
               retry_count = job.retry_count, "sending head record");

        match shared.transport.send(&job.descriptor).await {
            Ok(response) => handle_success(&shared, &queue_name, &job, response),
            Err(error) => {
                if let Some(delay_ms) = handle_failure(&shared, &queue_name, &job, &error) {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }
}

enum Prepared {
    Job(SendJob),
    /// The head changed while the queue was unlocked; take it again.
    Retry,
}

/// Take the head record, propagate accumulated substitutions into it, and
/// mark it requesting. Returns None (releasing the runner claim) when the
/// queue has drained.
///
/// Regenerate factories are caller code and may call back into the outbox,
/// so substitution and rebuilding run on a snapshot with no queue lock held;
/// the rewritten request is written back only if the head is still the same
/// record.
fn prepare_head(shared: &Arc<RunnerShared>, queue_name: &str) -> Option<SendJob> {
    loop {
        let cumulative = shared.scheduler.cumulative(queue_name);
        let snapshot = shared.scheduler.with_queue(queue_name, |queue| {
            if queue.is_empty() {
                queue.running = false;
                queue.clear_requesting();
                return None;
            }
            let head = queue.head().expect("queue is non-empty");
            Some((head.id.clone(), head.descriptor.clone(), head.regenerate.clone()))
        });
        let (record_id, descriptor, regenerate) = snapshot?;

        let (descriptor, regenerate) = if cumulative.is_empty() {
            (descriptor, regenerate)
        } else {
            propagate(&record_id, descriptor, regenerate, &cumulative, &shared.factories)
        };

        let prepared = shared.scheduler.with_queue(queue_name, |queue| {
            match queue.head_mut() {
                Some(head) if head.id == record_id => {
                    head.descriptor = descriptor;
                    head.regenerate = regenerate;
                }
                _ => return Some(Prepared::Retry),
            }
            if let Err(error) = queue.mark_requesting() {
                warn!(queue = queue_name, %error, "failed to mark head requesting");
                queue.running = false;
                return None;
            }

            let head = queue.head().expect("queue is non-empty");
            Some(Prepared::Job(SendJob {
                record_id: head.id.clone(),
                descriptor: head.descriptor.clone(),
                behavior: head.behavior,
                retry_policy: head.retry_policy.clone(),
                retry_count: head.retry_count,
                hooks: head.hooks.clone(),
            }))
        });

        match prepared {
            Some(Prepared::Job(job)) => return Some(job),
            Some(Prepared::Retry) => continue,
            None => return None,
        }
    }
}

/// Rewrite a record's request with resolved values: rebuild through its
/// regenerate factory when one is attached (substituting the stored
/// arguments first), otherwise deep-walk the existing descriptor.
fn propagate(
    record_id: &str,
    mut descriptor: RequestDescriptor,
    regenerate: Option<RegenerateDescriptor>,
    cumulative: &SubstitutionMap,
    factories: &FactoryRegistry,
) -> (RequestDescriptor, Option<RegenerateDescriptor>) {
    if let Some(regen) = regenerate {
        let mut args = regen.args;
        for arg in &mut args {
            apply_to_value(arg, cumulative);
        }
        let substituted = RegenerateDescriptor::new(regen.factory_id, args);
        match factories.rebuild(&substituted) {
            Ok(rebuilt) => return (rebuilt, Some(substituted)),
            Err(error) => {
                warn!(record_id, %error,
                      "regenerate factory failed, falling back to field substitution");
            }
        }
        apply_to_descriptor(&mut descriptor, cumulative);
        return (descriptor, Some(substituted));
    }
    apply_to_descriptor(&mut descriptor, cumulative);
    (descriptor, None)
}

fn handle_success(
    shared: &Arc<RunnerShared>,
    queue_name: &str,
    job: &SendJob,
    response: Value,
) {
    let record = shared
        .scheduler
        .with_existing_queue(queue_name, |queue| queue.pop_head())
        .flatten();
    let Some(mut record) = record else {
        warn!(queue = queue_name, record_id = %job.record_id, "head vanished before success handling");
        return;
    };
    record.state = RecordState::Succeeded;

    remove_from_store(shared, &record);

    if let Some(responder) = record.responder.take() {
        let _ = responder.send(Ok(response.clone()));
    }

    let substitution = resolve_placeholders(shared, queue_name, &record, &response);

    info!(queue = %queue_name, record_id = %record.id, behavior = %record.behavior,
          retry_count = record.retry_count, "record resolved");

    shared.events.emit_success(&CompletionEvent {
        queue: queue_name.to_string(),
        record_id: record.id.clone(),
        behavior: record.behavior,
        descriptor: record.descriptor.clone(),
        retry_count: record.retry_count,
        response: Some(response),
        substitution,
        error: None,
        emitted_at: Utc::now(),
    });
}

/// Pair the record's virtual response against the real one, publish the
/// resolutions to the placeholder registry and live state, and fold them
/// into the queue's cumulative map.
fn resolve_placeholders(
    shared: &Arc<RunnerShared>,
    queue_name: &str,
    record: &SubmissionRecord,
    response: &Value,
) -> Option<SubstitutionMap> {
    if record.behavior != Behavior::Silent {
        return None;
    }
    let root = record.virtual_response.as_ref()?;
    let map = pair_virtual_response(root, response);

    for (id, value) in &map {
        shared.registry.record_resolved(id, value.clone());
    }

    if let (Some(state_ref), Some(updater)) = (&record.state_ref, &shared.state_update) {
        updater.apply(state_ref, &mut |state| apply_to_value(state, &map));
    }

    shared.scheduler.merge_cumulative(queue_name, &map);
    Some(map)
}

/// Returns the backoff delay when the head should be retried in place;
/// `None` when the queue has already advanced past it.
fn handle_failure(
    shared: &Arc<RunnerShared>,
    queue_name: &str,
    job: &SendJob,
    error: &OutboxError,
) -> Option<u64> {
    if job.behavior != Behavior::Silent {
        reject_head(shared, queue_name, job, error);
        return None;
    }

    let retryable = job
        .retry_policy
        .as_ref()
        .filter(|policy| policy.allows_retry(error, job.retry_count));

    if let Some(policy) = retryable {
        let delay_ms = policy.backoff.next_delay_ms(job.retry_count);
        let retry_count = job.retry_count + 1;

        shared.scheduler.with_existing_queue(queue_name, |queue| {
            if let Some(head) = queue.head_mut() {
                if head.id == job.record_id {
                    head.retry_count = retry_count;
                    head.state = RecordState::RetryWaiting;
                }
            }
            queue.clear_requesting();
        });

        info!(queue = %queue_name, record_id = %job.record_id, retry_count, delay_ms,
              %error, "retry scheduled");
        job.hooks.run_retry(&RetryEvent {
            record_id: job.record_id.clone(),
            queue: queue_name.to_string(),
            retry_count,
            delay_ms,
        });
        return Some(delay_ms);
    }

    // Retries exhausted or error not retryable: terminal failure.
    let record = shared
        .scheduler
        .with_existing_queue(queue_name, |queue| queue.pop_head())
        .flatten();
    let Some(mut record) = record else {
        return None;
    };
    record.state = RecordState::FailedTerminal;
    record.hooks.run_fallback(error);

    // A bound fallback means the caller owns the outcome; an unbound record
    // stays persisted so the next boot can resume it.
    if record.hooks.has_fallback() {
        remove_from_store(shared, &record);
    }

    warn!(queue = %queue_name, record_id = %record.id, retry_count = record.retry_count,
          %error, "record failed terminally");

    shared.events.emit_error(&CompletionEvent {
        queue: queue_name.to_string(),
        record_id: record.id.clone(),
        behavior: record.behavior,
        descriptor: record.descriptor.clone(),
        retry_count: record.retry_count,
        response: None,
        substitution: None,
        error: Some(error.to_string()),
        emitted_at: Utc::now(),
    });
    None
}

/// Queue-mode (and any non-silent) failure: reject the caller, drop the
/// record, move on. Never retried.
fn reject_head(
    shared: &Arc<RunnerShared>,
    queue_name: &str,
    job: &SendJob,
    error: &OutboxError,
) {
    let record = shared
        .scheduler
        .with_existing_queue(queue_name, |queue| queue.pop_head())
        .flatten();
    let Some(mut record) = record else {
        return;
    };
    record.state = RecordState::FailedTerminal;

    remove_from_store(shared, &record);

    if let Some(responder) = record.responder.take() {
        let _ = responder.send(Err(error.clone()));
    }

    warn!(queue = %queue_name, record_id = %record.id, %error, "queue-mode record rejected");

    shared.events.emit_error(&CompletionEvent {
        queue: queue_name.to_string(),
        record_id: record.id.clone(),
        behavior: record.behavior,
        descriptor: record.descriptor.clone(),
        retry_count: record.retry_count,
        response: None,
        substitution: None,
        error: Some(error.to_string()),
        emitted_at: Utc::now(),
    });
}

fn remove_from_store(shared: &Arc<RunnerShared>, record: &SubmissionRecord) {
    if !record.persist {
        return;
    }
    if let Some(store) = &shared.store {
        if let Err(error) = store.remove(&record.id, &record.queue_name) {
            warn!(record_id = %record.id, %error, "failed to remove record from store");
        }
    }
}
