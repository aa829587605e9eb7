//! Public facade.
//!
//! An [`Outbox`] owns the scheduler context and the host capabilities
//! (transport, storage, state update) and exposes the submission surface:
//! routing by behavior, guarded enqueue with optional persistence, boot-time
//! resumption of persisted queues, and queue inspection/removal.

use crate::config::OutboxConfig;
use crate::error::{OutboxError, Result};
use crate::events::bus::{BootEvent, EventBus};
use crate::persistence::serializers::SerializerRegistry;
use crate::persistence::storage::Storage;
use crate::persistence::store::PersistenceStore;
use crate::placeholder::{PlaceholderRegistry, PlaceholderValue};
use crate::queue::queue::RecordSummary;
use crate::queue::runner::{kick, RunnerShared};
use crate::queue::scheduler::SchedulerContext;
use crate::queue::substitution::scan_placeholder_ids;
use crate::request::{RequestDescriptor, Transport};
use crate::state_update::{StateRef, StateUpdate};
use crate::submission::{
    Behavior, BehaviorSpec, ErrorMatcher, RecordHooks, RegenerateDescriptor, RetryPolicy,
    SubmissionRecord,
};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// What the caller gets back from [`Outbox::submit`].
pub enum SubmitOutcome {
    /// Static behavior: the request ran immediately; this is its response.
    Immediate(Value),
    /// Queue behavior: resolves or rejects when the record completes.
    Pending(oneshot::Receiver<Result<Value>>),
    /// Silent behavior: the record is queued; the caller already holds the
    /// virtual response it was built with.
    Accepted { record_id: String },
    /// An enqueue guard vetoed the record before it reached the queue.
    Vetoed { record_id: String },
}

/// One write request on its way to a queue.
pub struct Submission {
    descriptor: RequestDescriptor,
    behavior: BehaviorSpec,
    queue: Option<String>,
    persist: Option<bool>,
    retry_policy: Option<RetryPolicy>,
    linked_placeholder_ids: Vec<String>,
    virtual_response: Option<PlaceholderValue>,
    regenerate: Option<RegenerateDescriptor>,
    state_ref: Option<StateRef>,
    hooks: RecordHooks,
}

impl Submission {
    pub fn new(descriptor: RequestDescriptor) -> Self {
        Self {
            descriptor,
            behavior: BehaviorSpec::Fixed(Behavior::Queue),
            queue: None,
            persist: None,
            retry_policy: None,
            linked_placeholder_ids: Vec::new(),
            virtual_response: None,
            regenerate: None,
            state_ref: None,
            hooks: RecordHooks::default(),
        }
    }

    pub fn behavior(mut self, behavior: impl Into<BehaviorSpec>) -> Self {
        self.behavior = behavior.into();
        self
    }

    pub fn queue(mut self, name: impl Into<String>) -> Self {
        self.queue = Some(name.into());
        self
    }

    /// Force persistence on or off. Without this, a silent record persists
    /// exactly when storage is available and no fallback handler is bound.
    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = Some(persist);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Placeholder ids this request depends on, usually the basket returned
    /// by [`PlaceholderRegistry::collect`].
    pub fn linked_placeholders(mut self, ids: Vec<String>) -> Self {
        self.linked_placeholder_ids = ids;
        self
    }

    /// Root of the placeholder tree handed to the caller as the immediate
    /// response of a silent submission.
    pub fn virtual_response(mut self, root: PlaceholderValue) -> Self {
        self.virtual_response = Some(root);
        self
    }

    pub fn regenerate(mut self, descriptor: RegenerateDescriptor) -> Self {
        self.regenerate = Some(descriptor);
        self
    }

    pub fn state_ref(mut self, state_ref: StateRef) -> Self {
        self.state_ref = Some(state_ref);
        self
    }

    pub fn hooks(mut self, hooks: RecordHooks) -> Self {
        self.hooks = hooks;
        self
    }
}

pub struct OutboxBuilder {
    transport: Option<Arc<dyn Transport>>,
    storage: Option<Arc<dyn Storage>>,
    state_update: Option<Arc<dyn StateUpdate>>,
    serializers: SerializerRegistry,
    config: OutboxConfig,
}

impl OutboxBuilder {
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn state_update(mut self, state_update: Arc<dyn StateUpdate>) -> Self {
        self.state_update = Some(state_update);
        self
    }

    pub fn serializers(mut self, serializers: SerializerRegistry) -> Self {
        self.serializers = serializers;
        self
    }

    pub fn config(mut self, config: OutboxConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Outbox> {
        let transport = self.transport.ok_or_else(|| {
            OutboxError::Configuration("an outbox requires a transport".to_string())
        })?;
        let store = self.storage.map(|storage| {
            Arc::new(PersistenceStore::new(
                storage,
                self.serializers.clone(),
                self.config.storage_prefix.clone(),
            ))
        });
        Ok(Outbox {
            shared: Arc::new(RunnerShared {
                scheduler: SchedulerContext::new(),
                transport,
                store,
                events: EventBus::new(),
                registry: PlaceholderRegistry::new(),
                factories: crate::submission::FactoryRegistry::new(),
                state_update: self.state_update,
            }),
            config: self.config,
        })
    }
}

/// The submission subsystem: queues, runner, placeholders, persistence.
#[derive(Clone)]
pub struct Outbox {
    shared: Arc<RunnerShared>,
    config: OutboxConfig,
}

impl Outbox {
    pub fn builder() -> OutboxBuilder {
        OutboxBuilder {
            transport: None,
            storage: None,
            state_update: None,
            serializers: SerializerRegistry::new(),
            config: OutboxConfig::default(),
        }
    }

    pub fn registry(&self) -> &PlaceholderRegistry {
        &self.shared.registry
    }

    pub fn factories(&self) -> &crate::submission::FactoryRegistry {
        &self.shared.factories
    }

    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    pub fn config(&self) -> &OutboxConfig {
        &self.config
    }

    /// Submit a write request. The behavior spec is evaluated exactly once
    /// for this attempt; `Static` routes around the queue entirely.
    pub async fn submit(&self, submission: Submission) -> Result<SubmitOutcome> {
        let behavior = submission.behavior.resolve(&submission.descriptor);
        if behavior == Behavior::Static {
            debug!(method = %submission.descriptor.method, url = %submission.descriptor.url,
                   "static submission, sending immediately");
            let response = self.shared.transport.send(&submission.descriptor).await?;
            return Ok(SubmitOutcome::Immediate(response));
        }

        let queue_name = submission
            .queue
            .unwrap_or_else(|| self.config.default_queue.clone());

        let mut record = SubmissionRecord::new(queue_name.clone(), behavior, submission.descriptor);
        record.retry_policy = submission.retry_policy.or_else(|| {
            (behavior == Behavior::Silent).then(|| self.default_retry_policy())
        });
        record.virtual_response = submission.virtual_response;
        record.regenerate = submission.regenerate;
        record.state_ref = submission.state_ref;
        record.hooks = submission.hooks;
        record.linked_placeholder_ids = submission.linked_placeholder_ids;
        for id in scan_placeholder_ids(&serde_json::json!([
            record.descriptor.url.clone(),
            record.descriptor.config.clone(),
            record.descriptor.body.clone(),
        ])) {
            if !record.linked_placeholder_ids.contains(&id) {
                record.linked_placeholder_ids.push(id);
            }
        }

        record.persist = match submission.persist {
            Some(requested) => {
                if requested && self.shared.store.is_none() {
                    warn!(record_id = %record.id, "persistence requested without storage, disabling");
                    false
                } else {
                    requested
                }
            }
            None => {
                behavior == Behavior::Silent
                    && !record.hooks.has_fallback()
                    && self.shared.store.is_some()
            }
        };

        let receiver = if behavior == Behavior::Queue {
            let (sender, receiver) = oneshot::channel();
            record.responder = Some(sender);
            Some(receiver)
        } else {
            None
        };

        // Both guard lists may veto; a vetoed record never reaches the queue.
        if !record.hooks.run_before_enqueue() {
            debug!(record_id = %record.id, "before-enqueue guard vetoed record");
            return Ok(SubmitOutcome::Vetoed { record_id: record.id });
        }

        if record.persist {
            if let Some(store) = &self.shared.store {
                store.persist(&record.to_persisted())?;
            }
        }

        if !record.hooks.run_enqueued() {
            debug!(record_id = %record.id, "enqueued guard vetoed record");
            if record.persist {
                if let Some(store) = &self.shared.store {
                    store.remove(&record.id, &queue_name)?;
                }
            }
            return Ok(SubmitOutcome::Vetoed { record_id: record.id });
        }

        let record_id = record.id.clone();
        self.shared
            .scheduler
            .with_queue(&queue_name, |queue| queue.push(record));
        debug!(record_id = %record_id, queue = %queue_name, %behavior, "record enqueued");
        kick(&self.shared, &queue_name);

        Ok(match receiver {
            Some(receiver) => SubmitOutcome::Pending(receiver),
            None => SubmitOutcome::Accepted { record_id },
        })
    }

    /// Reload every persisted queue and resume processing. Emits the global
    /// boot event once and returns the number of records resumed.
    pub async fn boot(&self) -> Result<usize> {
        let Some(store) = &self.shared.store else {
            return Ok(0);
        };

        let mut resumed = Vec::new();
        for (queue_name, persisted) in store.load_all()? {
            let count = self.shared.scheduler.with_queue(&queue_name, |queue| {
                let mut count = 0;
                for record in persisted {
                    match SubmissionRecord::from_persisted(record, &self.shared.registry) {
                        Ok(record) => {
                            queue.push(record);
                            count += 1;
                        }
                        Err(error) => {
                            warn!(queue = %queue_name, %error, "skipping unloadable record");
                        }
                    }
                }
                count
            });
            resumed.push((queue_name, count));
        }

        let total: usize = resumed.iter().map(|(_, count)| count).sum();
        info!(total, "outbox boot complete");
        self.shared.events.emit_boot(&BootEvent {
            queues: resumed.clone(),
            emitted_at: Utc::now(),
        });

        for (queue_name, _) in &resumed {
            kick(&self.shared, queue_name);
        }
        Ok(total)
    }

    /// Snapshot of the records currently queued under a name.
    pub fn records(&self, queue_name: &str) -> Vec<RecordSummary> {
        self.shared
            .scheduler
            .with_existing_queue(queue_name, |queue| queue.summaries())
            .unwrap_or_default()
    }

    /// Manually remove a queued record from its queue and the store. The
    /// in-flight head cannot be removed. Returns whether a record was found.
    pub fn discard(&self, queue_name: &str, record_id: &str) -> Result<bool> {
        let removed = self
            .shared
            .scheduler
            .with_existing_queue(queue_name, |queue| queue.remove(record_id))
            .transpose()?
            .flatten();

        match removed {
            Some(record) => {
                if record.persist {
                    if let Some(store) = &self.shared.store {
                        store.remove(&record.id, queue_name)?;
                    }
                }
                info!(record_id, queue = queue_name, "record discarded");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn default_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            ErrorMatcher::Any,
            self.config.default_max_retries,
            self.config.default_backoff(),
        )
    }
}
