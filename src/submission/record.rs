use crate::error::Result;
use crate::placeholder::{PlaceholderRegistry, PlaceholderValue};
use crate::request::RequestDescriptor;
use crate::state_update::StateRef;
use crate::submission::hooks::RecordHooks;
use crate::submission::retry::RetryPolicy;
use crate::submission::states::RecordState;
use crate::submission::factory::RegenerateDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Submission behavior, decided once per enqueue attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// Enqueue; on failure reject the caller, remove from queue, never retry.
    Queue,
    /// Enqueue, satisfy the caller with a placeholder response immediately,
    /// and keep retrying across reloads until success, a non-retryable
    /// error, or manual removal.
    Silent,
    /// Do not queue at all; behave like an ordinary immediate request.
    Static,
}

impl fmt::Display for Behavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue => write!(f, "queue"),
            Self::Silent => write!(f, "silent"),
            Self::Static => write!(f, "static"),
        }
    }
}

impl std::str::FromStr for Behavior {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "queue" => Ok(Self::Queue),
            "silent" => Ok(Self::Silent),
            "static" => Ok(Self::Static),
            _ => Err(format!("Invalid behavior: {s}")),
        }
    }
}

type BehaviorStrategyFn = dyn Fn(&RequestDescriptor) -> Behavior + Send + Sync;

/// Either a fixed behavior or a strategy evaluated once per enqueue attempt;
/// the resolved value is cached on the record for that attempt.
#[derive(Clone)]
pub enum BehaviorSpec {
    Fixed(Behavior),
    Strategy(Arc<BehaviorStrategyFn>),
}

impl BehaviorSpec {
    pub fn strategy(f: impl Fn(&RequestDescriptor) -> Behavior + Send + Sync + 'static) -> Self {
        Self::Strategy(Arc::new(f))
    }

    pub fn resolve(&self, descriptor: &RequestDescriptor) -> Behavior {
        match self {
            Self::Fixed(behavior) => *behavior,
            Self::Strategy(f) => f(descriptor),
        }
    }
}

impl From<Behavior> for BehaviorSpec {
    fn from(behavior: Behavior) -> Self {
        Self::Fixed(behavior)
    }
}

impl fmt::Debug for BehaviorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(behavior) => write!(f, "BehaviorSpec::Fixed({behavior})"),
            Self::Strategy(_) => write!(f, "BehaviorSpec::Strategy(..)"),
        }
    }
}

/// One queued unit of work.
pub struct SubmissionRecord {
    pub id: String,
    pub queue_name: String,
    pub behavior: Behavior,
    pub descriptor: RequestDescriptor,
    /// Whether the record mirrors into the persistence store.
    pub persist: bool,
    pub retry_policy: Option<RetryPolicy>,
    /// Placeholder ids this record's request depended on.
    pub linked_placeholder_ids: Vec<String>,
    /// Root of the placeholder tree handed to the caller of a silent
    /// submission; paired against the real response on success.
    pub virtual_response: Option<PlaceholderValue>,
    pub regenerate: Option<RegenerateDescriptor>,
    /// Live application state to patch when resolution happens.
    pub state_ref: Option<StateRef>,
    pub created_at: DateTime<Utc>,
    pub(crate) retry_count: u32,
    pub(crate) state: RecordState,
    /// Resolves or rejects the caller of a queue-mode submission.
    pub(crate) responder: Option<oneshot::Sender<Result<Value>>>,
    pub(crate) hooks: RecordHooks,
}

impl fmt::Debug for SubmissionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionRecord")
            .field("id", &self.id)
            .field("queue_name", &self.queue_name)
            .field("behavior", &self.behavior)
            .field("state", &self.state)
            .field("retry_count", &self.retry_count)
            .field("persist", &self.persist)
            .finish()
    }
}

impl SubmissionRecord {
    pub fn new(
        queue_name: impl Into<String>,
        behavior: Behavior,
        descriptor: RequestDescriptor,
    ) -> Self {
        Self {
            id: format!("sr_{}", Uuid::new_v4().simple()),
            queue_name: queue_name.into(),
            behavior,
            descriptor,
            persist: false,
            retry_policy: None,
            linked_placeholder_ids: Vec::new(),
            virtual_response: None,
            regenerate: None,
            state_ref: None,
            created_at: Utc::now(),
            retry_count: 0,
            state: RecordState::default(),
            responder: None,
            hooks: RecordHooks::default(),
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    /// Serializable snapshot for the persistence store.
    pub fn to_persisted(&self) -> PersistedRecord {
        PersistedRecord {
            id: self.id.clone(),
            queue_name: self.queue_name.clone(),
            behavior: self.behavior,
            descriptor: self.descriptor.clone(),
            retry_policy: self.retry_policy.clone(),
            linked_placeholder_ids: self.linked_placeholder_ids.clone(),
            virtual_response: self
                .virtual_response
                .as_ref()
                .map(|root| root.to_tagged_tree()),
            regenerate: self.regenerate.clone(),
            state_ref: self.state_ref.clone(),
            created_at: self.created_at,
        }
    }

    /// Rebuild a live record from its persisted snapshot. Runtime plumbing
    /// (responder, hooks) starts empty; a resumed silent record surfaces only
    /// through the event bus.
    pub fn from_persisted(
        persisted: PersistedRecord,
        registry: &PlaceholderRegistry,
    ) -> Result<Self> {
        let virtual_response = persisted
            .virtual_response
            .as_ref()
            .map(|tree| PlaceholderValue::from_tagged_tree(registry, tree))
            .transpose()?;
        Ok(Self {
            id: persisted.id,
            queue_name: persisted.queue_name,
            behavior: persisted.behavior,
            descriptor: persisted.descriptor,
            persist: true,
            retry_policy: persisted.retry_policy,
            linked_placeholder_ids: persisted.linked_placeholder_ids,
            virtual_response,
            regenerate: persisted.regenerate,
            state_ref: persisted.state_ref,
            created_at: persisted.created_at,
            retry_count: 0,
            state: RecordState::Queued,
            responder: None,
            hooks: RecordHooks::default(),
        })
    }
}

/// Durable form of a submission record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub id: String,
    pub queue_name: String,
    pub behavior: Behavior,
    pub descriptor: RequestDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default)]
    pub linked_placeholder_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regenerate: Option<RegenerateDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_ref: Option<StateRef>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placeholder::LockLevel;
    use serde_json::json;

    #[test]
    fn behavior_string_conversion() {
        assert_eq!(Behavior::Silent.to_string(), "silent");
        assert_eq!("queue".parse::<Behavior>().unwrap(), Behavior::Queue);
        assert!("other".parse::<Behavior>().is_err());
    }

    #[test]
    fn behavior_strategy_resolves_per_descriptor() {
        let spec = BehaviorSpec::strategy(|desc| {
            if desc.method == "GET" {
                Behavior::Static
            } else {
                Behavior::Silent
            }
        });
        assert_eq!(
            spec.resolve(&RequestDescriptor::new("GET", "/items")),
            Behavior::Static
        );
        assert_eq!(
            spec.resolve(&RequestDescriptor::new("POST", "/items")),
            Behavior::Silent
        );
    }

    #[test]
    fn persisted_round_trip_preserves_identity() {
        let registry = PlaceholderRegistry::new();
        let root = registry.with_lock_level(LockLevel::Open, || {
            let root = registry.create(json!({"id": 1}));
            root.field("id").unwrap();
            root
        });

        let mut record = SubmissionRecord::new(
            "queue-a",
            Behavior::Silent,
            RequestDescriptor::new("POST", "/item"),
        );
        record.virtual_response = Some(root.clone());
        record.linked_placeholder_ids = vec!["vd_upstream".to_string()];

        let persisted = record.to_persisted();
        let json = serde_json::to_string(&persisted).unwrap();
        let parsed: PersistedRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, persisted);

        let revived = SubmissionRecord::from_persisted(parsed, &registry).unwrap();
        assert_eq!(revived.id, record.id);
        assert_eq!(
            revived.virtual_response.as_ref().unwrap().raw_id(),
            root.raw_id()
        );
        assert_eq!(revived.state(), RecordState::Queued);
        assert!(revived.persist);
    }
}
