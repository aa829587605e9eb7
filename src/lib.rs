//! # Outbox Core
//!
//! Client-side ordered write submission. Writes are enqueued into named FIFO
//! queues and sent one at a time; the caller gets an immediate placeholder
//! ("virtual") response whose values are filled in when the server answers.
//! Later requests in a queue that reference those placeholders are rewritten
//! with the real values before they are sent, so dependent writes stay
//! consistent without the caller waiting on the network.
//!
//! ## Architecture
//!
//! - **placeholder**: virtual values, the tagged JSON stand-ins with
//!   defaults, cached children, and a registry-governed lock level.
//! - **submission**: records with behavior modes, retry policies,
//!   regenerate factories, per-record hooks, and durable snapshots.
//! - **queue**: named FIFO queues, the scheduler context that owns them,
//!   the single-flight runner loop, and the substitution pass.
//! - **persistence**: durable mirror of the queues over a host key/value
//!   capability, with pluggable value serializers.
//! - **events**: global boot/success/error/complete lifecycle hooks.
//! - **outbox**: the public facade tying it all together.
//!
//! ## Example
//!
//! ```no_run
//! use outbox_core::{Behavior, Outbox, RequestDescriptor, Submission};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn run(transport: Arc<dyn outbox_core::Transport>) -> outbox_core::Result<()> {
//! let outbox = Outbox::builder().transport(transport).build()?;
//!
//! let descriptor = RequestDescriptor::new("POST", "/items")
//!     .with_body(json!({"title": "first"}));
//! outbox
//!     .submit(Submission::new(descriptor).behavior(Behavior::Silent))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod outbox;
pub mod persistence;
pub mod placeholder;
pub mod queue;
pub mod request;
pub mod state_update;
pub mod submission;

pub use config::OutboxConfig;
pub use error::{OutboxError, Result};
pub use events::{BootEvent, CompletionEvent, EventBus};
pub use logging::init_logging;
pub use outbox::{Outbox, OutboxBuilder, Submission, SubmitOutcome};
pub use persistence::{
    serial, FileStorage, MemoryStorage, PersistenceStore, Serializer, SerializerRegistry, Storage,
};
pub use placeholder::{
    FieldRead, LockLevel, PathSegment, PlaceholderRegistry, PlaceholderValue, VirtualDefault,
};
pub use queue::RecordSummary;
pub use request::{RequestDescriptor, Transport};
pub use state_update::{StateRef, StateUpdate};
pub use submission::{
    BackoffConfig, Behavior, BehaviorSpec, ErrorMatcher, FactoryRegistry, PersistedRecord,
    RecordHooks, RecordState, RegenerateDescriptor, RetryEvent, RetryPolicy, SubmissionRecord,
};
