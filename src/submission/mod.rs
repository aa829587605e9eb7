//! # Submission Records
//!
//! A [`SubmissionRecord`] is one queued unit of work: the request descriptor,
//! its behavior mode, retry policy, the placeholder ids it depends on, and
//! the runtime plumbing (responder, hooks) the queue runner drives.

pub mod factory;
pub mod hooks;
pub mod record;
pub mod retry;
pub mod states;

pub use factory::{FactoryRegistry, RegenerateDescriptor};
pub use hooks::{RecordHooks, RetryEvent};
pub use record::{Behavior, BehaviorSpec, PersistedRecord, SubmissionRecord};
pub use retry::{BackoffConfig, ErrorMatcher, RetryPolicy};
pub use states::RecordState;
