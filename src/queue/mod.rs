//! # Submission Queues & Runner
//!
//! Named FIFO queues of submission records, the scheduler context that owns
//! them, and the runner loop that drives one queue at a time: send the head,
//! interpret success or failure, schedule retries with backoff, propagate
//! resolved values into the remaining records and live state, advance.

pub mod queue;
pub mod runner;
pub mod scheduler;
pub mod substitution;

pub use queue::{RecordSummary, SubmissionQueue};
pub use scheduler::SchedulerContext;
pub use substitution::SubstitutionMap;
