//! # Event Bus
//!
//! Global lifecycle hooks for the queue runner: boot, success, error, and
//! complete. Handlers are ordered append-only lists invoked synchronously in
//! registration order; a failing handler is logged and skipped so the rest
//! of the list still runs.

pub mod bus;

pub use bus::{BootEvent, CompletionEvent, EventBus};
