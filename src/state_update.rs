//! State update seam.
//!
//! Reactive state belongs to the host. When a silent submission resolves, the
//! runner pushes placeholder substitutions into that state through this
//! capability; the core never owns or reads state itself.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Serializable pointer to a piece of host-owned state.
///
/// The matcher is opaque to the core: the host decides how to locate the state
/// it refers to (a cache key, a store path, a component id). It round-trips
/// through persistence with its record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRef {
    pub matcher: Value,
}

impl StateRef {
    pub fn new(matcher: Value) -> Self {
        Self { matcher }
    }
}

/// Host capability for patching live state.
///
/// The implementation locates the state named by `target` and runs `mutator`
/// over its JSON representation; the core's mutator replaces placeholder ids
/// with resolved values.
pub trait StateUpdate: Send + Sync {
    fn apply(&self, target: &StateRef, mutator: &mut dyn FnMut(&mut Value));
}
