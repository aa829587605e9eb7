use crate::placeholder::value::{PlaceholderValue, VirtualDefault};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Governs how placeholder attribute access behaves.
///
/// `Open` is active only while a request body is being constructed;
/// `SemiLocked` while success callbacks are being decorated; `Locked` is the
/// normal runtime mode, in which placeholders behave as frozen defaults and
/// stray access raises instead of silently manufacturing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockLevel {
    Open,
    SemiLocked,
    Locked,
}

impl LockLevel {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Locked)
    }
}

impl Default for LockLevel {
    fn default() -> Self {
        Self::Locked
    }
}

impl fmt::Display for LockLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::SemiLocked => write!(f, "semi_locked"),
            Self::Locked => write!(f, "locked"),
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    lock_level: RwLock<LockLevel>,
    /// Stack of active collection baskets; placeholder touches land in the
    /// innermost one.
    baskets: Mutex<Vec<Vec<String>>>,
    /// Real values for placeholders that have already resolved.
    resolved: DashMap<String, Value>,
}

/// Process-wide placeholder bookkeeping, shared by handle.
///
/// Placeholder creation never fails; everything here is infallible except
/// locked-mode reads on the values themselves.
#[derive(Clone, Default)]
pub struct PlaceholderRegistry {
    inner: Arc<RegistryInner>,
}

impl PlaceholderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a placeholder with the given default value. A JSON `null`
    /// default is represented distinctly from an absent one.
    pub fn create(&self, default: Value) -> PlaceholderValue {
        PlaceholderValue::create(self.clone(), VirtualDefault::from_value(default))
    }

    /// Create a placeholder with no default at all.
    pub fn create_missing(&self) -> PlaceholderValue {
        PlaceholderValue::create(self.clone(), VirtualDefault::Missing)
    }

    pub fn lock_level(&self) -> LockLevel {
        *self.inner.lock_level.read()
    }

    pub fn set_lock_level(&self, level: LockLevel) {
        *self.inner.lock_level.write() = level;
    }

    /// Run `f` at the given lock level, restoring the previous level after.
    pub fn with_lock_level<T>(&self, level: LockLevel, f: impl FnOnce() -> T) -> T {
        let previous = self.lock_level();
        self.set_lock_level(level);
        let result = f();
        self.set_lock_level(previous);
        result
    }

    /// Run `f` with an active collection basket and return the ids of every
    /// placeholder touched while it ran.
    pub fn collect<T>(&self, f: impl FnOnce() -> T) -> (T, Vec<String>) {
        self.inner.baskets.lock().push(Vec::new());
        let result = f();
        let basket = self
            .inner
            .baskets
            .lock()
            .pop()
            .unwrap_or_default();
        (result, basket)
    }

    /// Register a placeholder touch into the innermost active basket.
    pub(crate) fn track(&self, id: &str) {
        let mut baskets = self.inner.baskets.lock();
        if let Some(basket) = baskets.last_mut() {
            if !basket.iter().any(|existing| existing == id) {
                basket.push(id.to_string());
            }
        }
    }

    /// Record the real value a placeholder resolved to.
    pub fn record_resolved(&self, id: &str, value: Value) {
        self.inner.resolved.insert(id.to_string(), value);
    }

    pub fn resolved(&self, id: &str) -> Option<Value> {
        self.inner.resolved.get(id).map(|v| v.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_lock_level_is_locked() {
        let registry = PlaceholderRegistry::new();
        assert!(registry.lock_level().is_locked());
    }

    #[test]
    fn with_lock_level_restores_previous() {
        let registry = PlaceholderRegistry::new();
        registry.with_lock_level(LockLevel::Open, || {
            assert!(registry.lock_level().is_open());
        });
        assert!(registry.lock_level().is_locked());
    }

    #[test]
    fn collect_captures_touched_ids_once() {
        let registry = PlaceholderRegistry::new();
        let ph = registry.create(json!(1));
        let untouched = registry.create(json!(2));

        let ((), ids) = registry.collect(|| {
            ph.id();
            ph.as_json();
        });
        assert_eq!(ids, vec![ph.id()]);
        assert!(!ids.contains(&untouched.id()));
    }

    #[test]
    fn touches_outside_basket_are_dropped() {
        let registry = PlaceholderRegistry::new();
        let ph = registry.create(json!(1));
        ph.id();

        let ((), ids) = registry.collect(|| {});
        assert!(ids.is_empty());
    }

    #[test]
    fn resolved_values_are_readable() {
        let registry = PlaceholderRegistry::new();
        registry.record_resolved("vd_x", json!({"id": 9}));
        assert_eq!(registry.resolved("vd_x"), Some(json!({"id": 9})));
        assert_eq!(registry.resolved("vd_y"), None);
    }

    #[test]
    fn lock_level_serde_round_trip() {
        let json = serde_json::to_string(&LockLevel::SemiLocked).unwrap();
        assert_eq!(json, "\"semi_locked\"");
        let parsed: LockLevel = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, LockLevel::SemiLocked);
    }
}
