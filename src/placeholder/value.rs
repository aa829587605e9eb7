use crate::error::{OutboxError, Result};
use crate::placeholder::registry::{LockLevel, PlaceholderRegistry};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// JSON key marking a tagged placeholder node inside a request body.
pub const VDATA_TAG: &str = "__vdata__";

/// Default carried by a placeholder.
///
/// `Missing` and `Null` are distinct so that coercions behave like the
/// represented JSON value: a placeholder for a value known to be `null` reads
/// as `null`, while one created with no default reads as absent.
#[derive(Debug, Clone, PartialEq)]
pub enum VirtualDefault {
    Missing,
    Null,
    Value(Value),
}

impl VirtualDefault {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            other => Self::Value(other),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// The default as a JSON value; both `Missing` and `Null` read as `null`.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Missing | Self::Null => Value::Null,
            Self::Value(v) => v.clone(),
        }
    }

    /// Sub-default at one path segment.
    pub fn at(&self, segment: &PathSegment) -> VirtualDefault {
        match (self, segment) {
            (Self::Value(Value::Object(map)), PathSegment::Key(key)) => match map.get(key) {
                Some(Value::Null) => Self::Null,
                Some(v) => Self::Value(v.clone()),
                None => Self::Missing,
            },
            (Self::Value(Value::Array(items)), PathSegment::Index(idx)) => {
                match items.get(*idx) {
                    Some(Value::Null) => Self::Null,
                    Some(v) => Self::Value(v.clone()),
                    None => Self::Missing,
                }
            }
            _ => Self::Missing,
        }
    }
}

/// One step of nested access: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(idx: usize) -> Self {
        Self::Index(idx)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => write!(f, "{key}"),
            Self::Index(idx) => write!(f, "[{idx}]"),
        }
    }
}

/// Result of reading a placeholder field: another placeholder while the
/// registry is open, or a plain value once it is locked.
#[derive(Debug, Clone)]
pub enum FieldRead {
    Placeholder(PlaceholderValue),
    Value(Value),
}

impl FieldRead {
    pub fn into_value(self) -> Value {
        match self {
            Self::Placeholder(ph) => ph.to_value(),
            Self::Value(v) => v,
        }
    }
}

struct PlaceholderInner {
    id: String,
    default: VirtualDefault,
    registry: PlaceholderRegistry,
    children: Mutex<HashMap<PathSegment, PlaceholderValue>>,
}

/// A lazily-resolved stand-in for a value not yet returned by the server.
///
/// Cloning is cheap and shares identity: clones expose the same id and the
/// same child cache, so repeated access to a nested field always yields the
/// same child placeholder.
#[derive(Clone)]
pub struct PlaceholderValue {
    inner: Arc<PlaceholderInner>,
}

impl fmt::Debug for PlaceholderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaceholderValue")
            .field("id", &self.inner.id)
            .field("default", &self.inner.default)
            .finish()
    }
}

impl PlaceholderValue {
    pub(crate) fn create(registry: PlaceholderRegistry, default: VirtualDefault) -> Self {
        Self::with_id(registry, fresh_id(), default)
    }

    pub(crate) fn with_id(
        registry: PlaceholderRegistry,
        id: String,
        default: VirtualDefault,
    ) -> Self {
        Self {
            inner: Arc::new(PlaceholderInner {
                id,
                default,
                registry,
                children: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The placeholder's id. Reading it registers the id into the active
    /// collection basket, which is how a request learns its dependencies.
    pub fn id(&self) -> String {
        self.inner.registry.track(&self.inner.id);
        self.inner.id.clone()
    }

    /// Id without dependency tracking, for internal bookkeeping.
    pub(crate) fn raw_id(&self) -> &str {
        &self.inner.id
    }

    pub fn default(&self) -> &VirtualDefault {
        &self.inner.default
    }

    /// Read a nested field. Behavior depends on the registry lock level:
    ///
    /// - `Open`: returns a new or cached child placeholder.
    /// - `SemiLocked`: returns an already-manufactured child, or forwards the
    ///   read to the default; never manufactures new placeholders.
    /// - `Locked`: returns the resolved real child value if known, the frozen
    ///   default if it covers the path, and fails otherwise.
    pub fn field(&self, segment: impl Into<PathSegment>) -> Result<FieldRead> {
        let segment = segment.into();
        match self.inner.registry.lock_level() {
            LockLevel::Open => {
                let mut children = self.inner.children.lock();
                let child = children.entry(segment.clone()).or_insert_with(|| {
                    PlaceholderValue::create(
                        self.inner.registry.clone(),
                        self.inner.default.at(&segment),
                    )
                });
                Ok(FieldRead::Placeholder(child.clone()))
            }
            LockLevel::SemiLocked => {
                if let Some(child) = self.inner.children.lock().get(&segment) {
                    return Ok(FieldRead::Placeholder(child.clone()));
                }
                let sub = self.inner.default.at(&segment);
                if sub.is_missing() {
                    Err(OutboxError::Validation(format!(
                        "placeholder {} has no field `{segment}`",
                        self.inner.id
                    )))
                } else {
                    Ok(FieldRead::Value(sub.to_value()))
                }
            }
            LockLevel::Locked => {
                if let Some(resolved) = self.inner.registry.resolved(&self.inner.id) {
                    let value = index_value(&resolved, &segment).unwrap_or(Value::Null);
                    return Ok(FieldRead::Value(value));
                }
                let sub = self.inner.default.at(&segment);
                if sub.is_missing() {
                    Err(OutboxError::Validation(format!(
                        "placeholder {} read under lock with no resolved value or default for `{segment}`",
                        self.inner.id
                    )))
                } else {
                    Ok(FieldRead::Value(sub.to_value()))
                }
            }
        }
    }

    /// The default coerced to JSON. Registers the id into the active basket.
    pub fn as_json(&self) -> Value {
        self.inner.registry.track(&self.inner.id);
        self.inner.default.to_value()
    }

    /// Numeric coercion of the default, when it is a number.
    pub fn coerce_f64(&self) -> Option<f64> {
        self.inner.registry.track(&self.inner.id);
        self.inner.default.to_value().as_f64()
    }

    /// String coercion of the default, behaving like the represented value.
    pub fn coerce_string(&self) -> String {
        self.inner.registry.track(&self.inner.id);
        match &self.inner.default {
            VirtualDefault::Missing => String::new(),
            VirtualDefault::Null => "null".to_string(),
            VirtualDefault::Value(Value::String(s)) => s.clone(),
            VirtualDefault::Value(v) => v.to_string(),
        }
    }

    /// Embed this placeholder into a request body or config as a tagged node.
    pub fn to_value(&self) -> Value {
        self.inner.registry.track(&self.inner.id);
        let mut map = Map::new();
        map.insert(VDATA_TAG.to_string(), Value::String(self.inner.id.clone()));
        match &self.inner.default {
            VirtualDefault::Missing => {}
            other => {
                map.insert("default".to_string(), other.to_value());
            }
        }
        Value::Object(map)
    }

    /// Token for embedding this placeholder into a URL or query string; the
    /// substitution pass rewrites the id substring with the resolved value.
    pub fn url_token(&self) -> String {
        self.id()
    }

    /// Snapshot of cached children, for structural pairing against a real
    /// response.
    pub(crate) fn children(&self) -> Vec<(PathSegment, PlaceholderValue)> {
        self.inner
            .children
            .lock()
            .iter()
            .map(|(seg, child)| (seg.clone(), child.clone()))
            .collect()
    }

    /// Serialize the placeholder tree (id, default, cached children) for
    /// persistence. Ids survive the round trip unchanged.
    pub(crate) fn to_tagged_tree(&self) -> Value {
        let mut node = Map::new();
        node.insert(VDATA_TAG.to_string(), Value::String(self.inner.id.clone()));
        match &self.inner.default {
            VirtualDefault::Missing => {}
            other => {
                node.insert("default".to_string(), other.to_value());
            }
        }
        let children = self.inner.children.lock();
        if !children.is_empty() {
            let encoded: Vec<Value> = children
                .iter()
                .map(|(seg, child)| {
                    let seg_value = match seg {
                        PathSegment::Key(key) => Value::String(key.clone()),
                        PathSegment::Index(idx) => json!(idx),
                    };
                    json!([seg_value, child.to_tagged_tree()])
                })
                .collect();
            node.insert("children".to_string(), Value::Array(encoded));
        }
        Value::Object(node)
    }

    /// Rebuild a placeholder tree produced by [`Self::to_tagged_tree`].
    pub(crate) fn from_tagged_tree(registry: &PlaceholderRegistry, value: &Value) -> Result<Self> {
        let node = value.as_object().ok_or_else(|| {
            OutboxError::Serialization("placeholder node is not an object".to_string())
        })?;
        let id = node
            .get(VDATA_TAG)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                OutboxError::Serialization("placeholder node missing id".to_string())
            })?
            .to_string();
        let default = match node.get("default") {
            None => VirtualDefault::Missing,
            Some(Value::Null) => VirtualDefault::Null,
            Some(v) => VirtualDefault::Value(v.clone()),
        };
        let placeholder = Self::with_id(registry.clone(), id, default);
        if let Some(children) = node.get("children").and_then(Value::as_array) {
            let mut cache = placeholder.inner.children.lock();
            for entry in children {
                let pair = entry.as_array().filter(|p| p.len() == 2).ok_or_else(|| {
                    OutboxError::Serialization("malformed placeholder child entry".to_string())
                })?;
                let segment = match &pair[0] {
                    Value::String(key) => PathSegment::Key(key.clone()),
                    Value::Number(n) => PathSegment::Index(n.as_u64().unwrap_or(0) as usize),
                    other => {
                        return Err(OutboxError::Serialization(format!(
                            "invalid placeholder child segment: {other}"
                        )))
                    }
                };
                let child = Self::from_tagged_tree(registry, &pair[1])?;
                cache.insert(segment, child);
            }
        }
        Ok(placeholder)
    }
}

/// Extract the placeholder id from a tagged node, if `value` is one.
pub(crate) fn tagged_id(value: &Value) -> Option<&str> {
    value.as_object()?.get(VDATA_TAG)?.as_str()
}

fn index_value<'a>(value: &'a Value, segment: &PathSegment) -> Option<Value> {
    match segment {
        PathSegment::Key(key) => value.get(key).cloned(),
        PathSegment::Index(idx) => value.get(idx).cloned(),
    }
}

fn fresh_id() -> String {
    format!("vd_{}", Uuid::new_v4().simple())
}
