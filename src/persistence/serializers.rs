//! Serializer registry.
//!
//! Record payloads are JSON trees that may embed non-JSON-native runtime
//! values as tagged nodes: dates, regular expressions, placeholder values,
//! and host custom types. Before a payload hits storage, every node is
//! offered to the registered serializers in order; the first `forward` that
//! accepts wraps the node as `[serializerName, encodedValue]`. `backward`
//! reverses the wrapping on load. A plain user array that happens to look
//! like a wrapped node (two elements, first names a serializer) is escaped
//! under the reserved `"raw"` tag so decoding always restores the original
//! tree. Forward encoding is idempotent over a round trip:
//! encode(decode(x)) == encode(x).

use crate::error::{OutboxError, Result};
use crate::placeholder::value::VDATA_TAG;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::warn;

/// Tag key for date nodes built with [`serial::date`].
pub const DATE_TAG: &str = "$date";
/// Tag key for regular-expression nodes built with [`serial::regexp`].
pub const REGEXP_TAG: &str = "$regexp";

/// Reserved wrapper name escaping plain arrays that collide with the
/// `[serializerName, encodedValue]` shape. Not registrable.
const RAW_TAG: &str = "raw";

/// One pluggable value serializer.
///
/// `forward` returns `None` for values it does not handle; `backward`
/// receives exactly what `forward` produced.
pub trait Serializer: Send + Sync {
    fn name(&self) -> &str;
    fn forward(&self, value: &Value) -> Option<Value>;
    fn backward(&self, encoded: &Value) -> Result<Value>;
}

/// Helpers for embedding non-JSON-native values into record payloads.
pub mod serial {
    use super::*;

    pub fn date(value: DateTime<Utc>) -> Value {
        json!({ DATE_TAG: value.timestamp_millis() })
    }

    pub fn date_from(value: &Value) -> Option<DateTime<Utc>> {
        let millis = value.as_object()?.get(DATE_TAG)?.as_i64()?;
        Utc.timestamp_millis_opt(millis).single()
    }

    pub fn regexp(pattern: &str) -> Value {
        json!({ REGEXP_TAG: pattern })
    }

    pub fn regexp_from(value: &Value) -> Option<regex::Regex> {
        let pattern = value.as_object()?.get(REGEXP_TAG)?.as_str()?;
        regex::Regex::new(pattern).ok()
    }
}

struct DateSerializer;

impl Serializer for DateSerializer {
    fn name(&self) -> &str {
        "date"
    }

    fn forward(&self, value: &Value) -> Option<Value> {
        let map = value.as_object()?;
        if map.len() == 1 {
            map.get(DATE_TAG).filter(|v| v.is_i64()).cloned()
        } else {
            None
        }
    }

    fn backward(&self, encoded: &Value) -> Result<Value> {
        let millis = encoded.as_i64().ok_or_else(|| {
            OutboxError::Serialization(format!("invalid date payload: {encoded}"))
        })?;
        Ok(json!({ DATE_TAG: millis }))
    }
}

struct RegexpSerializer;

impl Serializer for RegexpSerializer {
    fn name(&self) -> &str {
        "regexp"
    }

    fn forward(&self, value: &Value) -> Option<Value> {
        let map = value.as_object()?;
        if map.len() == 1 {
            map.get(REGEXP_TAG).filter(|v| v.is_string()).cloned()
        } else {
            None
        }
    }

    fn backward(&self, encoded: &Value) -> Result<Value> {
        let pattern = encoded.as_str().ok_or_else(|| {
            OutboxError::Serialization(format!("invalid regexp payload: {encoded}"))
        })?;
        regex::Regex::new(pattern).map_err(|e| {
            OutboxError::Serialization(format!("invalid regexp pattern `{pattern}`: {e}"))
        })?;
        Ok(json!({ REGEXP_TAG: pattern }))
    }
}

/// Encodes tagged placeholder nodes as `[id, encodedDefault]`, where the
/// second element carries the default (and any cached children) so the
/// rebuilt placeholder keeps its id and shape.
struct PlaceholderSerializer;

impl Serializer for PlaceholderSerializer {
    fn name(&self) -> &str {
        "vdata"
    }

    fn forward(&self, value: &Value) -> Option<Value> {
        let map = value.as_object()?;
        let id = map.get(VDATA_TAG)?.as_str()?;
        let mut rest = Map::new();
        for (key, field) in map {
            if key != VDATA_TAG {
                rest.insert(key.clone(), field.clone());
            }
        }
        Some(json!([id, Value::Object(rest)]))
    }

    fn backward(&self, encoded: &Value) -> Result<Value> {
        let pair = encoded
            .as_array()
            .filter(|items| items.len() == 2)
            .ok_or_else(|| {
                OutboxError::Serialization(format!("invalid placeholder payload: {encoded}"))
            })?;
        let id = pair[0].as_str().ok_or_else(|| {
            OutboxError::Serialization("placeholder payload missing id".to_string())
        })?;
        let mut node = pair[1]
            .as_object()
            .cloned()
            .ok_or_else(|| {
                OutboxError::Serialization("placeholder payload missing body".to_string())
            })?;
        node.insert(VDATA_TAG.to_string(), Value::String(id.to_string()));
        Ok(Value::Object(node))
    }
}

/// Ordered registry of serializers. Built-ins handle dates, regular
/// expressions, and placeholder values; hosts may register more.
#[derive(Clone)]
pub struct SerializerRegistry {
    entries: Arc<RwLock<Vec<Arc<dyn Serializer>>>>,
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        let registry = Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        };
        registry.register(Arc::new(DateSerializer));
        registry.register(Arc::new(RegexpSerializer));
        registry.register(Arc::new(PlaceholderSerializer));
        registry
    }
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, serializer: Arc<dyn Serializer>) {
        if serializer.name() == RAW_TAG {
            warn!("serializer name `raw` is reserved, ignoring registration");
            return;
        }
        self.entries.write().push(serializer);
    }

    fn find(&self, name: &str) -> Option<Arc<dyn Serializer>> {
        self.entries
            .read()
            .iter()
            .find(|s| s.name() == name)
            .cloned()
    }

    /// Whether decoding would mistake these items for a wrapped node.
    fn looks_wrapped(&self, items: &[Value]) -> bool {
        items.len() == 2
            && items[0]
                .as_str()
                .is_some_and(|name| name == RAW_TAG || self.find(name).is_some())
    }

    /// Encode a payload tree for storage.
    pub fn forward_tree(&self, value: &Value) -> Value {
        let entries = self.entries.read().clone();
        for serializer in &entries {
            if let Some(encoded) = serializer.forward(value) {
                return json!([serializer.name(), encoded]);
            }
        }
        match value {
            Value::Array(items) => {
                let encoded: Vec<Value> =
                    items.iter().map(|item| self.forward_tree(item)).collect();
                if self.looks_wrapped(&encoded) {
                    json!([RAW_TAG, Value::Array(encoded)])
                } else {
                    Value::Array(encoded)
                }
            }
            Value::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, field)| (key.clone(), self.forward_tree(field)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Decode a stored payload tree.
    pub fn backward_tree(&self, value: &Value) -> Result<Value> {
        if let Some(items) = value.as_array() {
            if items.len() == 2 {
                if let Some(name) = items[0].as_str() {
                    if name == RAW_TAG {
                        let inner = items[1].as_array().ok_or_else(|| {
                            OutboxError::Serialization(format!(
                                "invalid raw payload: {}",
                                items[1]
                            ))
                        })?;
                        let decoded: Result<Vec<Value>> =
                            inner.iter().map(|item| self.backward_tree(item)).collect();
                        return Ok(Value::Array(decoded?));
                    }
                    if let Some(serializer) = self.find(name) {
                        return serializer.backward(&items[1]);
                    }
                }
            }
            let decoded: Result<Vec<Value>> =
                items.iter().map(|item| self.backward_tree(item)).collect();
            return Ok(Value::Array(decoded?));
        }
        if let Some(fields) = value.as_object() {
            let mut decoded = Map::new();
            for (key, field) in fields {
                decoded.insert(key.clone(), self.backward_tree(field)?);
            }
            return Ok(Value::Object(decoded));
        }
        Ok(value.clone())
    }
}
