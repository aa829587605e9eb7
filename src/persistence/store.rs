use crate::error::{OutboxError, Result};
use crate::persistence::serializers::SerializerRegistry;
use crate::persistence::storage::Storage;
use crate::submission::PersistedRecord;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

type QueueIndex = BTreeMap<String, Vec<String>>;

/// Durable mirror of the submission queues.
///
/// Only the queue runner and the enqueue/discard operations touch the store,
/// so its read-modify-write of the queue index needs no further locking
/// inside the process.
pub struct PersistenceStore {
    storage: Arc<dyn Storage>,
    serializers: SerializerRegistry,
    prefix: String,
}

impl PersistenceStore {
    pub fn new(
        storage: Arc<dyn Storage>,
        serializers: SerializerRegistry,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            serializers,
            prefix: prefix.into(),
        }
    }

    pub fn serializers(&self) -> &SerializerRegistry {
        &self.serializers
    }

    fn index_key(&self) -> String {
        format!("{}queue-index", self.prefix)
    }

    fn record_key(&self, record_id: &str) -> String {
        format!("{}record:{record_id}", self.prefix)
    }

    /// Write a record payload and add it to its queue's index. Idempotent:
    /// persisting the same record twice leaves one index entry.
    pub fn persist(&self, record: &PersistedRecord) -> Result<()> {
        let raw = serde_json::to_value(record)?;
        let encoded = self.serializers.forward_tree(&raw);
        self.storage
            .set(&self.record_key(&record.id), serde_json::to_string(&encoded)?);

        let mut index = self.load_index();
        let ids = index.entry(record.queue_name.clone()).or_default();
        if !ids.iter().any(|id| id == &record.id) {
            ids.push(record.id.clone());
        }
        self.write_index(&index)?;

        debug!(record_id = %record.id, queue = %record.queue_name, "record persisted");
        Ok(())
    }

    /// Remove a record payload and its index entry.
    pub fn remove(&self, record_id: &str, queue_name: &str) -> Result<()> {
        self.storage.remove(&self.record_key(record_id));

        let mut index = self.load_index();
        if let Some(ids) = index.get_mut(queue_name) {
            ids.retain(|id| id != record_id);
            if ids.is_empty() {
                index.remove(queue_name);
            }
        }
        self.write_index(&index)?;

        debug!(record_id, queue = queue_name, "record removed from store");
        Ok(())
    }

    /// Load every persisted queue in stored order. A record that fails to
    /// decode is skipped rather than aborting the whole load.
    pub fn load_all(&self) -> Result<Vec<(String, Vec<PersistedRecord>)>> {
        let index = self.load_index();
        let mut queues = Vec::new();
        for (queue_name, ids) in index {
            let mut records = Vec::new();
            for id in ids {
                match self.load_record(&id) {
                    Ok(record) => records.push(record),
                    Err(error) => {
                        warn!(record_id = %id, queue = %queue_name, %error,
                              "skipping corrupted persisted record");
                    }
                }
            }
            queues.push((queue_name, records));
        }
        Ok(queues)
    }

    fn load_record(&self, record_id: &str) -> Result<PersistedRecord> {
        let raw = self
            .storage
            .get(&self.record_key(record_id))
            .ok_or_else(|| {
                OutboxError::Storage(format!("record {record_id} missing from storage"))
            })?;
        let encoded: serde_json::Value = serde_json::from_str(&raw)?;
        let decoded = self.serializers.backward_tree(&encoded)?;
        Ok(serde_json::from_value(decoded)?)
    }

    fn load_index(&self) -> QueueIndex {
        match self.storage.get(&self.index_key()) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|error| {
                warn!(%error, "corrupt queue index, starting empty");
                QueueIndex::new()
            }),
            None => QueueIndex::new(),
        }
    }

    fn write_index(&self, index: &QueueIndex) -> Result<()> {
        if index.is_empty() {
            self.storage.remove(&self.index_key());
            return Ok(());
        }
        self.storage
            .set(&self.index_key(), serde_json::to_string(index)?);
        Ok(())
    }
}
