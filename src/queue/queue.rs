use crate::error::{OutboxError, Result};
use crate::submission::{Behavior, RecordState, SubmissionRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// Read-only view of one queued record, for inspection APIs.
#[derive(Debug, Clone, Serialize)]
pub struct RecordSummary {
    pub id: String,
    pub behavior: Behavior,
    pub state: RecordState,
    pub retry_count: u32,
    pub method: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// A named, ordered collection of submission records.
///
/// Records append at the tail and execute head-first; `requesting` is either
/// empty or the head record's id, never anything else.
pub struct SubmissionQueue {
    pub name: String,
    records: VecDeque<SubmissionRecord>,
    requesting: Option<String>,
    /// Whether a runner task currently owns this queue.
    pub(crate) running: bool,
}

impl SubmissionQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: VecDeque::new(),
            requesting: None,
            running: false,
        }
    }

    pub fn push(&mut self, mut record: SubmissionRecord) {
        record.state = RecordState::Queued;
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn head(&self) -> Option<&SubmissionRecord> {
        self.records.front()
    }

    pub fn head_mut(&mut self) -> Option<&mut SubmissionRecord> {
        self.records.front_mut()
    }

    pub fn pop_head(&mut self) -> Option<SubmissionRecord> {
        self.requesting = None;
        self.records.pop_front()
    }

    pub fn requesting(&self) -> Option<&str> {
        self.requesting.as_deref()
    }

    /// Mark the head as the in-flight record.
    pub fn mark_requesting(&mut self) -> Result<()> {
        let head = self.records.front_mut().ok_or_else(|| {
            OutboxError::Queue(format!("queue `{}` has no head to mark requesting", self.name))
        })?;
        head.state = RecordState::Requesting;
        self.requesting = Some(head.id.clone());
        Ok(())
    }

    pub fn clear_requesting(&mut self) {
        self.requesting = None;
    }

    /// Remove a record by id. The in-flight head cannot be removed; it stays
    /// owned by the runner until it resolves or fails.
    pub fn remove(&mut self, record_id: &str) -> Result<Option<SubmissionRecord>> {
        if self.requesting.as_deref() == Some(record_id) {
            return Err(OutboxError::Queue(format!(
                "record {record_id} is currently in flight and cannot be removed"
            )));
        }
        let position = self.records.iter().position(|r| r.id == record_id);
        Ok(position.and_then(|idx| self.records.remove(idx)))
    }

    pub fn summaries(&self) -> Vec<RecordSummary> {
        self.records
            .iter()
            .map(|record| RecordSummary {
                id: record.id.clone(),
                behavior: record.behavior,
                state: record.state,
                retry_count: record.retry_count,
                method: record.descriptor.method.clone(),
                url: record.descriptor.url.clone(),
                created_at: record.created_at,
            })
            .collect()
    }
}
