#![allow(dead_code)]

use async_trait::async_trait;
use outbox_core::{OutboxError, RequestDescriptor, Result, Transport};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Scripted transport that records every send it sees.
///
/// Replies are popped from a FIFO script; an empty script answers
/// `{"ok": true}`. Cloning shares the script and the recordings.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    script: Mutex<VecDeque<Result<Value>>>,
    sends: Mutex<Vec<SendRecord>>,
    latency: Mutex<Option<Duration>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

#[derive(Clone)]
pub struct SendRecord {
    pub descriptor: RequestDescriptor,
    pub at: Instant,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold each send open for this long before answering.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.inner.latency.lock() = Some(latency);
        self
    }

    pub fn reply_ok(&self, value: Value) {
        self.inner.script.lock().push_back(Ok(value));
    }

    pub fn reply_err(&self, error: OutboxError) {
        self.inner.script.lock().push_back(Err(error));
    }

    pub fn reply_transport_err(&self, message: &str) {
        self.reply_err(OutboxError::Transport(message.to_string()));
    }

    pub fn send_count(&self) -> usize {
        self.inner.sends.lock().len()
    }

    pub fn sends(&self) -> Vec<SendRecord> {
        self.inner.sends.lock().clone()
    }

    pub fn sent_urls(&self) -> Vec<String> {
        self.inner
            .sends
            .lock()
            .iter()
            .map(|send| send.descriptor.url.clone())
            .collect()
    }

    /// Highest number of sends that were ever in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.inner.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<Value> {
        let active = self.inner.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_active.fetch_max(active, Ordering::SeqCst);
        self.inner.sends.lock().push(SendRecord {
            descriptor: request.clone(),
            at: Instant::now(),
        });

        let latency = *self.inner.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.inner.active.fetch_sub(1, Ordering::SeqCst);

        let reply = self.inner.script.lock().pop_front();
        reply.unwrap_or_else(|| Ok(json!({"ok": true})))
    }
}

/// Poll until `cond` holds, failing the test after a generous timeout.
pub async fn wait_for(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(30), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not met within timeout");
}
