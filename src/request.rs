//! Request entity seam.
//!
//! The core never speaks a wire protocol. It holds a [`RequestDescriptor`] for
//! every queued write and hands it to the host's [`Transport`] when the record
//! reaches the head of its queue. A descriptor is plain data so it can be
//! persisted, rewritten during placeholder substitution, and rebuilt by a
//! regenerate factory.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything needed to (re)construct a request against the host transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub method: String,
    pub url: String,
    /// Transport-specific configuration (headers, params, timeouts).
    #[serde(default)]
    pub config: Value,
    #[serde(default)]
    pub body: Value,
}

impl RequestDescriptor {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            config: Value::Null,
            body: Value::Null,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }
}

/// Host-provided transport capability.
///
/// An aborted in-flight request must surface as `Err` rather than vanishing:
/// the runner treats it like any other failure so the queue never loses track
/// of an unresolved write.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RequestDescriptor) -> Result<Value>;
}
