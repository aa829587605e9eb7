//! Regenerate factories.
//!
//! When a request body was produced by invoking a caller-supplied builder
//! whose branching depends on a placeholder's value, field substitution on
//! the stored descriptor is not enough: the builder must run again with the
//! resolved arguments. Closures do not persist, so a record carries a
//! serializable `(factory_id, args)` descriptor resolved through this
//! registry at run time.

use crate::error::{OutboxError, Result};
use crate::request::RequestDescriptor;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

type FactoryFn = dyn Fn(&[Value]) -> Result<RequestDescriptor> + Send + Sync;

/// Serializable pointer to a registered request builder plus its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegenerateDescriptor {
    pub factory_id: String,
    pub args: Vec<Value>,
}

impl RegenerateDescriptor {
    pub fn new(factory_id: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            factory_id: factory_id.into(),
            args,
        }
    }
}

/// Table of registered request builders, keyed by factory id.
#[derive(Clone, Default)]
pub struct FactoryRegistry {
    factories: Arc<DashMap<String, Arc<FactoryFn>>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, factory_id: impl Into<String>, factory: F)
    where
        F: Fn(&[Value]) -> Result<RequestDescriptor> + Send + Sync + 'static,
    {
        self.factories.insert(factory_id.into(), Arc::new(factory));
    }

    pub fn contains(&self, factory_id: &str) -> bool {
        self.factories.contains_key(factory_id)
    }

    /// Rebuild a request descriptor by running the registered factory with
    /// the (already substituted) arguments.
    pub fn rebuild(&self, descriptor: &RegenerateDescriptor) -> Result<RequestDescriptor> {
        let factory = self
            .factories
            .get(&descriptor.factory_id)
            .ok_or_else(|| {
                OutboxError::Factory(format!(
                    "no factory registered for id `{}`",
                    descriptor.factory_id
                ))
            })?
            .clone();
        factory(&descriptor.args)
    }
}
