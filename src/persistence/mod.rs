//! # Persistence Layer
//!
//! Durable mirror of the submission queues over a host-provided key/value
//! capability. Two logical namespaces: a `queue-index` key mapping queue
//! name to ordered record ids, and one `record:<id>` slot per record holding
//! its serialized payload. Serialization runs through a registry of
//! forward/backward serializers so dates, regexes, placeholders, and host
//! custom types survive a restart.

pub mod serializers;
pub mod storage;
pub mod store;

pub use serializers::{serial, Serializer, SerializerRegistry};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use store::PersistenceStore;
