//! # Placeholder (Virtual Value) Model
//!
//! A [`PlaceholderValue`] stands in for data the server has not returned yet.
//! It carries a process-unique id and an immutable default, manufactures
//! cached child placeholders for nested access, and embeds into request
//! bodies as a tagged JSON node that the substitution pass can later replace
//! with the real value.
//!
//! The [`PlaceholderRegistry`] owns the cross-cutting bookkeeping: the lock
//! level that governs attribute access, the collection baskets that learn
//! which placeholder ids a request body depended on, and the table of
//! already-resolved values consulted once the registry is locked.

pub mod registry;
pub mod value;

pub use registry::{LockLevel, PlaceholderRegistry};
pub use value::{FieldRead, PathSegment, PlaceholderValue, VirtualDefault};
