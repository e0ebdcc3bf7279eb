//! Persistence: chunk record keys and the key-value stores that hold them.
//!
//! # Invariants
//! - Key bytes are defined by the storage engine; callers build them with
//!   [`chunk_key`] and never interpret them.
//! - Existence checks are reads only.
//! - A `StorageHandle` is tied to one storage instance, identified by its epoch.

pub mod key;
pub mod store;

pub use key::{ChunkDataKey, chunk_index, chunk_key};
pub use store::{DirStore, KeyValueStore, MemoryStore, StorageHandle, StoreError};
