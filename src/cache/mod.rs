//! Local content cache
//!
//! Cache entries are serialized to strings and kept in a pluggable
//! key-value storage, in memory (Moka) or on disk.

pub mod entry;
pub mod storage;

pub use entry::CacheEntry;
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError};
