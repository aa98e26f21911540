//! Local Key-Value Storage
//!
//! Backends for persisting cache entries between loads.
//! `MemoryStorage` lives as long as the process; `FileStorage` keeps one file
//! per key on local disk so entries survive restarts.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use moka::sync::Cache;
use sha1::{Digest, Sha1};
use tracing::{debug, info};

/// Storage backend failure
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// String key-value storage scoped to this client
pub trait KeyValueStorage: Send + Sync {
    /// Read the value stored under `key`, if any
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`; removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-process storage backed by a Moka cache
pub struct MemoryStorage {
    entries: Cache<String, String>,
}

impl MemoryStorage {
    /// Create unbounded in-memory storage
    pub fn new() -> Self {
        Self {
            entries: Cache::builder().name("content_storage").build(),
        }
    }

    /// Create in-memory storage holding at most `max_entries` keys
    pub fn with_capacity(max_entries: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_entries)
                .name("content_storage")
                .build(),
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.invalidate(key);
        Ok(())
    }
}

/// Disk-backed storage, one JSON file per key
pub struct FileStorage {
    /// Root directory for stored values
    dir: PathBuf,
}

impl FileStorage {
    /// Create storage under the user's cache directory
    ///
    /// # Arguments
    /// * `namespace` - Subdirectory name, keeps unrelated sites apart
    pub fn new(namespace: &str) -> Result<Self, StorageError> {
        let dir = dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("content-sync")
            .join(namespace);

        Self::with_dir(dir)
    }

    /// Create storage rooted at an explicit directory
    pub fn with_dir(dir: PathBuf) -> Result<Self, StorageError> {
        fs::create_dir_all(&dir)?;

        let storage = Self { dir };

        // Clean up any stale temp files from previous runs
        storage.cleanup();

        info!(dir = %storage.dir.display(), "File storage initialized");
        Ok(storage)
    }

    /// Remove `.tmp` files left from interrupted writes
    pub fn cleanup(&self) {
        if let Ok(read_dir) = fs::read_dir(&self.dir) {
            for entry in read_dir.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "tmp") {
                    debug!(path = %path.display(), "Removing stale temp file");
                    let _ = fs::remove_file(&path);
                }
            }
        }
    }

    /// Map a key to its file. Keys are hashed so any string is a valid name.
    fn path_for(&self, key: &str) -> PathBuf {
        let mut hasher = Sha1::new();
        hasher.update(key.as_bytes());
        self.dir.join(format!("{:x}.json", hasher.finalize()))
    }

    /// Get the storage directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);

        // Write atomically using tempfile
        let mut tmp = tempfile::Builder::new()
            .suffix(".tmp")
            .tempfile_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.persist(&path).map_err(|e| StorageError::Persist {
            path: path.clone(),
            source: e.error,
        })?;

        debug!(key = key, path = %path.display(), size = value.len(), "Stored value");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
