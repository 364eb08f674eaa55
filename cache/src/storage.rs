//! Key/value text stores backing the offer cache.
//!
//! Entries are permanent: there is no TTL, no size bound and no eviction.
//! Clearing a store is an out-of-band operation (delete the file).

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tally_utils::{SyncPolicy, atomic_write_with_sync, recover_bak_file};
use thiserror::Error;

/// Injected storage for serialized offers.
pub trait CacheStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cache store {} could not be read: {error}", .path.display())]
    Read { path: PathBuf, error: io::Error },
    #[error("cache store {} is not a JSON object of strings: {error}", .path.display())]
    Corrupt {
        path: PathBuf,
        error: serde_json::Error,
    },
    #[error("cache store {} could not be written: {error}", .path.display())]
    Write { path: PathBuf, error: io::Error },
}

/// Process-local store. Used in tests and when persistence is disabled.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Durable store: one JSON object of `key -> value` strings in a single file.
///
/// The whole file is loaded on open and rewritten atomically after every insert,
/// so a crash never leaves a half-written store behind.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    sync: SyncPolicy,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        recover_bak_file(&path);

        let entries = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|error| StorageError::Corrupt {
                path: path.clone(),
                error,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(error) => return Err(StorageError::Read { path, error }),
        };

        tracing::debug!(path = %path.display(), entries = entries.len(), "Offer cache opened");
        Ok(Self {
            path,
            sync: SyncPolicy::Durable,
            entries: Mutex::new(entries),
        })
    }

    #[must_use]
    pub fn with_sync(mut self, sync: SyncPolicy) -> Self {
        self.sync = sync;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());

        let serialized = serde_json::to_vec_pretty(&*entries).map_err(|error| {
            StorageError::Write {
                path: self.path.clone(),
                error: io::Error::other(error),
            }
        })?;

        atomic_write_with_sync(&self.path, &serialized, self.sync).map_err(|error| {
            StorageError::Write {
                path: self.path.clone(),
                error,
            }
        })
    }
}
