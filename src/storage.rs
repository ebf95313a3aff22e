//! Key-value persistence for ledger state.
//!
//! The ledger writes two records, a balance and a position list, through the
//! `KeyValueStore` trait. `FileStore` writes each key to its own file via a
//! temp file and rename, so a reader never sees a half-written value.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const BALANCE_KEY: &str = "trading_balance";
pub const POSITIONS_KEY: &str = "trading_positions";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid key '{0}'")]
    InvalidKey(String),
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-process store. State is lost when it is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One file per key under a directory.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    // serialises writers so two temp files for the same key never race the rename
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Opens (and creates if needed) the state directory.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("tmp");
        let io_err = |source| StoreError::Io {
            key: key.to_string(),
            source,
        };

        let _guard = self.write_lock.lock();
        let mut file = fs::File::create(&tmp).map_err(io_err)?;
        file.write_all(value.as_bytes()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        fs::rename(&tmp, &path).map_err(io_err)?;

        debug!(key, bytes = value.len(), "persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert_eq!(store.get(BALANCE_KEY).unwrap(), None);

        store.set(BALANCE_KEY, "10").unwrap();
        store.set(BALANCE_KEY, "12.5").unwrap();
        assert_eq!(store.get(BALANCE_KEY).unwrap().as_deref(), Some("12.5"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.get(POSITIONS_KEY).unwrap(), None);
        store.set(POSITIONS_KEY, "[]").unwrap();
        drop(store);

        let reopened = FileStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get(POSITIONS_KEY).unwrap().as_deref(), Some("[]"));
        assert!(!dir.path().join("trading_positions.tmp").exists());
    }

    #[test]
    fn file_store_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        assert!(matches!(store.set("../escape", "x"), Err(StoreError::InvalidKey(_))));
        assert!(matches!(store.get(""), Err(StoreError::InvalidKey(_))));
    }
}
