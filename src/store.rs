// ===============================
// src/store.rs
// ===============================
//
// Key-value store berisi blob JSON (string), mirip localStorage di browser:
// - get/set/remove sinkron, satu proses, tanpa transaksi.
// - Last writer wins; tidak ada token konkurensi.
// - MemoryStore untuk test, FileStore untuk CLI (satu file JSON, write-through).
//
use std::fs;
use std::path::{Path, PathBuf};

use ahash::AHashMap as HashMap;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const KEY_BATCHES: &str = "medicineBatches";
pub const KEY_UPDATED_BATCHES: &str = "updatedBatches";
pub const KEY_BATCH_COUNT: &str = "batchCount";
pub const KEY_CHECKOUT_HISTORY: &str = "checkoutHistory";
pub const KEY_PAYMENTS: &str = "payments";
pub const KEY_HELD_TRANSACTIONS: &str = "heldTransactions";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("json error under key {key}: {source}")]
    Json { key: String, source: serde_json::Error },
}

pub trait KvStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Whole store kept as one JSON object on disk; every write rewrites the file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: HashMap<String, String>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<HashMap<String, String>>(&raw) {
                Ok(map) => map,
                Err(e) => {
                    // file rusak -> mulai kosong, file lama ditimpa saat write berikutnya
                    warn!(?e, path = %path.display(), "store: unreadable file, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        debug!(path = %path.display(), keys = entries.len(), "store: opened");
        Ok(Self { path, entries })
    }

    fn flush(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|source| StoreError::Io { path: self.path.clone(), source })?;
            }
        }
        let body = serde_json::to_string_pretty(&self.entries)
            .map_err(|source| StoreError::Json { key: "*".into(), source })?;
        fs::write(&self.path, body).map_err(|source| StoreError::Io { path: self.path.clone(), source })
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

/// Typed read. `Ok(None)` when the key is absent.
pub fn load_json<T: DeserializeOwned>(store: &impl KvStore, key: &str) -> Result<Option<T>, StoreError> {
    match store.get(key) {
        None => Ok(None),
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Json { key: key.to_string(), source }),
    }
}

pub fn save_json<T: Serialize + ?Sized>(store: &mut impl KvStore, key: &str, value: &T) -> Result<(), StoreError> {
    let raw = serde_json::to_string(value).map_err(|source| StoreError::Json { key: key.to_string(), source })?;
    store.set(key, raw)
}

/// Read the list under `key` (empty if absent), push `item`, write it back.
/// Returns the new list length.
pub fn append_json<T>(store: &mut impl KvStore, key: &str, item: T) -> Result<usize, StoreError>
where
    T: Serialize + DeserializeOwned,
{
    let mut list: Vec<T> = load_json(store, key)?.unwrap_or_default();
    list.push(item);
    save_json(store, key, &list)?;
    Ok(list.len())
}
