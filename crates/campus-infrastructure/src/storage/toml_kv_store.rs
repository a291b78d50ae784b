//! File-backed durable key-value store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use campus_core::storage::{DurablePersistence, StorageError};
use serde::{Deserialize, Serialize};

use super::atomic_toml::{AtomicTomlError, AtomicTomlFile};
use crate::paths::{CampusPaths, PathError};

/// On-disk layout: a single `[entries]` table of string pairs.
#[derive(Debug, Default, Serialize, Deserialize)]
struct KeyValueDocument {
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

/// [`DurablePersistence`] backed by one TOML file.
///
/// Blocking file I/O is moved off the async executor. Batches written through
/// `set_all` land in a single atomic rename, so the token/role pair is never
/// torn on disk.
#[derive(Clone)]
pub struct TomlKeyValueStore {
    file: Arc<AtomicTomlFile<KeyValueDocument>>,
}

impl TomlKeyValueStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            file: Arc::new(AtomicTomlFile::new(path)),
        }
    }

    /// Opens the store at the platform default location.
    pub fn open_default() -> Result<Self, PathError> {
        Ok(Self::new(CampusPaths::session_file()?))
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    async fn run<R, F>(&self, op: &'static str, f: F) -> Result<R, StorageError>
    where
        F: FnOnce(&AtomicTomlFile<KeyValueDocument>) -> Result<R, AtomicTomlError> + Send + 'static,
        R: Send + 'static,
    {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || f(&file))
            .await
            .map_err(|e| StorageError::unavailable(format!("{op}: storage task failed: {e}")))?
            .map_err(|e| StorageError::unavailable(format!("{op}: {e}")))
    }
}

#[async_trait]
impl DurablePersistence for TomlKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let key = key.to_string();
        self.run("get", move |file| {
            Ok(file.load()?.entries.remove(&key))
        })
        .await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.set_all(&[(key, value)]).await
    }

    async fn set_all(&self, entries: &[(&str, &str)]) -> Result<(), StorageError> {
        let owned: Vec<(String, String)> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.run("set", move |file| {
            file.update(|doc| {
                let mut changed = false;
                for (key, value) in owned {
                    if doc.entries.get(&key) != Some(&value) {
                        doc.entries.insert(key, value);
                        changed = true;
                    }
                }
                changed
            })
        })
        .await
    }

    async fn remove_all(&self, keys: &[&str]) -> Result<(), StorageError> {
        let owned: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        self.run("remove", move |file| {
            file.update(|doc| {
                let before = doc.entries.len();
                for key in &owned {
                    doc.entries.remove(key);
                }
                doc.entries.len() != before
            })
        })
        .await
    }
}
