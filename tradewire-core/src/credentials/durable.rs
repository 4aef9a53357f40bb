//! Durable key/value storage behind the credential store.
//!
//! The runtime treats the store as opaque (and, on devices, encrypted)
//! key/value storage. Only writes go through it; reads happen once at load.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::StorageError;

/// Durable key/value collaborator.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    async fn clear(&self) -> Result<(), StorageError>;
}

/// Process-local store, used when no credentials path is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, StorageError> {
        self.values.lock().map_err(|_| StorageError::Unavailable {
            reason: "memory store lock poisoned".to_string(),
        })
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.lock()?.clear();
        Ok(())
    }
}

/// JSON object file on disk. Every write rewrites the whole file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_guard: AsyncMutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_guard: AsyncMutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(StorageError::io(self.path.display().to_string(), err)),
        };
        serde_json::from_str(&contents).map_err(|err| StorageError::Corrupt {
            reason: err.to_string(),
        })
    }

    async fn save(&self, values: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let target = self.path.display().to_string();
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|err| StorageError::io(&target, err))?;
            }
        }
        let contents = serde_json::to_string_pretty(values).map_err(|err| StorageError::Corrupt {
            reason: err.to_string(),
        })?;
        tokio::fs::write(&self.path, contents)
            .await
            .map_err(|err| StorageError::io(&target, err))
    }
}

#[async_trait]
impl DurableStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.write_guard.lock().await;
        let mut values = self.load().await?;
        values.insert(key.to_string(), value.to_string());
        self.save(&values).await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.write_guard.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::io(self.path.display().to_string(), err)),
        }
    }
}
