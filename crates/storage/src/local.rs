//! Client-side key/value persistence, the equivalent of browser local storage.
//!
//! Progress is cached here first so a reload never loses work that has not
//! reached the remote table yet.

use async_trait::async_trait;
use learn_core::model::{StudentProgress, UserId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::warn;

use crate::repository::StorageError;

/// Key prefix for cached progress; the user id is appended.
pub const PROGRESS_KEY_PREFIX: &str = "scilearn.progress.";
/// Key holding the signed-in bearer session.
pub const SESSION_KEY: &str = "scilearn.session";

#[must_use]
pub fn progress_key(user_id: UserId) -> String {
    format!("{PROGRESS_KEY_PREFIX}{user_id}")
}

#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set(&self, key: &str, value: String) -> Result<(), StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Volatile store for tests.
#[derive(Default)]
pub struct MemoryLocalStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryLocalStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        self.entries.write().await.insert(key.to_owned(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// All keys in one JSON object file, rewritten atomically on every change.
pub struct FileLocalStore {
    path: PathBuf,
    cache: RwLock<BTreeMap<String, String>>,
}

impl FileLocalStore {
    /// Open (or lazily create) the store at `path`. An unreadable or corrupt
    /// file starts empty.
    pub async fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "local store is corrupt, starting empty");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            cache: RwLock::new(entries),
        }
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let temp_path = self.path.with_extension("json.tmp");
        let mut f = fs::File::create(&temp_path)
            .await
            .map_err(|e| StorageError::Connection(format!("create temp file: {e}")))?;
        f.write_all(json.as_bytes())
            .await
            .map_err(|e| StorageError::Connection(format!("write temp file: {e}")))?;
        f.sync_all()
            .await
            .map_err(|e| StorageError::Connection(format!("sync temp file: {e}")))?;
        drop(f);

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| StorageError::Connection(format!("rename failed: {e}")))
    }
}

#[async_trait]
impl LocalStore for FileLocalStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.cache.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError> {
        let mut guard = self.cache.write().await;
        guard.insert(key.to_owned(), value);
        self.persist(&guard).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self.cache.write().await;
        if guard.remove(key).is_some() {
            self.persist(&guard).await?;
        }
        Ok(())
    }
}

/// Typed progress access on top of a `LocalStore`.
pub struct ProgressCache<S: ?Sized> {
    store: std::sync::Arc<S>,
}

impl<S: LocalStore + ?Sized> ProgressCache<S> {
    #[must_use]
    pub fn new(store: std::sync::Arc<S>) -> Self {
        Self { store }
    }

    /// Cached progress for `user_id`. Entries that no longer parse are
    /// dropped rather than surfaced.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the underlying store fails.
    pub async fn load(&self, user_id: UserId) -> Result<Option<StudentProgress>, StorageError> {
        let key = progress_key(user_id);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<StudentProgress>(&raw) {
            Ok(progress) if progress.user_id() == user_id => Ok(Some(progress)),
            Ok(_) | Err(_) => {
                warn!(%user_id, "dropping unreadable cached progress");
                self.store.remove(&key).await?;
                Ok(None)
            }
        }
    }

    /// # Errors
    ///
    /// Returns `StorageError` on serialization or store failures.
    pub async fn save(&self, progress: &StudentProgress) -> Result<(), StorageError> {
        let json = serde_json::to_string(progress)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.store.set(&progress_key(progress.user_id()), json).await
    }

    /// # Errors
    ///
    /// Returns `StorageError` if the underlying store fails.
    pub async fn clear(&self, user_id: UserId) -> Result<(), StorageError> {
        self.store.remove(&progress_key(user_id)).await
    }
}
