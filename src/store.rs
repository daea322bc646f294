//! Subscription persistence.
//!
//! Token → subscription JSON text. [`FileStore`] keeps one file per token
//! and survives restarts; [`MemoryStore`] is for tests and throwaway runs.

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::error::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store key `{0}`")]
    InvalidKey(String),

    #[error("store io: {0}")]
    Io(#[from] io::Error),
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Error::internal(e)
    }
}

/// A durable key → JSON-text mapping.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn put(&self, token: &str, subscription: &str) -> Result<(), StoreError>;

    /// `None` for unknown tokens, including ones that could never be keys.
    async fn get(&self, token: &str) -> Result<Option<String>, StoreError>;
}

/// The shared-resource form of a store.
pub type Store = Box<dyn SubscriptionStore>;

/// Keys are plain identifiers; anything else could escape the directory.
fn is_valid_key(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

// ── FileStore ─────────────────────────────────────────────────────────────────

/// One `<token>.json` file per subscription under a directory.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens `dir`, creating it if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, token: &str) -> PathBuf {
        self.dir.join(format!("{token}.json"))
    }
}

#[async_trait]
impl SubscriptionStore for FileStore {
    async fn put(&self, token: &str, subscription: &str) -> Result<(), StoreError> {
        if !is_valid_key(token) {
            return Err(StoreError::InvalidKey(token.to_owned()));
        }
        // Each write gets its own temp file in the same directory, then is
        // renamed over the entry. Concurrent writers of one token never share
        // a temp file; the last rename wins.
        let dir = self.dir.clone();
        let path = self.path_for(token);
        let contents = subscription.as_bytes().to_vec();
        let target = path.clone();
        tokio::task::spawn_blocking(move || -> io::Result<()> {
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(&contents)?;
            tmp.as_file().sync_data()?;
            tmp.persist(&target)?;
            Ok(())
        })
        .await
        .map_err(io::Error::other)??;

        debug!(token, path = %path.display(), "subscription stored");
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<String>, StoreError> {
        if !is_valid_key(token) {
            return Ok(None);
        }
        match tokio::fs::read_to_string(self.path_for(token)).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

// ── MemoryStore ───────────────────────────────────────────────────────────────

/// In-process store. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn put(&self, token: &str, subscription: &str) -> Result<(), StoreError> {
        if !is_valid_key(token) {
            return Err(StoreError::InvalidKey(token.to_owned()));
        }
        self.entries.write().insert(token.to_owned(), subscription.to_owned());
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().get(token).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_round_trips_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("tokens")).await.unwrap();
        store.put("abc123", r#"{"endpoint":"e"}"#).await.unwrap();
        assert_eq!(store.get("abc123").await.unwrap().as_deref(), Some(r#"{"endpoint":"e"}"#));

        // A second handle on the same directory sees the entry.
        let reopened = FileStore::open(dir.path().join("tokens")).await.unwrap();
        assert!(reopened.get("abc123").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn file_store_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        store.put("t", "1").await.unwrap();
        store.put("t", "2").await.unwrap();
        assert_eq!(store.get("t").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn file_store_unknown_and_hostile_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).await.unwrap();
        assert_eq!(store.get("missing").await.unwrap(), None);
        assert_eq!(store.get("../etc/passwd").await.unwrap(), None);
        assert_eq!(store.get("").await.unwrap(), None);
        assert!(matches!(
            store.put("../x", "{}").await,
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn file_store_concurrent_writes_to_one_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(FileStore::open(dir.path()).await.unwrap());
        let bodies: Vec<String> = (0..8).map(|i| format!("{i}").repeat(64 * 1024)).collect();

        for _ in 0..20 {
            let mut writers = tokio::task::JoinSet::new();
            for body in bodies.clone() {
                let store = std::sync::Arc::clone(&store);
                writers.spawn(async move { store.put("abcdef0123456", &body).await });
            }
            while let Some(res) = writers.join_next().await {
                res.unwrap().unwrap();
            }

            // Whole entries only: one writer's body, never a mix.
            let stored = store.get("abcdef0123456").await.unwrap().unwrap();
            assert!(bodies.contains(&stored));
        }

        // No temp files left behind.
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["abcdef0123456.json".to_owned()]);
    }

    #[tokio::test]
    async fn memory_store_round_trips() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        store.put("k", "v").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert_eq!(store.len(), 1);
    }
}
