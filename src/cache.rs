//! Response cache: keyed blobs with last-write-wins semantics
//!
//! Entries are never expired. Consumers use the cache as a fast path
//! before hitting the network and write through after every successful
//! fetch; a caller that wants fresh data goes through a refresh path that
//! skips the read.

use crate::{
    error::CacheError,
    types::{HistoryRange, MarketCategory},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// One cached payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    /// Opaque payload (serialized domain objects)
    pub payload: Vec<u8>,
    pub updated_at: DateTime<Utc>,
}

/// Deterministic cache keys, `<operation>_<param1>_<param2>...`
pub struct CacheKey;

impl CacheKey {
    pub fn market(category: MarketCategory, page: u32, page_size: u32) -> String {
        format!("market_{}_{}_{}", category.as_str(), page, page_size)
    }

    pub fn detail(id: &str) -> String {
        format!("detail_{}", id)
    }

    pub fn history(id: &str, range: HistoryRange) -> String {
        format!("history_{}_{}", id, range.as_days())
    }
}

/// Trait for response cache backends
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Reads the entry stored under `key`, if any
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Stores `payload` under `key`, replacing any previous entry
    async fn put(&self, key: &str, payload: Vec<u8>) -> Result<(), CacheError>;
}

/// In-memory cache for a single process
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, payload: Vec<u8>) -> Result<(), CacheError> {
        let entry = CacheEntry {
            key: key.to_string(),
            payload,
            updated_at: Utc::now(),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        tracing::debug!(key, "Cache entry written");
        Ok(())
    }
}

/// Directory-backed cache, one file per key
///
/// `updated_at` is taken from the file's modification time.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Opens (and creates, if needed) a cache rooted at `dir`
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }
}

/// Maps a key onto a safe file name
fn file_stem(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[async_trait]
impl ResponseCache for FileCache {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.path_for(key);
        let payload = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let modified = tokio::fs::metadata(&path).await?.modified()?;

        Ok(Some(CacheEntry {
            key: key.to_string(),
            payload,
            updated_at: DateTime::<Utc>::from(modified),
        }))
    }

    async fn put(&self, key: &str, payload: Vec<u8>) -> Result<(), CacheError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &payload).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::debug!(key, path = %path.display(), "Cache file written");
        Ok(())
    }
}
