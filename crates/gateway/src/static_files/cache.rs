//! In-memory cache of static file contents.
//!
//! Entries are keyed by canonical path and remember the modification time the file had
//! when it was read. An entry older than the file on disk is ignored and replaced on the
//! next read. The cache holds at most a fixed number of entries, inserting into a full
//! cache evicts the entry that was inserted or refreshed longest ago. Files at or above
//! the size ceiling are read from disk every time and never cached.
//!
//! Lookups only take the shared lock, insertions the exclusive one. Disk reads happen
//! without any lock held, so concurrent misses for one file may read it more than once;
//! the last insert wins.

use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::Bytes;
use lru::LruCache;
use parking_lot::RwLock;
use tracing::trace;

use crate::static_files::date::truncate_to_secs;

/// Number of files kept in memory
pub const DEFAULT_CAPACITY: NonZeroUsize = NonZeroUsize::new(20).unwrap();

/// Files of this size or larger are never cached
pub const MAX_CACHED_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Outcome of [`StaticFileCache::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    NotFound,
    /// The client's copy is still current, nothing was read
    NotModified { modified: SystemTime },
    Served { content: Bytes, modified: SystemTime },
}

#[derive(Debug)]
struct CacheEntry {
    content: Bytes,
    modified: SystemTime,
}

#[derive(Debug)]
pub struct StaticFileCache {
    entries: RwLock<LruCache<PathBuf, CacheEntry>>,
    max_file_size: usize,
}

impl Default for StaticFileCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticFileCache {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_CAPACITY, MAX_CACHED_FILE_SIZE)
    }

    pub fn with_limits(capacity: NonZeroUsize, max_file_size: usize) -> Self {
        Self { entries: RwLock::new(LruCache::new(capacity)), max_file_size }
    }

    /// Looks up the file at `path`, honoring the client's `If-Modified-Since`.
    ///
    /// # Errors
    ///
    /// Any I/O error other than the file not existing.
    pub async fn resolve(&self, path: &Path, if_modified_since: Option<SystemTime>) -> io::Result<Resolved> {
        let key = match tokio::fs::canonicalize(path).await {
            Ok(key) => key,
            Err(e) if is_not_found(&e) => return Ok(Resolved::NotFound),
            Err(e) => return Err(e),
        };
        let modified = match tokio::fs::metadata(&key).await {
            Ok(metadata) => metadata.modified()?,
            Err(e) if is_not_found(&e) => return Ok(Resolved::NotFound),
            Err(e) => return Err(e),
        };

        if if_modified_since.is_some_and(|since| since >= truncate_to_secs(modified)) {
            return Ok(Resolved::NotModified { modified });
        }

        let cached = {
            let entries = self.entries.read();
            entries.peek(&key).filter(|entry| entry.modified >= modified).map(|entry| entry.content.clone())
        };
        if let Some(content) = cached {
            trace!(path = %key.display(), "static file cache hit");
            return Ok(Resolved::Served { content, modified });
        }

        let content = match tokio::fs::read(&key).await {
            Ok(content) => Bytes::from(content),
            Err(e) if is_not_found(&e) => return Ok(Resolved::NotFound),
            Err(e) => return Err(e),
        };

        if content.len() < self.max_file_size {
            trace!(path = %key.display(), size = content.len(), "caching static file");
            let entry = CacheEntry { content: content.clone(), modified };
            self.entries.write().put(key, entry);
        }

        Ok(Resolved::Served { content, modified })
    }

    /// Whether an entry for the canonical `path` is cached, stale or not.
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.read().contains(path)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn is_not_found(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory)
}
