//! Version-tagged index cache. Keyed by `(collection_name,
//! fingerprint)` where `fingerprint = (metadata_mtime_ns, metadata_size)` —
//! any swap changes the metadata file's inode via atomic rename, which
//! changes the fingerprint, which invalidates the cache entry. The
//! previous value is simply dropped; the mmap'd artifact it wraps is
//! unmapped by its own destructor once the last `Arc` reference is gone,
//! and the kernel releases the unlinked inode. No explicit cleanup step.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;

use crate::error::CoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub mtime_ns: i128,
    pub size: u64,
}

impl Fingerprint {
    pub fn stat(metadata_path: &Path) -> CoreResult<Self> {
        let meta = fs::metadata(metadata_path)?;
        let mtime_ns = meta
            .modified()?
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos() as i128)
            .unwrap_or(0);
        Ok(Self { mtime_ns, size: meta.len() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    collection_name: String,
    fingerprint: Fingerprint,
}

/// Generic over the cached artifact `T` (an mmap'd HNSW index, an FTS
/// reader, ...); the cache itself only knows about fingerprints.
pub struct IndexCache<T> {
    entries: DashMap<CacheKey, Arc<T>>,
}

impl<T> Default for IndexCache<T> {
    fn default() -> Self {
        Self { entries: DashMap::new() }
    }
}

impl<T> IndexCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached instance if `metadata_path`'s current fingerprint
    /// matches what's cached for `collection_name`; otherwise calls
    /// `reload` to build a fresh one, caches it, and evicts any stale
    /// entry for this collection (all prior keys for the name, since the
    /// fingerprint changed).
    pub fn get_or_reload<F>(&self, collection_name: &str, metadata_path: &Path, reload: F) -> CoreResult<Arc<T>>
    where
        F: FnOnce() -> CoreResult<T>,
    {
        let fingerprint = Fingerprint::stat(metadata_path)?;
        let key = CacheKey { collection_name: collection_name.to_string(), fingerprint };

        if let Some(existing) = self.entries.get(&key) {
            return Ok(Arc::clone(existing.value()));
        }

        let fresh = Arc::new(reload()?);
        self.entries.retain(|k, _| k.collection_name != collection_name);
        self.entries.insert(key, Arc::clone(&fresh));
        Ok(fresh)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
