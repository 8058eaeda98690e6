use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use gitvec_core::cache::IndexCache;
use gitvec_core::config::Config;
use gitvec_core::jobqueue::JobQueue;
use gitvec_core::projection::matrix::ProjectionMatrix;
use gitvec_core::store::collection::Collection;
use gitvec_core::store::HnswAnnIndex;
use gitvec_core::CoreResult;

use crate::chunker::LineChunker;
use crate::embedder::HttpEmbedder;

/// A cached projection matrix plus the time it was last reached, so the
/// eviction scanner and idle-shutdown timer both have something to read.
pub struct CachedMatrix {
    pub matrix: ProjectionMatrix,
    pub last_access: Instant,
}

/// `matrixd` state: the resident cache of loaded projection matrices,
/// keyed by the absolute collection directory they were loaded from.
pub struct MatrixdState {
    pub matrices: DashMap<String, CachedMatrix>,
    pub started_at: Instant,
}

impl MatrixdState {
    pub fn new() -> Self {
        Self { matrices: DashMap::new(), started_at: Instant::now() }
    }

    /// Inserts or refreshes a matrix, touching `last_access`.
    pub fn touch(&self, key: String, matrix: ProjectionMatrix) {
        self.matrices.insert(key, CachedMatrix { matrix, last_access: Instant::now() });
    }

    /// Returns a clone of the cached matrix and refreshes `last_access`,
    /// or `None` if it isn't resident.
    pub fn get(&self, key: &str) -> Option<ProjectionMatrix> {
        let mut entry = self.matrices.get_mut(key)?;
        entry.last_access = Instant::now();
        Some(entry.matrix.clone())
    }

    /// Drops every entry whose `last_access` is older than `max_age`.
    pub fn evict_older_than(&self, max_age: std::time::Duration) -> usize {
        let before = self.matrices.len();
        self.matrices.retain(|_, v| v.last_access.elapsed() < max_age);
        before - self.matrices.len()
    }

    /// Minutes since the entry's last access was touched, for `/stats`.
    pub fn age_minutes(&self) -> Vec<(String, f64)> {
        self.matrices.iter().map(|e| (e.key().clone(), e.value().last_access.elapsed().as_secs_f64() / 60.0)).collect()
    }

    /// Minutes since the cache was last touched at all (zero entries ⇒
    /// time since startup), for the idle-shutdown timer.
    pub fn idle_minutes(&self) -> f64 {
        self.matrices
            .iter()
            .map(|e| e.value().last_access.elapsed())
            .min()
            .unwrap_or_else(|| self.started_at.elapsed())
            .as_secs_f64()
            / 60.0
    }
}

impl Default for MatrixdState {
    fn default() -> Self {
        Self::new()
    }
}

/// `apid` state: one daemon serves one checked-out repository and its
/// collection, mirroring how the matrix service is reached by path
/// rather than by a registered identity. `repo_url` on `/register` is
/// carried through as job metadata; the repository a daemon indexes and
/// queries is fixed at startup by `GITVEC_REPO_ROOT`.
pub struct ApidState {
    pub repo_root: PathBuf,
    pub collection: Collection,
    pub config: Config,
    pub jobs: JobQueue,
    pub embedder: Arc<HttpEmbedder>,
    pub chunker: Arc<LineChunker>,
    /// Version-tagged so a background rebuild's atomic swap (which changes
    /// `collection_meta.text`'s mtime) invalidates it without locking.
    pub hnsw_cache: IndexCache<HnswAnnIndex>,
}

impl ApidState {
    pub fn open(repo_root: PathBuf, embedding_model: &str) -> CoreResult<Self> {
        let config = Config::load(&repo_root).unwrap_or_default();
        let embedder = HttpEmbedder::from_env();
        let collection_dir = repo_root.join(".code-indexer").join("collection");

        let collection = if Collection::exists(&collection_dir) {
            Collection::open(collection_dir, config.clone())?
        } else {
            let vector_size: usize = std::env::var("GITVEC_VECTOR_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(768);
            Collection::create(collection_dir, "default", vector_size, "http", embedding_model, config.clone())?
        };

        Ok(Self {
            repo_root,
            collection,
            config,
            jobs: JobQueue::new(),
            embedder: Arc::new(embedder),
            chunker: Arc::new(LineChunker::default()),
            hnsw_cache: IndexCache::new(),
        })
    }
}
