//! Temporal index: `commits.db` + `blob_registry.db`, the
//! deduplicating git-history ingestion pipeline, and `temporal_meta.json`.

pub mod db;
pub mod ingest;
pub mod registry;

pub use db::TemporalDb;
pub use ingest::{IngestionPipeline, IngestProgress};
pub use registry::BlobRegistry;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexingMode {
    SingleBranch,
    AllBranches,
    /// A glob pattern list, expanded against local branches before ingest
    /// walks the union.
    Selective,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexingStats {
    pub commits_per_branch: std::collections::HashMap<String, usize>,
    pub dedup_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalMeta {
    pub last_indexed_commit: Option<String>,
    pub indexing_mode: IndexingMode,
    pub indexed_branches: Vec<String>,
    pub stats: IndexingStats,
}

impl Default for TemporalMeta {
    fn default() -> Self {
        Self {
            last_indexed_commit: None,
            indexing_mode: IndexingMode::SingleBranch,
            indexed_branches: Vec::new(),
            stats: IndexingStats::default(),
        }
    }
}

pub fn temporal_dir(repo_root: &Path) -> PathBuf {
    repo_root.join(".code-indexer").join("temporal")
}

impl TemporalMeta {
    fn path(repo_root: &Path) -> PathBuf {
        temporal_dir(repo_root).join("temporal_meta.json")
    }

    pub fn load(repo_root: &Path) -> CoreResult<Self> {
        let path = Self::path(repo_root);
        if !path.exists() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    /// Atomically persisted after each ingestion batch.
    pub fn save(&self, repo_root: &Path) -> CoreResult<()> {
        let dir = temporal_dir(repo_root);
        fs::create_dir_all(&dir)?;
        let path = Self::path(repo_root);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        fs::rename(tmp, path)?;
        Ok(())
    }
}

/// Whether the temporal index exists at all for a repository — callers
/// use this to decide whether to skip temporal filtering in the query
/// pipeline and fall back to a plain search.
pub fn temporal_index_exists(repo_root: &Path) -> bool {
    temporal_dir(repo_root).join("commits.db").exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn meta_round_trips() {
        let dir = TempDir::new().unwrap();
        let mut meta = TemporalMeta::default();
        meta.last_indexed_commit = Some("abc123".to_string());
        meta.indexed_branches.push("main".to_string());
        meta.save(dir.path()).unwrap();

        let loaded = TemporalMeta::load(dir.path()).unwrap();
        assert_eq!(loaded.last_indexed_commit, Some("abc123".to_string()));
    }

    #[test]
    fn missing_meta_defaults_cleanly() {
        let dir = TempDir::new().unwrap();
        let loaded = TemporalMeta::load(dir.path()).unwrap();
        assert!(loaded.last_indexed_commit.is_none());
    }
}
