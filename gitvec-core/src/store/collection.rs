//! Collection: the per-embedding-model directory holding a
//! projection matrix, metadata, id index, and the quantized vector tree.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;

use crate::config::Config;
use crate::error::CoreResult;
use crate::model::{CollectionMeta, IndexFingerprints};
use crate::projection::matrix::ProjectionMatrix;
use crate::store::id_index::IdIndex;

pub struct Collection {
    pub root: PathBuf,
    pub config: Config,
    pub matrix: ProjectionMatrix,
    pub meta: RwLock<CollectionMeta>,
    pub id_index: RwLock<IdIndex>,
}

impl Collection {
    fn meta_path(root: &Path) -> PathBuf {
        root.join("collection_meta.text")
    }

    fn id_index_path(root: &Path) -> PathBuf {
        root.join("id_index.text")
    }

    pub fn rebuild_lock_path(&self) -> PathBuf {
        self.root.join(".index_rebuild.lock")
    }

    pub fn hnsw_path(&self) -> PathBuf {
        self.root.join("hnsw_index.bin")
    }

    /// Path whose mtime/size the version-tagged index cache fingerprints
    /// against; any atomic rename swap (a rebuild, an upsert) changes it.
    pub fn meta_file_path(&self) -> PathBuf {
        Self::meta_path(&self.root)
    }

    /// Create a brand-new collection directory. One per `(repository,
    /// embedding_model)`; switching providers requires a new collection
    /// since `D`, `M`, and quantizations all change with it.
    pub fn create(
        root: PathBuf,
        name: &str,
        vector_size: usize,
        embedding_provider: &str,
        embedding_model: &str,
        config: Config,
    ) -> CoreResult<Self> {
        fs::create_dir_all(&root)?;
        let matrix = ProjectionMatrix::load_or_create(&root, vector_size, name)?;

        let meta = CollectionMeta {
            name: name.to_string(),
            vector_size,
            created_at: Utc::now().to_rfc3339(),
            depth_factor: config.depth_factor,
            reduced_dimensions: 64,
            embedding_provider: embedding_provider.to_string(),
            embedding_model: embedding_model.to_string(),
            fingerprints: IndexFingerprints::default(),
            point_count: 0,
        };
        write_meta_atomic(&Self::meta_path(&root), &meta)?;

        let id_index = IdIndex::new();
        id_index.save(&Self::id_index_path(&root))?;

        Ok(Self { root, config, matrix, meta: RwLock::new(meta), id_index: RwLock::new(id_index) })
    }

    /// Open an existing collection directory.
    pub fn open(root: PathBuf, config: Config) -> CoreResult<Self> {
        let meta_text = fs::read_to_string(Self::meta_path(&root))?;
        let meta: CollectionMeta = serde_json::from_str(&meta_text)?;
        let matrix = ProjectionMatrix::load_or_create(&root, meta.vector_size, &meta.name)?;
        let id_index = IdIndex::load(&Self::id_index_path(&root))?;

        Ok(Self { root, config, matrix, meta: RwLock::new(meta), id_index: RwLock::new(id_index) })
    }

    pub fn exists(root: &Path) -> bool {
        Self::meta_path(root).exists()
    }

    pub fn save_meta(&self) -> CoreResult<()> {
        let meta = self.meta.read().unwrap();
        write_meta_atomic(&Self::meta_path(&self.root), &meta)
    }

    pub fn save_id_index(&self) -> CoreResult<()> {
        self.id_index.read().unwrap().save(&Self::id_index_path(&self.root))
    }

    /// Mark the derived ANN/id artifacts stale and persist it. The next
    /// query or explicit rebuild call picks this up.
    pub fn mark_indexes_stale(&self) -> CoreResult<()> {
        {
            let mut meta = self.meta.write().unwrap();
            meta.fingerprints.hnsw_stale = true;
            meta.fingerprints.id_index_stale = true;
        }
        self.save_meta()
    }
}

fn write_meta_atomic(path: &Path, meta: &CollectionMeta) -> CoreResult<()> {
    let text = serde_json::to_string_pretty(meta)?;
    let tmp = path.with_extension("text.tmp");
    {
        let mut f = File::create(&tmp)?;
        f.write_all(text.as_bytes())?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn create_then_open_round_trips_meta() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("col");
        Collection::create(root.clone(), "col", 8, "voyage", "voyage-code-2", Config::default()).unwrap();

        let opened = Collection::open(root, Config::default()).unwrap();
        assert_eq!(opened.meta.read().unwrap().vector_size, 8);
        assert_eq!(opened.meta.read().unwrap().name, "col");
    }

    #[test]
    fn mark_indexes_stale_persists() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("col");
        let col = Collection::create(root.clone(), "col", 8, "voyage", "voyage-code-2", Config::default()).unwrap();
        col.mark_indexes_stale().unwrap();

        let reopened = Collection::open(root, Config::default()).unwrap();
        assert!(reopened.meta.read().unwrap().fingerprints.hnsw_stale);
    }
}
