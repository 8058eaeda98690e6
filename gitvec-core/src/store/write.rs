//! Vector store write path: `upsert_points`, `delete_points`,
//! `delete_by_filter`.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rayon::prelude::*;
use walkdir::WalkDir;

use crate::error::{CoreError, CoreResult};
use crate::gitbackend::GitBackend;
use crate::model::{Filter, PayloadStorage, PointInput, VectorMetadata, VectorRecord};
use crate::quantizer;
use crate::store::collection::Collection;

/// Batch git metadata gathered once per upsert batch, amortizing the
/// single `git ls-tree -r HEAD`
/// call across every point instead of shelling out per-file.
pub struct GitContext {
    pub clean: bool,
    pub blob_hashes: HashMap<String, String>,
}

impl GitContext {
    pub fn collect(repo_path: &Path) -> CoreResult<Self> {
        let backend = GitBackend::new(repo_path);
        let clean = !backend.is_dirty().unwrap_or(false);
        let blob_hashes = backend.ls_tree("HEAD").unwrap_or_default();
        Ok(Self { clean, blob_hashes })
    }

    fn git_blob_hash_for(&self, file_path: &str) -> Option<&String> {
        if self.clean {
            self.blob_hashes.get(file_path)
        } else {
            None
        }
    }
}

/// A point's vector file name never echoes `/` or `:` from its id into the
/// filesystem; the id itself (stored inside the record) is unchanged.
fn vector_filename(id: &str) -> String {
    let sanitized: String = id.chars().map(|c| if c == '/' || c == ':' || c == '\\' { '_' } else { c }).collect();
    format!("vector_{sanitized}.text")
}

fn vector_file_path(collection: &Collection, hex_path: &str) -> PathBuf {
    let (dirs, _suffix) = quantizer::to_path(hex_path, collection.config.depth_factor);
    let mut p = collection.root.clone();
    for d in &dirs {
        p.push(d);
    }
    p
}

pub fn upsert_points(
    collection: &Collection,
    git: Option<&GitContext>,
    embedding_model: &str,
    branch: Option<&str>,
    points: Vec<PointInput>,
) -> CoreResult<usize> {
    let expected = collection.meta.read().unwrap().vector_size;
    let mut written = 0usize;

    for point in points {
        if point.vector.len() != expected {
            return Err(CoreError::DimensionMismatch { expected, actual: point.vector.len() });
        }

        let hex_path = quantizer::quantize(&point.vector, &collection.matrix);
        let dir = vector_file_path(collection, &hex_path);
        fs::create_dir_all(&dir)?;

        let storage = match git.and_then(|g| g.git_blob_hash_for(&point.file_path)) {
            Some(hash) => PayloadStorage::GitBlob { git_blob_hash: hash.clone() },
            None => PayloadStorage::Inline { chunk_text: point.content.clone() },
        };

        let record = VectorRecord {
            id: point.id.clone(),
            file_path: point.file_path,
            start_line: point.start_line,
            end_line: point.end_line,
            start_offset: point.start_offset,
            end_offset: point.end_offset,
            chunk_hash: point.chunk_hash,
            vector: point.vector,
            storage,
            metadata: VectorMetadata {
                indexed_at: Utc::now().to_rfc3339(),
                embedding_model: embedding_model.to_string(),
                branch: branch.map(String::from),
                git_blob_hash_for_temporal: None,
            },
            point_type: point.point_type,
        };

        let final_path = dir.join(vector_filename(&record.id));
        write_record_atomic(&final_path, &record)?;

        let relative_path = final_path
            .strip_prefix(&collection.root)
            .unwrap_or(&final_path)
            .to_string_lossy()
            .into_owned();
        collection.id_index.write().unwrap().insert(&record.id, &relative_path);
        written += 1;
    }

    {
        let mut meta = collection.meta.write().unwrap();
        meta.point_count += written;
    }
    collection.mark_indexes_stale()?;
    collection.save_id_index()?;

    Ok(written)
}

fn write_record_atomic(path: &Path, record: &VectorRecord) -> CoreResult<()> {
    let text = serde_json::to_string_pretty(record)?;
    let tmp = path.with_extension("text.tmp");
    {
        let mut f = File::create(&tmp)?;
        f.write_all(text.as_bytes())?;
        f.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Every vector file under the collection root, read in parallel. Used by
/// both delete paths and the path-quantized read fallback.
pub fn scan_vector_files(collection: &Collection) -> Vec<(PathBuf, VectorRecord)> {
    let paths: Vec<PathBuf> = WalkDir::new(&collection.root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .filter(|p| {
            p.file_name().and_then(|n| n.to_str()).map(|n| n.starts_with("vector_") && n.ends_with(".text")).unwrap_or(false)
        })
        .collect();

    paths
        .into_par_iter()
        .filter_map(|p| {
            let text = fs::read_to_string(&p).ok()?;
            let record: VectorRecord = serde_json::from_str(&text).ok()?;
            Some((p, record))
        })
        .collect()
}

/// Removes each vector file whose id is found via the id index or a full
/// scan. Missing ids are a no-op.
pub fn delete_points(collection: &Collection, ids: &[String]) -> CoreResult<usize> {
    let id_set: std::collections::HashSet<&str> = ids.iter().map(String::as_str).collect();
    let mut removed = 0usize;

    for (path, record) in scan_vector_files(collection) {
        if id_set.contains(record.id.as_str()) {
            fs::remove_file(&path)?;
            collection.id_index.write().unwrap().remove(&record.id);
            removed += 1;
        }
    }

    if removed > 0 {
        {
            let mut meta = collection.meta.write().unwrap();
            meta.point_count = meta.point_count.saturating_sub(removed);
        }
        collection.mark_indexes_stale()?;
        collection.save_id_index()?;
    }

    Ok(removed)
}

pub fn delete_by_filter(collection: &Collection, filter: &Filter) -> CoreResult<usize> {
    let mut removed = 0usize;

    for (path, record) in scan_vector_files(collection) {
        if crate::store::read::record_matches_filter(&record, filter)? {
            fs::remove_file(&path)?;
            collection.id_index.write().unwrap().remove(&record.id);
            removed += 1;
        }
    }

    if removed > 0 {
        {
            let mut meta = collection.meta.write().unwrap();
            meta.point_count = meta.point_count.saturating_sub(removed);
        }
        collection.mark_indexes_stale()?;
        collection.save_id_index()?;
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model::PointInput;
    use tempfile::TempDir;

    fn make_point(id: &str, vector: Vec<f32>) -> PointInput {
        PointInput {
            id: id.to_string(),
            vector,
            file_path: "src/lib.rs".to_string(),
            start_line: 1,
            end_line: 10,
            start_offset: 0,
            end_offset: 100,
            chunk_hash: "deadbeef".to_string(),
            content: "fn main() {}".to_string(),
            point_type: Some("content".to_string()),
            branch: Some("main".to_string()),
        }
    }

    #[test]
    fn upsert_rejects_dimension_mismatch() {
        let dir = TempDir::new().unwrap();
        let col = Collection::create(dir.path().join("c"), "c", 8, "voyage", "m", Config::default()).unwrap();
        let err = upsert_points(&col, None, "m", None, vec![make_point("a", vec![0.0; 4])]).unwrap_err();
        assert!(matches!(err, CoreError::DimensionMismatch { expected: 8, actual: 4 }));
    }

    #[test]
    fn upsert_then_delete_round_trips() {
        let dir = TempDir::new().unwrap();
        let col = Collection::create(dir.path().join("c"), "c", 8, "voyage", "m", Config::default()).unwrap();
        upsert_points(&col, None, "m", None, vec![make_point("a:1-10:deadbeef", vec![0.1; 8])]).unwrap();

        assert_eq!(scan_vector_files(&col).len(), 1);

        let removed = delete_points(&col, &["a:1-10:deadbeef".to_string()]).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(scan_vector_files(&col).len(), 0);
    }

    #[test]
    fn upsert_without_git_stores_inline_text() {
        let dir = TempDir::new().unwrap();
        let col = Collection::create(dir.path().join("c"), "c", 8, "voyage", "m", Config::default()).unwrap();
        upsert_points(&col, None, "m", None, vec![make_point("a", vec![0.2; 8])]).unwrap();

        let (_, record) = &scan_vector_files(&col)[0];
        assert!(matches!(record.storage, PayloadStorage::Inline { .. }));
    }

    #[test]
    fn delete_missing_id_is_noop() {
        let dir = TempDir::new().unwrap();
        let col = Collection::create(dir.path().join("c"), "c", 8, "voyage", "m", Config::default()).unwrap();
        let removed = delete_points(&col, &["nonexistent".to_string()]).unwrap();
        assert_eq!(removed, 0);
    }
}
