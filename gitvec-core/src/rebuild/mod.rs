//! Background rebuilder: an exclusive, process-wide and machine-wide
//! advisory lock held for the full build+swap, a tmp-then-rename
//! artifact protocol, and orphan cleanup on the next acquisition.
//! Deliberately simpler than locking only the final swap, which is
//! bug-prone.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use walkdir::WalkDir;

use crate::error::{CoreError, CoreResult};
use crate::store::collection::Collection;

/// What the background rebuilder is asked to refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Hnsw,
    IdIndex,
    Fts,
}

/// `builder_fn` does the actual work and returns the `(tmp, final)` path
/// pairs it wants swapped in, or an empty vec to abort without changing
/// anything on disk.
pub fn rebuild_in_background<F, C>(
    collection: &Collection,
    kind: ArtifactKind,
    builder_fn: F,
    on_complete: C,
) -> CoreResult<()>
where
    F: FnOnce(&Collection) -> CoreResult<Vec<(PathBuf, PathBuf)>>,
    C: FnOnce(ArtifactKind),
{
    let lock_path = collection.rebuild_lock_path();
    let lock_file = File::create(&lock_path)?;
    lock_file.lock_exclusive().map_err(|_| CoreError::LockBusy { path: lock_path.clone() })?;

    let result = (|| -> CoreResult<()> {
        cleanup_orphaned_tmp_files(&collection.root)?;

        let swaps = builder_fn(collection)?;
        if swaps.is_empty() {
            return Ok(());
        }

        // Rename everything except the metadata file first; metadata is
        // renamed last so its fingerprint changes strictly after the new
        // artifact content is already visible.
        let (meta_swaps, other_swaps): (Vec<_>, Vec<_>) =
            swaps.into_iter().partition(|(_, dest)| dest.file_name().and_then(|n| n.to_str()) == Some("collection_meta.text"));

        for (tmp, dest) in &other_swaps {
            fs::rename(tmp, dest)?;
        }
        for (tmp, dest) in &meta_swaps {
            fs::rename(tmp, dest)?;
        }

        match kind {
            ArtifactKind::Hnsw => {
                let mut meta = collection.meta.write().unwrap();
                meta.fingerprints.hnsw_stale = false;
            }
            ArtifactKind::IdIndex => {
                let mut meta = collection.meta.write().unwrap();
                meta.fingerprints.id_index_stale = false;
            }
            ArtifactKind::Fts => {
                let mut meta = collection.meta.write().unwrap();
                meta.fingerprints.fts_stale = false;
            }
        }
        collection.save_meta()
    })();

    let _ = fs2::FileExt::unlock(&lock_file);
    if result.is_ok() {
        on_complete(kind);
    }
    result
}

/// Step 2 of the protocol: safe because we hold the exclusive lock. Either
/// the previous worker crashed before any rename (old artifacts fully
/// valid) or it crashed after all renames (new artifacts fully visible) —
/// the `.tmp` files left behind are always garbage.
fn cleanup_orphaned_tmp_files(collection_root: &Path) -> CoreResult<()> {
    for entry in WalkDir::new(collection_root).into_iter().filter_map(|e| e.ok()) {
        if entry.file_type().is_file() {
            let name = entry.file_name().to_string_lossy();
            if name.ends_with(".tmp") {
                let _ = fs::remove_file(entry.path());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    #[test]
    fn rebuild_cleans_orphaned_tmp_files() {
        let dir = TempDir::new().unwrap();
        let col = Collection::create(dir.path().join("c"), "c", 4, "voyage", "m", Config::default()).unwrap();
        fs::write(col.root.join("orphan.bin.tmp"), b"garbage").unwrap();

        rebuild_in_background(&col, ArtifactKind::Hnsw, |_c| Ok(vec![]), |_| {}).unwrap();
        assert!(!col.root.join("orphan.bin.tmp").exists());
    }

    #[test]
    fn rebuild_clears_staleness_on_success() {
        let dir = TempDir::new().unwrap();
        let col = Collection::create(dir.path().join("c"), "c", 4, "voyage", "m", Config::default()).unwrap();
        col.mark_indexes_stale().unwrap();
        assert!(col.meta.read().unwrap().fingerprints.hnsw_stale);

        rebuild_in_background(
            &col,
            ArtifactKind::Hnsw,
            |c| {
                let tmp = c.root.join("hnsw_index.bin.tmp");
                fs::write(&tmp, b"fake-hnsw").unwrap();
                Ok(vec![(tmp, c.hnsw_path())])
            },
            |_| {},
        )
        .unwrap();
        assert!(!col.meta.read().unwrap().fingerprints.hnsw_stale);
        assert!(col.hnsw_path().exists());
    }

    #[test]
    fn aborted_build_leaves_staleness_untouched() {
        let dir = TempDir::new().unwrap();
        let col = Collection::create(dir.path().join("c"), "c", 4, "voyage", "m", Config::default()).unwrap();
        col.mark_indexes_stale().unwrap();

        rebuild_in_background(&col, ArtifactKind::Hnsw, |_c| Ok(vec![]), |_| {}).unwrap();
        // empty swaps short-circuits before clearing staleness
        assert!(col.meta.read().unwrap().fingerprints.hnsw_stale);
    }
}
