//! Ingestion pipeline: enumerate commits, dedupe blobs through the
//! registry, stream+chunk+embed what's new, and keep `temporal_meta.json`
//! checkpointed so a crash mid-run resumes from `last_indexed_commit`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::gitbackend::GitBackend;
use crate::interop::{Chunker, Embedder};
use crate::memory;
use crate::model::PointInput;
use crate::store::collection::Collection;
use crate::store::write::{upsert_points, GitContext};
use crate::temporal::db::TemporalDb;
use crate::temporal::registry::BlobRegistry;
use crate::temporal::{temporal_dir, IndexingMode, IndexingStats, TemporalMeta};

/// One line of the `(current, total, path, info)` progress contract.
/// Every field is an RPC-serializable primitive, never a composite value.
#[derive(Debug, Clone)]
pub struct IngestProgress {
    pub current: u64,
    pub total: u64,
    pub path: PathBuf,
    pub info: String,
}

const MIN_AVAILABLE_MB: u64 = 512;
const LOW_MEMORY_THRESHOLD_MB: u64 = 1024;

pub struct IngestionPipeline {
    repo_root: PathBuf,
    git: GitBackend,
    db: TemporalDb,
    registry: BlobRegistry,
    batch_size: usize,
}

impl IngestionPipeline {
    pub fn new(repo_root: impl Into<PathBuf>, config: &Config) -> CoreResult<Self> {
        let repo_root = repo_root.into();
        let dir = temporal_dir(&repo_root);
        let db = TemporalDb::open(&dir)?;
        let registry = BlobRegistry::open(&dir)?;
        Ok(Self {
            git: GitBackend::new(&repo_root),
            repo_root,
            db,
            registry,
            batch_size: config.temporal_batch_size.max(1),
        })
    }

    /// Walks `branches` (already-resolved ref names), indexing every
    /// commit not yet covered by `temporal_meta.last_indexed_commit`.
    pub fn run(
        &mut self,
        collection: &Collection,
        embedder: &dyn Embedder,
        chunker: &dyn Chunker,
        embedding_model: &str,
        mode: IndexingMode,
        branches: &[String],
        excluded_extensions: &[String],
        on_progress: &dyn Fn(IngestProgress),
    ) -> CoreResult<IndexingStats> {
        let mut meta = TemporalMeta::load(&self.repo_root)?;
        meta.indexing_mode = mode;

        let mut reused_blobs: u64 = 0;
        let mut total_blob_refs: u64 = 0;

        for branch in branches {
            let head = self.git.rev_parse(branch)?;
            let range = match &meta.last_indexed_commit {
                Some(last) => format!("{last}..{branch}"),
                None => branch.clone(),
            };

            let mut commits = self.git.log_commits(&range)?;
            commits.reverse(); // oldest first: chronological checkpointing

            let total = commits.len() as u64;
            on_progress(IngestProgress {
                current: 0,
                total: 0,
                path: PathBuf::new(),
                info: format!("enumerated {total} commit(s) on {branch}"),
            });

            let mut cat_file = self.git.open_cat_file_batch()?;
            let mut blobs_since_checkpoint = 0usize;

            for (idx, commit) in commits.iter().enumerate() {
                self.db.insert_commit(commit)?;
                let is_head = commit.hash == head;
                self.db.insert_branch_row(&commit.hash, branch, is_head, &Utc::now().to_rfc3339())?;

                let tree = self.git.ls_tree(&commit.hash)?;
                for (path, blob_hash) in &tree {
                    if is_excluded(path, excluded_extensions) {
                        continue;
                    }
                    total_blob_refs += 1;

                    if self.registry.is_registered(blob_hash)? {
                        reused_blobs += 1;
                        self.db.insert_tree_row(&commit.hash, path, blob_hash)?;
                        continue;
                    }

                    if blobs_since_checkpoint >= self.batch_size {
                        self.check_and_adjust_memory()?;
                        blobs_since_checkpoint = 0;
                    }

                    let point_ids = self.embed_blob(
                        collection,
                        &mut cat_file,
                        embedder,
                        chunker,
                        embedding_model,
                        branch,
                        path,
                        blob_hash,
                    )?;
                    self.registry.register(blob_hash, &point_ids)?;
                    self.db.insert_tree_row(&commit.hash, path, blob_hash)?;
                    blobs_since_checkpoint += 1;

                    let pct = if total_blob_refs > 0 { 100 * (total_blob_refs - reused_blobs) / total_blob_refs } else { 0 };
                    on_progress(IngestProgress {
                        current: idx as u64 + 1,
                        total,
                        path: PathBuf::from(path),
                        info: format!("{}/{} commits ({pct}% novel) | {} blobs embedded", idx + 1, total, point_ids.len()),
                    });
                }

                meta.last_indexed_commit = Some(commit.hash.clone());
                meta.save(&self.repo_root)?;
            }

            if !meta.indexed_branches.contains(branch) {
                meta.indexed_branches.push(branch.clone());
            }
            *meta.stats.commits_per_branch.entry(branch.clone()).or_insert(0) += commits.len();
        }

        meta.stats.dedup_ratio = if total_blob_refs > 0 { reused_blobs as f64 / total_blob_refs as f64 } else { 0.0 };
        meta.save(&self.repo_root)?;

        Ok(meta.stats)
    }

    /// Refuses outright below 512 MiB; halves the batch size below 1 GiB
    /// so the next checkpoint comes sooner and holds less in flight.
    fn check_and_adjust_memory(&mut self) -> CoreResult<()> {
        let available = memory::available_memory_mb();
        let adjusted = adjust_batch_size(self.batch_size, available)?;
        if adjusted != self.batch_size {
            tracing::warn!(available_mb = available, old_batch_size = self.batch_size, new_batch_size = adjusted, "low memory, halving ingest batch size");
        }
        self.batch_size = adjusted;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn embed_blob(
        &self,
        collection: &Collection,
        cat_file: &mut crate::gitbackend::CatFileBatch,
        embedder: &dyn Embedder,
        chunker: &dyn Chunker,
        embedding_model: &str,
        branch: &str,
        path: &str,
        blob_hash: &str,
    ) -> CoreResult<Vec<String>> {
        cat_file.request(blob_hash)?;
        let Some((_obj_type, content)) = cat_file.read_one()? else {
            return Ok(Vec::new());
        };
        let text = String::from_utf8_lossy(&content).into_owned();

        let chunks = chunker.chunk(&text, path)?;
        let mut points = Vec::with_capacity(chunks.len());
        let mut point_ids = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let vector = embedder.embed(&chunk.text)?;
            let id = format!("{path}:{}-{}:{}", chunk.start_line, chunk.end_line, chunk.chunk_hash);
            point_ids.push(id.clone());
            points.push(PointInput {
                id,
                vector,
                file_path: path.to_string(),
                start_line: chunk.start_line,
                end_line: chunk.end_line,
                start_offset: chunk.start_offset,
                end_offset: chunk.end_offset,
                chunk_hash: chunk.chunk_hash,
                content: chunk.text,
                point_type: Some("content".to_string()),
                branch: Some(branch.to_string()),
            });
        }

        if !points.is_empty() {
            let mut blob_hashes = HashMap::with_capacity(1);
            blob_hashes.insert(path.to_string(), blob_hash.to_string());
            let git_ctx = GitContext { clean: true, blob_hashes };
            upsert_points(collection, Some(&git_ctx), embedding_model, Some(branch), points)?;
        }

        Ok(point_ids)
    }
}

/// Pure batch-size decision: refuse below `MIN_AVAILABLE_MB`, halve below
/// `LOW_MEMORY_THRESHOLD_MB`, otherwise leave `batch_size` untouched.
fn adjust_batch_size(batch_size: usize, available_mb: u64) -> CoreResult<usize> {
    if available_mb < MIN_AVAILABLE_MB {
        return Err(CoreError::InsufficientMemory { available_mb, required_mb: MIN_AVAILABLE_MB });
    }
    if available_mb < LOW_MEMORY_THRESHOLD_MB {
        return Ok((batch_size / 2).max(1));
    }
    Ok(batch_size)
}

fn is_excluded(path: &str, excluded_extensions: &[String]) -> bool {
    let Some(ext) = Path::new(path).extension().and_then(|e| e.to_str()) else {
        return false;
    };
    excluded_extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Chunk;
    use std::fs;
    use std::process::Command as StdCommand;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FixedEmbedder(usize);
    impl Embedder for FixedEmbedder {
        fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
            let h = crate::hashutil::hash_chunk(text);
            Ok((0..self.0).map(|i| h[i % h.len()] as f32 / 255.0).collect())
        }
    }

    struct WholeFileChunker;
    impl Chunker for WholeFileChunker {
        fn chunk(&self, text: &str, _path: &str) -> CoreResult<Vec<Chunk>> {
            Ok(vec![Chunk {
                text: text.to_string(),
                start_line: 0,
                end_line: text.lines().count(),
                start_offset: 0,
                end_offset: text.len(),
                chunk_hash: crate::hashutil::chunk_hash_hex(&crate::hashutil::hash_chunk(text)),
            }])
        }
    }

    fn init_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        StdCommand::new("git").arg("init").current_dir(dir.path()).output().unwrap();
        StdCommand::new("git").args(["config", "user.email", "a@b.c"]).current_dir(dir.path()).output().unwrap();
        StdCommand::new("git").args(["config", "user.name", "t"]).current_dir(dir.path()).output().unwrap();
        dir
    }

    fn commit(dir: &Path, msg: &str) {
        StdCommand::new("git").args(["add", "."]).current_dir(dir).output().unwrap();
        StdCommand::new("git").args(["commit", "-m", msg]).current_dir(dir).output().unwrap();
    }

    #[test]
    fn dedups_unchanged_blob_across_commits() {
        let dir = init_repo();
        fs::write(dir.path().join("user.py"), "def greet():\n    return 'hi'\n").unwrap();
        commit(dir.path(), "c1");
        fs::write(dir.path().join("other.py"), "x = 1\n").unwrap();
        commit(dir.path(), "c2"); // user.py blob unchanged across c1, c2

        let col_dir = TempDir::new().unwrap();
        let collection = Collection::create(col_dir.path().to_path_buf(), "col", 4, "fake", "fake-model", Config::default()).unwrap();

        let mut pipeline = IngestionPipeline::new(dir.path(), &Config::default()).unwrap();
        let embedder = FixedEmbedder(4);
        let chunker = WholeFileChunker;
        let calls = Mutex::new(0u32);

        let stats = pipeline
            .run(
                &collection,
                &embedder,
                &chunker,
                "fake-model",
                IndexingMode::SingleBranch,
                &["HEAD".to_string()],
                &[],
                &|_p| {
                    *calls.lock().unwrap() += 1;
                },
            )
            .unwrap();

        assert_eq!(stats.commits_per_branch.get("HEAD"), Some(&2));
        // user.py's blob is registered once despite appearing in both commits.
        let registered = pipeline.registry.registered_count().unwrap();
        assert_eq!(registered, 2); // user.py once + other.py once
        assert!(*calls.lock().unwrap() > 0);
    }

    #[test]
    fn excluded_extensions_are_skipped() {
        assert!(is_excluded("assets/logo.png", &["png".to_string()]));
        assert!(!is_excluded("src/lib.rs", &["png".to_string()]));
    }

    #[test]
    fn adjust_batch_size_halves_below_low_memory_threshold() {
        assert_eq!(adjust_batch_size(100, 800).unwrap(), 50);
    }

    #[test]
    fn adjust_batch_size_floors_at_one() {
        assert_eq!(adjust_batch_size(1, 800).unwrap(), 1);
    }

    #[test]
    fn adjust_batch_size_leaves_batch_alone_with_plenty_of_memory() {
        assert_eq!(adjust_batch_size(100, 4096).unwrap(), 100);
    }

    #[test]
    fn adjust_batch_size_refuses_below_minimum() {
        let err = adjust_batch_size(100, 256).unwrap_err();
        assert!(matches!(err, CoreError::InsufficientMemory { .. }));
    }
}
