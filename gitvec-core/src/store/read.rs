//! Vector store read path: HNSW recall (via an injected `AnnIndex`)
//! and the path-quantized fallback, plus the shared in-memory filter
//! evaluator used by both the read path and `delete_by_filter`.

use std::path::Path;

use globset::Glob;
use rayon::prelude::*;

use crate::error::{CoreError, CoreResult};
use crate::model::{AccuracyMode, Filter, VectorRecord};
use crate::quantizer;
use crate::store::collection::Collection;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub score_threshold: Option<f32>,
    pub filter: Option<Filter>,
    pub accuracy: AccuracyMode,
    /// Forces strategy (B) even when a fresh HNSW index is available —
    /// used by tests and by `status --validate`-style cross-checks.
    pub force_fallback: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self { limit: 10, score_threshold: None, filter: None, accuracy: AccuracyMode::Balanced, force_fallback: false }
    }
}

#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: VectorRecord,
    pub score: f32,
}

/// The HNSW neighbor parameter default: M, the HNSW neighbor
/// parameter, is 16 unless a collection overrides it.
pub const HNSW_M: usize = 16;

/// Seam for the version-tagged cached HNSW instance (built by
/// `rebuild`/`cache`) without coupling the store to either module.
pub trait AnnIndex {
    /// Returns `(internal_label, score)` pairs, best first.
    fn search(&self, query: &[f32], ef_search: usize, limit: usize) -> Vec<(u32, f32)>;
}

pub fn search(
    collection: &Collection,
    query: &[f32],
    opts: &SearchOptions,
    ann: Option<&dyn AnnIndex>,
) -> CoreResult<Vec<ScoredRecord>> {
    let hnsw_stale = collection.meta.read().unwrap().fingerprints.hnsw_stale;
    let over_fetch = opts.limit.max(1) * 3;

    let mut candidates: Vec<ScoredRecord> = if !opts.force_fallback && !hnsw_stale && ann.is_some() {
        search_hnsw(collection, query, opts, over_fetch, ann.unwrap())?
    } else {
        search_fallback(collection, query, opts, over_fetch)?
    };

    if let Some(threshold) = opts.score_threshold {
        candidates.retain(|c| c.score >= threshold);
    }

    if let Some(filter) = &opts.filter {
        let mut kept = Vec::with_capacity(candidates.len());
        for c in candidates {
            if record_matches_filter(&c.record, filter)? {
                kept.push(c);
            }
        }
        candidates = kept;
    }

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    candidates.truncate(opts.limit);
    Ok(candidates)
}

fn search_hnsw(
    collection: &Collection,
    query: &[f32],
    opts: &SearchOptions,
    over_fetch: usize,
    ann: &dyn AnnIndex,
) -> CoreResult<Vec<ScoredRecord>> {
    let ef_search = opts.accuracy.ef_search(HNSW_M);
    let hits = ann.search(query, ef_search, over_fetch);
    let id_index = collection.id_index.read().unwrap();

    let mut out = Vec::with_capacity(hits.len());
    for (label, score) in hits {
        let Some(id) = id_index.label_to_id(label) else { continue };
        if let Some(record) = load_record_by_id(collection, id) {
            out.push(ScoredRecord { record, score });
        }
    }
    Ok(out)
}

/// Resolves `id` straight to its vector file via the id index's path side
/// table, avoiding a full collection scan per hit.
fn load_record_by_id(collection: &Collection, id: &str) -> Option<VectorRecord> {
    let relative_path = collection.id_index.read().unwrap().path_for(id)?.to_string();
    let path = collection.root.join(relative_path);
    let text = std::fs::read_to_string(&path).ok()?;
    serde_json::from_str(&text).ok()
}

/// Strategy (B): quantize the query, enumerate neighbor directories within
/// the accuracy-derived Hamming radius, load every candidate in parallel,
/// and score by cosine similarity.
fn search_fallback(
    collection: &Collection,
    query: &[f32],
    opts: &SearchOptions,
    over_fetch: usize,
) -> CoreResult<Vec<ScoredRecord>> {
    let hex = quantizer::quantize(query, &collection.matrix);
    let radius = opts.accuracy.hamming_radius();
    let dir_paths = quantizer::neighbor_dir_paths(&hex, collection.config.depth_factor, radius);

    let mut files: Vec<std::path::PathBuf> = Vec::new();
    for dirs in &dir_paths {
        let mut p = collection.root.clone();
        for d in dirs {
            p.push(d);
        }
        if let Ok(entries) = std::fs::read_dir(&p) {
            for entry in entries.flatten() {
                let path = entry.path();
                if is_vector_file(&path) {
                    files.push(path);
                }
            }
        }
    }

    let cap = collection.config.candidate_loading_cap;
    if files.len() > cap {
        tracing::warn!(
            examined = files.len(),
            cap,
            "candidate loading cap exceeded, truncating deterministically"
        );
        files.sort();
        files.truncate(cap);
    }

    let scored: Vec<ScoredRecord> = files
        .into_par_iter()
        .filter_map(|path| {
            let text = std::fs::read_to_string(&path).ok()?;
            let record: VectorRecord = serde_json::from_str(&text).ok()?;
            let score = cosine_similarity(query, &record.vector);
            Some(ScoredRecord { record, score })
        })
        .collect();

    let mut scored = scored;
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(over_fetch);
    Ok(scored)
}

fn is_vector_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("vector_") && n.ends_with(".text"))
        .unwrap_or(false)
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for i in 0..a.len() {
        dot += a[i] * b[i];
        na += a[i] * a[i];
        nb += b[i] * b[i];
    }
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na.sqrt() * nb.sqrt())
}

/// Maps a handful of common extensions to the canonical language name used
/// by the `language` filter predicate.
fn extension_to_language(ext: &str) -> &'static str {
    match ext {
        "py" => "python",
        "rs" => "rust",
        "go" => "go",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "java" => "java",
        "rb" => "ruby",
        "c" | "h" => "c",
        "cpp" | "cc" | "hpp" => "cpp",
        _ => "unknown",
    }
}

/// The shared in-memory filter evaluator. Conforming predicates only;
/// nested `Must`/`MustNot`/`Should` is the translated shape of the
/// Qdrant-style wrapper accepted at the protocol boundary.
pub fn record_matches_filter(record: &VectorRecord, filter: &Filter) -> CoreResult<bool> {
    Ok(match filter {
        Filter::Language(lang) => {
            let ext = Path::new(&record.file_path).extension().and_then(|e| e.to_str()).unwrap_or("");
            extension_to_language(ext).eq_ignore_ascii_case(lang)
        }
        Filter::FilePathGlob(pattern) => Glob::new(pattern)
            .map_err(|e| CoreError::UnsupportedFilter(format!("bad glob {pattern:?}: {e}")))?
            .compile_matcher()
            .is_match(&record.file_path),
        Filter::Branch(branch) => record.metadata.branch.as_deref() == Some(branch.as_str()),
        Filter::Type(t) => record.point_type.as_deref() == Some(t.as_str()),
        Filter::Must(subs) => {
            for sub in subs {
                if !record_matches_filter(record, sub)? {
                    return Ok(false);
                }
            }
            true
        }
        Filter::MustNot(subs) => {
            for sub in subs {
                if record_matches_filter(record, sub)? {
                    return Ok(false);
                }
            }
            true
        }
        Filter::Should(subs) => {
            if subs.is_empty() {
                true
            } else {
                let mut any = false;
                for sub in subs {
                    if record_matches_filter(record, sub)? {
                        any = true;
                        break;
                    }
                }
                any
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model::PointInput;
    use crate::store::write::upsert_points;
    use tempfile::TempDir;

    fn make_point(id: &str, vector: Vec<f32>, file_path: &str) -> PointInput {
        PointInput {
            id: id.to_string(),
            vector,
            file_path: file_path.to_string(),
            start_line: 1,
            end_line: 5,
            start_offset: 0,
            end_offset: 50,
            chunk_hash: "h".to_string(),
            content: "content".to_string(),
            point_type: Some("content".to_string()),
            branch: Some("main".to_string()),
        }
    }

    #[test]
    fn fallback_search_finds_identical_vector_as_top_hit() {
        let dir = TempDir::new().unwrap();
        let col = Collection::create(dir.path().join("c"), "c", 8, "voyage", "m", Config::default()).unwrap();

        let target = vec![0.9, 0.1, 0.2, 0.3, -0.1, 0.4, 0.2, 0.1];
        upsert_points(&col, None, "m", None, vec![
            make_point("a", target.clone(), "a.py"),
            make_point("b", vec![-0.9, -0.1, -0.2, -0.3, 0.1, -0.4, -0.2, -0.1], "b.py"),
        ]).unwrap();

        let opts = SearchOptions { limit: 2, force_fallback: true, ..Default::default() };
        let hits = search(&col, &target, &opts, None).unwrap();
        assert_eq!(hits[0].record.id, "a");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn language_filter_restricts_results() {
        let dir = TempDir::new().unwrap();
        let col = Collection::create(dir.path().join("c"), "c", 4, "voyage", "m", Config::default()).unwrap();
        upsert_points(&col, None, "m", None, vec![
            make_point("a", vec![0.5; 4], "a.py"),
            make_point("b", vec![0.5; 4], "b.rs"),
        ]).unwrap();

        let opts = SearchOptions {
            limit: 10,
            filter: Some(Filter::Language("rust".to_string())),
            force_fallback: true,
            ..Default::default()
        };
        let hits = search(&col, &vec![0.5; 4], &opts, None).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.file_path, "b.rs");
    }

    #[test]
    fn unsupported_glob_returns_error() {
        let record = VectorRecord {
            id: "a".into(),
            file_path: "a.py".into(),
            start_line: 1,
            end_line: 1,
            start_offset: 0,
            end_offset: 1,
            chunk_hash: "h".into(),
            vector: vec![],
            storage: crate::model::PayloadStorage::Inline { chunk_text: "x".into() },
            metadata: crate::model::VectorMetadata::default(),
            point_type: None,
        };
        let err = record_matches_filter(&record, &Filter::FilePathGlob("[".into())).unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedFilter(_)));
    }
}
