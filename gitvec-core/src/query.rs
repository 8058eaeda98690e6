//! Query pipeline: embed, search, apply temporal filters, materialize
//! content and staleness, truncate. Falls back to a plain embed-search-
//! materialize sequence with a warning when a repository has no temporal
//! index but the caller asked for a temporal mode anyway.

use std::path::Path;

use crate::error::CoreResult;
use crate::gitbackend::GitBackend;
use crate::interop::Embedder;
use crate::materializer;
use crate::model::{AccuracyMode, EvolutionEntry, Filter, PayloadStorage, SearchHit, TemporalContext};
use crate::store::collection::Collection;
use crate::store::read::{search, AnnIndex, SearchOptions};
use crate::temporal::{temporal_dir, temporal_index_exists, TemporalDb};

const OVER_FETCH_FACTOR: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub limit: usize,
    pub accuracy: AccuracyMode,
    pub score_threshold: Option<f32>,
    pub filter: Option<Filter>,
    pub time_range: Option<(i64, i64)>,
    pub at_commit: Option<String>,
    pub include_removed: bool,
    pub show_evolution: bool,
}

impl Default for AccuracyMode {
    fn default() -> Self {
        AccuracyMode::Balanced
    }
}

pub struct QueryResult {
    pub hits: Vec<SearchHit>,
    pub warning: Option<String>,
}

pub fn query(
    repo_root: &Path,
    collection: &Collection,
    embedder: &dyn Embedder,
    ann: Option<&dyn AnnIndex>,
    q_text: &str,
    opts: &QueryOptions,
) -> CoreResult<QueryResult> {
    let wants_temporal = opts.time_range.is_some() || opts.at_commit.is_some() || opts.include_removed || opts.show_evolution;
    let temporal_available = temporal_index_exists(repo_root);
    let apply_temporal = wants_temporal && temporal_available;

    let warning = if wants_temporal && !temporal_available {
        Some("Temporal index not available; time-range/at-commit/include-removed/show-evolution are ignored.".to_string())
    } else {
        None
    };

    let over_fetch_limit = if apply_temporal { opts.limit.max(1) * OVER_FETCH_FACTOR } else { opts.limit.max(1) };

    let vector = embedder.embed(q_text)?;
    let search_opts = SearchOptions {
        limit: over_fetch_limit,
        score_threshold: opts.score_threshold,
        filter: opts.filter.clone(),
        accuracy: opts.accuracy,
        force_fallback: false,
    };
    let mut scored = search(collection, &vector, &search_opts, ann)?;

    let mut hits: Vec<SearchHit> = if apply_temporal {
        let db = TemporalDb::open(&temporal_dir(repo_root))?;
        let backend = GitBackend::new(repo_root);
        let head_tree = backend.ls_tree("HEAD").unwrap_or_default();
        let at_commit_hash = match &opts.at_commit {
            Some(rev) => Some(backend.rev_parse(rev)?),
            None => None,
        };

        let mut out = Vec::with_capacity(scored.len());
        for scored_hit in scored.drain(..) {
            let git_blob_hash = match &scored_hit.record.storage {
                PayloadStorage::GitBlob { git_blob_hash } => git_blob_hash.clone(),
                PayloadStorage::Inline { .. } => {
                    out.push(build_hit(repo_root, &scored_hit.record, scored_hit.score, None, Vec::new(), opts.show_evolution, Some(&db))?);
                    continue;
                }
            };

            let commits = db.commits_for_blob(&git_blob_hash)?;

            if let Some(t0_t1) = opts.time_range {
                let in_range = commits.iter().any(|(_, date)| *date >= t0_t1.0 && *date <= t0_t1.1);
                if !commits.is_empty() && !in_range {
                    continue;
                }
            }

            if let Some(commit_hash) = &at_commit_hash {
                let tree_blobs = db.blob_hashes_in_commit(commit_hash)?;
                if !tree_blobs.contains(&git_blob_hash) {
                    continue;
                }
            }

            if !opts.include_removed && !head_tree.values().any(|h| h == &git_blob_hash) {
                continue;
            }

            let temporal_context = if commits.is_empty() {
                None
            } else {
                let dates: Vec<i64> = commits.iter().map(|(_, d)| *d).collect();
                Some(TemporalContext {
                    first_seen: *dates.iter().min().unwrap(),
                    last_seen: *dates.iter().max().unwrap(),
                    appearance_count: commits.len(),
                    commits: commits.iter().map(|(h, _)| h.clone()).collect(),
                })
            };

            out.push(build_hit(repo_root, &scored_hit.record, scored_hit.score, temporal_context, commits, opts.show_evolution, Some(&db))?);
        }
        out
    } else {
        scored
            .drain(..)
            .map(|s| build_hit(repo_root, &s.record, s.score, None, Vec::new(), false, None))
            .collect::<CoreResult<Vec<_>>>()?
    };

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(opts.limit.max(1));

    Ok(QueryResult { hits, warning })
}

fn build_hit(
    repo_root: &Path,
    record: &crate::model::VectorRecord,
    score: f32,
    temporal_context: Option<TemporalContext>,
    commits: Vec<(String, i64)>,
    show_evolution: bool,
    db: Option<&TemporalDb>,
) -> CoreResult<SearchHit> {
    let materialized = materializer::materialize(repo_root, record)?;

    let mut evolution = std::collections::HashMap::new();
    if let (true, Some(db)) = (show_evolution && !commits.is_empty(), db) {
        let mut entries = Vec::with_capacity(commits.len());
        for (hash, date) in &commits {
            if let Some((author, message, _)) = db.commit_header_row(hash)? {
                entries.push(EvolutionEntry { commit_hash: hash.clone(), commit_date: *date, author, message, diff: None });
            }
        }
        evolution.insert(record.file_path.clone(), entries);
    }

    Ok(SearchHit {
        id: record.id.clone(),
        score,
        file_path: record.file_path.clone(),
        start_line: record.start_line,
        end_line: record.end_line,
        content: materialized.content,
        staleness: materialized.staleness,
        temporal_context,
        evolution,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model::PointInput;
    use crate::store::write::upsert_points;
    use tempfile::TempDir;

    struct FixedEmbedder(Vec<f32>);
    impl Embedder for FixedEmbedder {
        fn embed(&self, _text: &str) -> CoreResult<Vec<f32>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn query_without_temporal_index_emits_warning_and_still_returns_hits() {
        let col_dir = TempDir::new().unwrap();
        let collection = Collection::create(col_dir.path().to_path_buf(), "c", 4, "fake", "m", Config::default()).unwrap();
        upsert_points(
            &collection,
            None,
            "m",
            None,
            vec![PointInput {
                id: "a".to_string(),
                vector: vec![1.0, 0.0, 0.0, 0.0],
                file_path: "a.py".to_string(),
                start_line: 0,
                end_line: 1,
                start_offset: 0,
                end_offset: 1,
                chunk_hash: "h".to_string(),
                content: "x = 1".to_string(),
                point_type: None,
                branch: None,
            }],
        )
        .unwrap();

        let repo_dir = TempDir::new().unwrap();
        let embedder = FixedEmbedder(vec![1.0, 0.0, 0.0, 0.0]);
        let opts = QueryOptions { limit: 5, include_removed: true, ..QueryOptions::default() };

        let result = query(repo_dir.path(), &collection, &embedder, None, "find x", &opts).unwrap();
        assert!(result.warning.is_some());
        assert_eq!(result.hits.len(), 1);
        assert_eq!(result.hits[0].content, "x = 1");
    }

    #[test]
    fn query_without_temporal_options_needs_no_temporal_index() {
        let col_dir = TempDir::new().unwrap();
        let collection = Collection::create(col_dir.path().to_path_buf(), "c", 4, "fake", "m", Config::default()).unwrap();
        upsert_points(
            &collection,
            None,
            "m",
            None,
            vec![PointInput {
                id: "a".to_string(),
                vector: vec![1.0, 0.0, 0.0, 0.0],
                file_path: "a.py".to_string(),
                start_line: 0,
                end_line: 1,
                start_offset: 0,
                end_offset: 1,
                chunk_hash: "h".to_string(),
                content: "x = 1".to_string(),
                point_type: None,
                branch: None,
            }],
        )
        .unwrap();

        let repo_dir = TempDir::new().unwrap();
        let embedder = FixedEmbedder(vec![1.0, 0.0, 0.0, 0.0]);
        let result = query(repo_dir.path(), &collection, &embedder, None, "find x", &QueryOptions { limit: 5, ..QueryOptions::default() }).unwrap();
        assert!(result.warning.is_none());
        assert_eq!(result.hits.len(), 1);
    }
}
