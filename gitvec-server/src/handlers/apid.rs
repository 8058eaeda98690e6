use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path as AxumPath, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use gitvec_core::config::Config;
use gitvec_core::gitbackend::{expand_branch_globs, GitBackend};
use gitvec_core::model::{AccuracyMode, Staleness, StalenessIndicator, TemporalContext};
use gitvec_core::query::{self, QueryOptions};
use gitvec_core::rebuild::{rebuild_in_background, ArtifactKind};
use gitvec_core::store::build_hnsw_artifact;
use gitvec_core::store::HnswAnnIndex;
use gitvec_core::temporal::ingest::IngestionPipeline;
use gitvec_core::temporal::IndexingMode;
use gitvec_protocol::{
    CancelJobResponse, EvolutionEntryWire, JobResponse, JobStateWire, QueryRequestBody, QueryResponseBody,
    RegisterJobRequest, RegisterJobResponse, SearchHitWire, StalenessWire, TemporalContextWire,
};

use crate::app_state::ApidState;
use crate::filter::to_core_filter;
use crate::handlers::utils::{from_core_error, respond_err};

/// Resolves a request's indexing mode and branch list, and for
/// `all_branches` enforces the required cost-warning confirmation. Returns
/// the error response to send back verbatim when the request can't proceed.
fn resolve_branches(repo_root: &std::path::Path, req: &RegisterJobRequest) -> Result<(IndexingMode, Vec<String>), Response> {
    let opts = req.temporal_options.as_ref();
    let mode_str = opts.and_then(|t| t.mode.as_deref()).unwrap_or("single");
    let git = GitBackend::new(repo_root);

    match mode_str {
        "all_branches" => {
            let confirmed = opts.map(|t| t.confirm_cost).unwrap_or(false);
            let branches = git.local_branches().map_err(|e| respond_err(e.http_status(), e.to_string()))?;
            if !confirmed {
                let estimate = git.estimate_branch_cost(&branches).map_err(|e| respond_err(e.http_status(), e.to_string()))?;
                return Err(respond_err(
                    400,
                    format!(
                        "all_branches indexing requires confirmation: {} branch(es), ~{} commit(s) to walk. \
                         Set temporal_options.confirm_cost = true to proceed.",
                        estimate.branch_count, estimate.total_commits
                    ),
                ));
            }
            Ok((IndexingMode::AllBranches, branches))
        }
        "selective" => {
            let patterns = opts.map(|t| t.branches.clone()).unwrap_or_default();
            if patterns.is_empty() {
                return Err(respond_err(400, "selective indexing requires temporal_options.branches (glob patterns)".to_string()));
            }
            let all_branches = git.local_branches().map_err(|e| respond_err(e.http_status(), e.to_string()))?;
            let matched = expand_branch_globs(&patterns, &all_branches);
            if matched.is_empty() {
                return Err(respond_err(400, format!("no local branches matched patterns {patterns:?}")));
            }
            Ok((IndexingMode::Selective, matched))
        }
        _ => Ok((IndexingMode::SingleBranch, vec!["HEAD".to_string()])),
    }
}

pub async fn register_handler(State(state): State<Arc<ApidState>>, Json(req): Json<RegisterJobRequest>) -> Response {
    let (mode, branches) = match resolve_branches(&state.repo_root, &req) {
        Ok(pair) => pair,
        Err(response) => return response,
    };

    let state_for_job = Arc::clone(&state);
    let repo_url = req.repo_url.clone();

    let mut metadata = HashMap::new();
    metadata.insert("repo_url".to_string(), repo_url);
    metadata.insert("index_types".to_string(), req.index_types.join(","));

    let job_id = state.jobs.register("index", metadata, move |on_progress| {
        let config = Config::load(&state_for_job.repo_root).unwrap_or_default();
        let mut pipeline = IngestionPipeline::new(state_for_job.repo_root.clone(), &config).map_err(|e| e.to_string())?;

        let embedder = &*state_for_job.embedder;
        let chunker = &*state_for_job.chunker;
        let embedding_model = state_for_job.collection.meta.read().unwrap().embedding_model.clone();

        let stats = pipeline
            .run(
                &state_for_job.collection,
                embedder,
                chunker,
                &embedding_model,
                mode,
                &branches,
                &config.excluded_extensions,
                &move |p| {
                    let mut progress = HashMap::new();
                    progress.insert("current".to_string(), p.current.to_string());
                    progress.insert("total".to_string(), p.total.to_string());
                    progress.insert("info".to_string(), p.info);
                    on_progress(progress);
                },
            )
            .map_err(|e| e.to_string())?;

        rebuild_in_background(&state_for_job.collection, ArtifactKind::Hnsw, build_hnsw_artifact, |_| {})
            .map_err(|e| e.to_string())?;

        serde_json::to_string(&stats).map_err(|e| e.to_string())
    });

    Json(RegisterJobResponse { job_id, status: "queued".to_string(), message: "indexing job registered".to_string() }).into_response()
}

pub async fn job_handler(State(state): State<Arc<ApidState>>, AxumPath(id): AxumPath<u64>) -> Response {
    match state.jobs.get(id) {
        Some(job) => Json(JobResponse {
            id: job.id,
            kind: job.kind,
            state: to_wire_state(job.state),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            progress: job.progress,
            result: job.result,
            error: job.error,
            metadata: job.metadata,
        })
        .into_response(),
        None => respond_err(404, format!("job {id} not found")),
    }
}

pub async fn cancel_job_handler(State(state): State<Arc<ApidState>>, AxumPath(id): AxumPath<u64>) -> Response {
    let cancelled = state.jobs.cancel(id);
    Json(CancelJobResponse { cancelled }).into_response()
}

pub async fn query_handler(State(state): State<Arc<ApidState>>, Json(req): Json<QueryRequestBody>) -> Response {
    let filter = match req.filter.as_ref().map(to_core_filter).transpose() {
        Ok(f) => f,
        Err(e) => return from_core_error(e),
    };

    let accuracy = match req.accuracy.as_deref() {
        Some("fast") => AccuracyMode::Fast,
        Some("high") => AccuracyMode::High,
        _ => AccuracyMode::Balanced,
    };

    let opts = QueryOptions {
        limit: req.limit,
        accuracy,
        score_threshold: req.score_threshold,
        filter,
        time_range: req.time_range,
        at_commit: req.at_commit.clone(),
        include_removed: req.include_removed,
        show_evolution: req.show_evolution,
    };

    let hnsw_path = state.collection.hnsw_path();
    let ann: Option<Arc<HnswAnnIndex>> = if hnsw_path.exists() {
        let meta_path = state.collection.meta_file_path();
        let name = state.collection.meta.read().unwrap().name.clone();
        match state.hnsw_cache.get_or_reload(&name, &meta_path, || HnswAnnIndex::load(&hnsw_path)) {
            Ok(index) => Some(index),
            Err(e) => {
                tracing::warn!(error = %e, "falling back to path-quantized search: hnsw index failed to load");
                None
            }
        }
    } else {
        None
    };

    let ann_ref: Option<&dyn gitvec_core::store::AnnIndex> = ann.as_deref().map(|i| i as &dyn gitvec_core::store::AnnIndex);
    let result = query::query(&state.repo_root, &state.collection, &*state.embedder, ann_ref, &req.query, &opts);

    match result {
        Ok(result) => {
            let mut hits: Vec<SearchHitWire> = result.hits.into_iter().map(to_hit_wire).collect();
            if let Some(cap) = req.evolution_limit {
                for hit in &mut hits {
                    for entries in hit.evolution.values_mut() {
                        entries.truncate(cap);
                    }
                }
            }
            if !req.include_source {
                for hit in &mut hits {
                    hit.content.clear();
                }
            }
            Json(QueryResponseBody { hits, warning: result.warning }).into_response()
        }
        Err(e) => from_core_error(e),
    }
}

fn to_wire_state(state: gitvec_core::jobqueue::JobState) -> JobStateWire {
    use gitvec_core::jobqueue::JobState::*;
    match state {
        Queued => JobStateWire::Queued,
        Running => JobStateWire::Running,
        Completed => JobStateWire::Completed,
        Failed => JobStateWire::Failed,
        Cancelled => JobStateWire::Cancelled,
    }
}

fn to_hit_wire(hit: gitvec_core::model::SearchHit) -> SearchHitWire {
    SearchHitWire {
        id: hit.id,
        score: hit.score,
        file_path: hit.file_path,
        start_line: hit.start_line,
        end_line: hit.end_line,
        content: hit.content,
        staleness: to_staleness_wire(hit.staleness),
        temporal_context: hit.temporal_context.map(to_temporal_wire),
        evolution: hit
            .evolution
            .into_iter()
            .map(|(path, entries)| {
                (
                    path,
                    entries
                        .into_iter()
                        .map(|e| EvolutionEntryWire { commit_hash: e.commit_hash, commit_date: e.commit_date, author: e.author, message: e.message, diff: e.diff })
                        .collect(),
                )
            })
            .collect(),
    }
}

fn to_staleness_wire(staleness: Staleness) -> StalenessWire {
    StalenessWire {
        is_stale: staleness.is_stale,
        staleness_indicator: staleness.staleness_indicator.map(|i| match i {
            StalenessIndicator::Modified => "modified".to_string(),
            StalenessIndicator::Deleted => "deleted".to_string(),
            StalenessIndicator::Error => "error".to_string(),
        }),
        staleness_reason: staleness.staleness_reason,
        hash_mismatch: staleness.hash_mismatch,
        staleness_delta_seconds: staleness.staleness_delta_seconds,
    }
}

fn to_temporal_wire(ctx: TemporalContext) -> TemporalContextWire {
    TemporalContextWire { first_seen: ctx.first_seen, last_seen: ctx.last_seen, appearance_count: ctx.appearance_count, commits: ctx.commits }
}
