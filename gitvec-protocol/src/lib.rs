//! JSON wire bodies shared between `matrixd`/`apid` and their clients.
//! Plain `serde_json` request/response structs over HTTP, not a custom
//! binary framing — the daemons here are localhost-only helper
//! processes, not a push/pull transport.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// `POST /multiply` on `matrixd`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiplyRequest {
    pub vector: Vec<f32>,
    pub collection_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiplyResponse {
    pub result: Vec<f32>,
}

/// `GET /health` on `matrixd`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub cached_matrices: usize,
    pub uptime_seconds: u64,
}

/// `GET /stats` on `matrixd`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub cache_size: usize,
    pub entries: Vec<MatrixStatsEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatrixStatsEntry {
    pub collection: String,
    pub age_minutes: f64,
}

/// `POST /register` on `apid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterJobRequest {
    pub repo_url: String,
    pub index_types: Vec<String>,
    #[serde(default)]
    pub temporal_options: Option<TemporalOptionsWire>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalOptionsWire {
    /// `"single"` (default, HEAD only), `"all_branches"`, or `"selective"`.
    #[serde(default)]
    pub mode: Option<String>,
    /// For `"selective"`, a glob pattern list (e.g. `["feature/*"]`) matched
    /// against local branches. Ignored for `"single"`/`"all_branches"`.
    #[serde(default)]
    pub branches: Vec<String>,
    /// Required `true` for `"all_branches"` jobs. The caller is expected to
    /// have shown the cost estimate (branch count, total commits) and
    /// gotten explicit confirmation before setting this.
    #[serde(default)]
    pub confirm_cost: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterJobResponse {
    pub job_id: u64,
    pub status: String,
    pub message: String,
}

/// `GET /job/{id}` response body, the wire shape of a queued/running job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStateWire {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    pub id: u64,
    pub kind: String,
    pub state: JobStateWire,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub progress: HashMap<String, String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// `DELETE /job/{id}` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelJobResponse {
    pub cancelled: bool,
}

/// `POST /query` request body. `filter` is the Qdrant-style JSON surface
/// accepted for compatibility; translating it down to the core's narrow
/// `Filter` enum is the server's job, not this crate's.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequestBody {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub include_source: bool,
    #[serde(default)]
    pub accuracy: Option<String>,
    #[serde(default)]
    pub score_threshold: Option<f32>,
    #[serde(default)]
    pub filter: Option<FilterJson>,
    #[serde(default)]
    pub time_range: Option<(i64, i64)>,
    #[serde(default)]
    pub at_commit: Option<String>,
    #[serde(default)]
    pub include_removed: bool,
    #[serde(default)]
    pub show_evolution: bool,
    #[serde(default)]
    pub evolution_limit: Option<usize>,
}

fn default_limit() -> usize {
    10
}

/// The Qdrant-compatible filter JSON shape. Only `match`/`range` leaves
/// resolving to `language`/`file_path`/`branch`/`type` are conforming;
/// anything else is rejected by the server as `UnsupportedFilter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterJson {
    Leaf {
        key: String,
        #[serde(rename = "match")]
        match_: Option<MatchJson>,
        range: Option<RangeJson>,
    },
    Must {
        must: Vec<FilterJson>,
    },
    MustNot {
        must_not: Vec<FilterJson>,
    },
    Should {
        should: Vec<FilterJson>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchJson {
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeJson {
    pub gte: Option<String>,
    pub lte: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalContextWire {
    pub first_seen: i64,
    pub last_seen: i64,
    pub appearance_count: usize,
    pub commits: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionEntryWire {
    pub commit_hash: String,
    pub commit_date: i64,
    pub author: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StalenessWire {
    pub is_stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staleness_indicator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staleness_reason: Option<String>,
    pub hash_mismatch: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staleness_delta_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHitWire {
    pub id: String,
    pub score: f32,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
    pub staleness: StalenessWire,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal_context: Option<TemporalContextWire>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub evolution: HashMap<String, Vec<EvolutionEntryWire>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponseBody {
    pub hits: Vec<SearchHitWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Error body for any non-2xx response from either daemon, mirroring
/// `CoreError::http_status`'s behavior-named taxonomy over the wire.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}
