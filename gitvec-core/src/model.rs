//! Record types for the vector store. Dynamic dictionaries are replaced by
//! explicit tagged variants and schema-driven (de)serialization, exactly
//! the redesign Design Notes calls for; on-disk key names are preserved.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A chunk produced by the caller's chunker, prior to embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub start_line: usize,
    pub end_line: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub chunk_hash: String,
}

/// Exactly one of these is stored per vector file — never both, never a
/// bare `content`/`text` key. Replaces an earlier scheme that sometimes
/// stored both fields and let them drift out of sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadStorage {
    GitBlob { git_blob_hash: String },
    Inline { chunk_text: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub indexed_at: String, // UTC ISO-8601
    pub embedding_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub git_blob_hash_for_temporal: Option<String>,
}

/// A caller-supplied point to upsert. `payload.content` is accepted here
/// (the caller's convenience shape) but is dropped unconditionally before
/// anything is written to disk — see `store::write::upsert_points`.
#[derive(Debug, Clone)]
pub struct PointInput {
    pub id: String,
    pub vector: Vec<f32>,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub chunk_hash: String,
    pub content: String,
    pub point_type: Option<String>,
    pub branch: Option<String>,
}

/// The on-disk record for one vector file, post-write-path-policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub chunk_hash: String,
    pub vector: Vec<f32>,
    #[serde(flatten)]
    pub storage: PayloadStorage,
    pub metadata: VectorMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMeta {
    pub name: String,
    pub vector_size: usize,
    pub created_at: String,
    pub depth_factor: usize,
    pub reduced_dimensions: usize,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub fingerprints: IndexFingerprints,
    pub point_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexFingerprints {
    pub hnsw_stale: bool,
    pub id_index_stale: bool,
    pub fts_stale: bool,
}

/// A conforming in-memory filter predicate, plus the Qdrant-compatible
/// wrapper translated down to it.
#[derive(Debug, Clone)]
pub enum Filter {
    Language(String),
    FilePathGlob(String),
    Branch(String),
    Type(String),
    Must(Vec<Filter>),
    MustNot(Vec<Filter>),
    Should(Vec<Filter>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalenessIndicator {
    Modified,
    Deleted,
    Error,
}

impl StalenessIndicator {
    pub fn emoji_label(self) -> &'static str {
        match self {
            StalenessIndicator::Modified => "\u{26A0}\u{FE0F} Modified",
            StalenessIndicator::Deleted => "\u{1F5D1}\u{FE0F} Deleted",
            StalenessIndicator::Error => "\u{274C} Error",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Staleness {
    pub is_stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staleness_indicator: Option<StalenessIndicator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staleness_reason: Option<String>,
    pub hash_mismatch: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staleness_delta_seconds: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalContext {
    pub first_seen: i64,
    pub last_seen: i64,
    pub appearance_count: usize,
    pub commits: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub file_path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
    pub staleness: Staleness,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal_context: Option<TemporalContext>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub evolution: HashMap<String, Vec<EvolutionEntry>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionEntry {
    pub commit_hash: String,
    pub commit_date: i64,
    pub author: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccuracyMode {
    Fast,
    Balanced,
    High,
}

impl AccuracyMode {
    pub fn hamming_radius(self) -> u32 {
        match self {
            AccuracyMode::Fast => 1,
            AccuracyMode::Balanced => 2,
            AccuracyMode::High => 3,
        }
    }

    /// `ef_search = M * mult`, `M = 16` (the HNSW default neighbor count).
    pub fn ef_search(self, m: usize) -> usize {
        let mult = match self {
            AccuracyMode::Fast => 1,
            AccuracyMode::Balanced => 2,
            AccuracyMode::High => 4,
        };
        m * mult
    }
}
