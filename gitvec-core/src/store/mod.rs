//! The path-quantized vector store: a collection's on-disk
//! layout, the write path, and the two-strategy read path.

pub mod collection;
#[cfg(feature = "ann-hnsw")]
pub mod hnsw_index;
pub mod id_index;
pub mod read;
pub mod write;

pub use collection::Collection;
#[cfg(feature = "ann-hnsw")]
pub use hnsw_index::{build_artifact as build_hnsw_artifact, HnswAnnIndex};
pub use id_index::IdIndex;
pub use read::{AnnIndex, ScoredRecord, SearchOptions};
pub use write::GitContext;
