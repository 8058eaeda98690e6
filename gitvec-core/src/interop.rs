//! The narrow interop boundary: embedding generation and chunking are the
//! caller's responsibility, not the core's —
//! `Embedder::embed(text) -> Vec<f32>` and `Chunker::chunk`.

use crate::error::CoreResult;
use crate::model::Chunk;

pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> CoreResult<Vec<f32>>;
}

pub trait Chunker: Send + Sync {
    fn chunk(&self, text: &str, path: &str) -> CoreResult<Vec<Chunk>>;
}
