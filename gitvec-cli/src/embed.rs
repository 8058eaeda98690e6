//! Embedder/chunker adapters for offline indexing runs invoked from the
//! command line. Mirrors the daemon's adapters (same env-var-configured
//! HTTP embedding provider, same fixed-window chunker) since each process
//! that calls into the core owns its own thin implementation of the
//! `Embedder`/`Chunker` contract rather than sharing one.

use std::time::Duration;

use gitvec_core::error::{CoreError, CoreResult};
use gitvec_core::hashutil::{chunk_hash_hex, hash_chunk};
use gitvec_core::interop::{Chunker, Embedder};
use gitvec_core::model::Chunk;
use serde::{Deserialize, Serialize};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpEmbedder {
    endpoint: Option<String>,
    api_key: Option<String>,
    http: reqwest::blocking::Client,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    pub fn from_env() -> Self {
        Self {
            endpoint: std::env::var("EMBEDDING_PROVIDER_URL").ok(),
            api_key: std::env::var("EMBEDDING_PROVIDER_KEY").ok(),
            http: reqwest::blocking::Client::builder().timeout(REQUEST_TIMEOUT).build().expect("reqwest client"),
        }
    }
}

impl Embedder for HttpEmbedder {
    fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        let endpoint = self
            .endpoint
            .as_ref()
            .ok_or_else(|| CoreError::MatrixServiceUnavailable("EMBEDDING_PROVIDER_URL not set".to_string()))?;

        let mut req = self.http.post(endpoint).json(&EmbedRequest { input: text });
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req
            .send()
            .map_err(|e| CoreError::MatrixServiceUnavailable(format!("embedding provider request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(CoreError::MatrixServiceUnavailable(format!(
                "embedding provider returned {}",
                resp.status()
            )));
        }

        resp.json::<EmbedResponse>()
            .map(|r| r.embedding)
            .map_err(|e| CoreError::MatrixServiceUnavailable(format!("bad embedding provider response: {e}")))
    }
}

pub struct LineChunker {
    pub lines_per_chunk: usize,
}

impl Default for LineChunker {
    fn default() -> Self {
        Self { lines_per_chunk: 60 }
    }
}

impl Chunker for LineChunker {
    fn chunk(&self, text: &str, _path: &str) -> CoreResult<Vec<Chunk>> {
        let lines: Vec<&str> = text.lines().collect();
        if lines.is_empty() {
            return Ok(Vec::new());
        }

        let mut chunks = Vec::new();
        let mut start_line = 0;
        let mut start_offset = 0;

        while start_line < lines.len() {
            let end_line = (start_line + self.lines_per_chunk).min(lines.len());
            let slice = lines[start_line..end_line].join("\n");
            let end_offset = start_offset + slice.len();

            chunks.push(Chunk {
                chunk_hash: chunk_hash_hex(&hash_chunk(&slice)),
                text: slice,
                start_line,
                end_line,
                start_offset,
                end_offset,
            });

            start_offset = end_offset + 1;
            start_line = end_line;
        }

        Ok(chunks)
    }
}
