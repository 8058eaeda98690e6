//! `Embedder` adapter calling an external embedding provider over HTTP.
//! The provider's URL and credentials are environment-supplied; the core
//! only ever sees the narrow `embed(text) -> Vec<f32>` contract.

use gitvec_core::error::{CoreError, CoreResult};
use gitvec_core::interop::Embedder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

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
