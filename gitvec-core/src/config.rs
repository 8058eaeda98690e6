use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accuracy {
    Fast,
    Balanced,
    High,
}

impl Default for Accuracy {
    fn default() -> Self {
        Accuracy::Balanced
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub depth_factor: usize,
    pub accuracy: Accuracy,
    pub thread_pool_size: usize,
    pub candidate_loading_cap: usize,
    pub temporal_batch_size: usize,
    pub excluded_extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            depth_factor: 4,
            accuracy: Accuracy::Balanced,
            thread_pool_size: 10,
            candidate_loading_cap: 50_000,
            temporal_batch_size: 500,
            excluded_extensions: vec![
                "png".into(), "jpg".into(), "jpeg".into(), "gif".into(),
                "ico".into(), "lock".into(), "woff".into(), "woff2".into(),
                "ttf".into(), "zip".into(), "tar".into(), "gz".into(),
            ],
        }
    }
}

impl Config {
    /// Load `<repo>/.code-indexer/config.toml`, layering
    /// `<repo>/.code-indexer-override.toml` on top if present. Missing
    /// files fall back to `Config::default()`.
    pub fn load(repo_root: &Path) -> CoreResult<Self> {
        let mut cfg = Self::read_one(&repo_root.join(".code-indexer").join("config.toml"))?
            .unwrap_or_default();

        if let Some(over) = Self::read_one(&repo_root.join(".code-indexer-override.toml"))? {
            cfg = over;
        }

        Ok(cfg)
    }

    fn read_one(path: &Path) -> CoreResult<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let s = fs::read_to_string(path)?;
        Ok(Some(toml::from_str(&s)?))
    }

    pub fn save(&self, repo_root: &Path) -> CoreResult<()> {
        let dir = repo_root.join(".code-indexer");
        fs::create_dir_all(&dir)?;
        let s = toml::to_string_pretty(self)?;
        fs::write(dir.join("config.toml"), s)?;
        Ok(())
    }
}

/// Host-wide directory for the projection service's port/PID registry,
/// shared across every repository's `matrixd` instance on this machine.
pub fn matrix_service_registry_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".code-indexer-matrix-service")
}
