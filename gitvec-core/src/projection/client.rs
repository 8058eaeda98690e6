//! Client-side auto-start protocol for the Projection Service: stat
//! the PID file, probe `/health`, spawn the daemon on failure, retry with
//! backoff, and fall back to in-process multiplication if the service
//! still isn't reachable. Fallback is always correct — its only cost is
//! I/O (reloading the matrix from disk directly).

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use gitvec_protocol::{MultiplyRequest, MultiplyResponse};

use crate::projection::matrix::ProjectionMatrix;
use crate::projection::registry::PortRegistry;

const BACKOFF_MS: [u64; 6] = [100, 200, 400, 800, 1600, 1900];
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct MatrixClient {
    registry: PortRegistry,
    matrixd_bin: PathBuf,
    http: reqwest::blocking::Client,
}

#[derive(Debug)]
pub struct MultiplyOutcome {
    pub result: Vec<f32>,
    pub used_service: bool,
}

impl MatrixClient {
    pub fn new(matrixd_bin: impl Into<PathBuf>) -> Self {
        Self {
            registry: PortRegistry::new(),
            matrixd_bin: matrixd_bin.into(),
            http: reqwest::blocking::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("reqwest client"),
        }
    }

    /// `y = vector . M` via the resident service when reachable, falling
    /// back to an in-process read of the same matrix file otherwise.
    pub fn multiply(&self, vector: &[f32], collection_path: &Path, matrix_path: &Path) -> MultiplyOutcome {
        if let Some(port) = self.ensure_service_running() {
            if let Ok(result) = self.call_multiply(port, vector, collection_path) {
                return MultiplyOutcome { result, used_service: true };
            }
        }

        eprintln!("\u{26A0}\u{FE0F} Using in-process matrix multiplication (service unavailable)");
        let matrix = ProjectionMatrix::load_or_create(
            matrix_path.parent().unwrap_or_else(|| Path::new(".")),
            vector.len(),
            "fallback",
        )
        .expect("in-process fallback must be able to load or create the matrix");
        MultiplyOutcome { result: matrix.multiply(vector), used_service: false }
    }

    fn call_multiply(&self, port: u16, vector: &[f32], collection_path: &Path) -> Result<Vec<f32>, ()> {
        let req = MultiplyRequest {
            vector: vector.to_vec(),
            collection_path: collection_path.display().to_string(),
        };

        let resp = self
            .http
            .post(format!("http://127.0.0.1:{port}/multiply"))
            .json(&req)
            .send()
            .map_err(|_| ())?;

        if !resp.status().is_success() {
            return Err(());
        }
        resp.json::<MultiplyResponse>().map(|r| r.result).map_err(|_| ())
    }

    fn probe_health(&self, port: u16) -> bool {
        self.http
            .get(format!("http://127.0.0.1:{port}/health"))
            .timeout(HEALTH_PROBE_TIMEOUT)
            .send()
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// Returns the live service's port, spawning it detached and retrying
    /// with backoff if it wasn't already running. `None` means the caller
    /// should fall back in-process.
    fn ensure_service_running(&self) -> Option<u16> {
        if let Some(reg) = self.registry.read() {
            if self.probe_health(reg.port) {
                return Some(reg.port);
            }
        }

        let _ = Command::new(&self.matrixd_bin)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        for delay_ms in BACKOFF_MS {
            std::thread::sleep(Duration::from_millis(delay_ms));
            if let Some(reg) = self.registry.read() {
                if self.probe_health(reg.port) {
                    return Some(reg.port);
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn fallback_path_is_deterministic_and_correct() {
        let dir = TempDir::new().unwrap();
        let client = MatrixClient::new("/nonexistent/matrixd-binary-for-test");
        let v = vec![0.1f32; 8];
        let out1 = client.multiply(&v, dir.path(), &dir.path().join("projection_matrix.text"));
        let out2 = client.multiply(&v, dir.path(), &dir.path().join("projection_matrix.text"));
        assert!(!out1.used_service);
        assert_eq!(out1.result, out2.result);
        assert_eq!(out1.result.len(), 64);
    }
}
