//! Deterministic D×64 projection matrix, persisted as human-readable text
//! for git-friendliness. Legacy binary files are upgraded to text on first
//! access; the binary is retained, never deleted.

use chrono::Utc;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::{CoreError, CoreResult};

const REDUCED_DIM: usize = 64;
const TEXT_MAGIC: &str = "# gitvec-projection-matrix v1";
const LEGACY_BINARY_MAGIC: [u8; 4] = *b"GVPM";

#[derive(Debug, Clone)]
pub struct ProjectionMatrix {
    pub rows: usize, // D
    pub cols: usize, // 64
    data: Vec<f32>,  // row-major, rows * cols
    pub collection: Option<String>,
    pub created_at: Option<String>,
}

impl ProjectionMatrix {
    /// Generate the deterministic matrix for embedding dimension `d`,
    /// seeded from `hash("projection_{D}_64")`, normalized by `1/sqrt(64)`
    /// so output scale is independent of the reduced dimension.
    pub fn generate(d: usize) -> Self {
        Self::generate_for(d, None)
    }

    pub fn generate_for(d: usize, collection: Option<String>) -> Self {
        let seed_str = format!("projection_{d}_{REDUCED_DIM}");
        let seed = *blake3::hash(seed_str.as_bytes()).as_bytes();
        let mut rng = ChaCha20Rng::from_seed(seed);

        let scale = 1.0f32 / (REDUCED_DIM as f32).sqrt();
        let mut data = Vec::with_capacity(d * REDUCED_DIM);
        for _ in 0..(d * REDUCED_DIM) {
            let sample: f32 = rng.gen_range(-1.0f32..1.0f32);
            data.push(sample * scale);
        }

        Self {
            rows: d,
            cols: REDUCED_DIM,
            data,
            collection,
            created_at: Some(Utc::now().to_rfc3339()),
        }
    }

    /// `y = vector . M`, length `cols` (64).
    pub fn multiply(&self, vector: &[f32]) -> Vec<f32> {
        assert_eq!(vector.len(), self.rows, "projection input dimension mismatch");
        let mut out = vec![0.0f32; self.cols];
        for (r, &x) in vector.iter().enumerate() {
            if x == 0.0 {
                continue;
            }
            let row_start = r * self.cols;
            for c in 0..self.cols {
                out[c] += x * self.data[row_start + c];
            }
        }
        out
    }

    fn row(&self, r: usize) -> &[f32] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Serialize as the human-readable text format:
    /// `shape:[D,64]`, `dtype`, `data:[[...]]`, `created_at`, `collection`.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(TEXT_MAGIC);
        out.push('\n');
        out.push_str(&format!("shape: [{}, {}]\n", self.rows, self.cols));
        out.push_str("dtype: f32\n");
        out.push_str(&format!("created_at: {}\n", self.created_at.as_deref().unwrap_or("")));
        out.push_str(&format!("collection: {}\n", self.collection.as_deref().unwrap_or("")));
        out.push_str("data:\n");
        for r in 0..self.rows {
            let row = self.row(r);
            let joined = row.iter().map(|v| format!("{v}")).collect::<Vec<_>>().join(", ");
            out.push_str(&format!("  - [{joined}]\n"));
        }
        out
    }

    pub fn from_text(s: &str) -> CoreResult<Self> {
        let mut rows = 0usize;
        let mut cols = 0usize;
        let mut created_at = None;
        let mut collection = None;
        let mut data = Vec::new();

        for line in s.lines() {
            let line = line.trim_end();
            if let Some(rest) = line.trim().strip_prefix("shape:") {
                let rest = rest.trim().trim_start_matches('[').trim_end_matches(']');
                let parts: Vec<&str> = rest.split(',').map(|p| p.trim()).collect();
                if parts.len() == 2 {
                    rows = parts[0].parse().map_err(bad_matrix)?;
                    cols = parts[1].parse().map_err(bad_matrix)?;
                }
            } else if let Some(rest) = line.trim().strip_prefix("created_at:") {
                created_at = Some(rest.trim().to_string());
            } else if let Some(rest) = line.trim().strip_prefix("collection:") {
                let v = rest.trim();
                if !v.is_empty() {
                    collection = Some(v.to_string());
                }
            } else if let Some(rest) = line.trim().strip_prefix("- [") {
                let rest = rest.trim_end_matches(']');
                for v in rest.split(',') {
                    let v = v.trim();
                    if !v.is_empty() {
                        data.push(v.parse::<f32>().map_err(bad_matrix)?);
                    }
                }
            }
        }

        if cols != REDUCED_DIM {
            return Err(CoreError::CorruptVectorFile {
                path: Path::new("projection_matrix").to_path_buf(),
                reason: format!("expected cols={REDUCED_DIM}, got {cols}"),
            });
        }
        if data.len() != rows * cols {
            return Err(CoreError::CorruptVectorFile {
                path: Path::new("projection_matrix").to_path_buf(),
                reason: format!("expected {} values, got {}", rows * cols, data.len()),
            });
        }

        Ok(Self { rows, cols, data, collection, created_at })
    }

    /// Load from `<collection>/projection_matrix.{text|bin}`. Legacy
    /// binary files are parsed, then immediately rewritten as text
    /// alongside (the binary file itself is left in place).
    pub fn load_or_create(collection_dir: &Path, d: usize, collection_name: &str) -> CoreResult<Self> {
        let text_path = collection_dir.join("projection_matrix.text");
        if text_path.exists() {
            let s = fs::read_to_string(&text_path)?;
            return Self::from_text(&s);
        }

        let bin_path = collection_dir.join("projection_matrix.bin");
        if bin_path.exists() {
            let bytes = fs::read(&bin_path)?;
            let matrix = Self::from_legacy_binary(&bytes)?;
            matrix.write_text(&text_path)?;
            return Ok(matrix);
        }

        let matrix = Self::generate_for(d, Some(collection_name.to_string()));
        matrix.write_text(&text_path)?;
        Ok(matrix)
    }

    pub fn write_text(&self, path: &Path) -> CoreResult<()> {
        let tmp = path.with_extension("text.tmp");
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(self.to_text().as_bytes())?;
            f.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn from_legacy_binary(bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() < 12 || bytes[0..4] != LEGACY_BINARY_MAGIC {
            return Err(CoreError::CorruptVectorFile {
                path: Path::new("projection_matrix.bin").to_path_buf(),
                reason: "bad magic".into(),
            });
        }
        let rows = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        let cols = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        let expected_len = 12 + rows * cols * 4;
        if bytes.len() != expected_len {
            return Err(CoreError::CorruptVectorFile {
                path: Path::new("projection_matrix.bin").to_path_buf(),
                reason: "truncated data".into(),
            });
        }
        let mut data = Vec::with_capacity(rows * cols);
        let mut offset = 12;
        for _ in 0..(rows * cols) {
            data.push(f32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()));
            offset += 4;
        }
        Ok(Self { rows, cols, data, collection: None, created_at: None })
    }
}

fn bad_matrix<E: std::fmt::Display>(e: E) -> CoreError {
    CoreError::CorruptVectorFile {
        path: Path::new("projection_matrix").to_path_buf(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn generate_is_deterministic() {
        let m1 = ProjectionMatrix::generate(8);
        let m2 = ProjectionMatrix::generate(8);
        assert_eq!(m1.data, m2.data);
    }

    #[test]
    fn different_dims_produce_different_matrices() {
        let m1 = ProjectionMatrix::generate(8);
        let m2 = ProjectionMatrix::generate(16);
        assert_ne!(m1.rows, m2.rows);
    }

    #[test]
    fn text_round_trip_preserves_values() {
        let m = ProjectionMatrix::generate_for(4, Some("test-coll".into()));
        let text = m.to_text();
        let back = ProjectionMatrix::from_text(&text).unwrap();
        assert_eq!(m.rows, back.rows);
        assert_eq!(m.cols, back.cols);
        for i in 0..m.data.len() {
            assert!((m.data[i] - back.data[i]).abs() < 1e-6);
        }
    }

    #[test]
    fn load_or_create_persists_to_disk() {
        let dir = TempDir::new().unwrap();
        let m1 = ProjectionMatrix::load_or_create(dir.path(), 8, "coll").unwrap();
        assert!(dir.path().join("projection_matrix.text").exists());
        let m2 = ProjectionMatrix::load_or_create(dir.path(), 8, "coll").unwrap();
        assert_eq!(m1.multiply(&[1.0; 8]), m2.multiply(&[1.0; 8]));
    }

    #[test]
    fn multiply_produces_64_dim_output() {
        let m = ProjectionMatrix::generate(32);
        let v = vec![0.5f32; 32];
        let y = m.multiply(&v);
        assert_eq!(y.len(), 64);
    }
}
