//! Concrete `AnnIndex` backed by the `hnsw` crate (strategy A of the read
//! path). The rebuilder writes a flat `bincode`-encoded `(label, vector)`
//! snapshot to `hnsw_index.bin`; this module mmaps that snapshot and
//! builds the in-memory graph from it, since `hnsw`'s own graph isn't
//! `serde`-shaped for direct on-disk persistence.

use std::fs::File;
use std::path::{Path, PathBuf};

use hnsw::{Hnsw, Searcher};
use memmap2::Mmap;
use rand_chacha::ChaCha20Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use space::{Metric, Neighbor};

use crate::error::{CoreError, CoreResult};
use crate::store::collection::Collection;
use crate::store::read::{cosine_similarity, AnnIndex};
use crate::store::write::scan_vector_files;

/// HNSW neighbor-list sizes for the graph's upper and ground layers.
const M: usize = 12;
const M0: usize = 24;
/// Scales a `[0, 2]` cosine distance into an integer `Metric::Unit`; `hnsw`
/// requires a totally-ordered distance, which `f32` isn't (NaN).
const DISTANCE_SCALE: f32 = 1_000_000.0;

struct CosineMetric;

impl Metric<Vec<f32>> for CosineMetric {
    type Unit = u64;

    fn distance(&self, a: &Vec<f32>, b: &Vec<f32>) -> u64 {
        let dist = (1.0 - cosine_similarity(a, b)).max(0.0);
        (dist * DISTANCE_SCALE) as u64
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    points: Vec<(u32, Vec<f32>)>,
}

pub struct HnswAnnIndex {
    hnsw: Hnsw<CosineMetric, Vec<f32>, ChaCha20Rng, M, M0>,
    labels: Vec<u32>,
}

impl HnswAnnIndex {
    fn from_points(points: Vec<(u32, Vec<f32>)>) -> Self {
        let mut searcher = Searcher::default();
        let mut hnsw: Hnsw<CosineMetric, Vec<f32>, ChaCha20Rng, M, M0> =
            Hnsw::new_with_rng(CosineMetric, ChaCha20Rng::seed_from_u64(0));
        let mut labels = Vec::with_capacity(points.len());

        for (label, vector) in points {
            hnsw.insert(vector, &mut searcher);
            labels.push(label);
        }

        Self { hnsw, labels }
    }

    /// Loads a snapshot written by `build_artifact` and builds the graph
    /// from it. Mmaps the file so the read never copies the serialized
    /// bytes before decoding.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let snapshot: Snapshot =
            bincode::deserialize(&mmap).map_err(|e| CoreError::HnswArtifact(format!("corrupt snapshot: {e}")))?;
        Ok(Self::from_points(snapshot.points))
    }
}

impl AnnIndex for HnswAnnIndex {
    fn search(&self, query: &[f32], ef_search: usize, limit: usize) -> Vec<(u32, f32)> {
        if self.labels.is_empty() {
            return Vec::new();
        }
        let mut searcher = Searcher::default();
        let want = ef_search.max(limit).max(1);
        let mut neighbors = vec![Neighbor { index: !0, distance: !0 }; want];
        self.hnsw.nearest(&query.to_vec(), ef_search.max(1), &mut searcher, &mut neighbors);

        neighbors
            .into_iter()
            .filter(|n| n.index != !0 && n.index < self.labels.len())
            .filter_map(|n| {
                let label = self.labels[n.index];
                let score = 1.0 - (n.distance as f32 / DISTANCE_SCALE);
                Some((label, score))
            })
            .take(limit)
            .collect()
    }
}

/// `builder_fn` for `rebuild::rebuild_in_background(ArtifactKind::Hnsw,
/// ...)`. Scans every vector record, pairs it with its dense id-index
/// label, and writes the `(label, vector)` snapshot `HnswAnnIndex::load`
/// rebuilds the graph from.
pub fn build_artifact(collection: &Collection) -> CoreResult<Vec<(PathBuf, PathBuf)>> {
    let id_index = collection.id_index.read().unwrap();
    let points: Vec<(u32, Vec<f32>)> = scan_vector_files(collection)
        .into_iter()
        .filter_map(|(_, record)| {
            let label = id_index.get(&record.id)?;
            Some((label, record.vector))
        })
        .collect();
    drop(id_index);

    if points.is_empty() {
        return Ok(Vec::new());
    }

    let snapshot = Snapshot { points };
    let bytes = bincode::serialize(&snapshot).map_err(|e| CoreError::HnswArtifact(format!("encode failed: {e}")))?;

    let final_path = collection.hnsw_path();
    let tmp_path = final_path.with_extension("bin.tmp");
    std::fs::write(&tmp_path, &bytes)?;

    Ok(vec![(tmp_path, final_path)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model::PointInput;
    use crate::rebuild::{rebuild_in_background, ArtifactKind};
    use crate::store::write::upsert_points;
    use tempfile::TempDir;

    fn seed_collection(dir: &Path) -> Collection {
        let collection = Collection::create(dir.to_path_buf(), "c", 4, "fake", "m", Config::default()).unwrap();
        let points: Vec<PointInput> = (0..20)
            .map(|i| PointInput {
                id: format!("p{i}"),
                vector: vec![i as f32, 0.0, 0.0, 0.0],
                file_path: format!("f{i}.py"),
                start_line: 0,
                end_line: 1,
                start_offset: 0,
                end_offset: 1,
                chunk_hash: format!("h{i}"),
                content: format!("x = {i}"),
                point_type: None,
                branch: None,
            })
            .collect();
        upsert_points(&collection, None, "m", None, points).unwrap();
        collection
    }

    #[test]
    fn build_then_load_finds_nearest_neighbor() {
        let dir = TempDir::new().unwrap();
        let collection = seed_collection(dir.path());

        rebuild_in_background(&collection, ArtifactKind::Hnsw, build_artifact, |_| {}).unwrap();
        assert!(collection.hnsw_path().exists());

        let index = HnswAnnIndex::load(&collection.hnsw_path()).unwrap();
        let hits = index.search(&[5.0, 0.0, 0.0, 0.0], 24, 3);
        assert!(!hits.is_empty());

        let id_index = collection.id_index.read().unwrap();
        let top_id = id_index.label_to_id(hits[0].0).unwrap();
        assert_eq!(top_id, "p5");
    }

    #[test]
    fn empty_collection_produces_no_artifact() {
        let dir = TempDir::new().unwrap();
        let collection = Collection::create(dir.path().to_path_buf(), "c", 4, "fake", "m", Config::default()).unwrap();
        rebuild_in_background(&collection, ArtifactKind::Hnsw, build_artifact, |_| {}).unwrap();
        assert!(!collection.hnsw_path().exists());
    }
}
