use anyhow::Result;
use gitvec_core::config::Config;
use gitvec_core::model::PointInput;
use gitvec_core::rebuild::{rebuild_in_background, ArtifactKind};
use gitvec_core::store::collection::Collection;
use gitvec_core::store::read::{search, SearchOptions};
use gitvec_core::store::write::upsert_points;
use gitvec_core::store::{build_hnsw_artifact, HnswAnnIndex};
use tempfile::TempDir;

fn open_test_collection(dir: &std::path::Path) -> Result<Collection> {
    Ok(Collection::create(dir.to_path_buf(), "col", 4, "fake", "fake-model", Config::default())?)
}

fn point(id: &str, vector: Vec<f32>, file_path: &str) -> PointInput {
    PointInput {
        id: id.to_string(),
        vector,
        file_path: file_path.to_string(),
        start_line: 1,
        end_line: 3,
        start_offset: 0,
        end_offset: 30,
        chunk_hash: format!("h-{id}"),
        content: format!("content for {id}"),
        point_type: Some("content".to_string()),
        branch: Some("main".to_string()),
    }
}

// ==================== Upsert → rebuild → search ====================

#[test]
fn round_trip_finds_nearest_neighbor_via_hnsw() -> Result<()> {
    let dir = TempDir::new()?;
    let collection = open_test_collection(dir.path())?;

    let points: Vec<PointInput> = (0..12)
        .map(|i| point(&format!("p{i}"), vec![i as f32, 0.0, 0.0, 0.0], &format!("f{i}.py")))
        .collect();
    upsert_points(&collection, None, "fake-model", None, points)?;

    rebuild_in_background(&collection, ArtifactKind::Hnsw, build_hnsw_artifact, |_| {})?;
    assert!(collection.hnsw_path().exists());

    let index = HnswAnnIndex::load(&collection.hnsw_path())?;
    let opts = SearchOptions { limit: 3, ..Default::default() };
    let hits = search(&collection, &[7.0, 0.0, 0.0, 0.0], &opts, Some(&index))?;

    assert!(!hits.is_empty());
    assert_eq!(hits[0].record.id, "p7");
    Ok(())
}

#[test]
fn round_trip_survives_upsert_after_rebuild() -> Result<()> {
    let dir = TempDir::new()?;
    let collection = open_test_collection(dir.path())?;

    upsert_points(&collection, None, "fake-model", None, vec![point("a", vec![1.0, 0.0, 0.0, 0.0], "a.py")])?;
    rebuild_in_background(&collection, ArtifactKind::Hnsw, build_hnsw_artifact, |_| {})?;

    // A point added after the rebuild is invisible to the stale HNSW
    // snapshot but still found by the fallback path.
    upsert_points(&collection, None, "fake-model", None, vec![point("b", vec![-1.0, 0.0, 0.0, 0.0], "b.py")])?;

    let opts = SearchOptions { limit: 10, force_fallback: true, ..Default::default() };
    let hits = search(&collection, &[-1.0, 0.0, 0.0, 0.0], &opts, None)?;
    assert!(hits.iter().any(|h| h.record.id == "b"));
    Ok(())
}

#[test]
fn empty_collection_search_returns_no_hits() -> Result<()> {
    let dir = TempDir::new()?;
    let collection = open_test_collection(dir.path())?;

    rebuild_in_background(&collection, ArtifactKind::Hnsw, build_hnsw_artifact, |_| {})?;
    assert!(!collection.hnsw_path().exists());

    let opts = SearchOptions::default();
    let hits = search(&collection, &[0.0, 0.0, 0.0, 0.0], &opts, None)?;
    assert!(hits.is_empty());
    Ok(())
}
