use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gitvec_core::config::Config;
use gitvec_core::error::CoreResult;
use gitvec_core::interop::Embedder;
use gitvec_core::model::PointInput;
use gitvec_core::query::{query, QueryOptions};
use gitvec_core::store::collection::Collection;
use gitvec_core::store::write::upsert_points;
use std::hint::black_box;
use tempfile::TempDir;

const VECTOR_SIZE: usize = 256;

struct FixedEmbedder(Vec<f32>);

impl Embedder for FixedEmbedder {
    fn embed(&self, _text: &str) -> CoreResult<Vec<f32>> {
        Ok(self.0.clone())
    }
}

fn fixed_vector(seed: usize) -> Vec<f32> {
    (0..VECTOR_SIZE).map(|i| ((seed * 31 + i) % 97) as f32 / 97.0).collect()
}

fn seed_collection(point_count: usize) -> (TempDir, Collection) {
    let col_dir = TempDir::new().unwrap();
    let collection =
        Collection::create(col_dir.path().to_path_buf(), "bench", VECTOR_SIZE, "fake", "m", Config::default()).unwrap();

    let points: Vec<PointInput> = (0..point_count)
        .map(|i| PointInput {
            id: format!("p{i}"),
            vector: fixed_vector(i),
            file_path: format!("file_{i:04}.py"),
            start_line: 0,
            end_line: 2,
            start_offset: 0,
            end_offset: 20,
            chunk_hash: format!("h{i}"),
            content: format!("def f_{i}(): return {i}"),
            point_type: None,
            branch: None,
        })
        .collect();
    upsert_points(&collection, None, "m", None, points).unwrap();

    (col_dir, collection)
}

/// End-to-end query latency (embed is a no-op here) against the
/// path-quantized fallback, bounded by the pipeline's own P95 <=300ms
/// end-to-end target.
fn bench_query_end_to_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("query_end_to_end");

    for size in [100, 1_000, 10_000].iter() {
        let (_col_dir, collection) = seed_collection(*size);
        let repo_dir = TempDir::new().unwrap();
        let embedder = FixedEmbedder(fixed_vector(0));
        let opts = QueryOptions { limit: 10, ..QueryOptions::default() };

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                black_box(query(repo_dir.path(), &collection, &embedder, None, "find f_0", &opts).unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_query_end_to_end);
criterion_main!(benches);
