//! Search latency across effort profiles.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use embedb_core::{EmbedbConfig, Engine, NoopEmbedder, QueryRequest, SearchEffort};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const DIMENSION: usize = 128;
const RECORDS: usize = 5_000;

fn build_engine(dir: &tempfile::TempDir) -> Engine {
    let mut config = EmbedbConfig::default();
    config.storage.data_dir = dir.path().to_path_buf();
    config.hnsw.dimension = DIMENSION;

    let engine = Engine::open(config, Arc::new(NoopEmbedder::new(DIMENSION))).unwrap();
    let mut rng = StdRng::seed_from_u64(42);
    for i in 0..RECORDS {
        let vector: Vec<f32> = (0..DIMENSION).map(|_| rng.gen_range(-1.0..1.0)).collect();
        engine.upsert_vector(i as u64, vector, None).unwrap();
    }
    engine
}

fn bench_search(c: &mut Criterion) {
    let dir = tempfile::TempDir::new().unwrap();
    let engine = build_engine(&dir);
    let mut rng = StdRng::seed_from_u64(7);
    let query: Vec<f32> = (0..DIMENSION).map(|_| rng.gen_range(-1.0..1.0)).collect();

    let mut group = c.benchmark_group("search_top10");
    for (name, effort) in [
        ("fast", SearchEffort::Fast),
        ("balanced", SearchEffort::Balanced),
        ("accurate", SearchEffort::Accurate),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &effort, |b, &effort| {
            b.iter(|| {
                let request = QueryRequest {
                    effort: Some(effort),
                    ..QueryRequest::new(query.clone(), 10)
                };
                engine.search(&request).unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_search);
criterion_main!(benches);
