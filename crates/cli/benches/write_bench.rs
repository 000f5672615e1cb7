use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use engine::{Engine, EngineOptions, OpType};
use tempfile::tempdir;

const N_WRITES: usize = 200;
const DIMENSION: u32 = 384;

fn open(dir: &tempfile::TempDir, batching: bool) -> Engine {
    let mut options = EngineOptions::new(dir.path().join("bench"));
    options.dimension = DIMENSION;
    options.batching = batching;
    Engine::open(options).unwrap()
}

fn embedding(seed: usize) -> Vec<f32> {
    (0..DIMENSION).map(|i| (seed + i as usize) as f32).collect()
}

fn direct_write_benchmark(c: &mut Criterion) {
    c.bench_function("direct_insert_200", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let engine = open(&dir, false);
                (dir, engine)
            },
            |(_dir, engine)| {
                for i in 0..N_WRITES {
                    engine
                        .write_record(&format!("key{i}"), &embedding(i), OpType::Insert)
                        .unwrap();
                }
            },
            BatchSize::PerIteration,
        );
    });
}

fn batched_write_benchmark(c: &mut Criterion) {
    c.bench_function("batched_insert_200", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let engine = open(&dir, true);
                (dir, engine)
            },
            |(_dir, engine)| {
                for i in 0..N_WRITES {
                    engine
                        .write_record(&format!("key{i}"), &embedding(i), OpType::Insert)
                        .unwrap();
                }
                engine.flush().unwrap();
            },
            BatchSize::PerIteration,
        );
    });
}

fn read_benchmark(c: &mut Criterion) {
    c.bench_function("read_record_200", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let engine = open(&dir, false);
                for i in 0..N_WRITES {
                    engine
                        .write_record(&format!("key{i}"), &embedding(i), OpType::Insert)
                        .unwrap();
                }
                (dir, engine)
            },
            |(_dir, engine)| {
                for i in 0..N_WRITES {
                    let record = engine.read_record(&format!("key{i}")).unwrap();
                    assert!(record.is_some());
                }
            },
            BatchSize::LargeInput,
        );
    });
}

fn search_benchmark(c: &mut Criterion) {
    c.bench_function("search_top10_of_200", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let engine = open(&dir, false);
                for i in 0..N_WRITES {
                    engine
                        .write_record(&format!("key{i}"), &embedding(i), OpType::Insert)
                        .unwrap();
                }
                (dir, engine)
            },
            |(_dir, engine)| {
                let results = engine.search(&embedding(42), 10).unwrap();
                assert_eq!(results.len(), 10);
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    direct_write_benchmark,
    batched_write_benchmark,
    read_benchmark,
    search_benchmark
);
criterion_main!(benches);
