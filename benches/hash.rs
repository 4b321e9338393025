//! # Hash Index Benchmarks
//!
//! Microbenchmarks for the chained hash index:
//!
//! - `put`: sequential inserts across all heads, including chain growth
//! - `get_hit`: point lookups of present keys
//! - `get_all`: full table scan
//!
//! ## Running
//!
//! ```bash
//! cargo bench --bench hash
//! cargo bench --bench hash -- put     # inserts only
//! ```

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use tempfile::TempDir;

use chainhash::HashTable;

fn bench_put(c: &mut Criterion) {
    c.bench_function("put_sequential_10k", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let index = HashTable::open(dir.path().join("bench.idx"), 8, 16).unwrap();
                (dir, index)
            },
            |(_dir, index)| {
                for key in 0..10_000u64 {
                    index.put(key, key + 1).unwrap();
                }
            },
            BatchSize::PerIteration,
        );
    });
}

fn bench_get(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let index = HashTable::open(dir.path().join("bench.idx"), 8, 16).unwrap();
    for key in 0..10_000u64 {
        index.put(key, key + 1).unwrap();
    }

    c.bench_function("get_hit", |b| {
        let mut key = 0u64;
        b.iter(|| {
            key = (key + 7) % 10_000;
            black_box(index.get(black_box(key), 0, |_, _| true))
        });
    });

    c.bench_function("get_all_10k", |b| {
        b.iter(|| black_box(index.get_all(0)));
    });
}

criterion_group!(benches, bench_put, bench_get);
criterion_main!(benches);
