use std::ops::Bound;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use serde_derive::{Deserialize, Serialize};

use baseapp::codec;
use baseapp::storage::cache::CacheStore;
use baseapp::storage::memory::{MemDb, Memory};
use baseapp::storage::multi::{CommitMultiStore, EngineStore};
use baseapp::storage::{Store, StoreKey};

fn generate_pairs(count: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let mut key = vec![0u8; 16];
            let mut value = vec![0u8; 64];
            rng.fill(key.as_mut_slice());
            rng.fill(value.as_mut_slice());
            (key, value)
        })
        .collect()
}

fn bench_cache_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_store");

    let sizes = vec![100, 1000, 10000];

    for size in sizes {
        let pairs = generate_pairs(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("set", size), &pairs, |b, pairs| {
            b.iter(|| {
                let mut cache = CacheStore::over(EngineStore::over(Memory::new("bench")));
                for (key, value) in pairs {
                    cache.set(black_box(key), value.clone());
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("write_through", size), &pairs, |b, pairs| {
            b.iter(|| {
                let mut cache = CacheStore::over(EngineStore::over(Memory::new("bench")));
                for (key, value) in pairs {
                    cache.set(key, value.clone());
                }
                cache.write();
            });
        });

        group.bench_with_input(BenchmarkId::new("merged_scan", size), &pairs, |b, pairs| {
            let mut parent = EngineStore::over(Memory::new("bench"));
            for (key, value) in pairs {
                parent.set(key, value.clone());
            }
            let mut cache = CacheStore::over(parent);
            for (key, _) in pairs.iter().take(size / 2) {
                cache.delete(key);
            }
            b.iter(|| {
                cache.iterator(Bound::Unbounded, Bound::Unbounded).count()
            });
        });
    }

    group.finish();
}

fn bench_multi_store_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_store");

    for writes_per_block in [10usize, 100, 1000] {
        let pairs = generate_pairs(writes_per_block);
        group.throughput(Throughput::Elements(writes_per_block as u64));

        group.bench_with_input(
            BenchmarkId::new("write_and_commit", writes_per_block),
            &pairs,
            |b, pairs| {
                let db = MemDb::new();
                let key = StoreKey::new("bench");
                let mut cms = CommitMultiStore::new(db.clone());
                cms.mount(&key, Memory::open(&db, "bench"));
                cms.load_latest_version().unwrap();

                b.iter(|| {
                    let cache = cms.cache_multi_store();
                    {
                        let store = cache.store(&key);
                        let mut store = store.lock().unwrap();
                        for (k, v) in pairs {
                            store.set(k, v.clone());
                        }
                    }
                    cache.write();
                    black_box(cms.commit());
                });
            },
        );
    }

    group.finish();
}

#[derive(Serialize, Deserialize)]
struct MockTx {
    sender: String,
    amounts: Vec<u64>,
    gas_wanted: u64,
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    for msg_count in [1usize, 10, 100] {
        let tx = MockTx {
            sender: "bench-sender".to_string(),
            amounts: (0..msg_count as u64).collect(),
            gas_wanted: 100_000,
        };
        let encoded = codec::encode(&tx).unwrap();
        group.throughput(Throughput::Bytes(encoded.len() as u64));

        group.bench_with_input(BenchmarkId::new("encode", msg_count), &tx, |b, tx| {
            b.iter(|| codec::encode(black_box(tx)).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("decode", msg_count), &encoded, |b, encoded| {
            b.iter(|| codec::decode::<MockTx>(black_box(encoded)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_cache_store, bench_multi_store_commit, bench_codec);
criterion_main!(benches);
