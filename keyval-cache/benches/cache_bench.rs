use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use futures::StreamExt;
use keyval_cache::{CacheFactory, CacheHandle, CollectionOptions, MemoryEngine};
use std::sync::Arc;

fn open_store(rt: &tokio::runtime::Runtime) -> CacheHandle<String> {
    rt.block_on(async {
        let factory = CacheFactory::default_cache(Arc::new(MemoryEngine::new()));
        factory
            .open::<String>("bench", CollectionOptions::new())
            .await
            .unwrap()
    })
}

fn bench_cache_set(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = open_store(&rt);
    let value = "test_value".to_string();

    c.bench_function("cache_set", |b| {
        b.to_async(&rt).iter(|| async {
            let key = black_box("test_key");
            store.set(key, black_box(&value), None).await.unwrap();
        });
    });
}

fn bench_cache_get(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = open_store(&rt);

    // Pre-populate
    rt.block_on(async {
        store
            .set("test_key", &"test_value".to_string(), None)
            .await
            .unwrap();
    });

    c.bench_function("cache_get", |b| {
        b.to_async(&rt).iter(|| async {
            let key = black_box("test_key");
            store.get(key).await.unwrap();
        });
    });
}

fn bench_cache_entries(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("cache_entries");

    for size in [10, 100, 1000] {
        let store = open_store(&rt);
        rt.block_on(async {
            for i in 0..size {
                store
                    .set(format!("key_{i}"), &format!("value_{i}"), None)
                    .await
                    .unwrap();
            }
        });

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.to_async(&rt).iter(|| async {
                let entries = store.entries().await.unwrap();
                let count = entries.count().await;
                black_box(count);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_cache_set, bench_cache_get, bench_cache_entries);
criterion_main!(benches);
