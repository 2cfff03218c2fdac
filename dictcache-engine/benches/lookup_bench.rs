//! Criterion benchmarks for dictcache lookups: warm numeric hits, warm string hits, collision churn.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use dictcache_core::{AttributeSpec, AttributeType, DictionaryLifetime, DictionaryStructure, SourceRow};
use dictcache_engine::{CacheConfig, CacheDictionary, Defaults};
use dictcache_source::MemorySource;

const BATCH: u64 = 1024;

fn make_structure() -> DictionaryStructure {
    DictionaryStructure::new(vec![
        AttributeSpec::new("name", AttributeType::String, "".into()),
        AttributeSpec::new("score", AttributeType::UInt64, 0u64.into()),
    ])
    .unwrap()
}

fn make_dictionary(size: usize) -> CacheDictionary {
    let structure = make_structure();
    let rows = (0..BATCH).map(|key| SourceRow::new(key, vec![format!("user-{}", key).into(), key.into()]));
    let source = MemorySource::with_rows(structure.clone(), rows).unwrap();
    let config = CacheConfig::new()
        .size(size)
        .lifetime(DictionaryLifetime::never())
        .update_threads(2)
        .rng_seed(7);
    CacheDictionary::new("bench", structure, Arc::new(source), config).unwrap()
}

fn bench_numeric_hits(c: &mut Criterion) {
    let dictionary = make_dictionary(1 << 16);
    let keys: Vec<u64> = (0..BATCH).collect();
    dictionary.get_u64("score", &keys).unwrap();

    let mut g = c.benchmark_group("numeric_hits");
    g.throughput(Throughput::Elements(BATCH));
    g.bench_function("get_u64", |b| {
        b.iter(|| black_box(dictionary.get_u64("score", black_box(&keys))).unwrap());
    });
    g.finish();
}

fn bench_string_hits(c: &mut Criterion) {
    let dictionary = make_dictionary(1 << 16);
    let keys: Vec<u64> = (0..BATCH).collect();
    dictionary.get_strings("name", &keys, Defaults::Attribute).unwrap();

    let mut g = c.benchmark_group("string_hits");
    g.throughput(Throughput::Elements(BATCH));
    g.bench_function("get_strings", |b| {
        b.iter(|| black_box(dictionary.get_strings("name", black_box(&keys), Defaults::Attribute)).unwrap());
    });
    g.finish();
}

fn bench_collision_churn(c: &mut Criterion) {
    // Far fewer slots than keys: most lookups evict and refill.
    let dictionary = make_dictionary(64);
    let keys: Vec<u64> = (0..BATCH).collect();

    let mut g = c.benchmark_group("collision_churn");
    g.throughput(Throughput::Elements(BATCH));
    g.sample_size(20);
    g.bench_function("get_u64", |b| {
        b.iter(|| black_box(dictionary.get_u64("score", black_box(&keys))).unwrap());
    });
    g.finish();
}

criterion_group!(benches, bench_numeric_hits, bench_string_hits, bench_collision_churn);
criterion_main!(benches);
