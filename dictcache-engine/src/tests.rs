//! End-to-end lookups against an in-memory source.

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use proptest::prelude::*;

use dictcache_core::{
    AttributeSpec, AttributeType, AttributeValue, DictError, DictionaryLifetime, DictionarySource, DictionaryStructure,
};
use dictcache_source::MemorySource;

use crate::{int_hash64, CacheConfig, CacheDictionary, CellState, Defaults, FindStatus};

fn make_structure() -> DictionaryStructure {
    DictionaryStructure::new(vec![
        AttributeSpec::new("name", AttributeType::String, "default".into()),
        AttributeSpec::new("age", AttributeType::UInt64, 0u64.into()),
        AttributeSpec::new("balance", AttributeType::Int64, (-1i64).into()),
    ])
    .unwrap()
}

fn make_source(rows: &[(u64, &str, u64)]) -> Arc<MemorySource> {
    let source = MemorySource::new(make_structure());
    for &(key, name, age) in rows {
        source
            .insert(key, vec![name.into(), age.into(), (age as i64 * 10).into()])
            .unwrap();
    }
    Arc::new(source)
}

fn make_config() -> CacheConfig {
    CacheConfig::new()
        .size(64)
        .lifetime(DictionaryLifetime::never())
        .update_threads(1)
        .query_wait_timeout(Duration::from_secs(5))
        .rng_seed(42)
}

fn make_dictionary(source: &Arc<MemorySource>, config: CacheConfig) -> CacheDictionary {
    let source: Arc<dyn DictionarySource> = source.clone();
    CacheDictionary::new("test", make_structure(), source, config).unwrap()
}

/// First `count` non-zero keys that land in pairwise distinct slots.
fn distinct_slot_keys(count: usize, capacity: usize) -> Vec<u64> {
    let mut used = HashSet::new();
    (1u64..)
        .filter(|&key| used.insert(int_hash64(key) as usize & (capacity - 1)))
        .take(count)
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOOKUPS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_duplicate_and_absent_keys() {
    let source = make_source(&[(5, "x", 1)]);
    let dictionary = make_dictionary(&source, make_config().size(4));

    let names = dictionary.get_strings("name", &[5, 5, 9], Defaults::Attribute).unwrap();
    assert_eq!(names.to_vec(), vec!["x", "x", "default"]);

    // Duplicates are requested from the source once.
    assert_eq!(source.load_count(), 1);
    assert_eq!(source.keys_requested(), 2);
}

#[test]
fn test_numeric_lookups() {
    let k = distinct_slot_keys(3, 64);
    let source = make_source(&[(k[0], "a", 30), (k[1], "b", 40)]);
    let dictionary = make_dictionary(&source, make_config());

    assert_eq!(dictionary.get_u64("age", &[k[1], k[0], k[2]]).unwrap(), vec![40, 30, 0]);
    assert_eq!(dictionary.get_i64("balance", &[k[0], k[2]]).unwrap(), vec![300, -1]);
    assert_eq!(source.load_count(), 1);

    // Every key is cached, absent ones included.
    assert_eq!(dictionary.get_u64("age", &[k[2], k[1], k[0]]).unwrap(), vec![0, 40, 30]);
    assert_eq!(source.load_count(), 1);
}

#[test]
fn test_float_attribute() {
    let structure = DictionaryStructure::new(vec![AttributeSpec::new(
        "ratio",
        AttributeType::Float64,
        AttributeValue::Float64(f64::NAN),
    )])
    .unwrap();
    let source = MemorySource::new(structure.clone());
    source.insert(1, vec![0.25f64.into()]).unwrap();

    let dictionary = CacheDictionary::new("ratios", structure, Arc::new(source), make_config()).unwrap();
    let values = dictionary.get_f64("ratio", &[1, 2]).unwrap();
    assert_eq!(values[0], 0.25);
    assert!(values[1].is_nan());
}

#[test]
fn test_cached_values_served_without_source() {
    let source = make_source(&[(1, "a", 30)]);
    let dictionary = make_dictionary(&source, make_config());

    assert_eq!(dictionary.get_strings("name", &[1], Defaults::Attribute).unwrap().to_vec(), vec!["a"]);
    source.set_failing(true);
    assert_eq!(dictionary.get_strings("name", &[1], Defaults::Attribute).unwrap().to_vec(), vec!["a"]);
    assert_eq!(dictionary.profile().keys_hit, 1);
}

#[test]
fn test_per_row_and_constant_defaults() {
    let source = make_source(&[(1, "a", 30)]);
    let dictionary = make_dictionary(&source, make_config());

    let per_row = [100u64, 200];
    assert_eq!(dictionary.get("age", &[1, 2], Defaults::PerRow(&per_row)).unwrap(), vec![30, 200]);
    // Cached as absent: the caller's default still applies.
    assert_eq!(dictionary.get("age", &[1, 2], Defaults::PerRow(&per_row)).unwrap(), vec![30, 200]);
    assert_eq!(dictionary.get("age", &[2], Defaults::Constant(7u64)).unwrap(), vec![7]);

    let names = dictionary
        .get_strings("name", &[2, 1], Defaults::Constant("zz".to_string()))
        .unwrap();
    assert_eq!(names.to_vec(), vec!["zz", "a"]);

    let err = dictionary.get("age", &[1, 2, 3], Defaults::PerRow(&per_row)).unwrap_err();
    assert!(matches!(err, DictError::InvalidArgument(_)));
}

#[test]
fn test_type_mismatch_and_unknown_attribute() {
    let source = make_source(&[]);
    let dictionary = make_dictionary(&source, make_config());

    let err = dictionary.get_u64("name", &[1]).unwrap_err();
    assert!(matches!(
        err,
        DictError::TypeMismatch {
            expected: AttributeType::String,
            actual: AttributeType::UInt64,
            ..
        }
    ));
    assert!(matches!(dictionary.get_i64("age", &[1]), Err(DictError::TypeMismatch { .. })));
    assert!(matches!(
        dictionary.get_strings("age", &[1], Defaults::Attribute),
        Err(DictError::TypeMismatch { .. })
    ));
    assert!(matches!(dictionary.get_u64("missing", &[1]), Err(DictError::UnknownAttribute(_))));
    assert_eq!(source.load_count(), 0);
}

#[test]
fn test_has() {
    let k = distinct_slot_keys(2, 64);
    let source = make_source(&[(k[0], "a", 30), (0, "zero", 1)]);
    let dictionary = make_dictionary(&source, make_config());

    assert_eq!(dictionary.has(&[k[0], k[1], k[0], 0]).unwrap(), vec![true, false, true, true]);
    assert_eq!(dictionary.has(&[k[1], k[0]]).unwrap(), vec![false, true]);
    assert_eq!(source.load_count(), 1);
}

#[test]
fn test_empty_batch() {
    let source = make_source(&[]);
    let dictionary = make_dictionary(&source, make_config());

    assert!(dictionary.get_u64("age", &[]).unwrap().is_empty());
    assert!(dictionary.get_strings("name", &[], Defaults::Attribute).unwrap().is_empty());
    assert_eq!(source.load_count(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// CELLS & OCCUPANCY
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_absent_key_counted_once() {
    let source = make_source(&[]);
    let dictionary = make_dictionary(&source, make_config());

    dictionary.get_u64("age", &[9]).unwrap();
    assert_eq!(dictionary.element_count(), 1);

    let cell = dictionary.inspect(9).unwrap();
    assert_eq!(cell.state, CellState::DefaultMarked);
    assert_eq!(cell.expires_at, None);

    dictionary.get_u64("age", &[9]).unwrap();
    assert_eq!(dictionary.element_count(), 1);
    assert_eq!(source.load_count(), 1);
}

#[test]
fn test_zero_key_uses_reserved_slot() {
    let source = make_source(&[(0, "zero", 3)]);
    let dictionary = make_dictionary(&source, make_config().size(4));

    assert_eq!(dictionary.locate(0).status, FindStatus::NotFound);
    assert_eq!(dictionary.get_u64("age", &[0]).unwrap(), vec![3]);

    let result = dictionary.locate(0);
    assert_eq!(result.slot, dictionary.capacity());
    assert_eq!(result.status, FindStatus::Valid);
    assert_eq!(dictionary.element_count(), 0);
}

#[test]
fn test_collision_evicts_previous_key() {
    let source = make_source(&[(1, "a", 10), (2, "b", 20)]);
    let dictionary = make_dictionary(&source, make_config().size(1));

    assert_eq!(dictionary.get_u64("age", &[1]).unwrap(), vec![10]);
    assert_eq!(dictionary.get_u64("age", &[2]).unwrap(), vec![20]);

    assert_eq!(dictionary.locate(1).status, FindStatus::NotFound);
    assert_eq!(dictionary.locate(2).status, FindStatus::Valid);
    assert!(dictionary.inspect(1).is_none());
    assert_eq!(dictionary.element_count(), 1);
    assert_eq!(dictionary.load_factor(), 1.0);
}

#[test]
fn test_colliding_keys_in_one_batch() {
    let source = make_source(&[(1, "a", 10), (2, "b", 20), (3, "c", 30)]);
    let dictionary = make_dictionary(&source, make_config().size(1));

    // Every key shares the single slot; answers still come from the refill.
    assert_eq!(dictionary.get_u64("age", &[1, 2, 3, 4]).unwrap(), vec![10, 20, 30, 0]);
    let names = dictionary.get_strings("name", &[3, 1], Defaults::Attribute).unwrap();
    assert_eq!(names.to_vec(), vec!["c", "a"]);
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPIRATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_expired_keys_refreshed_synchronously() {
    let source = make_source(&[(1, "a", 30)]);
    let lifetime = DictionaryLifetime::new(Duration::from_millis(30), Duration::from_millis(30));
    let dictionary = make_dictionary(&source, make_config().lifetime(lifetime));

    assert_eq!(dictionary.get_strings("name", &[1], Defaults::Attribute).unwrap().to_vec(), vec!["a"]);
    source.insert(1, vec!["b".into(), 31u64.into(), 0i64.into()]).unwrap();

    thread::sleep(Duration::from_millis(60));
    assert_eq!(dictionary.locate(1).status, FindStatus::Outdated);
    assert_eq!(dictionary.get_strings("name", &[1], Defaults::Attribute).unwrap().to_vec(), vec!["b"]);
    assert_eq!(source.load_count(), 2);
    assert_eq!(dictionary.profile().keys_expired, 1);
}

#[test]
fn test_stale_values_served_while_refreshing() {
    let source = make_source(&[(1, "a", 30)]);
    let lifetime = DictionaryLifetime::new(Duration::from_millis(50), Duration::from_millis(50));
    let config = make_config().lifetime(lifetime).allow_read_expired_keys(true);
    let dictionary = make_dictionary(&source, config);

    assert_eq!(dictionary.get_strings("name", &[1], Defaults::Attribute).unwrap().to_vec(), vec!["a"]);
    source.insert(1, vec!["b".into(), 31u64.into(), 0i64.into()]).unwrap();
    thread::sleep(Duration::from_millis(80));

    // Stale value comes back at once; the refresh runs in the background.
    assert_eq!(dictionary.get_strings("name", &[1], Defaults::Attribute).unwrap().to_vec(), vec!["a"]);
    assert!(dictionary.profile().reads_rotted_values >= 1);

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let names = dictionary.get_strings("name", &[1], Defaults::Attribute).unwrap();
        if names.get(0) == Some("b") {
            break;
        }
        assert!(Instant::now() < deadline, "background refresh never landed");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_stale_serving_still_waits_for_unknown_keys() {
    let source = make_source(&[(1, "a", 30), (2, "b", 40)]);
    let config = make_config().allow_read_expired_keys(true);
    let dictionary = make_dictionary(&source, config);

    assert_eq!(dictionary.get_u64("age", &[1, 2]).unwrap(), vec![30, 40]);
}

#[test]
fn test_lifetime_jitter_within_window() {
    let source = make_source(&[(1, "a", 30)]);
    let lifetime = DictionaryLifetime::new(Duration::from_secs(100), Duration::from_secs(200));
    let dictionary = make_dictionary(&source, make_config().lifetime(lifetime));

    let before = Instant::now();
    dictionary.get_u64("age", &[1]).unwrap();
    let after = Instant::now();

    let expires_at = dictionary.inspect(1).unwrap().expires_at.unwrap();
    assert!(expires_at >= before + Duration::from_secs(100));
    assert!(expires_at <= after + Duration::from_secs(200));
}

#[test]
fn test_huge_lifetime_binds_without_overflow() {
    let source = make_source(&[(1, "a", 30)]);
    let lifetime = DictionaryLifetime { min_ms: u64::MAX - 1, max_ms: u64::MAX };
    let dictionary = make_dictionary(&source, make_config().lifetime(lifetime));

    let now = Instant::now();
    assert!(dictionary.inner().draw_expiration(now).map_or(true, |at| at > now));

    assert_eq!(dictionary.get_u64("age", &[1]).unwrap(), vec![30]);
    assert_eq!(dictionary.get_u64("age", &[1]).unwrap(), vec![30]);
    assert_eq!(source.load_count(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_expiration_drawn_from_window(min_ms in 1u64..10_000, spread_ms in 0u64..10_000, seed in any::<u64>()) {
        let source = make_source(&[]);
        let lifetime = DictionaryLifetime::new(
            Duration::from_millis(min_ms),
            Duration::from_millis(min_ms + spread_ms),
        );
        let config = make_config().lifetime(lifetime).update_threads(0).rng_seed(seed);
        let dictionary = make_dictionary(&source, config);

        let now = Instant::now();
        let expires_at = dictionary.inner().draw_expiration(now).unwrap();
        prop_assert!(expires_at >= now + Duration::from_millis(min_ms));
        prop_assert!(expires_at <= now + Duration::from_millis(min_ms + spread_ms));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REFILL FAILURES & BACKPRESSURE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_source_failure_binds_defaults() {
    let source = make_source(&[(1, "a", 30)]);
    let dictionary = make_dictionary(&source, make_config());

    source.set_failing(true);
    for _ in 0..3 {
        assert_eq!(dictionary.get_u64("age", &[1]).unwrap(), vec![0]);
    }

    // The failure is cached as absent, so the source is asked once.
    assert_eq!(dictionary.inspect(1).unwrap().state, CellState::DefaultMarked);
    assert_eq!(source.load_count(), 1);
    assert_eq!(dictionary.element_count(), 1);
    assert_eq!(dictionary.profile().keys_requested_miss, 1);

    source.set_failing(false);
    assert_eq!(dictionary.get_u64("age", &[1]).unwrap(), vec![0]);
    assert_eq!(source.load_count(), 1);
}

#[test]
fn test_failed_refresh_replaces_expired_value() {
    let source = make_source(&[(1, "a", 30)]);
    let lifetime = DictionaryLifetime::new(Duration::from_millis(30), Duration::from_millis(30));
    let dictionary = make_dictionary(&source, make_config().lifetime(lifetime));

    assert_eq!(dictionary.get_u64("age", &[1]).unwrap(), vec![30]);
    thread::sleep(Duration::from_millis(60));

    source.set_failing(true);
    assert_eq!(dictionary.get_u64("age", &[1]).unwrap(), vec![0]);
    assert_eq!(dictionary.inspect(1).unwrap().state, CellState::DefaultMarked);
    assert_eq!(source.load_count(), 2);
}

#[test]
fn test_failed_background_refresh_stops_stale_serving() {
    let source = make_source(&[(1, "a", 30)]);
    let lifetime = DictionaryLifetime::new(Duration::from_millis(30), Duration::from_millis(30));
    let config = make_config().lifetime(lifetime).allow_read_expired_keys(true);
    let dictionary = make_dictionary(&source, config);

    assert_eq!(dictionary.get_u64("age", &[1]).unwrap(), vec![30]);
    thread::sleep(Duration::from_millis(60));
    source.set_failing(true);

    // First read serves the stale value and queues the refresh.
    assert_eq!(dictionary.get_u64("age", &[1]).unwrap(), vec![30]);

    let deadline = Instant::now() + Duration::from_secs(5);
    while dictionary.inspect(1).map(|cell| cell.state) != Some(CellState::DefaultMarked) {
        assert!(Instant::now() < deadline, "failed refresh never bound the key as absent");
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(dictionary.get_u64("age", &[1]).unwrap(), vec![0]);
}

#[test]
fn test_refill_timeout() {
    let source = make_source(&[(1, "a", 30)]);
    let config = make_config()
        .update_threads(0)
        .query_wait_timeout(Duration::from_millis(50));
    let dictionary = make_dictionary(&source, config);

    let err = dictionary.get_u64("age", &[1]).unwrap_err();
    assert!(matches!(err, DictError::RefillTimedOut { keys: 1, timeout_ms: 50 }));
    assert!(err.is_recoverable());

    // The abandoned unit still lands when drained.
    assert_eq!(dictionary.run_pending_updates(), 1);
    assert_eq!(dictionary.locate(1).status, FindStatus::Valid);
}

#[test]
fn test_full_queue_rejects_lookup() {
    let source = make_source(&[(1, "a", 30), (2, "b", 40)]);
    let config = CacheConfig::new()
        .size(64)
        .lifetime(DictionaryLifetime::never())
        .max_update_queue_size(1)
        .update_threads(0)
        .query_wait_timeout(Duration::from_secs(10));
    let dictionary = make_dictionary(&source, config);

    thread::scope(|scope| {
        let waiting = scope.spawn(|| dictionary.get_u64("age", &[1]));

        let deadline = Instant::now() + Duration::from_secs(5);
        while dictionary.update_queue_len() < 1 {
            assert!(Instant::now() < deadline, "first lookup never queued");
            thread::sleep(Duration::from_millis(1));
        }

        let err = dictionary.get_u64("age", &[2]).unwrap_err();
        assert!(matches!(err, DictError::QueueFull { capacity: 1, len: 1 }));

        assert_eq!(dictionary.run_pending_updates(), 1);
        assert_eq!(waiting.join().unwrap().unwrap(), vec![30]);
    });

    assert_eq!(source.load_count(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONCURRENCY & STATS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_concurrent_batches() {
    let rows: Vec<(u64, &str, u64)> = (0..100u64).filter(|k| k % 2 == 0).map(|k| (k, "even", k)).collect();
    let source = make_source(&rows);
    let dictionary = make_dictionary(&source, make_config().size(1024).update_threads(4));
    let keys: Vec<u64> = (0..100).collect();

    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..10 {
                    let ages = dictionary.get_u64("age", &keys).unwrap();
                    for (key, age) in keys.iter().zip(ages) {
                        assert_eq!(age, if key % 2 == 0 { *key } else { 0 });
                    }
                }
            });
        }
    });

    assert_eq!(dictionary.query_count(), 8 * 10 * 100);
    assert!(dictionary.hit_rate() > 0.0);
}

#[test]
fn test_stats() {
    let source = make_source(&[(1, "a", 30)]);
    let dictionary = make_dictionary(&source, make_config());

    dictionary.get_u64("age", &[1]).unwrap();
    dictionary.get_u64("age", &[1]).unwrap();

    let stats = dictionary.stats();
    assert_eq!(stats.name, "test");
    assert_eq!(stats.capacity, 64);
    assert_eq!(stats.element_count, 1);
    assert_eq!(stats.query_count, 2);
    assert_eq!(stats.hit_rate, 0.5);
    assert_eq!(stats.profile.keys_requested, 1);
    assert_eq!(stats.profile.keys_requested_found, 1);
    assert_eq!(stats.profile.source_requests, 1);
    assert_eq!(stats.profile.in_flight_requests, 0);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["query_count"], 2);
}

#[test]
fn test_invalid_config_rejected() {
    let source = make_source(&[]);
    let result = CacheDictionary::new("bad", make_structure(), source, CacheConfig::new().size(0));
    assert!(matches!(result, Err(DictError::ConfigError(_))));
}
