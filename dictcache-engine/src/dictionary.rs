//! The cache dictionary: batched lookups over the cell table with
//! synchronous and stale-serving refill.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use dictcache_core::{
    AttributeType, AttributeValue, DictError, DictionarySource, DictionaryStructure, Key, Result,
};

use crate::attributes::{AttributeColumn, AttributeStore, Column, NumericAttribute};
use crate::cells::{Cell, CellTable, FindResult, FindStatus, SlotRead};
use crate::classify::{classify, Classification};
use crate::config::CacheConfig;
use crate::merge::MergeEvent;
use crate::output::{Defaults, StringColumn};
use crate::profile::{ProfileCounters, ProfileEvent, ProfileSnapshot};
use crate::queue::{UnitOutcome, UpdateQueue, UpdateUnit};
use crate::worker::UpdateWorkers;

/// Cell table and attribute columns, guarded together by the dictionary lock.
pub(crate) struct Storage {
    pub(crate) cells: CellTable,
    pub(crate) attributes: AttributeStore,
}

impl Storage {
    fn string_column(&self, index: usize) -> Result<&Column<String>> {
        self.attributes
            .column(index)
            .and_then(AttributeColumn::as_strings)
            .ok_or_else(|| DictError::InvalidArgument(format!("attribute #{} is not a string column", index)))
    }
}

/// State shared between the dictionary handle and its fetch workers.
pub(crate) struct Inner {
    pub(crate) name: String,
    pub(crate) structure: DictionaryStructure,
    pub(crate) config: CacheConfig,
    pub(crate) source: Arc<dyn DictionarySource>,
    pub(crate) queue: UpdateQueue,
    pub(crate) profile: ProfileCounters,
    pub(crate) element_count: AtomicU64,
    storage: RwLock<Storage>,
    rng: Mutex<ChaCha8Rng>,
    query_count: AtomicU64,
    hit_count: AtomicU64,
    capacity: usize,
}

impl Inner {
    pub(crate) fn read_storage(&self) -> RwLockReadGuard<'_, Storage> {
        let start = Instant::now();
        let guard = self.storage.read();
        self.profile.record_since(ProfileEvent::LockReadNs, start);
        guard
    }

    pub(crate) fn write_storage(&self) -> RwLockWriteGuard<'_, Storage> {
        let start = Instant::now();
        let guard = self.storage.write();
        self.profile.record_since(ProfileEvent::LockWriteNs, start);
        guard
    }

    /// Expiration for a cell bound at `now`: uniform in the lifetime window,
    /// or never when no window is configured or the deadline is unrepresentable.
    pub(crate) fn draw_expiration(&self, now: Instant) -> Option<Instant> {
        let lifetime = self.config.lifetime;
        if !lifetime.is_expiring() {
            return None;
        }
        let ttl = self.rng.lock().gen_range(lifetime.min()..=lifetime.max());
        now.checked_add(ttl)
    }

    fn attribute_index(&self, name: &str, requested: AttributeType) -> Result<usize> {
        let index = self.structure.index_of(name)?;
        let stored = self.structure.attributes()[index].attr_type;
        if stored != requested {
            return Err(DictError::TypeMismatch {
                attribute: name.to_owned(),
                expected: stored,
                actual: requested,
            });
        }
        Ok(index)
    }

    fn null_value(&self, index: usize) -> &AttributeValue {
        &self.structure.attributes()[index].null_value
    }

    fn record_classification(&self, rows: usize, classification: &Classification) {
        self.profile.increment(ProfileEvent::KeysExpired, classification.expired.len() as u64);
        self.profile.increment(ProfileEvent::KeysNotFound, classification.not_found.len() as u64);
        self.profile.increment(ProfileEvent::KeysHit, classification.hits as u64);
        self.profile.increment(ProfileEvent::ReadsRottedValues, classification.stale_reads as u64);

        self.query_count.fetch_add(rows as u64, Ordering::Relaxed);
        self.hit_count.fetch_add(classification.hits as u64, Ordering::Release);
    }

    fn record_hits(&self, rows: usize) {
        self.profile.increment(ProfileEvent::KeysHit, rows as u64);
        self.query_count.fetch_add(rows as u64, Ordering::Relaxed);
        self.hit_count.fetch_add(rows as u64, Ordering::Release);
    }

    /// Queues a refresh of expired keys without waiting. Under backpressure
    /// the refresh is dropped and the stale values already served stand.
    fn refresh_async(&self, keys: &[Key]) {
        let unit = Arc::new(UpdateUnit::new(keys.iter().copied()));
        match self.queue.try_push(unit) {
            Ok(()) => debug!(dictionary = %self.name, keys = keys.len(), "queued refresh of expired keys"),
            Err(err) => debug!(dictionary = %self.name, error = %err, "dropped refresh of expired keys"),
        }
    }

    /// Queues a refill of `keys` and waits for it.
    fn refill_sync(&self, keys: Vec<Key>) -> Result<(Arc<UpdateUnit>, Arc<UnitOutcome>)> {
        let unit = Arc::new(UpdateUnit::new(keys));
        if let Err(err) = self.queue.try_push(Arc::clone(&unit)) {
            warn!(dictionary = %self.name, keys = unit.len(), error = %err, "refill rejected");
            return Err(err);
        }

        let timeout = self.config.wait_timeout();
        match unit.wait(timeout) {
            Some(outcome) => Ok((unit, outcome)),
            None => {
                warn!(
                    dictionary = %self.name,
                    keys = unit.len(),
                    timeout_ms = self.config.query_wait_timeout_ms,
                    "refill timed out"
                );
                Err(DictError::RefillTimedOut {
                    keys: unit.len(),
                    timeout_ms: self.config.query_wait_timeout_ms,
                })
            }
        }
    }

    /// Fills `out` for `keys`: hits from the cache, the rest through a refill.
    ///
    /// `read_cached` reads a row from a locked slot, `from_row` extracts the
    /// output from fetched values and `default` supplies absent rows.
    fn resolve_rows<T, R, F, D>(
        &self,
        keys: &[Key],
        out: &mut [T],
        read_cached: R,
        from_row: F,
        default: D,
    ) -> Result<()>
    where
        T: Clone,
        R: Fn(&Storage, usize, &SlotRead<'_>) -> T,
        F: Fn(&[AttributeValue]) -> Option<T>,
        D: Fn(usize) -> T,
    {
        let read_expired = self.config.allow_read_expired_keys;
        let classification = {
            let guard = self.read_storage();
            let storage: &Storage = &guard;
            classify(&storage.cells, keys, Instant::now(), read_expired, |row, _, slot| {
                out[row] = read_cached(storage, row, slot);
            })
        };
        self.record_classification(keys.len(), &classification);

        if classification.not_found.is_empty() {
            if classification.expired.is_empty() {
                return Ok(());
            }
            if read_expired {
                self.refresh_async(classification.expired.keys());
                return Ok(());
            }
        }

        let (unit, outcome) = self.refill_sync(classification.missing_keys())?;
        self.prepare_answer(&unit, &outcome, |event| match event {
            MergeEvent::Found { key, values, .. } => {
                let value = from_row(values);
                for row in classification.missing_rows(key) {
                    out[row] = value.clone().unwrap_or_else(|| default(row));
                }
            }
            MergeEvent::Absent { key, .. } => {
                for row in classification.missing_rows(key) {
                    out[row] = default(row);
                }
            }
        });
        Ok(())
    }
}

/// Point-in-time statistics of a dictionary.
#[derive(Clone, Debug, Serialize)]
pub struct DictionaryStats {
    /// Dictionary name
    pub name: String,
    /// Hashed slots
    pub capacity: usize,
    /// Hashed slots ever bound
    pub element_count: u64,
    /// Rows looked up
    pub query_count: u64,
    /// Fraction of rows answered from valid cells
    pub hit_rate: f64,
    /// `element_count / capacity`
    pub load_factor: f64,
    /// Update units waiting
    pub queue_len: usize,
    /// Update queue depth
    pub queue_capacity: usize,
    /// Profiling counters
    pub profile: ProfileSnapshot,
}

/// A fixed-capacity, time-expiring cache in front of a [`DictionarySource`].
///
/// Lookups are batched: one call answers one attribute for a slice of keys,
/// in input order. Keys that are unknown or expired are refilled through a
/// bounded update queue drained by background workers.
///
/// # Example
///
/// ```rust,ignore
/// let dictionary = CacheDictionary::new("users", structure, source, CacheConfig::default())?;
/// let ages: Vec<u64> = dictionary.get("age", &[1, 2, 3], Defaults::Attribute)?;
/// let names = dictionary.get_strings("name", &[1, 2, 3], Defaults::Attribute)?;
/// ```
pub struct CacheDictionary {
    inner: Arc<Inner>,
    workers: UpdateWorkers,
}

impl CacheDictionary {
    /// Creates a dictionary and starts its fetch workers.
    ///
    /// # Errors
    /// `ConfigError` for an invalid configuration, `IoError` if a worker
    /// thread cannot be spawned.
    pub fn new(
        name: impl Into<String>,
        structure: DictionaryStructure,
        source: Arc<dyn DictionarySource>,
        config: CacheConfig,
    ) -> Result<Self> {
        config.validate()?;
        let name = name.into();

        let cells = CellTable::new(config.size);
        let capacity = cells.capacity();
        let attributes = AttributeStore::new(&structure, cells.slot_count());
        let rng = match config.rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        info!(
            dictionary = %name,
            capacity,
            attributes = structure.len(),
            source = %source.describe(),
            allow_read_expired_keys = config.allow_read_expired_keys,
            "cache dictionary created"
        );

        let inner = Arc::new(Inner {
            name,
            queue: UpdateQueue::new(config.max_update_queue_size),
            structure,
            source,
            profile: ProfileCounters::new(),
            element_count: AtomicU64::new(0),
            storage: RwLock::new(Storage { cells, attributes }),
            rng: Mutex::new(rng),
            query_count: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            capacity,
            config,
        });

        let workers = UpdateWorkers::spawn(&inner, inner.config.max_threads_for_updates)?;
        Ok(Self { inner, workers })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LOOKUPS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Looks up a numeric attribute for every key.
    ///
    /// # Errors
    /// `UnknownAttribute`, `TypeMismatch` if the attribute is not of type
    /// `T`, `QueueFull` or `RefillTimedOut` if a needed refill could not be
    /// queued or did not finish in time.
    pub fn get<T: NumericAttribute>(&self, attribute: &str, keys: &[Key], defaults: Defaults<'_, T>) -> Result<Vec<T>> {
        let index = self.inner.attribute_index(attribute, T::TYPE)?;
        let defaults = defaults.resolve(self.inner.null_value(index), keys.len(), T::from_value)?;

        let mut out = vec![T::default(); keys.len()];
        self.inner.resolve_rows(
            keys,
            &mut out,
            |storage, row, slot| {
                if slot.is_default() {
                    *defaults.get(row)
                } else {
                    storage
                        .attributes
                        .read::<T>(index, slot.index())
                        .unwrap_or_else(|| *defaults.get(row))
                }
            },
            |values| values.get(index).and_then(T::from_value),
            |row| *defaults.get(row),
        )?;
        Ok(out)
    }

    /// Looks up a `UInt64` attribute with its null value as default.
    pub fn get_u64(&self, attribute: &str, keys: &[Key]) -> Result<Vec<u64>> {
        self.get(attribute, keys, Defaults::Attribute)
    }

    /// Looks up an `Int64` attribute with its null value as default.
    pub fn get_i64(&self, attribute: &str, keys: &[Key]) -> Result<Vec<i64>> {
        self.get(attribute, keys, Defaults::Attribute)
    }

    /// Looks up a `Float64` attribute with its null value as default.
    pub fn get_f64(&self, attribute: &str, keys: &[Key]) -> Result<Vec<f64>> {
        self.get(attribute, keys, Defaults::Attribute)
    }

    /// Looks up a string attribute for every key.
    ///
    /// Tries an optimistic pass first that stops at the first key that is
    /// not a valid hit; only then classifies the whole batch, collects
    /// values per key and writes the packed output with a single reservation.
    pub fn get_strings(&self, attribute: &str, keys: &[Key], defaults: Defaults<'_, String>) -> Result<StringColumn> {
        let index = self.inner.attribute_index(attribute, AttributeType::String)?;
        let defaults = defaults.resolve(self.inner.null_value(index), keys.len(), |value| {
            value.as_str().map(str::to_owned)
        })?;
        let rows = keys.len();
        let mut out = StringColumn::with_capacity(rows);

        let all_valid = {
            let guard = self.inner.read_storage();
            let column = guard.string_column(index)?;
            let now = Instant::now();
            let mut all_valid = true;

            for (row, &key) in keys.iter().enumerate() {
                let slot = guard.cells.read(key, now);
                if slot.status() != FindStatus::Valid {
                    all_valid = false;
                    break;
                }
                if slot.is_default() {
                    out.push(defaults.get(row));
                } else {
                    column.with(slot.index(), |value| out.push(value));
                }
            }
            all_valid
        };

        if all_valid {
            self.inner.record_hits(rows);
            return Ok(out);
        }
        out.clear();

        let read_expired = self.inner.config.allow_read_expired_keys;
        let mut resolved: HashMap<Key, String> = HashMap::new();
        let classification = {
            let guard = self.inner.read_storage();
            let storage: &Storage = &guard;
            let column = storage.string_column(index)?;
            classify(&storage.cells, keys, Instant::now(), read_expired, |_, key, slot| {
                if !slot.is_default() {
                    resolved.entry(key).or_insert_with(|| column.get(slot.index()));
                }
            })
        };
        self.inner.record_classification(rows, &classification);

        let needs_sync = !classification.not_found.is_empty()
            || (!classification.expired.is_empty() && !read_expired);

        if needs_sync {
            let (unit, outcome) = self.inner.refill_sync(classification.missing_keys())?;
            self.inner.prepare_answer(&unit, &outcome, |event| match event {
                MergeEvent::Found { key, values, .. } => match values.get(index).and_then(AttributeValue::as_str) {
                    Some(value) => {
                        resolved.insert(key, value.to_owned());
                    }
                    None => {
                        resolved.remove(&key);
                    }
                },
                MergeEvent::Absent { key, .. } => {
                    resolved.remove(&key);
                }
            });
        } else if !classification.expired.is_empty() {
            self.inner.refresh_async(classification.expired.keys());
        }

        let total_bytes: usize = keys
            .iter()
            .enumerate()
            .map(|(row, key)| resolved.get(key).map_or_else(|| defaults.get(row).len(), String::len))
            .sum();
        out.reserve_bytes(total_bytes);

        for (row, key) in keys.iter().enumerate() {
            match resolved.get(key) {
                Some(value) => out.push(value),
                None => out.push(defaults.get(row)),
            }
        }
        Ok(out)
    }

    /// Reports for every key whether the source has it.
    ///
    /// Keys cached as absent answer false; unknown keys are refilled first.
    pub fn has(&self, keys: &[Key]) -> Result<Vec<bool>> {
        let mut out = vec![false; keys.len()];
        self.inner
            .resolve_rows(keys, &mut out, |_, _, slot| !slot.is_default(), |_| Some(true), |_| false)?;
        Ok(out)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // UPDATES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Processes every queued update unit on the calling thread.
    ///
    /// Used when the dictionary runs without background workers. Returns the
    /// number of units processed.
    pub fn run_pending_updates(&self) -> usize {
        let mut processed = 0;
        while let Some(unit) = self.inner.queue.try_pop() {
            self.inner.process_unit(&unit);
            processed += 1;
        }
        processed
    }

    /// Update units currently queued.
    pub fn update_queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    /// Number of running fetch workers.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INSPECTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Dictionary name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Attribute structure.
    pub fn structure(&self) -> &DictionaryStructure {
        &self.inner.structure
    }

    /// Active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Number of hashed slots.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Classifies `key` at the current instant.
    pub fn locate(&self, key: Key) -> FindResult {
        self.inner.read_storage().cells.locate(key, Instant::now())
    }

    /// Classifies `key` at `now`.
    pub fn locate_at(&self, key: Key, now: Instant) -> FindResult {
        self.inner.read_storage().cells.locate(key, now)
    }

    /// Copy of the cell bound to `key`, if any.
    pub fn inspect(&self, key: Key) -> Option<Cell> {
        let storage = self.inner.read_storage();
        storage
            .cells
            .snapshot(storage.cells.slot_of(key))
            .filter(|cell| cell.is_bound_to(key))
    }

    /// Hashed slots ever bound.
    pub fn element_count(&self) -> u64 {
        self.inner.element_count.load(Ordering::Relaxed)
    }

    /// Rows looked up so far.
    pub fn query_count(&self) -> u64 {
        self.inner.query_count.load(Ordering::Relaxed)
    }

    /// Fraction of looked-up rows answered from valid cells.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.inner.hit_count.load(Ordering::Acquire);
        let queries = self.inner.query_count.load(Ordering::Relaxed);
        if queries == 0 {
            0.0
        } else {
            hits as f64 / queries as f64
        }
    }

    /// Fraction of hashed slots bound.
    pub fn load_factor(&self) -> f64 {
        self.element_count() as f64 / self.inner.capacity as f64
    }

    /// Profiling counters.
    pub fn profile(&self) -> ProfileSnapshot {
        self.inner.profile.snapshot()
    }

    /// Point-in-time statistics.
    pub fn stats(&self) -> DictionaryStats {
        DictionaryStats {
            name: self.inner.name.clone(),
            capacity: self.inner.capacity,
            element_count: self.element_count(),
            query_count: self.query_count(),
            hit_rate: self.hit_rate(),
            load_factor: self.load_factor(),
            queue_len: self.inner.queue.len(),
            queue_capacity: self.inner.queue.capacity(),
            profile: self.profile(),
        }
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Inner {
        &self.inner
    }
}

impl Drop for CacheDictionary {
    fn drop(&mut self) {
        self.workers.shutdown(&self.inner.queue);
        debug!(dictionary = %self.inner.name, "cache dictionary dropped");
    }
}
