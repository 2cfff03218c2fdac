//! In-memory dictionary source.
//!
//! Thread-safe key → row storage suitable for development, testing and
//! small reference tables that fit in the process.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, instrument};

use dictcache_core::error::{DictError, Result};
use dictcache_core::traits::DictionarySource;
use dictcache_core::types::{AttributeValue, DictionaryStructure, Key, SourceRow};

/// In-memory dictionary source.
///
/// Rows are checked against the structure on insert, so every row a load
/// returns is well-typed.
///
/// # Fault injection
///
/// [`set_failing`](Self::set_failing) makes every load fail and
/// [`set_latency`](Self::set_latency) delays every load, which lets tests
/// exercise refill timeouts and backpressure.
#[derive(Debug)]
pub struct MemorySource {
    /// Attribute structure rows are checked against
    structure: DictionaryStructure,
    /// Primary storage: key → values
    rows: DashMap<Key, Vec<AttributeValue>>,
    /// Fail every load while set
    failing: AtomicBool,
    /// Delay applied before every load
    latency: RwLock<Duration>,
    /// Bulk loads served
    loads: AtomicU64,
    /// Keys requested across all loads
    keys_requested: AtomicU64,
}

impl MemorySource {
    /// Creates an empty source.
    pub fn new(structure: DictionaryStructure) -> Self {
        Self {
            structure,
            rows: DashMap::new(),
            failing: AtomicBool::new(false),
            latency: RwLock::new(Duration::ZERO),
            loads: AtomicU64::new(0),
            keys_requested: AtomicU64::new(0),
        }
    }

    /// Creates a source holding `rows`.
    pub fn with_rows(structure: DictionaryStructure, rows: impl IntoIterator<Item = SourceRow>) -> Result<Self> {
        let source = Self::new(structure);
        source.import(rows)?;
        Ok(source)
    }

    /// Attribute structure.
    pub fn structure(&self) -> &DictionaryStructure {
        &self.structure
    }

    /// Inserts or replaces the row for `key`.
    pub fn insert(&self, key: Key, values: Vec<AttributeValue>) -> Result<()> {
        let row = self.structure.coerce_row(SourceRow::new(key, values))?;
        self.rows.insert(row.key, row.values);
        Ok(())
    }

    /// Imports rows, replacing existing keys. Returns the number imported.
    pub fn import(&self, rows: impl IntoIterator<Item = SourceRow>) -> Result<usize> {
        let mut imported = 0;
        for row in rows {
            let row = self.structure.coerce_row(row)?;
            self.rows.insert(row.key, row.values);
            imported += 1;
        }
        Ok(imported)
    }

    /// Removes the row for `key`.
    pub fn remove(&self, key: Key) -> Option<Vec<AttributeValue>> {
        self.rows.remove(&key).map(|(_, values)| values)
    }

    /// Removes every row.
    pub fn clear(&self) {
        self.rows.clear();
    }

    /// Returns all rows (for export).
    pub fn all_rows(&self) -> Vec<SourceRow> {
        let mut rows: Vec<SourceRow> = self
            .rows
            .iter()
            .map(|entry| SourceRow::new(*entry.key(), entry.value().clone()))
            .collect();
        rows.sort_by_key(|row| row.key);
        rows
    }

    /// Makes every subsequent load fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delays every subsequent load by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write() = latency;
    }

    /// Bulk loads served so far, failed ones included.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    /// Keys requested across all loads.
    pub fn keys_requested(&self) -> u64 {
        self.keys_requested.load(Ordering::SeqCst)
    }

    /// Returns the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the source holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl DictionarySource for MemorySource {
    #[instrument(skip(self, keys), fields(keys = keys.len()))]
    fn load_keys(&self, keys: &[Key]) -> Result<Vec<SourceRow>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.keys_requested.fetch_add(keys.len() as u64, Ordering::SeqCst);

        let latency = *self.latency.read();
        if !latency.is_zero() {
            thread::sleep(latency);
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(DictError::SourceError("memory source is set to fail".into()));
        }

        let rows: Vec<SourceRow> = keys
            .iter()
            .filter_map(|key| self.rows.get(key).map(|values| SourceRow::new(*key, values.clone())))
            .collect();

        debug!(found = rows.len(), "Loaded rows");
        Ok(rows)
    }

    fn describe(&self) -> String {
        format!("memory ({} rows)", self.rows.len())
    }
}
