//! Batch classification against the cell table.

use std::collections::HashMap;
use std::time::Instant;

use dictcache_core::Key;

use crate::cells::{CellTable, FindStatus, SlotRead};

/// Keys mapped to every batch row that requested them, in first-seen order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RowGroups {
    rows: HashMap<Key, Vec<usize>>,
    order: Vec<Key>,
}

impl RowGroups {
    /// Records that `row` requested `key`.
    pub fn push(&mut self, key: Key, row: usize) {
        match self.rows.get_mut(&key) {
            Some(rows) => rows.push(row),
            None => {
                self.rows.insert(key, vec![row]);
                self.order.push(key);
            }
        }
    }

    /// Rows that requested `key`.
    pub fn rows(&self, key: Key) -> &[usize] {
        self.rows.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Distinct keys in first-seen order.
    pub fn keys(&self) -> &[Key] {
        &self.order
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if no key was recorded.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// A batch split into hits, expired keys and unknown keys.
#[derive(Debug, Default)]
pub struct Classification {
    /// Keys bound but past expiration
    pub expired: RowGroups,
    /// Keys not bound to their slot
    pub not_found: RowGroups,
    /// Rows that were valid hits
    pub hits: usize,
    /// Expired rows whose stale value was read
    pub stale_reads: usize,
}

impl Classification {
    /// Returns true if every row was a hit.
    pub fn all_valid(&self) -> bool {
        self.expired.is_empty() && self.not_found.is_empty()
    }

    /// Unknown keys followed by expired keys; the set a synchronous refill requests.
    pub fn missing_keys(&self) -> Vec<Key> {
        let mut keys = Vec::with_capacity(self.not_found.len() + self.expired.len());
        keys.extend_from_slice(self.not_found.keys());
        keys.extend_from_slice(self.expired.keys());
        keys
    }

    /// Every row that requested `key` and was not a hit.
    pub fn missing_rows(&self, key: Key) -> impl Iterator<Item = usize> + '_ {
        self.not_found
            .rows(key)
            .iter()
            .chain(self.expired.rows(key))
            .copied()
    }
}

/// Classifies `keys` against `cells` at `now`.
///
/// `on_readable(row, key, slot)` runs with the slot read-locked for every
/// valid row, and for expired rows too when `read_expired` is set, so the
/// caller can copy the cached value without a second lookup.
pub fn classify<F>(
    cells: &CellTable,
    keys: &[Key],
    now: Instant,
    read_expired: bool,
    mut on_readable: F,
) -> Classification
where
    F: FnMut(usize, Key, &SlotRead<'_>),
{
    let mut classification = Classification::default();

    for (row, &key) in keys.iter().enumerate() {
        let slot = cells.read(key, now);
        match slot.status() {
            FindStatus::Valid => {
                classification.hits += 1;
                on_readable(row, key, &slot);
            }
            FindStatus::Outdated => {
                classification.expired.push(key, row);
                if read_expired {
                    classification.stale_reads += 1;
                    on_readable(row, key, &slot);
                }
            }
            FindStatus::NotFound => classification.not_found.push(key, row),
        }
    }

    classification
}
