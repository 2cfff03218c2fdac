//! Writing refill results back into the cell table.

use std::sync::atomic::Ordering;
use std::time::Instant;

use tracing::warn;

use dictcache_core::{AttributeValue, Key, Result};

use crate::cells::CellState;
use crate::dictionary::{Inner, Storage};
use crate::queue::{UnitOutcome, UpdateUnit};

/// What the merge did for one requested key.
#[derive(Debug)]
pub enum MergeEvent<'a> {
    /// The source returned `values` and the slot now holds them.
    Found {
        /// Requested key
        key: Key,
        /// Slot the key was bound to
        slot: usize,
        /// Fetched values in structure order
        values: &'a [AttributeValue],
    },
    /// The source had no row (or the load failed); the slot now holds null values.
    Absent {
        /// Requested key
        key: Key,
        /// Slot the key was bound to
        slot: usize,
    },
}

impl Inner {
    /// Binds `key` to its slot with fetched values and a fresh expiration.
    ///
    /// Works under either lock mode: the slot itself is write-locked for the
    /// duration, so the key and its attribute entries change together.
    pub(crate) fn bind_fetched(
        &self,
        storage: &Storage,
        key: Key,
        values: &[AttributeValue],
        now: Instant,
    ) -> Result<usize> {
        let mut slot = storage.cells.write(key);
        storage.attributes.write_row(slot.index(), values)?;
        if slot.bind(key, CellState::Fetched, self.draw_expiration(now)) {
            self.element_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(slot.index())
    }

    /// Binds `key` to its slot as absent, storing every null value.
    ///
    /// Binding keeps confirmed misses cached so repeated lookups do not
    /// hammer the source.
    pub(crate) fn bind_default(&self, storage: &Storage, key: Key, now: Instant) -> usize {
        let mut slot = storage.cells.write(key);
        storage.attributes.write_defaults(slot.index());
        if slot.bind(key, CellState::DefaultMarked, self.draw_expiration(now)) {
            self.element_count.fetch_add(1, Ordering::Relaxed);
        }
        slot.index()
    }

    /// Merges a completed unit into the cache, reporting each requested key
    /// to `on_key` in request order.
    ///
    /// A failed unit has no rows, so every key takes the absent path.
    pub(crate) fn prepare_answer<F>(&self, unit: &UpdateUnit, outcome: &UnitOutcome, mut on_key: F)
    where
        F: FnMut(MergeEvent<'_>),
    {
        let storage = self.read_storage();
        let now = Instant::now();

        for &key in unit.requested_keys() {
            if let Some(values) = outcome.row(key) {
                match self.bind_fetched(&storage, key, values, now) {
                    Ok(slot) => {
                        on_key(MergeEvent::Found { key, slot, values });
                        continue;
                    }
                    Err(err) => warn!(key, error = %err, "fetched row rejected, binding default"),
                }
            }

            let slot = self.bind_default(&storage, key, now);
            on_key(MergeEvent::Absent { key, slot });
        }
    }
}
