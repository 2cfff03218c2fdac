//! Direct-mapped cell table.
//!
//! Every key maps to exactly one slot: `int_hash64(key) & (capacity - 1)`,
//! with key `0` pinned to a reserved slot just past the hashed range. There
//! is no probing, so a colliding key simply takes the slot over and the
//! previous occupant reads as not found from then on.
//!
//! Each slot carries its own lock. Callers hold the dictionary-wide lock in
//! read mode and take the slot lock to read or rebind a single cell, which
//! keeps concurrent merges on different slots independent.

use std::time::Instant;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use dictcache_core::{Key, MAX_CACHE_SIZE, ZERO_KEY};

/// 64-bit integer mixer used for slot addressing.
pub fn int_hash64(mut x: u64) -> u64 {
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    x ^= x >> 33;
    x
}

// ═══════════════════════════════════════════════════════════════════════════════
// CELL
// ═══════════════════════════════════════════════════════════════════════════════

/// What a slot currently holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellState {
    /// Never bound to any key.
    Empty,
    /// Bound to a key whose values were fetched from the source.
    Fetched,
    /// Bound to a key the source reported absent; attribute entries hold null values.
    DefaultMarked,
}

/// One slot of the cell table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell {
    /// Bound key (meaningless while `Empty`)
    pub key: Key,
    /// Expiration instant, `None` if the cell never expires
    pub expires_at: Option<Instant>,
    /// Binding state
    pub state: CellState,
}

impl Cell {
    const EMPTY: Cell = Cell {
        key: ZERO_KEY,
        expires_at: None,
        state: CellState::Empty,
    };

    /// Returns true if this cell is bound to `key`.
    pub fn is_bound_to(&self, key: Key) -> bool {
        self.state != CellState::Empty && self.key == key
    }

    /// Returns true if the cell has passed its expiration instant.
    pub fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(expires_at) if now >= expires_at)
    }

    /// Returns true if the cell holds null values for an absent key.
    pub fn is_default(&self) -> bool {
        self.state == CellState::DefaultMarked
    }

    /// Classifies this cell against a lookup of `key` at `now`.
    pub fn status(&self, key: Key, now: Instant) -> FindStatus {
        if !self.is_bound_to(key) {
            FindStatus::NotFound
        } else if self.is_expired(now) {
            FindStatus::Outdated
        } else {
            FindStatus::Valid
        }
    }
}

/// Outcome of looking a key up in its slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FindStatus {
    /// Bound to the key and not expired.
    Valid,
    /// Bound to the key but expired.
    Outdated,
    /// Empty or bound to a different key.
    NotFound,
}

/// Slot index plus status for one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FindResult {
    /// Slot the key maps to
    pub slot: usize,
    /// Status of the key in that slot
    pub status: FindStatus,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SLOT GUARDS
// ═══════════════════════════════════════════════════════════════════════════════

/// A slot held in read mode, classified for one key.
///
/// Attribute entries of the slot may be read consistently while this is alive.
pub struct SlotRead<'a> {
    slot: usize,
    status: FindStatus,
    cell: RwLockReadGuard<'a, Cell>,
}

impl SlotRead<'_> {
    /// Slot index.
    pub fn index(&self) -> usize {
        self.slot
    }

    /// Status of the looked-up key.
    pub fn status(&self) -> FindStatus {
        self.status
    }

    /// Returns true if the slot holds null values.
    pub fn is_default(&self) -> bool {
        self.cell.is_default()
    }

    /// Copy of the underlying cell.
    pub fn cell(&self) -> Cell {
        *self.cell
    }
}

/// A slot held in write mode for rebinding.
pub struct SlotWrite<'a> {
    slot: usize,
    is_zero_slot: bool,
    cell: RwLockWriteGuard<'a, Cell>,
}

impl SlotWrite<'_> {
    /// Slot index.
    pub fn index(&self) -> usize {
        self.slot
    }

    /// Binds the slot to `key`.
    ///
    /// Returns true if this bind took a previously empty hashed slot, i.e.
    /// the occupancy count should grow. Rebinding an occupied slot or the
    /// zero slot never counts.
    pub fn bind(&mut self, key: Key, state: CellState, expires_at: Option<Instant>) -> bool {
        debug_assert!(state != CellState::Empty, "bind requires a non-empty state");
        let newly_occupied = self.cell.state == CellState::Empty && !self.is_zero_slot;
        *self.cell = Cell { key, expires_at, state };
        newly_occupied
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CELL TABLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed-size, direct-mapped array of cells.
pub struct CellTable {
    cells: Box<[RwLock<Cell>]>,
    mask: usize,
}

impl CellTable {
    /// Creates a table with at least `size` hashed slots (rounded up to a
    /// power of two) plus the reserved zero slot.
    pub fn new(size: usize) -> Self {
        let capacity = size.clamp(1, MAX_CACHE_SIZE).next_power_of_two();
        let cells = (0..=capacity).map(|_| RwLock::new(Cell::EMPTY)).collect();
        Self {
            cells,
            mask: capacity - 1,
        }
    }

    /// Number of hashed slots (excludes the zero slot).
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Total slots including the zero slot; the length of every attribute column.
    pub fn slot_count(&self) -> usize {
        self.cells.len()
    }

    /// Index of the slot reserved for key `0`.
    pub fn zero_slot(&self) -> usize {
        self.mask + 1
    }

    /// Slot `key` maps to.
    pub fn slot_of(&self, key: Key) -> usize {
        if key == ZERO_KEY {
            self.zero_slot()
        } else {
            (int_hash64(key) as usize) & self.mask
        }
    }

    /// Classifies `key` at `now` without keeping the slot locked.
    pub fn locate(&self, key: Key, now: Instant) -> FindResult {
        let slot = self.slot_of(key);
        let status = self.cells[slot].read().status(key, now);
        FindResult { slot, status }
    }

    /// Classifies `key` at `now` and keeps the slot read-locked.
    pub fn read(&self, key: Key, now: Instant) -> SlotRead<'_> {
        let slot = self.slot_of(key);
        let cell = self.cells[slot].read();
        let status = cell.status(key, now);
        SlotRead { slot, status, cell }
    }

    /// Write-locks the slot `key` maps to.
    pub fn write(&self, key: Key) -> SlotWrite<'_> {
        let slot = self.slot_of(key);
        SlotWrite {
            slot,
            is_zero_slot: slot == self.zero_slot(),
            cell: self.cells[slot].write(),
        }
    }

    /// Copy of the cell at `slot`.
    pub fn snapshot(&self, slot: usize) -> Option<Cell> {
        self.cells.get(slot).map(|cell| *cell.read())
    }
}
