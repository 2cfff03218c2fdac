//! Bounded update queue and update units.
//!
//! Producers push with [`UpdateQueue::try_push`], which fails immediately
//! when the queue is full instead of growing it. Fetch workers pop units in
//! arrival order and complete each exactly once; the producer that created
//! a unit waits on that unit alone.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use dictcache_core::{AttributeValue, DictError, Key, Result, SourceRow};

// ═══════════════════════════════════════════════════════════════════════════════
// UPDATE UNIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Result of fulfilling an update unit.
#[derive(Debug, Default)]
pub struct UnitOutcome {
    found: HashMap<Key, bool>,
    rows: HashMap<Key, Vec<AttributeValue>>,
    error: Option<String>,
}

impl UnitOutcome {
    /// Outcome of a successful fetch. Rows for keys outside `requested` are dropped.
    pub fn loaded(requested: &[Key], rows: Vec<SourceRow>) -> Self {
        let mut found: HashMap<Key, bool> = requested.iter().map(|&key| (key, false)).collect();
        let mut by_key = HashMap::with_capacity(rows.len());

        for row in rows {
            if let Some(flag) = found.get_mut(&row.key) {
                *flag = true;
                by_key.insert(row.key, row.values);
            }
        }

        Self {
            found,
            rows: by_key,
            error: None,
        }
    }

    /// Outcome of a failed fetch: every requested key is absent.
    pub fn failed(requested: &[Key], error: impl Into<String>) -> Self {
        Self {
            found: requested.iter().map(|&key| (key, false)).collect(),
            rows: HashMap::new(),
            error: Some(error.into()),
        }
    }

    /// Whether the source returned a row for `key`.
    pub fn is_found(&self, key: Key) -> bool {
        self.found.get(&key).copied().unwrap_or(false)
    }

    /// Per-key presence for every requested key.
    pub fn found_mask(&self) -> &HashMap<Key, bool> {
        &self.found
    }

    /// Fetched values for `key`, in structure order.
    pub fn row(&self, key: Key) -> Option<&[AttributeValue]> {
        self.rows.get(&key).map(Vec::as_slice)
    }

    /// Number of keys the source returned.
    pub fn found_count(&self) -> usize {
        self.rows.len()
    }

    /// Source error if the fetch failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// One refill request and its single-fire completion signal.
#[derive(Debug)]
pub struct UpdateUnit {
    requested_keys: Vec<Key>,
    outcome: Mutex<Option<Arc<UnitOutcome>>>,
    done: Condvar,
    created_at: Instant,
}

impl UpdateUnit {
    /// Creates a unit for `keys`, dropping duplicates but keeping first-seen order.
    pub fn new(keys: impl IntoIterator<Item = Key>) -> Self {
        let mut seen = HashSet::new();
        let requested_keys = keys.into_iter().filter(|key| seen.insert(*key)).collect();
        Self {
            requested_keys,
            outcome: Mutex::new(None),
            done: Condvar::new(),
            created_at: Instant::now(),
        }
    }

    /// Deduplicated keys to fetch.
    pub fn requested_keys(&self) -> &[Key] {
        &self.requested_keys
    }

    /// Number of requested keys.
    pub fn len(&self) -> usize {
        self.requested_keys.len()
    }

    /// Returns true if no key is requested.
    pub fn is_empty(&self) -> bool {
        self.requested_keys.is_empty()
    }

    /// Time since the unit was created.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Stores the outcome and wakes every waiter.
    ///
    /// Returns false, leaving the first outcome in place, if the unit was
    /// already completed.
    pub fn complete(&self, outcome: UnitOutcome) -> bool {
        let mut slot = self.outcome.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(Arc::new(outcome));
        self.done.notify_all();
        true
    }

    /// Returns true once the unit has been completed.
    pub fn is_done(&self) -> bool {
        self.outcome.lock().is_some()
    }

    /// Outcome, if completed.
    pub fn outcome(&self) -> Option<Arc<UnitOutcome>> {
        self.outcome.lock().clone()
    }

    /// Blocks until the unit completes or `timeout` passes.
    pub fn wait(&self, timeout: Duration) -> Option<Arc<UnitOutcome>> {
        let deadline = Instant::now() + timeout;
        let mut outcome = self.outcome.lock();
        while outcome.is_none() {
            if self.done.wait_until(&mut outcome, deadline).timed_out() {
                break;
            }
        }
        outcome.clone()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// UPDATE QUEUE
// ═══════════════════════════════════════════════════════════════════════════════

struct QueueState {
    units: VecDeque<Arc<UpdateUnit>>,
    closed: bool,
}

/// Bounded FIFO of update units.
pub struct UpdateQueue {
    state: Mutex<QueueState>,
    not_empty: Condvar,
    capacity: usize,
}

impl UpdateQueue {
    /// Creates a queue holding at most `capacity` units.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                units: VecDeque::with_capacity(capacity.min(1024)),
                closed: false,
            }),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    /// Enqueues `unit` without blocking.
    ///
    /// # Errors
    /// `QueueFull` when at capacity, `QueueClosed` after [`close`](Self::close).
    pub fn try_push(&self, unit: Arc<UpdateUnit>) -> Result<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(DictError::QueueClosed);
        }
        if state.units.len() >= self.capacity {
            return Err(DictError::QueueFull {
                capacity: self.capacity,
                len: state.units.len(),
            });
        }
        state.units.push_back(unit);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Dequeues the oldest unit, blocking while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn pop(&self) -> Option<Arc<UpdateUnit>> {
        let mut state = self.state.lock();
        loop {
            if let Some(unit) = state.units.pop_front() {
                return Some(unit);
            }
            if state.closed {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Dequeues the oldest unit if there is one.
    pub fn try_pop(&self) -> Option<Arc<UpdateUnit>> {
        self.state.lock().units.pop_front()
    }

    /// Rejects further pushes and wakes blocked consumers.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_all();
    }

    /// Returns true after [`close`](Self::close).
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Units currently queued.
    pub fn len(&self) -> usize {
        self.state.lock().units.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum depth.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
