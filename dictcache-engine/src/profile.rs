//! Fire-and-forget profiling counters.
//!
//! Counters are owned by one dictionary instance and only ever incremented
//! with relaxed ordering; nothing reads them to make decisions.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// A countable profiling event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileEvent {
    /// Keys sent to the source
    KeysRequested,
    /// Requested keys the source returned
    KeysRequestedFound,
    /// Requested keys the source did not return
    KeysRequestedMiss,
    /// Distinct expired keys seen by lookups
    KeysExpired,
    /// Distinct unknown keys seen by lookups
    KeysNotFound,
    /// Rows answered from valid cells
    KeysHit,
    /// Bulk loads issued to the source
    SourceRequests,
    /// Time spent in source loads
    SourceRequestTimeNs,
    /// Time spent waiting for the dictionary lock in read mode
    LockReadNs,
    /// Time spent waiting for the dictionary lock in write mode
    LockWriteNs,
    /// Expired values served to callers while a refresh was queued
    ReadsRottedValues,
}

/// Instance-owned profiling counters.
#[derive(Debug, Default)]
pub struct ProfileCounters {
    keys_requested: AtomicU64,
    keys_requested_found: AtomicU64,
    keys_requested_miss: AtomicU64,
    keys_expired: AtomicU64,
    keys_not_found: AtomicU64,
    keys_hit: AtomicU64,
    source_requests: AtomicU64,
    source_request_time_ns: AtomicU64,
    lock_read_ns: AtomicU64,
    lock_write_ns: AtomicU64,
    reads_rotted_values: AtomicU64,
    in_flight_requests: AtomicI64,
}

impl ProfileCounters {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, event: ProfileEvent) -> &AtomicU64 {
        match event {
            ProfileEvent::KeysRequested => &self.keys_requested,
            ProfileEvent::KeysRequestedFound => &self.keys_requested_found,
            ProfileEvent::KeysRequestedMiss => &self.keys_requested_miss,
            ProfileEvent::KeysExpired => &self.keys_expired,
            ProfileEvent::KeysNotFound => &self.keys_not_found,
            ProfileEvent::KeysHit => &self.keys_hit,
            ProfileEvent::SourceRequests => &self.source_requests,
            ProfileEvent::SourceRequestTimeNs => &self.source_request_time_ns,
            ProfileEvent::LockReadNs => &self.lock_read_ns,
            ProfileEvent::LockWriteNs => &self.lock_write_ns,
            ProfileEvent::ReadsRottedValues => &self.reads_rotted_values,
        }
    }

    /// Adds `amount` to `event`.
    pub fn increment(&self, event: ProfileEvent, amount: u64) {
        if amount > 0 {
            self.counter(event).fetch_add(amount, Ordering::Relaxed);
        }
    }

    /// Adds the nanoseconds elapsed since `start` to `event`.
    pub fn record_since(&self, event: ProfileEvent, start: Instant) {
        let elapsed = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.increment(event, elapsed);
    }

    /// Current value of `event`.
    pub fn get(&self, event: ProfileEvent) -> u64 {
        self.counter(event).load(Ordering::Relaxed)
    }

    /// Marks a source request as started; the returned guard ends it on drop.
    pub fn start_request(&self) -> InFlightRequest<'_> {
        self.in_flight_requests.fetch_add(1, Ordering::Relaxed);
        InFlightRequest { counters: self }
    }

    /// Source requests currently running.
    pub fn in_flight_requests(&self) -> i64 {
        self.in_flight_requests.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> ProfileSnapshot {
        ProfileSnapshot {
            keys_requested: self.get(ProfileEvent::KeysRequested),
            keys_requested_found: self.get(ProfileEvent::KeysRequestedFound),
            keys_requested_miss: self.get(ProfileEvent::KeysRequestedMiss),
            keys_expired: self.get(ProfileEvent::KeysExpired),
            keys_not_found: self.get(ProfileEvent::KeysNotFound),
            keys_hit: self.get(ProfileEvent::KeysHit),
            source_requests: self.get(ProfileEvent::SourceRequests),
            source_request_time_ns: self.get(ProfileEvent::SourceRequestTimeNs),
            lock_read_ns: self.get(ProfileEvent::LockReadNs),
            lock_write_ns: self.get(ProfileEvent::LockWriteNs),
            reads_rotted_values: self.get(ProfileEvent::ReadsRottedValues),
            in_flight_requests: self.in_flight_requests(),
        }
    }
}

/// Decrements the in-flight request gauge when dropped.
pub struct InFlightRequest<'a> {
    counters: &'a ProfileCounters,
}

impl Drop for InFlightRequest<'_> {
    fn drop(&mut self) {
        self.counters.in_flight_requests.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Serializable copy of [`ProfileCounters`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    /// Keys sent to the source
    pub keys_requested: u64,
    /// Requested keys the source returned
    pub keys_requested_found: u64,
    /// Requested keys the source did not return
    pub keys_requested_miss: u64,
    /// Distinct expired keys seen by lookups
    pub keys_expired: u64,
    /// Distinct unknown keys seen by lookups
    pub keys_not_found: u64,
    /// Rows answered from valid cells
    pub keys_hit: u64,
    /// Bulk loads issued to the source
    pub source_requests: u64,
    /// Nanoseconds spent in source loads
    pub source_request_time_ns: u64,
    /// Nanoseconds spent waiting for the read lock
    pub lock_read_ns: u64,
    /// Nanoseconds spent waiting for the write lock
    pub lock_write_ns: u64,
    /// Expired values served
    pub reads_rotted_values: u64,
    /// Source requests running at snapshot time
    pub in_flight_requests: i64,
}
