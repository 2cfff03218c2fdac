//! Fetch workers draining the update queue.
//!
//! Each worker pops units in arrival order, loads the requested keys from
//! the source, writes the results back under the dictionary lock in write
//! mode and completes the unit. A failed load counts as a load that found
//! nothing: every requested key is bound as absent.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use dictcache_core::{Key, Result, SourceRow};

use crate::dictionary::Inner;
use crate::profile::ProfileEvent;
use crate::queue::{UnitOutcome, UpdateQueue, UpdateUnit};

impl Inner {
    /// Fulfils one update unit and fires its completion signal.
    #[instrument(skip(self, unit), fields(dictionary = %self.name, keys = unit.len()))]
    pub(crate) fn process_unit(&self, unit: &UpdateUnit) {
        let keys = unit.requested_keys();
        self.profile.increment(ProfileEvent::KeysRequested, keys.len() as u64);

        let loaded = {
            let _request = self.profile.start_request();
            let start = Instant::now();
            let result = self.source.load_keys(keys).and_then(|rows| self.check_rows(rows));
            self.profile.record_since(ProfileEvent::SourceRequestTimeNs, start);
            self.profile.increment(ProfileEvent::SourceRequests, 1);
            result
        };

        let outcome = match loaded {
            Ok(rows) => UnitOutcome::loaded(keys, rows),
            Err(err) => {
                warn!(error = %err, "source load failed, requested keys treated as absent");
                UnitOutcome::failed(keys, err.to_string())
            }
        };
        self.write_back(keys, &outcome);

        let found = outcome.found_count();
        self.profile.increment(ProfileEvent::KeysRequestedFound, found as u64);
        self.profile.increment(ProfileEvent::KeysRequestedMiss, (keys.len() - found) as u64);
        debug!(found, waited_ms = unit.age().as_millis() as u64, "refill loaded");

        if !unit.complete(outcome) {
            debug!("update unit was already completed");
        }
    }

    fn check_rows(&self, rows: Vec<SourceRow>) -> Result<Vec<SourceRow>> {
        for row in &rows {
            self.structure.check_row(row)?;
        }
        Ok(rows)
    }

    fn write_back(&self, keys: &[Key], outcome: &UnitOutcome) {
        let storage = self.write_storage();
        let now = Instant::now();

        for &key in keys {
            match outcome.row(key) {
                Some(values) => {
                    if let Err(err) = self.bind_fetched(&storage, key, values, now) {
                        warn!(key, error = %err, "failed to store fetched row");
                    }
                }
                None => {
                    self.bind_default(&storage, key, now);
                }
            }
        }
    }
}

/// Handles of the running fetch workers.
pub(crate) struct UpdateWorkers {
    handles: Vec<JoinHandle<()>>,
}

impl UpdateWorkers {
    /// Starts `count` workers on `inner`'s queue.
    pub(crate) fn spawn(inner: &Arc<Inner>, count: usize) -> Result<Self> {
        let mut workers = Self {
            handles: Vec::with_capacity(count),
        };

        for id in 0..count {
            let worker_inner = Arc::clone(inner);
            let spawned = thread::Builder::new()
                .name(format!("{}-update-{}", inner.name, id))
                .spawn(move || run_worker(worker_inner, id));

            match spawned {
                Ok(handle) => workers.handles.push(handle),
                Err(err) => {
                    workers.shutdown(&inner.queue);
                    return Err(err.into());
                }
            }
        }

        if count > 0 {
            info!(dictionary = %inner.name, workers = count, "update workers started");
        }
        Ok(workers)
    }

    /// Number of running workers.
    pub(crate) fn len(&self) -> usize {
        self.handles.len()
    }

    /// Closes the queue and joins every worker once it has drained.
    pub(crate) fn shutdown(&mut self, queue: &UpdateQueue) {
        queue.close();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("update worker panicked");
            }
        }
    }
}

fn run_worker(inner: Arc<Inner>, id: usize) {
    debug!(dictionary = %inner.name, worker = id, "update worker running");
    while let Some(unit) = inner.queue.pop() {
        inner.process_unit(&unit);
    }
    debug!(dictionary = %inner.name, worker = id, "update worker stopped");
}
