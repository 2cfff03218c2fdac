//! Cache configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use dictcache_core::{
    DictError, DictionaryLifetime, Result, DEFAULT_CACHE_SIZE, DEFAULT_QUERY_WAIT_TIMEOUT_MS,
    DEFAULT_UPDATE_QUEUE_SIZE, DEFAULT_UPDATE_THREADS, MAX_CACHE_SIZE,
};

/// Cache dictionary configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Requested number of slots, rounded up to a power of two
    pub size: usize,
    /// Window each cell's lifetime is drawn from
    pub lifetime: DictionaryLifetime,
    /// Serve expired values immediately and refresh them in the background
    pub allow_read_expired_keys: bool,
    /// Maximum number of queued update units
    pub max_update_queue_size: usize,
    /// How long a lookup waits for its synchronous refill, in milliseconds
    pub query_wait_timeout_ms: u64,
    /// Background fetch workers; 0 leaves draining to `run_pending_updates`
    pub max_threads_for_updates: usize,
    /// Seed for the lifetime jitter RNG; random when unset
    pub rng_seed: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CACHE_SIZE,
            lifetime: DictionaryLifetime::default(),
            allow_read_expired_keys: false,
            max_update_queue_size: DEFAULT_UPDATE_QUEUE_SIZE,
            query_wait_timeout_ms: DEFAULT_QUERY_WAIT_TIMEOUT_MS,
            max_threads_for_updates: DEFAULT_UPDATE_THREADS,
            rng_seed: None,
        }
    }
}

impl CacheConfig {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the requested slot count.
    pub fn size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    /// Sets the lifetime window.
    pub fn lifetime(mut self, lifetime: DictionaryLifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Enables or disables serving expired values.
    pub fn allow_read_expired_keys(mut self, allow: bool) -> Self {
        self.allow_read_expired_keys = allow;
        self
    }

    /// Sets the update queue depth.
    pub fn max_update_queue_size(mut self, size: usize) -> Self {
        self.max_update_queue_size = size;
        self
    }

    /// Sets the synchronous refill timeout.
    pub fn query_wait_timeout(mut self, timeout: Duration) -> Self {
        self.query_wait_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the number of fetch workers.
    pub fn update_threads(mut self, threads: usize) -> Self {
        self.max_threads_for_updates = threads;
        self
    }

    /// Seeds the lifetime RNG.
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Synchronous refill timeout as a `Duration`.
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.query_wait_timeout_ms)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(DictError::ConfigError("size must be positive".into()));
        }
        if self.size > MAX_CACHE_SIZE {
            return Err(DictError::ConfigError(format!("size must be at most {}", MAX_CACHE_SIZE)));
        }
        if self.max_update_queue_size == 0 {
            return Err(DictError::ConfigError("max_update_queue_size must be positive".into()));
        }
        if self.query_wait_timeout_ms == 0 {
            return Err(DictError::ConfigError("query_wait_timeout_ms must be positive".into()));
        }
        self.lifetime.validate()
    }
}
