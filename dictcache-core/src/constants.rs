//! Defaults and reserved values for dictcache.

// ═══════════════════════════════════════════════════════════════════════════════
// KEYS
// ═══════════════════════════════════════════════════════════════════════════════

/// Key that always maps to the reserved zero slot, outside the hashed range.
pub const ZERO_KEY: u64 = 0;

// ═══════════════════════════════════════════════════════════════════════════════
// CACHE SIZING
// ═══════════════════════════════════════════════════════════════════════════════

/// Default requested number of slots. Rounded up to a power of two.
pub const DEFAULT_CACHE_SIZE: usize = 65_536;

/// Largest accepted cache size; bigger requests are rejected.
pub const MAX_CACHE_SIZE: usize = 1 << 30;

/// Default maximum depth of the update queue.
pub const DEFAULT_UPDATE_QUEUE_SIZE: usize = 100_000;

/// Default number of background fetch workers.
pub const DEFAULT_UPDATE_THREADS: usize = 4;

// ═══════════════════════════════════════════════════════════════════════════════
// TIMING
// ═══════════════════════════════════════════════════════════════════════════════

/// Default time a synchronous lookup waits for its refill, in milliseconds.
pub const DEFAULT_QUERY_WAIT_TIMEOUT_MS: u64 = 60_000;

/// Default lower bound of a cell lifetime, in milliseconds (5 minutes).
pub const DEFAULT_LIFETIME_MIN_MS: u64 = 300_000;

/// Default upper bound of a cell lifetime, in milliseconds (6 minutes).
/// The spread between min and max spreads expirations out over time.
pub const DEFAULT_LIFETIME_MAX_MS: u64 = 360_000;
