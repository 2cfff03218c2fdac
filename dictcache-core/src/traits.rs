//! Common traits for dictcache.
//!
//! These traits define the seams between the cache and the systems it
//! sits in front of, enabling alternative sources and testing.

use crate::error::Result;
use crate::types::{Key, SourceRow};

// ═══════════════════════════════════════════════════════════════════════════════
// BACKING SOURCE TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Interface of the backing store a cache dictionary refills from.
///
/// Implementations might use:
/// - An in-memory map (for testing/development)
/// - A file of rows loaded at startup
/// - A remote database queried in bulk
///
/// Called from fetch worker threads, never while the cache lock is held.
pub trait DictionarySource: Send + Sync {
    /// Loads rows for the requested keys in one bulk lookup.
    ///
    /// Keys without a returned row are absent from the source. Rows for
    /// keys that were not requested are ignored by the cache.
    ///
    /// # Errors
    /// Any error marks the whole request as failed; the cache answers the
    /// waiting lookup with defaults and does not retry.
    fn load_keys(&self, keys: &[Key]) -> Result<Vec<SourceRow>>;

    /// Human-readable description used in logs.
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_owned()
    }
}
