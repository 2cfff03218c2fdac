//! Cell lifetime window.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_LIFETIME_MAX_MS, DEFAULT_LIFETIME_MIN_MS};
use crate::error::{DictError, Result};

/// Range a cell's time-to-live is drawn from on every bind.
///
/// A zero bound on either side disables expiration: cells then live until
/// their slot is taken by another key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryLifetime {
    /// Lower bound in milliseconds
    pub min_ms: u64,
    /// Upper bound in milliseconds
    pub max_ms: u64,
}

impl DictionaryLifetime {
    /// Creates a lifetime window from two durations.
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min_ms: min.as_millis() as u64,
            max_ms: max.as_millis() as u64,
        }
    }

    /// Creates a lifetime window in whole seconds.
    pub fn from_secs(min_sec: u64, max_sec: u64) -> Self {
        Self {
            min_ms: min_sec.saturating_mul(1000),
            max_ms: max_sec.saturating_mul(1000),
        }
    }

    /// A lifetime under which cells never expire.
    pub fn never() -> Self {
        Self { min_ms: 0, max_ms: 0 }
    }

    /// Returns true if cells bound under this lifetime expire.
    pub fn is_expiring(&self) -> bool {
        self.min_ms != 0 && self.max_ms != 0
    }

    /// Lower bound.
    pub fn min(&self) -> Duration {
        Duration::from_millis(self.min_ms)
    }

    /// Upper bound.
    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    /// Validates the window.
    pub fn validate(&self) -> Result<()> {
        if self.min_ms > self.max_ms {
            return Err(DictError::ConfigError(format!(
                "lifetime min ({}ms) exceeds max ({}ms)",
                self.min_ms, self.max_ms
            )));
        }
        Ok(())
    }
}

impl Default for DictionaryLifetime {
    fn default() -> Self {
        Self {
            min_ms: DEFAULT_LIFETIME_MIN_MS,
            max_ms: DEFAULT_LIFETIME_MAX_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_expires() {
        assert!(!DictionaryLifetime::never().is_expiring());
        assert!(!DictionaryLifetime::from_secs(0, 10).is_expiring());
        assert!(DictionaryLifetime::from_secs(1, 10).is_expiring());
    }

    #[test]
    fn test_bounds() {
        let lifetime = DictionaryLifetime::new(Duration::from_millis(20), Duration::from_millis(40));
        assert_eq!(lifetime.min(), Duration::from_millis(20));
        assert_eq!(lifetime.max(), Duration::from_millis(40));
        assert!(lifetime.validate().is_ok());
    }

    #[test]
    fn test_inverted_window_rejected() {
        let lifetime = DictionaryLifetime::from_secs(10, 5);
        assert!(matches!(lifetime.validate(), Err(DictError::ConfigError(_))));
    }
}
