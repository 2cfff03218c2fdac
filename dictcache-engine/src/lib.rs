//! # dictcache engine
//!
//! A fixed-capacity, direct-mapped cache of key → attribute rows in front
//! of a slower [`DictionarySource`](dictcache_core::DictionarySource).
//!
//! - **Cells**: one slot per key hash, no probing; collisions evict
//! - **Expiration**: every bind draws a lifetime uniformly from a window
//! - **Refill**: misses go through a bounded queue drained by fetch workers;
//!   a full queue fails the lookup instead of blocking it
//! - **Stale serving**: optionally answer expired keys at once and refresh
//!   them in the background
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dictcache_engine::{CacheConfig, CacheDictionary, Defaults};
//!
//! let dictionary = CacheDictionary::new("users", structure, Arc::new(source), CacheConfig::default())?;
//! let scores: Vec<i64> = dictionary.get("score", &[1, 2, 3], Defaults::Constant(-1))?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod attributes;
mod cells;
mod classify;
mod config;
mod dictionary;
mod merge;
mod output;
mod profile;
mod queue;
mod worker;

#[cfg(test)]
mod tests;

pub use attributes::NumericAttribute;
pub use cells::{int_hash64, Cell, CellState, FindResult, FindStatus};
pub use config::CacheConfig;
pub use dictionary::{CacheDictionary, DictionaryStats};
pub use merge::MergeEvent;
pub use output::{Defaults, StringColumn};
pub use profile::{ProfileEvent, ProfileSnapshot};
pub use queue::{UnitOutcome, UpdateQueue, UpdateUnit};
