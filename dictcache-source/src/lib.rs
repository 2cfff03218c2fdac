//! # dictcache sources
//!
//! Backing stores a cache dictionary refills from.
//!
//! - **Memory**: a concurrent in-memory map, with failure and latency
//!   injection for testing
//! - **File**: rows loaded from a JSON file, reloadable at runtime
//!
//! ## Example
//!
//! ```rust,ignore
//! use dictcache_source::MemorySource;
//!
//! let source = MemorySource::new(structure);
//! source.insert(42, vec![AttributeValue::from("answer")])?;
//! let rows = source.load_keys(&[42, 43])?;
//! assert_eq!(rows.len(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod file;
mod memory;

pub use file::FileSource;
pub use memory::MemorySource;

// Re-export the trait from core
pub use dictcache_core::traits::DictionarySource as Source;
