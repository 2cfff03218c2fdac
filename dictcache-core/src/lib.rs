//! # dictcache core
//!
//! Core types, errors, and traits shared by the dictcache crates.
//!
//! - **Types**: keys, typed attribute values, dictionary structure, lifetimes
//! - **Errors**: the `DictError` hierarchy and `Result` alias
//! - **Constants**: default sizes, timeouts and the reserved zero key
//! - **Traits**: the backing-source interface the cache refills from
//!
//! ## Example
//!
//! ```rust
//! use dictcache_core::{AttributeSpec, AttributeType, AttributeValue, DictionaryStructure};
//!
//! let structure = DictionaryStructure::new(vec![
//!     AttributeSpec::new("name", AttributeType::String, AttributeValue::String(String::new())),
//!     AttributeSpec::new("score", AttributeType::Int64, AttributeValue::Int64(-1)),
//! ])
//! .unwrap();
//! assert_eq!(structure.index_of("score").unwrap(), 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::{DictError, Result};
pub use traits::*;
pub use types::*;
