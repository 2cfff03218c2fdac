//! Domain types for dictcache.
//!
//! - [`AttributeValue`]: a typed value of one attribute for one key
//! - [`DictionaryStructure`]: the ordered, typed attribute list of a dictionary
//! - [`DictionaryLifetime`]: the expiration window drawn for every cached cell
//! - [`SourceRow`]: one key's values as returned by a backing source

mod attribute;
mod lifetime;
mod structure;

pub use attribute::*;
pub use lifetime::*;
pub use structure::*;
