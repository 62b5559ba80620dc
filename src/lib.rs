//! h5mdc - metadata cache and extensible/fixed array index engine for
//! hierarchical self-describing data files.
//!
//! The metadata cache (`cache`) is the single authority for reading,
//! writing, and caching variable-size metadata entries against a byte
//! store (`store`). The extensible and fixed array index structures
//! (`array::ea`, `array::fa`) are clients of the cache, built entirely on
//! its `protect`/`insert`/`flush_dep_create` surface.

pub mod array;
pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod store;

pub use error::{Error, Result};
