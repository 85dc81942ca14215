//! Named cache stores for offline support.
//!
//! This module provides the cache half of request routing:
//! - Version-tagged store names (umbrella, static assets, dynamic data)
//! - A storage trait with SQLite and in-memory backends
//! - A registry facade that swallows storage I/O errors as cache misses
//! - Cleanup of stores left behind by superseded versions

mod registry;
mod store;

pub use registry::{CacheNames, CacheRegistry};
pub use store::{CacheStorage, MemoryStorage, SqliteStorage};
