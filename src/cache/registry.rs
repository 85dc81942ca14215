//! Named cache registry with version-derived store identifiers.
//!
//! Registry operations never surface storage I/O errors to callers: a failed
//! lookup or write is logged and reported as a cache miss, so routing always
//! proceeds to its fallback.

use std::sync::Arc;
use tracing::{debug, warn};

use super::store::{CacheStorage, Snapshot};
use crate::http::{Request, Response};

/// Store identifiers derived from one app-name + version pair.
///
/// The umbrella name identifies the version as a whole and only participates
/// in cleanup comparison; snapshots live in the static and dynamic stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
  umbrella: String,
  static_assets: String,
  dynamic_data: String,
}

impl CacheNames {
  pub fn new(app: &str, version: &str) -> Self {
    Self {
      umbrella: format!("{}-v{}", app, version),
      static_assets: format!("{}-static-v{}", app, version),
      dynamic_data: format!("{}-data-v{}", app, version),
    }
  }

  pub fn umbrella(&self) -> &str {
    &self.umbrella
  }

  pub fn static_assets(&self) -> &str {
    &self.static_assets
  }

  pub fn dynamic_data(&self) -> &str {
    &self.dynamic_data
  }

  /// The stores that survive activation cleanup.
  pub fn keep_set(&self) -> [&str; 3] {
    [&self.umbrella, &self.static_assets, &self.dynamic_data]
  }
}

/// Error-swallowing facade over a cache storage backend.
pub struct CacheRegistry<S: CacheStorage> {
  storage: Arc<S>,
  names: CacheNames,
}

impl<S: CacheStorage> CacheRegistry<S> {
  pub fn new(storage: S, names: CacheNames) -> Self {
    Self {
      storage: Arc::new(storage),
      names,
    }
  }

  pub fn names(&self) -> &CacheNames {
    &self.names
  }

  /// Open a named store, creating it if absent.
  pub fn open(&self, store: &str) {
    if let Err(e) = self.storage.open(store) {
      warn!("Failed to open cache store {}: {}", store, e);
    }
  }

  /// Match a request against one store. Storage failure counts as a miss.
  pub fn lookup(&self, store: &str, request: &Request) -> Option<Snapshot> {
    match self.storage.get(store, request) {
      Ok(hit) => hit,
      Err(e) => {
        warn!("Cache lookup in {} failed for {}: {}", store, request.url, e);
        None
      }
    }
  }

  /// Match a request against every store.
  pub fn lookup_any(&self, request: &Request) -> Option<Snapshot> {
    match self.storage.get_any(request) {
      Ok(hit) => hit,
      Err(e) => {
        warn!("Cache lookup failed for {}: {}", request.url, e);
        None
      }
    }
  }

  /// Store a response copy. Failure is logged; the live response is already
  /// on its way to the caller.
  pub fn store(&self, store: &str, request: &Request, response: &Response) {
    if let Err(e) = self.storage.put(store, request, response) {
      warn!("Failed to cache {} in {}: {}", request.url, store, e);
    }
  }

  /// Delete every ambient store whose name is not in the keep set.
  pub fn delete_stores_not_in(&self, keep: &[&str]) {
    let names = match self.storage.list_stores() {
      Ok(names) => names,
      Err(e) => {
        warn!("Failed to enumerate cache stores: {}", e);
        return;
      }
    };

    for name in names {
      if !keep.contains(&name.as_str()) {
        debug!("Deleting old cache: {}", name);
        if let Err(e) = self.storage.delete_store(&name) {
          warn!("Failed to delete cache store {}: {}", name, e);
        }
      }
    }
  }
}

impl<S: CacheStorage> Clone for CacheRegistry<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      names: self.names.clone(),
    }
  }
}
