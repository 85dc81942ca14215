//! Request routing: per-request cache-store selection and fetch strategy.
//!
//! Every intercepted request is classified by URL path and handled by one of
//! two strategies:
//! - API requests get network-first: live data when online, the dynamic
//!   store (or a synthesized offline indicator) when not.
//! - Everything else gets cache-first: instant load of immutable assets,
//!   with the live network only consulted on a miss.
//!
//! Routing never returns an error; every failure path ends in a substitute
//! response.

use tracing::debug;
use url::Url;

use crate::cache::{CacheRegistry, CacheStorage};
use crate::http::{Fetcher, Request, Response};

/// Routing configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
  /// Path substrings that classify a request as API-bound
  pub api_markers: Vec<String>,
  /// Root page served as the offline fallback for document requests
  pub root_path: String,
  /// Application origin that relative request URLs resolve against
  pub base: Url,
}

impl RouterConfig {
  pub fn new(base: Url) -> Self {
    Self {
      api_markers: vec!["api".to_string(), "streamlit".to_string()],
      root_path: "/".to_string(),
      base,
    }
  }
}

/// How a request is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
  /// Network-first against the dynamic store
  Api,
  /// Cache-first against the static store
  Static,
}

pub struct RequestRouter<S: CacheStorage, F: Fetcher> {
  registry: CacheRegistry<S>,
  fetcher: F,
  config: RouterConfig,
}

impl<S: CacheStorage, F: Fetcher> RequestRouter<S, F> {
  pub fn new(registry: CacheRegistry<S>, fetcher: F, config: RouterConfig) -> Self {
    Self {
      registry,
      fetcher,
      config,
    }
  }

  pub fn classify(&self, request: &Request) -> RequestClass {
    let path = request.path();
    if self
      .config
      .api_markers
      .iter()
      .any(|marker| path.contains(marker.as_str()))
    {
      RequestClass::Api
    } else {
      RequestClass::Static
    }
  }

  /// Route one intercepted request to a response. The request is
  /// canonicalized first so relative and absolute spellings of one resource
  /// hit the same cache entry.
  pub async fn route(&self, request: &Request) -> Response {
    let request = request.canonicalized(&self.config.base);
    match self.classify(&request) {
      RequestClass::Api => self.network_first(&request).await,
      RequestClass::Static => self.cache_first(&request).await,
    }
  }

  /// Network-first: live fetch, caching a 200 copy in the dynamic store; on
  /// fetch failure fall back to the dynamic store, then to the synthesized
  /// offline JSON indicator.
  async fn network_first(&self, request: &Request) -> Response {
    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if response.is_success() {
          self
            .registry
            .store(self.registry.names().dynamic_data(), request, &response);
        }
        response
      }
      Err(e) => {
        debug!("Network fetch failed for {}: {}", request.url, e);
        let dynamic = self.registry.names().dynamic_data();
        match self.registry.lookup(dynamic, request) {
          Some(snapshot) => snapshot.response,
          None => Response::offline_json(),
        }
      }
    }
  }

  /// Cache-first: serve a cached snapshot verbatim if any store has one;
  /// otherwise fetch live, caching a 200 copy in the static store. On fetch
  /// failure, document requests fall back to the cached root page or a 503
  /// offline message; other requests get an empty 204.
  async fn cache_first(&self, request: &Request) -> Response {
    if let Some(snapshot) = self.registry.lookup_any(request) {
      debug!(
        "Serving {} from cache (stored {})",
        request.url, snapshot.cached_at
      );
      return snapshot.response;
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if response.is_success() {
          self
            .registry
            .store(self.registry.names().static_assets(), request, &response);
        }
        response
      }
      Err(e) => {
        debug!("Network fetch failed for {}: {}", request.url, e);
        if request.destination.is_document() {
          let root = Request::get(&self.config.root_path).canonicalized(&self.config.base);
          match self.registry.lookup_any(&root) {
            Some(snapshot) => snapshot.response,
            None => Response::offline_page(),
          }
        } else {
          Response::no_content()
        }
      }
    }
  }
}

impl<S: CacheStorage, F: Fetcher + Clone> Clone for RequestRouter<S, F> {
  fn clone(&self) -> Self {
    Self {
      registry: self.registry.clone(),
      fetcher: self.fetcher.clone(),
      config: self.config.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheNames, MemoryStorage};
  use crate::http::testing::StubFetcher;

  fn base() -> Url {
    Url::parse("http://localhost:8000").unwrap()
  }

  fn router(fetcher: StubFetcher) -> RequestRouter<MemoryStorage, StubFetcher> {
    let registry = CacheRegistry::new(MemoryStorage::new(), CacheNames::new("diary", "1.0.0"));
    RequestRouter::new(registry, fetcher, RouterConfig::new(base()))
  }

  #[test]
  fn test_classify_by_path_marker() {
    let router = router(StubFetcher::new());

    assert_eq!(
      router.classify(&Request::get("/api/entries")),
      RequestClass::Api
    );
    assert_eq!(
      router.classify(&Request::get("http://localhost:8000/streamlit/data")),
      RequestClass::Api
    );
    assert_eq!(
      router.classify(&Request::get("/generated-icon.png")),
      RequestClass::Static
    );
  }

  #[tokio::test]
  async fn test_api_success_is_returned_and_cached() {
    let fetcher = StubFetcher::new();
    let live = Response::ok("application/json", br#"[{"glucose":5.6}]"#.to_vec());
    fetcher.respond("http://localhost:8000/api/entries", live.clone());
    let router = router(fetcher);
    let request = Request::get("/api/entries");

    let response = router.route(&request).await;
    assert_eq!(response, live);

    let cached = router.registry.lookup(
      router.registry.names().dynamic_data(),
      &request.canonicalized(&base()),
    );
    assert_eq!(cached.unwrap().response, live);
  }

  #[tokio::test]
  async fn test_api_non_success_is_not_cached() {
    let fetcher = StubFetcher::new();
    fetcher.respond(
      "http://localhost:8000/api/entries",
      Response {
        status: 500,
        headers: Vec::new(),
        body: Vec::new(),
      },
    );
    let router = router(fetcher);
    let request = Request::get("/api/entries");

    let response = router.route(&request).await;
    assert_eq!(response.status, 500);

    assert!(router
      .registry
      .lookup(
        router.registry.names().dynamic_data(),
        &request.canonicalized(&base())
      )
      .is_none());
  }

  #[tokio::test]
  async fn test_api_offline_serves_cached_copy() {
    let fetcher = StubFetcher::new();
    let router = router(fetcher);
    let request = Request::get("/api/entries").canonicalized(&base());
    let cached = Response::ok("application/json", b"[]".to_vec());
    router
      .registry
      .store(router.registry.names().dynamic_data(), &request, &cached);

    let response = router.route(&request).await;
    assert_eq!(response, cached);
  }

  #[tokio::test]
  async fn test_api_offline_cold_cache_yields_offline_json() {
    let router = router(StubFetcher::new());

    let response = router.route(&Request::get("/api/entries")).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.content_type(), Some("application/json"));
    assert_eq!(
      response.body,
      br#"{"error":"Offline mode active","message":"Using cached data"}"#
    );
  }

  #[tokio::test]
  async fn test_static_hit_skips_live_fetch() {
    let fetcher = StubFetcher::new();
    let router = router(fetcher.clone());
    let request = Request::get("/generated-icon.png").canonicalized(&base());
    let cached = Response::ok("image/png", vec![0x89, 0x50, 0x4e, 0x47]);
    router
      .registry
      .store(router.registry.names().static_assets(), &request, &cached);

    let first = router.route(&request).await;
    let second = router.route(&request).await;

    assert_eq!(first, cached);
    assert_eq!(second, cached);
    assert_eq!(fetcher.call_count(), 0);
  }

  #[tokio::test]
  async fn test_static_hit_across_url_spellings() {
    let fetcher = StubFetcher::new();
    let router = router(fetcher.clone());
    // Seeded the way install does, with a relative manifest path
    let precached = Request::get("/manifest.json").canonicalized(&base());
    let snapshot = Response::ok("application/json", b"{}".to_vec());
    router
      .registry
      .store(router.registry.names().static_assets(), &precached, &snapshot);

    let response = router
      .route(&Request::get("http://localhost:8000/manifest.json"))
      .await;

    assert_eq!(response, snapshot);
    assert_eq!(fetcher.call_count(), 0);
  }

  #[tokio::test]
  async fn test_static_miss_fetches_and_caches() {
    let fetcher = StubFetcher::new();
    let live = Response::ok("text/css", b"body{}".to_vec());
    fetcher.respond("http://localhost:8000/style.css", live.clone());
    let router = router(fetcher.clone());
    let request = Request::get("/style.css");

    let response = router.route(&request).await;
    assert_eq!(response, live);

    // Second request is served from cache, under either spelling
    let again = router
      .route(&Request::get("http://localhost:8000/style.css"))
      .await;
    assert_eq!(again, live);
    assert_eq!(fetcher.call_count(), 1);
  }

  #[tokio::test]
  async fn test_offline_document_falls_back_to_root_page() {
    let fetcher = StubFetcher::new();
    let router = router(fetcher);
    let root = Request::get("/").canonicalized(&base());
    let page = Response::ok("text/html", b"<html>diary</html>".to_vec());
    router
      .registry
      .store(router.registry.names().static_assets(), &root, &page);

    let response = router.route(&Request::document("/entries/today")).await;
    assert_eq!(response, page);
  }

  #[tokio::test]
  async fn test_offline_document_without_root_yields_503() {
    let router = router(StubFetcher::new());

    let response = router.route(&Request::document("/entries/today")).await;

    assert_eq!(response.status, 503);
    assert_eq!(response.body, b"Offline - Please check your connection");
  }

  #[tokio::test]
  async fn test_offline_non_document_yields_empty_204() {
    let router = router(StubFetcher::new());

    let response = router.route(&Request::get("/style.css")).await;

    assert_eq!(response.status, 204);
    assert!(response.body.is_empty());
  }
}
