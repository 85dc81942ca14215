//! Request and response types plus the live-fetch capability.
//!
//! Requests are identified by a hash over method + URL; cached snapshots are
//! keyed by that identity and served byte-for-byte. The `Fetcher` trait is
//! the seam between routing logic and the real network.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use url::Url;

/// The kind of resource a request expects, mirroring fetch destinations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
  Document,
  Script,
  Style,
  Image,
  Font,
  #[default]
  Other,
}

impl Destination {
  pub fn is_document(self) -> bool {
    matches!(self, Destination::Document)
  }
}

/// An intercepted request. The URL may be absolute or a path relative to the
/// application origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
  #[serde(default = "default_method")]
  pub method: String,
  pub url: String,
  #[serde(default)]
  pub destination: Destination,
}

fn default_method() -> String {
  "GET".to_string()
}

impl Request {
  pub fn get(url: &str) -> Self {
    Self {
      method: default_method(),
      url: url.to_string(),
      destination: Destination::Other,
    }
  }

  pub fn document(url: &str) -> Self {
    Self {
      method: default_method(),
      url: url.to_string(),
      destination: Destination::Document,
    }
  }

  /// Resolve a relative URL against the application base, yielding the
  /// absolute form that cache identity is computed over. Already-absolute
  /// and unresolvable URLs pass through unchanged.
  pub fn canonicalized(&self, base: &Url) -> Request {
    if Url::parse(&self.url).is_ok() {
      return self.clone();
    }
    match base.join(&self.url) {
      Ok(url) => Request {
        url: url.to_string(),
        ..self.clone()
      },
      Err(_) => self.clone(),
    }
  }

  /// Cache identity: sha-256 over method and URL. Callers canonicalize
  /// first so both spellings of one resource share an identity.
  pub fn identity(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }

  /// URL path component used for classification. Relative URLs are already
  /// paths; unparsable ones classify by their raw form.
  pub fn path(&self) -> String {
    Url::parse(&self.url)
      .map(|u| u.path().to_string())
      .unwrap_or_else(|_| self.url.clone())
  }
}

/// A response as returned to the intercepted caller or held in a cache store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn ok(content_type: &str, body: Vec<u8>) -> Self {
    Self {
      status: 200,
      headers: vec![("content-type".to_string(), content_type.to_string())],
      body,
    }
  }

  /// Only a 200 counts as cacheable success.
  pub fn is_success(&self) -> bool {
    self.status == 200
  }

  pub fn content_type(&self) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
      .map(|(_, value)| value.as_str())
  }

  /// Fallback for API requests that fail both live fetch and cache lookup.
  pub fn offline_json() -> Self {
    let body = serde_json::json!({
      "error": "Offline mode active",
      "message": "Using cached data",
    });
    Self::ok("application/json", body.to_string().into_bytes())
  }

  /// Fallback for document requests with no cached root page.
  pub fn offline_page() -> Self {
    Self {
      status: 503,
      headers: vec![("content-type".to_string(), "text/plain".to_string())],
      body: b"Offline - Please check your connection".to_vec(),
    }
  }

  /// Empty success for non-document requests that fail while offline.
  pub fn no_content() -> Self {
    Self {
      status: 204,
      headers: Vec::new(),
      body: Vec::new(),
    }
  }
}

/// Live network access.
pub trait Fetcher: Send + Sync {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

/// Fetcher backed by reqwest. Relative request URLs are joined against the
/// application base URL.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  base: Url,
}

impl HttpFetcher {
  pub fn new(base: Url) -> Self {
    Self {
      client: reqwest::Client::new(),
      base,
    }
  }

  fn absolute(&self, request: &Request) -> Result<Url> {
    match Url::parse(&request.url) {
      Ok(url) => Ok(url),
      Err(_) => self
        .base
        .join(&request.url)
        .map_err(|e| eyre!("Cannot resolve request URL {}: {}", request.url, e)),
    }
  }
}

impl Fetcher for HttpFetcher {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send {
    async move {
      let url = self.absolute(request)?;
      let method = reqwest::Method::from_bytes(request.method.as_bytes())
        .map_err(|e| eyre!("Invalid request method {}: {}", request.method, e))?;

      let response = self
        .client
        .request(method, url.clone())
        .send()
        .await
        .map_err(|e| eyre!("Fetch failed for {}: {}", url, e))?;

      let status = response.status().as_u16();
      let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
          value
            .to_str()
            .ok()
            .map(|v| (name.to_string(), v.to_string()))
        })
        .collect();
      let body = response
        .bytes()
        .await
        .map_err(|e| eyre!("Failed to read response body from {}: {}", url, e))?
        .to_vec();

      Ok(Response {
        status,
        headers,
        body,
      })
    }
  }
}
