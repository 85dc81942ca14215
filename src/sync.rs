//! Background sync of locally pending diary data.
//!
//! A sync pass is a single best-effort sweep: enumerate pending items, send
//! each to the remote endpoint, remove the ones that made it. Item failures
//! are logged and skipped; the platform re-triggers the pass later. There is
//! no retry or backoff within a pass.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, error, info};
use url::Url;

/// A locally queued unit of data awaiting transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingItem {
  pub id: String,
  pub payload: serde_json::Value,
}

/// Local queue of pending items.
pub trait PendingStore: Send + Sync {
  fn pending(&self) -> Result<Vec<PendingItem>>;
  fn remove(&self, id: &str) -> Result<()>;
}

/// Stand-in until a persistent queue backend is wired up: there is never
/// anything pending.
pub struct NoopPendingStore;

impl PendingStore for NoopPendingStore {
  fn pending(&self) -> Result<Vec<PendingItem>> {
    Ok(Vec::new())
  }

  fn remove(&self, _id: &str) -> Result<()> {
    Ok(())
  }
}

/// Remote endpoint accepting pending items.
pub trait SyncClient: Send + Sync {
  fn send(&self, item: &PendingItem) -> impl Future<Output = Result<()>> + Send;
}

/// Posts pending items as JSON to the diary-data API.
pub struct HttpSyncClient {
  client: reqwest::Client,
  endpoint: Url,
  token: Option<String>,
}

impl HttpSyncClient {
  pub fn new(endpoint: &str, token: Option<String>) -> Result<Self> {
    let endpoint =
      Url::parse(endpoint).map_err(|e| eyre!("Invalid sync endpoint {}: {}", endpoint, e))?;

    Ok(Self {
      client: reqwest::Client::new(),
      endpoint,
      token,
    })
  }
}

impl SyncClient for HttpSyncClient {
  fn send(&self, item: &PendingItem) -> impl Future<Output = Result<()>> + Send {
    async move {
      let mut request = self.client.post(self.endpoint.clone()).json(item);
      if let Some(token) = &self.token {
        request = request.bearer_auth(token);
      }

      let response = request
        .send()
        .await
        .map_err(|e| eyre!("Failed to send item {}: {}", item.id, e))?;

      if !response.status().is_success() {
        return Err(eyre!(
          "Remote rejected item {}: {}",
          item.id,
          response.status()
        ));
      }

      Ok(())
    }
  }
}

/// Runs sync passes when connectivity is restored.
pub struct SyncEngine<P: PendingStore, C: SyncClient> {
  store: P,
  client: C,
  /// Only sync events carrying this tag trigger a pass
  tag: String,
}

impl<P: PendingStore, C: SyncClient> SyncEngine<P, C> {
  pub fn new(store: P, client: C, tag: String) -> Self {
    Self { store, client, tag }
  }

  /// Run one pass if `tag` matches. A pending-list retrieval failure aborts
  /// the pass; per-item failures are logged and the sweep continues.
  pub async fn run(&self, tag: &str) {
    if tag != self.tag {
      debug!("Ignoring sync event with tag {}", tag);
      return;
    }

    let items = match self.store.pending() {
      Ok(items) => items,
      Err(e) => {
        error!("Background sync failed: {}", e);
        return;
      }
    };

    if items.is_empty() {
      debug!("No pending data to sync");
      return;
    }

    info!("Syncing {} pending items", items.len());
    for item in items {
      match self.client.send(&item).await {
        Ok(()) => {
          if let Err(e) = self.store.remove(&item.id) {
            error!("Failed to remove synced item {}: {}", item.id, e);
          }
        }
        Err(e) => error!("Failed to sync data item {}: {}", item.id, e),
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;
  use std::sync::Mutex;

  struct VecPendingStore {
    items: Mutex<Vec<PendingItem>>,
  }

  impl VecPendingStore {
    fn new(ids: &[&str]) -> Self {
      Self {
        items: Mutex::new(
          ids
            .iter()
            .map(|id| PendingItem {
              id: id.to_string(),
              payload: serde_json::json!({"glucose": 5.6}),
            })
            .collect(),
        ),
      }
    }

    fn remaining(&self) -> Vec<String> {
      self
        .items
        .lock()
        .unwrap()
        .iter()
        .map(|item| item.id.clone())
        .collect()
    }
  }

  impl PendingStore for VecPendingStore {
    fn pending(&self) -> Result<Vec<PendingItem>> {
      Ok(self.items.lock().unwrap().clone())
    }

    fn remove(&self, id: &str) -> Result<()> {
      self.items.lock().unwrap().retain(|item| item.id != id);
      Ok(())
    }
  }

  struct BrokenPendingStore;

  impl PendingStore for BrokenPendingStore {
    fn pending(&self) -> Result<Vec<PendingItem>> {
      Err(eyre!("queue unavailable"))
    }

    fn remove(&self, _id: &str) -> Result<()> {
      panic!("remove called after failed retrieval");
    }
  }

  /// Records sent ids; ids in the failing set are rejected.
  #[derive(Default)]
  struct RecordingClient {
    sent: Mutex<Vec<String>>,
    failing: HashSet<String>,
  }

  impl RecordingClient {
    fn failing(ids: &[&str]) -> Self {
      Self {
        sent: Mutex::new(Vec::new()),
        failing: ids.iter().map(|id| id.to_string()).collect(),
      }
    }

    fn sent(&self) -> Vec<String> {
      self.sent.lock().unwrap().clone()
    }
  }

  impl SyncClient for RecordingClient {
    fn send(&self, item: &PendingItem) -> impl Future<Output = Result<()>> + Send {
      self.sent.lock().unwrap().push(item.id.clone());
      let rejected = self.failing.contains(&item.id);
      let id = item.id.clone();
      async move {
        if rejected {
          Err(eyre!("remote rejected {}", id))
        } else {
          Ok(())
        }
      }
    }
  }

  #[tokio::test]
  async fn test_successful_items_are_removed() {
    let engine = SyncEngine::new(
      VecPendingStore::new(&["a", "b"]),
      RecordingClient::default(),
      "diary-data-sync".to_string(),
    );

    engine.run("diary-data-sync").await;

    assert_eq!(engine.client.sent(), vec!["a", "b"]);
    assert!(engine.store.remaining().is_empty());
  }

  #[tokio::test]
  async fn test_item_failure_continues_sweep() {
    let engine = SyncEngine::new(
      VecPendingStore::new(&["a", "b", "c"]),
      RecordingClient::failing(&["b"]),
      "diary-data-sync".to_string(),
    );

    engine.run("diary-data-sync").await;

    // All attempted once, only the failed one stays queued
    assert_eq!(engine.client.sent(), vec!["a", "b", "c"]);
    assert_eq!(engine.store.remaining(), vec!["b"]);
  }

  #[tokio::test]
  async fn test_retrieval_failure_aborts_pass() {
    let engine = SyncEngine::new(
      BrokenPendingStore,
      RecordingClient::default(),
      "diary-data-sync".to_string(),
    );

    engine.run("diary-data-sync").await;

    assert!(engine.client.sent().is_empty());
  }

  #[tokio::test]
  async fn test_unknown_tag_is_ignored() {
    let engine = SyncEngine::new(
      VecPendingStore::new(&["a"]),
      RecordingClient::default(),
      "diary-data-sync".to_string(),
    );

    engine.run("other-sync").await;

    assert!(engine.client.sent().is_empty());
    assert_eq!(engine.store.remaining(), vec!["a"]);
  }

  #[test]
  fn test_http_sync_client_requires_valid_endpoint() {
    assert!(HttpSyncClient::new("not a url", None).is_err());
    assert!(
      HttpSyncClient::new("https://diary.example/api/entries", Some("token".to_string())).is_ok()
    );
  }

  #[test]
  fn test_noop_store_is_always_empty() {
    assert!(NoopPendingStore.pending().unwrap().is_empty());
    assert!(NoopPendingStore.remove("anything").is_ok());
  }
}
