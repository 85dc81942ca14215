//! Event dispatch: wires the lifecycle manager, request router, sync engine
//! and notification relay to the platform event stream.
//!
//! Each fetch event runs as an independent spawned task; handlers share
//! nothing mutable beyond the cache stores themselves. In-flight handles are
//! retained and awaited before shutdown so no handler is torn down early.

use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use url::Url;

use crate::cache::{CacheNames, CacheRegistry, SqliteStorage};
use crate::config::Config;
use crate::event::{Event, EventHandler};
use crate::http::{HttpFetcher, Request, Response};
use crate::lifecycle::LifecycleManager;
use crate::notify::{LogSink, NotificationRelay};
use crate::router::{RequestRouter, RouterConfig};
use crate::sync::{HttpSyncClient, NoopPendingStore, SyncEngine};

/// One routed fetch, written as a JSON line to stdout. Text bodies pass
/// through as UTF-8; binary bodies are hex-encoded so no byte is lost on
/// the wire.
#[derive(Debug, Serialize)]
struct FetchOutcome {
  url: String,
  status: u16,
  content_type: Option<String>,
  body: String,
  encoding: BodyEncoding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum BodyEncoding {
  Utf8,
  Hex,
}

impl FetchOutcome {
  fn new(request: &Request, response: &Response) -> Self {
    let (body, encoding) = match std::str::from_utf8(&response.body) {
      Ok(text) => (text.to_string(), BodyEncoding::Utf8),
      Err(_) => (hex::encode(&response.body), BodyEncoding::Hex),
    };

    Self {
      url: request.url.clone(),
      status: response.status,
      content_type: response.content_type().map(String::from),
      body,
      encoding,
    }
  }
}

/// The offline-caching agent.
pub struct Agent {
  lifecycle: LifecycleManager<SqliteStorage, HttpFetcher>,
  router: Arc<RequestRouter<SqliteStorage, HttpFetcher>>,
  sync: Option<SyncEngine<NoopPendingStore, HttpSyncClient>>,
  relay: NotificationRelay<LogSink>,
  /// In-flight fetch handlers
  tasks: Vec<JoinHandle<()>>,
}

impl Agent {
  pub fn new(config: Config, storage: SqliteStorage) -> Result<Self> {
    let names = CacheNames::new(&config.app.name, &config.app.version);
    let registry = CacheRegistry::new(storage, names);
    let base = Url::parse(&config.app.base_url)
      .map_err(|e| eyre!("Invalid base URL {}: {}", config.app.base_url, e))?;
    let fetcher = HttpFetcher::new(base.clone());

    let lifecycle = LifecycleManager::new(
      registry.clone(),
      fetcher.clone(),
      config.precache.clone(),
      base.clone(),
    );

    let router = Arc::new(RequestRouter::new(
      registry,
      fetcher,
      RouterConfig {
        api_markers: config.api_markers.clone(),
        root_path: "/".to_string(),
        base,
      },
    ));

    let sync = match &config.sync.endpoint {
      Some(endpoint) => {
        let client = HttpSyncClient::new(endpoint, Config::get_sync_token())?;
        Some(SyncEngine::new(
          NoopPendingStore,
          client,
          config.sync.tag.clone(),
        ))
      }
      None => None,
    };

    let relay = NotificationRelay::new(
      LogSink,
      config.notifications.icon.clone(),
      config.app.base_url.clone(),
    );

    Ok(Self {
      lifecycle,
      router,
      sync,
      relay,
      tasks: Vec::new(),
    })
  }

  /// Dispatch events until the stream ends, then drain in-flight handlers.
  pub async fn run(&mut self, mut events: EventHandler) -> Result<()> {
    while let Some(event) = events.next().await {
      self.handle(event).await;
      self.tasks.retain(|task| !task.is_finished());
    }

    for task in self.tasks.drain(..) {
      if let Err(e) = task.await {
        warn!("Fetch handler panicked: {}", e);
      }
    }

    Ok(())
  }

  async fn handle(&mut self, event: Event) {
    match event {
      Event::Install => {
        if let Err(e) = self.lifecycle.install().await {
          error!("Install failed: {:#}", e);
        }
      }
      Event::Activate => self.lifecycle.activate(),
      Event::Fetch { request } => {
        let router = Arc::clone(&self.router);
        self.tasks.push(tokio::spawn(async move {
          let response = router.route(&request).await;
          match serde_json::to_string(&FetchOutcome::new(&request, &response)) {
            Ok(line) => println!("{}", line),
            Err(e) => error!("Failed to serialize fetch outcome: {}", e),
          }
        }));
      }
      Event::Sync { tag } => match &self.sync {
        Some(engine) => engine.run(&tag).await,
        None => info!("Sync endpoint not configured, ignoring tag {}", tag),
      },
      Event::Push { payload } => self.relay.on_push(&payload),
      Event::NotificationClick { action } => self.relay.on_click(&action),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fetch_outcome_text_body_stays_utf8() {
    let request = Request::get("/manifest.json");
    let response = Response::ok("application/json", b"{\"name\":\"diary\"}".to_vec());

    let outcome = FetchOutcome::new(&request, &response);

    assert_eq!(outcome.encoding, BodyEncoding::Utf8);
    assert_eq!(outcome.body, "{\"name\":\"diary\"}");
  }

  #[test]
  fn test_fetch_outcome_binary_body_is_hex_encoded() {
    let request = Request::get("/generated-icon.png");
    let response = Response::ok("image/png", vec![0x89, 0x50, 0x4e, 0x47, 0xff]);

    let outcome = FetchOutcome::new(&request, &response);

    assert_eq!(outcome.encoding, BodyEncoding::Hex);
    assert_eq!(outcome.body, "89504e47ff");
    assert_eq!(hex::decode(&outcome.body).unwrap(), response.body);
  }
}
