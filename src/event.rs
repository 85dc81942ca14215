use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

use crate::http::Request;

/// Platform events, one JSON object per stdin line, tagged by `type` with
/// the platform event names (install, activate, fetch, sync, push,
/// notificationclick).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
  Install,
  Activate,
  Fetch {
    request: Request,
  },
  Sync {
    tag: String,
  },
  Push {
    #[serde(default)]
    payload: serde_json::Value,
  },
  NotificationClick {
    action: String,
  },
}

/// Event handler that produces events from the platform event stream
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Spawn a reader that parses one event per stdin line. Malformed lines
  /// are logged and skipped.
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
      let mut lines = BufReader::new(tokio::io::stdin()).lines();
      loop {
        match lines.next_line().await {
          Ok(Some(line)) => {
            let line = line.trim();
            if line.is_empty() {
              continue;
            }
            match serde_json::from_str::<Event>(line) {
              Ok(event) => {
                if tx.send(event).is_err() {
                  break;
                }
              }
              Err(e) => warn!("Ignoring malformed event: {}", e),
            }
          }
          Ok(None) => break,
          Err(e) => {
            warn!("Failed to read event stream: {}", e);
            break;
          }
        }
      }
    });

    Self { rx }
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
