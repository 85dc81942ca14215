//! Push notification relay: payload display and click routing.

use color_eyre::Result;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Fixed fallbacks when the push payload omits title or body.
const DEFAULT_TITLE: &str = "糖尿病提醒";
const DEFAULT_BODY: &str = "请检查您的血糖记录";

const NOTIFICATION_TAG: &str = "diabetes-alert";

pub const ACTION_VIEW: &str = "view";
pub const ACTION_DISMISS: &str = "dismiss";

/// Fields drawn from a push-delivered JSON payload. Unknown fields are
/// ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushPayload {
  pub title: Option<String>,
  pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

/// A notification as handed to the display surface.
#[derive(Debug, Clone)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub tag: String,
  pub require_interaction: bool,
  pub actions: Vec<NotificationAction>,
}

/// Display surface for notifications and client-window control.
pub trait NotificationSink: Send + Sync {
  fn show(&self, notification: Notification) -> Result<()>;
  fn close(&self) -> Result<()>;
  fn open_window(&self, url: &str) -> Result<()>;
}

/// Production sink: notifications go to the log, window opens are logged.
pub struct LogSink;

impl NotificationSink for LogSink {
  fn show(&self, notification: Notification) -> Result<()> {
    info!(
      "Notification: {} - {}",
      notification.title, notification.body
    );
    Ok(())
  }

  fn close(&self) -> Result<()> {
    Ok(())
  }

  fn open_window(&self, url: &str) -> Result<()> {
    info!("Opening client window at {}", url);
    Ok(())
  }
}

/// Displays push-delivered messages and routes user interaction back to the
/// application.
pub struct NotificationRelay<N: NotificationSink> {
  sink: N,
  icon: String,
  root_url: String,
}

impl<N: NotificationSink> NotificationRelay<N> {
  pub fn new(sink: N, icon: String, root_url: String) -> Self {
    Self {
      sink,
      icon,
      root_url,
    }
  }

  /// Display a notification for a push payload. A null payload is skipped;
  /// a malformed one falls back to the fixed defaults.
  pub fn on_push(&self, payload: &serde_json::Value) {
    if payload.is_null() {
      debug!("Push event without payload");
      return;
    }

    let parsed: PushPayload = match serde_json::from_value(payload.clone()) {
      Ok(parsed) => parsed,
      Err(e) => {
        warn!("Malformed push payload: {}", e);
        PushPayload::default()
      }
    };

    let notification = Notification {
      title: parsed.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
      body: parsed.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
      icon: self.icon.clone(),
      badge: self.icon.clone(),
      tag: NOTIFICATION_TAG.to_string(),
      require_interaction: true,
      actions: vec![
        NotificationAction {
          action: ACTION_VIEW.to_string(),
          title: "查看详情".to_string(),
        },
        NotificationAction {
          action: ACTION_DISMISS.to_string(),
          title: "忽略".to_string(),
        },
      ],
    };

    if let Err(e) = self.sink.show(notification) {
      warn!("Failed to show notification: {}", e);
    }
  }

  /// Close the notification; "view" additionally opens the application root.
  pub fn on_click(&self, action: &str) {
    if let Err(e) = self.sink.close() {
      warn!("Failed to close notification: {}", e);
    }

    if action == ACTION_VIEW {
      if let Err(e) = self.sink.open_window(&self.root_url) {
        warn!("Failed to open client window: {}", e);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Mutex;

  #[derive(Default)]
  struct RecordingSink {
    shown: Mutex<Vec<Notification>>,
    opened: Mutex<Vec<String>>,
    closed: Mutex<usize>,
  }

  impl NotificationSink for RecordingSink {
    fn show(&self, notification: Notification) -> Result<()> {
      self.shown.lock().unwrap().push(notification);
      Ok(())
    }

    fn close(&self) -> Result<()> {
      *self.closed.lock().unwrap() += 1;
      Ok(())
    }

    fn open_window(&self, url: &str) -> Result<()> {
      self.opened.lock().unwrap().push(url.to_string());
      Ok(())
    }
  }

  fn relay() -> NotificationRelay<RecordingSink> {
    NotificationRelay::new(
      RecordingSink::default(),
      "/generated-icon.png".to_string(),
      "http://localhost:8000".to_string(),
    )
  }

  #[test]
  fn test_payload_fields_are_displayed() {
    let relay = relay();

    relay.on_push(&serde_json::json!({"title": "T", "body": "B"}));

    let shown = relay.sink.shown.lock().unwrap();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].title, "T");
    assert_eq!(shown[0].body, "B");
    assert!(shown[0].require_interaction);
  }

  #[test]
  fn test_missing_fields_fall_back_to_defaults() {
    let relay = relay();

    relay.on_push(&serde_json::json!({}));

    let shown = relay.sink.shown.lock().unwrap();
    assert_eq!(shown[0].title, "糖尿病提醒");
    assert_eq!(shown[0].body, "请检查您的血糖记录");
  }

  #[test]
  fn test_null_payload_shows_nothing() {
    let relay = relay();

    relay.on_push(&serde_json::Value::Null);

    assert!(relay.sink.shown.lock().unwrap().is_empty());
  }

  #[test]
  fn test_malformed_payload_uses_defaults() {
    let relay = relay();

    relay.on_push(&serde_json::json!(["not", "an", "object"]));

    let shown = relay.sink.shown.lock().unwrap();
    assert_eq!(shown[0].title, "糖尿病提醒");
  }

  #[test]
  fn test_notification_carries_view_and_dismiss_actions() {
    let relay = relay();

    relay.on_push(&serde_json::json!({"title": "T"}));

    let shown = relay.sink.shown.lock().unwrap();
    let actions: Vec<&str> = shown[0].actions.iter().map(|a| a.action.as_str()).collect();
    assert_eq!(actions, vec![ACTION_VIEW, ACTION_DISMISS]);
  }

  #[test]
  fn test_view_click_opens_root() {
    let relay = relay();

    relay.on_click(ACTION_VIEW);

    assert_eq!(*relay.sink.closed.lock().unwrap(), 1);
    assert_eq!(
      *relay.sink.opened.lock().unwrap(),
      vec!["http://localhost:8000".to_string()]
    );
  }

  #[test]
  fn test_dismiss_click_only_closes() {
    let relay = relay();

    relay.on_click(ACTION_DISMISS);

    assert_eq!(*relay.sink.closed.lock().unwrap(), 1);
    assert!(relay.sink.opened.lock().unwrap().is_empty());
  }
}
