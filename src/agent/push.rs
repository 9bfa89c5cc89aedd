//! Push payloads and notification interaction.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::OfflineAgent;
use crate::config::NotificationConfig;
use crate::host::{Notification, NotificationAction, NotificationOptions};

/// Fields read from the JSON body of a push message. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushPayload {
  pub title: Option<String>,
  pub body: Option<String>,
  pub icon: Option<String>,
  pub badge: Option<String>,
  pub tag: Option<String>,
  pub url: Option<String>,
}

impl PushPayload {
  /// Parse a push body. Invalid JSON and `null` are rejected; any other
  /// JSON value is accepted, and a non-object simply carries no fields.
  pub fn parse(data: &[u8]) -> Result<Self> {
    let value: Value =
      serde_json::from_slice(data).map_err(|e| eyre!("Failed to parse push payload: {}", e))?;
    if value.is_null() {
      return Err(eyre!("Push payload is null"));
    }
    Ok(Self::from_value(&value))
  }

  fn from_value(value: &Value) -> Self {
    let field = |name: &str| value.get(name).and_then(truthy_text);
    Self {
      title: field("title"),
      body: field("body"),
      icon: field("icon"),
      badge: field("badge"),
      tag: field("tag"),
      url: field("url"),
    }
  }

  /// Title and options with defaults filled in for missing fields.
  pub fn into_notification(self, defaults: &NotificationConfig) -> (String, NotificationOptions) {
    let or = |value: Option<String>, default: &str| value.unwrap_or_else(|| default.to_string());

    let options = NotificationOptions {
      body: or(self.body, &defaults.body),
      icon: or(self.icon, &defaults.icon),
      badge: or(self.badge, &defaults.badge),
      tag: or(self.tag, &defaults.tag),
      url: or(self.url, "/"),
      actions: vec![
        NotificationAction {
          action: "open".to_string(),
          title: "Open".to_string(),
        },
        NotificationAction {
          action: "close".to_string(),
          title: "Close".to_string(),
        },
      ],
    };

    (or(self.title, &defaults.app_name), options)
  }
}

/// Text of a scalar field, or `None` where a default should apply: empty
/// strings, `0`, `false`, `null`, arrays and objects.
fn truthy_text(value: &Value) -> Option<String> {
  match value {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
    Value::Bool(true) => Some("true".to_string()),
    _ => None,
  }
}

impl OfflineAgent {
  /// Show a notification for a push message.
  ///
  /// Returns `None` when nothing was shown: an absent or empty payload,
  /// invalid JSON, or a JSON `null`.
  pub async fn on_push(&self, data: Option<&[u8]>) -> Result<Option<Notification>> {
    let Some(data) = data.filter(|d| !d.is_empty()) else {
      debug!("push without payload ignored");
      return Ok(None);
    };

    let payload = match PushPayload::parse(data) {
      Ok(payload) => payload,
      Err(e) => {
        warn!(error = %e, "malformed push payload ignored");
        return Ok(None);
      }
    };

    let (title, options) = payload.into_notification(&self.settings.notifications);
    let notification = self.host.notifications.show(&title, options).await?;
    Ok(Some(notification))
  }

  /// React to a click on a notification or one of its actions.
  ///
  /// `action` is empty for a click on the notification body.
  pub async fn on_notification_click(&self, notification: &Notification, action: &str) -> Result<()> {
    self.host.notifications.close(notification).await?;

    if action == "open" {
      info!(url = %notification.options.url, "opening notification target");
      self
        .host
        .clients
        .open_window(&notification.options.url)
        .await?;
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{url, Harness};

  #[test]
  fn test_defaults_fill_missing_fields() {
    let (title, options) = PushPayload::default().into_notification(&NotificationConfig::default());
    assert_eq!(title, "MakerAI Studio");
    assert_eq!(options.body, "New update available");
    assert_eq!(options.icon, "/icons/icon-192x192.png");
    assert_eq!(options.badge, "/icons/icon-96x96.png");
    assert_eq!(options.tag, "makerai-update");
    assert_eq!(options.url, "/");
    let actions: Vec<_> = options.actions.iter().map(|a| a.action.as_str()).collect();
    assert_eq!(actions, vec!["open", "close"]);
  }

  #[test]
  fn test_empty_strings_fall_back_to_defaults() {
    let payload = PushPayload::parse(br#"{"title": "", "body": null, "tag": "release"}"#).unwrap();
    let (title, options) = payload.into_notification(&NotificationConfig::default());
    assert_eq!(title, "MakerAI Studio");
    assert_eq!(options.body, "New update available");
    assert_eq!(options.tag, "release");
  }

  #[test]
  fn test_unknown_fields_are_ignored() {
    let payload = PushPayload::parse(br#"{"title": "Hi", "priority": 5}"#).unwrap();
    assert_eq!(payload.title.as_deref(), Some("Hi"));
  }

  #[test]
  fn test_scalar_fields_are_stringified() {
    let payload = PushPayload::parse(
      br#"{"title": 5, "body": 0, "tag": true, "url": false, "icon": ["x"], "badge": {}}"#,
    )
    .unwrap();
    let (title, options) = payload.into_notification(&NotificationConfig::default());

    assert_eq!(title, "5");
    assert_eq!(options.body, "New update available");
    assert_eq!(options.tag, "true");
    assert_eq!(options.url, "/");
    assert_eq!(options.icon, "/icons/icon-192x192.png");
    assert_eq!(options.badge, "/icons/icon-96x96.png");
  }

  #[test]
  fn test_non_object_payload_has_no_fields() {
    assert_eq!(PushPayload::parse(b"[1, 2]").unwrap(), PushPayload::default());
    assert_eq!(PushPayload::parse(br#""hi""#).unwrap(), PushPayload::default());
    assert_eq!(PushPayload::parse(b"42").unwrap(), PushPayload::default());
  }

  #[test]
  fn test_null_and_invalid_json_are_rejected() {
    assert!(PushPayload::parse(b"null").is_err());
    assert!(PushPayload::parse(b"{\"title\":").is_err());
  }

  #[tokio::test]
  async fn test_push_without_payload_shows_nothing() {
    let harness = Harness::new();

    assert!(harness.agent.on_push(None).await.unwrap().is_none());
    assert!(harness.agent.on_push(Some(b"".as_slice())).await.unwrap().is_none());
    assert!(harness.notifications.active().is_empty());
  }

  #[tokio::test]
  async fn test_malformed_payload_shows_nothing() {
    let harness = Harness::new();

    assert!(harness.agent.on_push(Some(b"not json".as_slice())).await.unwrap().is_none());
    assert!(harness.agent.on_push(Some(b"null".as_slice())).await.unwrap().is_none());
    assert!(harness.notifications.active().is_empty());
  }

  #[tokio::test]
  async fn test_array_payload_shows_default_notification() {
    let harness = Harness::new();

    let shown = harness.agent.on_push(Some(b"[1, 2]".as_slice())).await.unwrap().unwrap();

    assert_eq!(shown.title, "MakerAI Studio");
    assert_eq!(shown.options.body, "New update available");
    assert_eq!(shown.options.url, "/");
    assert_eq!(harness.notifications.active(), vec![shown]);
  }

  #[tokio::test]
  async fn test_numeric_title_is_shown_as_text() {
    let harness = Harness::new();

    let shown = harness
      .agent
      .on_push(Some(br#"{"title": 5}"#.as_slice()))
      .await
      .unwrap()
      .unwrap();

    assert_eq!(shown.title, "5");
  }

  #[tokio::test]
  async fn test_push_shows_notification_and_open_navigates() {
    let harness = Harness::new();
    let payload = br#"{ "title": "Update", "url": "/changelog" }"#;

    let notification = harness.agent.on_push(Some(payload.as_slice())).await.unwrap().unwrap();
    assert_eq!(notification.title, "Update");
    assert_eq!(harness.notifications.active(), vec![notification.clone()]);

    harness
      .agent
      .on_notification_click(&notification, "open")
      .await
      .unwrap();

    assert!(harness.notifications.active().is_empty());
    assert_eq!(harness.clients.windows(), vec![url("/changelog")]);
  }

  #[tokio::test]
  async fn test_body_click_closes_without_navigation() {
    let harness = Harness::new();
    let notification = harness
      .agent
      .on_push(Some(br#"{"url": "/news"}"#.as_slice()))
      .await
      .unwrap()
      .unwrap();

    harness.agent.on_notification_click(&notification, "").await.unwrap();

    assert!(harness.notifications.active().is_empty());
    assert!(harness.clients.windows().is_empty());
  }

  #[tokio::test]
  async fn test_close_action_does_not_navigate() {
    let harness = Harness::new();
    let notification = harness.agent.on_push(Some(b"{}".as_slice())).await.unwrap().unwrap();

    harness
      .agent
      .on_notification_click(&notification, "close")
      .await
      .unwrap();

    assert!(harness.clients.windows().is_empty());
  }
}
