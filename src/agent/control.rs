//! Control messages and background sync.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::OfflineAgent;

/// Messages controlled views may post to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
  /// Activate the waiting generation now
  #[serde(rename = "SKIP_WAITING")]
  SkipWaiting,
}

impl OfflineAgent {
  /// Handle a posted message. Anything but a known control message is ignored.
  pub fn on_message(&self, data: &Value) -> Option<ControlMessage> {
    match ControlMessage::deserialize(data) {
      Ok(ControlMessage::SkipWaiting) => {
        info!("skip waiting requested");
        self.host.registration.skip_waiting();
        Some(ControlMessage::SkipWaiting)
      }
      Err(_) => {
        debug!(message = %data, "ignoring unrecognized message");
        None
      }
    }
  }

  /// Acknowledge a background sync. No deferred work is queued.
  pub fn on_sync(&self, tag: &str) -> bool {
    if tag == self.settings.sync_tag {
      info!(tag, "background sync");
      true
    } else {
      debug!(tag, "ignoring unknown sync tag");
      false
    }
  }
}
