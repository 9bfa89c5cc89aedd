use serde_json::Value;

use crate::agent::ResponseSource;
use crate::host::Notification;
use crate::http::{Request, Response};

/// Events the host delivers to the agent.
///
/// Activation is not among them: the runtime runs it when it promotes a
/// waiting worker.
#[derive(Debug)]
pub enum Event {
  /// A new generation is being installed
  Install,
  /// A controlled view issued a request
  Fetch(Request),
  /// A view posted a message
  Message(Value),
  /// Background sync fired for a tag
  Sync { tag: String },
  /// Push message arrived, possibly without payload
  Push { data: Option<Vec<u8>> },
  /// User clicked a notification; empty action means the body
  NotificationClick {
    notification: Notification,
    action: String,
  },
}

impl Event {
  pub fn name(&self) -> &'static str {
    match self {
      Event::Install => "install",
      Event::Fetch(_) => "fetch",
      Event::Message(_) => "message",
      Event::Sync { .. } => "sync",
      Event::Push { .. } => "push",
      Event::NotificationClick { .. } => "notificationclick",
    }
  }
}

/// What handling an event produced
#[derive(Debug)]
pub enum EventResult {
  Done,
  Response {
    response: Response,
    source: ResponseSource,
  },
  Notification(Option<Notification>),
}
