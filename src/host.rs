//! Contracts the hosting runtime provides to the agent.

use async_trait::async_trait;
use color_eyre::Result;
use std::sync::Arc;

use crate::cache::CacheStorage;
use crate::http::{Request, Response};

/// Performs real network fetches. An `Err` means the fetch was rejected
/// (offline, DNS failure, connection reset), never an HTTP error status.
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// A button shown on a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

/// Display options for a system notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationOptions {
  pub body: String,
  pub icon: String,
  pub badge: String,
  /// De-duplication key: a new notification replaces one with the same tag
  pub tag: String,
  /// Where the `open` action navigates to
  pub url: String,
  pub actions: Vec<NotificationAction>,
}

/// A notification currently shown by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub id: u64,
  pub title: String,
  pub options: NotificationOptions,
}

#[async_trait]
pub trait Notifications: Send + Sync {
  async fn show(&self, title: &str, options: NotificationOptions) -> Result<Notification>;

  async fn close(&self, notification: &Notification) -> Result<()>;
}

/// The views (tabs, windows) the agent can control.
#[async_trait]
pub trait Clients: Send + Sync {
  /// Take control of every open view without a reload.
  async fn claim(&self) -> Result<()>;

  /// Open a new window at `url`, or focus one already showing it.
  async fn open_window(&self, url: &str) -> Result<()>;
}

/// The agent's own registration with the host.
pub trait Registration: Send + Sync {
  /// Ask to become active without waiting for existing views to close.
  fn skip_waiting(&self);
}

/// Every host service the agent talks to.
#[derive(Clone)]
pub struct Host {
  pub caches: Arc<dyn CacheStorage>,
  pub network: Arc<dyn Network>,
  pub notifications: Arc<dyn Notifications>,
  pub clients: Arc<dyn Clients>,
  pub registration: Arc<dyn Registration>,
}
