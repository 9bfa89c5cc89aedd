//! In-process implementations of the notification, client and registration
//! contracts, used when the agent runs outside a browser.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::info;
use url::Url;

use crate::host::{Clients, Notification, NotificationOptions, Notifications, Registration};

/// Keeps the notifications currently on screen.
#[derive(Default)]
pub struct NotificationCenter {
  active: Mutex<Vec<Notification>>,
  next_id: AtomicU64,
}

impl NotificationCenter {
  pub fn new() -> Self {
    Self::default()
  }
}

#[cfg(test)]
impl NotificationCenter {
  /// Notifications shown and not yet closed, oldest first.
  pub fn active(&self) -> Vec<Notification> {
    self.active.lock().unwrap().clone()
  }
}

#[async_trait]
impl Notifications for NotificationCenter {
  async fn show(&self, title: &str, options: NotificationOptions) -> Result<Notification> {
    let notification = Notification {
      id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
      title: title.to_string(),
      options,
    };

    let mut active = self.active.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    // Same tag replaces the previous notification
    active.retain(|n| n.options.tag != notification.options.tag);
    active.push(notification.clone());

    info!(
      id = notification.id,
      title = %notification.title,
      body = %notification.options.body,
      tag = %notification.options.tag,
      "notification shown"
    );
    Ok(notification)
  }

  async fn close(&self, notification: &Notification) -> Result<()> {
    let mut active = self.active.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    active.retain(|n| n.id != notification.id);
    info!(id = notification.id, "notification closed");
    Ok(())
  }
}

/// Views controlled from this process.
pub struct LocalClients {
  origin: Url,
  claimed: AtomicBool,
  windows: Mutex<Vec<Url>>,
}

impl LocalClients {
  pub fn new(origin: Url) -> Self {
    Self {
      origin,
      claimed: AtomicBool::new(false),
      windows: Mutex::new(Vec::new()),
    }
  }

  /// Windows opened so far, as absolute URLs.
  pub fn windows(&self) -> Vec<Url> {
    self
      .windows
      .lock()
      .map(|windows| windows.clone())
      .unwrap_or_default()
  }
}

#[async_trait]
impl Clients for LocalClients {
  async fn claim(&self) -> Result<()> {
    self.claimed.store(true, Ordering::SeqCst);
    info!("claimed open clients");
    Ok(())
  }

  async fn open_window(&self, url: &str) -> Result<()> {
    let url = self
      .origin
      .join(url)
      .map_err(|e| eyre!("Invalid window URL '{}': {}", url, e))?;

    let mut windows = self.windows.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    if windows.contains(&url) {
      info!(url = %url, "focusing window");
    } else {
      info!(url = %url, "opening window");
      windows.push(url);
    }
    Ok(())
  }
}

#[cfg(test)]
impl LocalClients {
  pub fn is_claimed(&self) -> bool {
    self.claimed.load(Ordering::SeqCst)
  }
}

/// Registration state the runtime consults between events.
#[derive(Default)]
pub struct WorkerRegistration {
  skip_waiting: AtomicBool,
}

impl WorkerRegistration {
  pub fn new() -> Self {
    Self::default()
  }

  /// Consume a pending skip-waiting request.
  pub fn take_skip_waiting(&self) -> bool {
    self.skip_waiting.swap(false, Ordering::SeqCst)
  }
}

impl Registration for WorkerRegistration {
  fn skip_waiting(&self) {
    self.skip_waiting.store(true, Ordering::SeqCst);
  }
}
