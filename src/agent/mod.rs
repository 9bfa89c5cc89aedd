//! The offline cache agent.
//!
//! A set of independent event handlers keyed off one immutable cache
//! generation name:
//! - install seeds the application shell into the current generation
//! - activate purges every other generation and claims open views
//! - fetch is network-first with a cache fallback
//! - message, sync and push relay control signals and notifications

mod control;
mod fetch;
mod lifecycle;
mod push;

use color_eyre::{eyre::eyre, Result};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::warn;
use url::Url;

use crate::config::{Config, NotificationConfig};
use crate::host::Host;
use crate::http::Response;

pub use fetch::ExclusionRules;

/// Immutable settings injected when the agent is registered.
#[derive(Debug, Clone)]
pub struct AgentSettings {
  pub origin: Url,
  /// The current cache generation
  pub cache_name: String,
  pub app_version: String,
  pub precache: Vec<Url>,
  pub offline_document: Url,
  pub exclude: ExclusionRules,
  pub sync_tag: String,
  pub notifications: NotificationConfig,
}

impl AgentSettings {
  /// Resolve configured paths against the origin.
  pub fn from_config(config: &Config) -> Result<Self> {
    let origin = Url::parse(&config.origin)
      .map_err(|e| eyre!("Invalid origin '{}': {}", config.origin, e))?;

    let resolve = |path: &str| {
      origin
        .join(path)
        .map_err(|e| eyre!("Invalid URL '{}': {}", path, e))
    };

    let precache = config
      .precache
      .iter()
      .map(|path| resolve(path))
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      cache_name: config.cache_name.clone(),
      app_version: config.app_version.clone(),
      precache,
      offline_document: resolve(&config.offline_document)?,
      exclude: ExclusionRules::from_config(&config.exclude),
      sync_tag: config.sync_tag.clone(),
      notifications: config.notifications.clone(),
      origin,
    })
  }
}

/// Where a response handed back to a view came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Live network response, through the agent
  Network,
  /// Exact match from a cache store
  Cache,
  /// Cached offline document served to a failed navigation
  OfflineDocument,
  /// Synthesized 503
  Offline,
  /// The agent did not intervene; the host fetched on its own
  Passthrough,
}

/// Result of the fetch handler.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
  /// Let the host perform its default fetch
  Passthrough,
  Respond {
    response: Response,
    source: ResponseSource,
  },
}

/// Handles for work that outlives the event that started it.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
  handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundTasks {
  /// Run blocking work on the blocking pool without awaiting it.
  pub fn spawn_blocking<F>(&self, work: F)
  where
    F: FnOnce() + Send + 'static,
  {
    self.track(tokio::task::spawn_blocking(work));
  }

  fn track(&self, handle: JoinHandle<()>) {
    match self.handles.lock() {
      Ok(mut handles) => {
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
      }
      // Untracked tasks still run, they just cannot be flushed
      Err(e) => warn!(error = %e, "background task registry poisoned"),
    }
  }

  /// Wait for every task spawned so far.
  pub async fn flush(&self) {
    let handles: Vec<_> = match self.handles.lock() {
      Ok(mut handles) => handles.drain(..).collect(),
      Err(_) => return,
    };

    for handle in handles {
      if let Err(e) = handle.await {
        warn!(error = %e, "background task failed");
      }
    }
  }
}

/// The offline cache agent.
///
/// Handlers share nothing mutable: the settings are read-only and every
/// side effect goes through the host.
#[derive(Clone)]
pub struct OfflineAgent {
  settings: Arc<AgentSettings>,
  host: Host,
  background: BackgroundTasks,
}

impl OfflineAgent {
  pub fn new(settings: AgentSettings, host: Host) -> Self {
    Self {
      settings: Arc::new(settings),
      host,
      background: BackgroundTasks::default(),
    }
  }

  pub fn settings(&self) -> &AgentSettings {
    &self.settings
  }

  pub fn host(&self) -> &Host {
    &self.host
  }

  /// Wait for fire-and-forget cache writes to land.
  pub async fn flush_background(&self) {
    self.background.flush().await;
  }
}
