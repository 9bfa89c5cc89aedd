//! Install and activate handlers.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use tracing::{error, info};

use super::OfflineAgent;
use crate::http::{Request, Response};

impl OfflineAgent {
  /// Seed the current generation with the application shell.
  ///
  /// Skip-waiting is requested up front so the new generation takes over as
  /// soon as installation ends. A seeding failure is logged and swallowed:
  /// the install still completes with a partially filled cache.
  pub async fn on_install(&self) -> Result<()> {
    info!(version = %self.settings.app_version, "agent installing");

    self.host.registration.skip_waiting();

    match self.precache().await {
      Ok(count) => info!(cache = %self.settings.cache_name, entries = count, "install complete"),
      Err(e) => error!(cache = %self.settings.cache_name, error = %e, "install seeding failed"),
    }

    Ok(())
  }

  /// Open the current cache and add every shell URL, all or nothing.
  async fn precache(&self) -> Result<usize> {
    let name = &self.settings.cache_name;
    self.host.caches.open(name)?;
    info!(cache = %name, "initial cache created");

    let requests: Vec<Request> = self
      .settings
      .precache
      .iter()
      .map(|url| Request::get(url.clone()))
      .collect();

    let responses =
      try_join_all(requests.iter().map(|request| self.fetch_for_precache(request))).await?;

    for (request, response) in requests.iter().zip(&responses) {
      self.host.caches.put(name, request, response)?;
    }

    Ok(responses.len())
  }

  async fn fetch_for_precache(&self, request: &Request) -> Result<Response> {
    let response = self.host.network.fetch(request).await?;
    if !response.ok() {
      return Err(eyre!(
        "Failed to precache {}: status {}",
        request.url,
        response.status
      ));
    }
    Ok(response)
  }

  /// Delete every cache generation but the current one, then take control of
  /// the open views.
  pub async fn on_activate(&self) -> Result<()> {
    info!("agent activating");

    let current = &self.settings.cache_name;
    for name in self.host.caches.keys()? {
      if &name != current {
        info!(cache = %name, "removing old cache");
        self.host.caches.delete(&name)?;
      }
    }

    info!("activation complete");
    self.host.clients.claim().await
  }
}
