//! Fakes for exercising the agent without a network.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

use crate::agent::{AgentSettings, OfflineAgent};
use crate::cache::MemoryStorage;
use crate::config::Config;
use crate::host::{Host, Network};
use crate::http::{Request, Response};
use crate::native::{LocalClients, NotificationCenter, WorkerRegistration};

pub const ORIGIN: &str = "https://studio.example";

pub fn url(path: &str) -> Url {
  Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

/// Network serving canned responses; can be switched offline.
#[derive(Default)]
pub struct StubNetwork {
  routes: Mutex<HashMap<String, Response>>,
  offline: AtomicBool,
  calls: AtomicUsize,
}

impl StubNetwork {
  pub fn route(&self, path: &str, status: u16, body: &str) {
    let url = url(path);
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), Response::new(url.as_str(), status, body));
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl Network for StubNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("Failed to fetch {}: offline", request.url));
    }
    Ok(
      self
        .routes
        .lock()
        .unwrap()
        .get(request.url.as_str())
        .cloned()
        .unwrap_or_else(|| Response::new(request.url.as_str(), 404, "Not Found")),
    )
  }
}

/// An agent wired to in-memory fakes, with handles to inspect them.
pub struct Harness {
  pub agent: OfflineAgent,
  pub caches: Arc<MemoryStorage>,
  pub network: Arc<StubNetwork>,
  pub notifications: Arc<NotificationCenter>,
  pub clients: Arc<LocalClients>,
  pub registration: Arc<WorkerRegistration>,
}

impl Harness {
  pub fn new() -> Self {
    Self::with_config(Config {
      origin: ORIGIN.to_string(),
      ..Config::default()
    })
  }

  pub fn with_config(config: Config) -> Self {
    let settings = AgentSettings::from_config(&config).unwrap();
    let caches = Arc::new(MemoryStorage::new());
    let network = Arc::new(StubNetwork::default());
    let notifications = Arc::new(NotificationCenter::new());
    let clients = Arc::new(LocalClients::new(settings.origin.clone()));
    let registration = Arc::new(WorkerRegistration::new());

    let host = Host {
      caches: caches.clone(),
      network: network.clone(),
      notifications: notifications.clone(),
      clients: clients.clone(),
      registration: registration.clone(),
    };

    Self {
      agent: OfflineAgent::new(settings, host),
      caches,
      network,
      notifications,
      clients,
      registration,
    }
  }

  /// Serve the application shell so install can seed it.
  pub fn serve_shell(&self) {
    self.network.route("/", 200, "<html>root</html>");
    self.network.route("/index.html", 200, "<html>index</html>");
    self.network.route("/manifest.json", 200, "{}");
  }
}
