use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin the application is served from; relative URLs resolve against it
  pub origin: String,
  /// Current cache generation. Every other cache is purged on activation.
  pub cache_name: String,
  pub app_version: String,
  /// Application shell cached at install
  pub precache: Vec<String>,
  /// Served to navigations that miss the cache while offline
  pub offline_document: String,
  pub exclude: ExcludeConfig,
  /// Background sync tag that gets acknowledged
  pub sync_tag: String,
  pub notifications: NotificationConfig,
  /// Cache database location (defaults to $XDG_DATA_HOME/offline-agent/caches.db)
  pub database: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:8080".to_string(),
      cache_name: "makerai-v1.0".to_string(),
      app_version: "1.0.0".to_string(),
      precache: vec![
        "/".to_string(),
        "/index.html".to_string(),
        "/manifest.json".to_string(),
      ],
      offline_document: "/index.html".to_string(),
      exclude: ExcludeConfig::default(),
      sync_tag: "sync-data".to_string(),
      notifications: NotificationConfig::default(),
      database: None,
    }
  }
}

/// Requests the agent never intercepts.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExcludeConfig {
  /// Substrings of the URL path
  pub path_contains: Vec<String>,
  /// URL schemes (browser extensions)
  pub schemes: Vec<String>,
  /// `host:port` pairs (dev live-reload servers)
  pub hosts: Vec<String>,
}

impl Default for ExcludeConfig {
  fn default() -> Self {
    Self {
      path_contains: vec!["chrome-extension".to_string(), "sockjs-node".to_string()],
      schemes: vec!["chrome-extension".to_string(), "moz-extension".to_string()],
      hosts: vec!["localhost:35729".to_string()],
    }
  }
}

/// Defaults applied to push payloads that omit a field.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
  /// Title used when the payload has none
  pub app_name: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub tag: String,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      app_name: "MakerAI Studio".to_string(),
      body: "New update available".to_string(),
      icon: "/icons/icon-192x192.png".to_string(),
      badge: "/icons/icon-96x96.png".to_string(),
      tag: "makerai-update".to_string(),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offline-agent.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offline-agent/config.yaml
  ///
  /// Without any file the built-in defaults apply. `OFFLINE_AGENT_ORIGIN`
  /// overrides the origin either way.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };

    Ok(config.with_env_overrides())
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("offline-agent.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offline-agent").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  fn with_env_overrides(self) -> Self {
    match std::env::var("OFFLINE_AGENT_ORIGIN") {
      Ok(origin) if !origin.is_empty() => Config { origin, ..self },
      _ => self,
    }
  }
}
