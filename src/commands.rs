//! CLI commands driving the agent through the worker runtime.

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

use crate::agent::{AgentSettings, OfflineAgent};
use crate::cache::{CacheStorage, MemoryStorage, SqliteStorage};
use crate::config::Config;
use crate::event::{Event, EventResult};
use crate::host::Host;
use crate::http::Request;
use crate::native::{LocalClients, NotificationCenter, WorkerRegistration};
use crate::net::ReqwestNetwork;
use crate::runtime::WorkerRuntime;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Install the configured cache generation and activate it
  Install,

  /// Route one request through the agent
  Fetch {
    /// Absolute URL, or a path relative to the origin
    url: String,

    /// Treat the request as a page navigation
    #[arg(long)]
    navigate: bool,

    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Extra request header as `name: value` (repeatable)
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Write the body to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
  },

  /// Post a control message, e.g. '{"type":"SKIP_WAITING"}'
  Message { json: String },

  /// Fire a background sync event
  Sync {
    /// Sync tag (defaults to the configured tag)
    tag: Option<String>,
  },

  /// Deliver a push message
  Push {
    /// JSON payload; omit for a push without data
    payload: Option<String>,

    /// Click the shown notification: "open", "close", or "" for the body
    #[arg(long)]
    click: Option<String>,
  },

  /// List cache generations
  Caches {
    /// Also list the entries of each cache
    #[arg(long)]
    entries: bool,
  },
}

pub async fn run(config: Config, ephemeral: bool, command: Command) -> Result<()> {
  let settings = AgentSettings::from_config(&config)?;
  let caches = open_storage(&config, ephemeral)?;

  if let Command::Caches { entries } = command {
    let mut out = std::io::stdout().lock();
    return list_caches(caches.as_ref(), &settings.cache_name, entries, &mut out);
  }

  let clients = Arc::new(LocalClients::new(settings.origin.clone()));
  let registration = Arc::new(WorkerRegistration::new());
  let host = Host {
    caches,
    network: Arc::new(ReqwestNetwork::new(concat!(
      "offline-agent/",
      env!("CARGO_PKG_VERSION")
    ))?),
    notifications: Arc::new(NotificationCenter::new()),
    clients: clients.clone(),
    registration: registration.clone(),
  };

  let agent = OfflineAgent::new(settings, host);
  let runtime = WorkerRuntime::spawn(agent.clone(), registration);

  let result = execute(&runtime, &agent, &clients, command).await;

  // Always drain background cache writes, even after a failed command
  runtime.shutdown().await?;
  result
}

/// In-memory stores when ephemeral, otherwise the cache database.
fn open_storage(config: &Config, ephemeral: bool) -> Result<Arc<dyn CacheStorage>> {
  if ephemeral {
    return Ok(Arc::new(MemoryStorage::new()));
  }

  let storage = match &config.database {
    Some(path) => SqliteStorage::open_at(path)?,
    None => SqliteStorage::open_default()?,
  };
  Ok(Arc::new(storage))
}

async fn execute(
  runtime: &WorkerRuntime,
  agent: &OfflineAgent,
  clients: &LocalClients,
  command: Command,
) -> Result<()> {
  if let Command::Install = command {
    runtime.update().await?;
    println!("{}: {:?}", agent.settings().cache_name, runtime.state());
    return Ok(());
  }

  runtime.register().await?;

  match command {
    Command::Fetch {
      url,
      navigate,
      method,
      headers,
      output,
    } => {
      let request = build_request(&agent.settings().origin, &url, navigate, &method, &headers)?;
      let (response, source) = runtime.fetch(request).await?;

      eprintln!(
        "{} {} ({:?}, {}, {} bytes)",
        response.status,
        response.status_text,
        source,
        response.header("content-type").unwrap_or("no content type"),
        response.body.len()
      );

      match output {
        Some(path) => std::fs::write(&path, &response.body)
          .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?,
        None => std::io::stdout()
          .write_all(&response.body)
          .map_err(|e| eyre!("Failed to write response body: {}", e))?,
      }
    }
    Command::Message { json } => {
      let data = serde_json::from_str(&json).map_err(|e| eyre!("Invalid message JSON: {}", e))?;
      runtime.dispatch(Event::Message(data)).await?;
    }
    Command::Sync { tag } => {
      let tag = tag.unwrap_or_else(|| agent.settings().sync_tag.clone());
      runtime.dispatch(Event::Sync { tag }).await?;
    }
    Command::Push { payload, click } => {
      let shown = runtime
        .dispatch(Event::Push {
          data: payload.map(String::into_bytes),
        })
        .await?;

      let notification = match shown {
        EventResult::Notification(Some(notification)) => notification,
        _ => {
          println!("no notification shown");
          return Ok(());
        }
      };

      println!(
        "[{}] {}: {}",
        notification.options.tag, notification.title, notification.options.body
      );

      if let Some(action) = click {
        runtime
          .dispatch(Event::NotificationClick {
            notification,
            action,
          })
          .await?;
        for window in clients.windows() {
          println!("opened {}", window);
        }
      }
    }
    Command::Install | Command::Caches { .. } => {}
  }

  Ok(())
}

fn build_request(
  origin: &Url,
  url: &str,
  navigate: bool,
  method: &str,
  headers: &[String],
) -> Result<Request> {
  let url = origin
    .join(url)
    .map_err(|e| eyre!("Invalid URL '{}': {}", url, e))?;
  let method = Method::from_bytes(method.to_uppercase().as_bytes())
    .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;

  let mut request = if navigate {
    Request::navigate(url)
  } else {
    Request::get(url)
  }
  .with_method(method);

  for header in headers {
    let (name, value) = header
      .split_once(':')
      .ok_or_else(|| eyre!("Invalid header '{}', expected 'name: value'", header))?;
    request = request.with_header(name.trim(), value.trim());
  }

  Ok(request)
}

/// One line per cache, the current generation marked with `*`.
fn list_caches(
  caches: &dyn CacheStorage,
  current: &str,
  entries: bool,
  out: &mut impl Write,
) -> Result<()> {
  for name in caches.keys()? {
    let marker = if name == current { "*" } else { " " };
    writeln!(out, "{} {}", marker, name).map_err(|e| eyre!("Failed to write listing: {}", e))?;

    if entries {
      for entry in caches.entries(&name)? {
        writeln!(
          out,
          "    {} {} {}B {}",
          entry.status,
          entry.url,
          entry.size,
          entry.cached_at.format("%Y-%m-%d %H:%M:%S")
        )
        .map_err(|e| eyre!("Failed to write listing: {}", e))?;
      }
    }
  }
  Ok(())
}
