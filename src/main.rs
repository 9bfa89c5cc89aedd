mod agent;
mod cache;
mod commands;
mod config;
mod event;
mod host;
mod http;
mod native;
mod net;
mod runtime;
#[cfg(test)]
mod testing;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use commands::Command;

#[derive(Parser, Debug)]
#[command(name = "offline-agent")]
#[command(about = "Network-first offline cache agent for a web application")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offline-agent/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Origin the application is served from
  #[arg(long, global = true)]
  origin: Option<String>,

  /// Keep caches in memory instead of the cache database
  #[arg(long, global = true)]
  ephemeral: bool,

  /// Write logs to this file instead of stderr
  #[arg(long, global = true)]
  log_file: Option<PathBuf>,

  /// Enable debug logging
  #[arg(short, long, global = true)]
  debug: bool,

  #[command(subcommand)]
  command: Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_logging(args.debug, args.log_file.as_deref())?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override origin if specified on command line
  let config = if let Some(origin) = args.origin {
    config::Config { origin, ..config }
  } else {
    config
  };

  commands::run(config, args.ephemeral, args.command).await
}

/// Log to stderr, or to a file through a non-blocking writer.
///
/// The filter comes from `OFFLINE_AGENT_LOG` when set.
fn init_logging(debug: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let default_filter = if debug {
    "offline_agent=debug"
  } else {
    "offline_agent=info"
  };
  let filter = EnvFilter::try_from_env("OFFLINE_AGENT_LOG")
    .unwrap_or_else(|_| EnvFilter::new(default_filter));

  match log_file {
    Some(path) => {
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

      let appender = tracing_appender::rolling::never(dir, file_name);
      let (writer, guard) = tracing_appender::non_blocking(appender);

      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

      Ok(None)
    }
  }
}
