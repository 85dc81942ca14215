mod agent;
mod cache;
mod config;
mod event;
mod http;
mod lifecycle;
mod notify;
mod router;
mod sync;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "offworker")]
#[command(about = "Offline-caching request agent, driven by platform events on stdin")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offworker/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Path to the cache database (default: platform data directory)
  #[arg(long)]
  database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  // Stdout carries fetch outcomes; logs go to stderr
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  let config = config::Config::load(args.config.as_deref())?;

  let storage = match &args.database {
    Some(path) => cache::SqliteStorage::open_at(path)?,
    None => cache::SqliteStorage::open()?,
  };

  let mut agent = agent::Agent::new(config, storage)?;
  agent.run(event::EventHandler::new()).await?;

  Ok(())
}
