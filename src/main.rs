use clap::{Parser, Subcommand};
use color_eyre::Result;
use hrdata::cache::{CacheKey, Ttl};
use hrdata::{CachedApi, Config};
use serde_json::Value;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "hrdata")]
#[command(about = "Inspect and maintain the HR API client cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/hrdata/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Also log to stderr
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show memory and disk usage of the cache
  Stats,
  /// Delete expired records from the durable cache
  Sweep,
  /// Delete every cached record
  Clear,
  /// Fetch an endpoint through the cache and print the payload
  Get {
    /// Endpoint relative to the configured base URL (e.g. "employees?page=1")
    endpoint: String,
    /// TTL category: short, medium, long or extended
    #[arg(long, default_value = "medium")]
    ttl: Ttl,
    /// Skip the cache and refetch
    #[arg(long)]
    refresh: bool,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let _log_guard = hrdata::logging::init(&hrdata::logging::default_log_dir()?, args.verbose)?;

  let config = Config::load(args.config.as_deref())?;
  let api = CachedApi::from_config(&config)?;

  match args.command {
    Command::Stats => {
      let stats = api.statistics();
      println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    Command::Sweep => {
      let removed = api.store().sweep_expired();
      println!("Removed {} expired records", removed);
    }
    Command::Clear => {
      api.clear_all();
      println!("Cache cleared");
    }
    Command::Get {
      endpoint,
      ttl,
      refresh,
    } => {
      let key = CacheKey::builder("get").param(&endpoint).build();
      info!(%endpoint, %key, "CLI fetch");
      let result = api
        .get_json_with_provenance::<Value>(&endpoint, &key, ttl, refresh)
        .await?;
      eprintln!("source: {:?}", result.source);
      println!("{}", serde_json::to_string_pretty(&result.value)?);
    }
  }

  Ok(())
}
