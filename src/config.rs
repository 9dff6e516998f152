use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::cache::{TtlPolicy, DEFAULT_MEMORY_BYTES, DEFAULT_MEMORY_ITEMS};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL that endpoints are resolved against (e.g. "https://hr.example.com/api/")
  pub base_url: String,
  /// Per-request timeout. Unset means the HTTP client's default.
  #[serde(default)]
  pub timeout_secs: Option<u64>,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: "http://localhost/".to_string(),
      timeout_secs: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// When false the durable tier is disabled and only memory caching is used
  pub enabled: bool,
  /// Database location (defaults to $XDG_DATA_HOME/hrdata/cache.db)
  pub path: Option<PathBuf>,
  pub memory_max_items: usize,
  pub memory_max_bytes: usize,
  /// Delete expired durable records when the service starts
  pub sweep_on_start: bool,
  pub ttl: TtlConfig,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
      memory_max_items: DEFAULT_MEMORY_ITEMS,
      memory_max_bytes: DEFAULT_MEMORY_BYTES,
      sweep_on_start: true,
      ttl: TtlConfig::default(),
    }
  }
}

/// TTL category durations in seconds.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct TtlConfig {
  pub short_secs: i64,
  pub medium_secs: i64,
  pub long_secs: i64,
  pub extended_secs: i64,
}

impl Default for TtlConfig {
  fn default() -> Self {
    let policy = TtlPolicy::default();
    Self {
      short_secs: policy.short.num_seconds(),
      medium_secs: policy.medium.num_seconds(),
      long_secs: policy.long.num_seconds(),
      extended_secs: policy.extended.num_seconds(),
    }
  }
}

impl TtlConfig {
  pub fn policy(&self) -> TtlPolicy {
    TtlPolicy {
      short: Duration::seconds(self.short_secs),
      medium: Duration::seconds(self.medium_secs),
      long: Duration::seconds(self.long_secs),
      extended: Duration::seconds(self.extended_secs),
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./hrdata.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/hrdata/config.yaml
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

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/hrdata/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("hrdata.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("hrdata").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Get the API bearer token from the environment, if one is set.
  ///
  /// Obtaining and refreshing the token is the session layer's job; this only
  /// forwards whatever it left in HRDATA_API_TOKEN.
  pub fn get_api_token() -> Option<String> {
    std::env::var("HRDATA_API_TOKEN")
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}
