use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::cache::CorruptPolicy;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub upstream: UpstreamConfig,
  pub cache: CacheConfig,
  pub posts: PostsConfig,
  pub server: ServerConfig,
  pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
  /// Base url of the notes API
  pub url: String,
  /// Per-request timeout for upstream calls
  pub timeout_secs: u64,
  /// Fetch note detail when the list endpoint omits content
  pub fetch_details: bool,
  /// Maximum number of detail requests in flight during a cold fetch
  pub detail_concurrency: usize,
}

impl Default for UpstreamConfig {
  fn default() -> Self {
    Self {
      url: "https://api.hackmd.io/v1".to_string(),
      timeout_secs: 30,
      fetch_details: true,
      detail_concurrency: 4,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Disable to always go upstream
  pub enabled: bool,
  /// Location of the post collection file (default: $XDG_DATA_HOME/hackpost/posts_cache.json)
  pub path: Option<PathBuf>,
  /// What to do with a cache file that fails to parse
  pub on_corrupt: CorruptPolicy,
  /// Keep a timestamped copy of the cache file before a refresh removes it
  pub backups: bool,
  /// Backups kept per file before the oldest are pruned; 0 keeps all
  pub max_backups: usize,
  /// Where backups go (default: `backups/` next to the cache file)
  pub backup_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
      on_corrupt: CorruptPolicy::default(),
      backups: true,
      max_backups: 10,
      backup_dir: None,
    }
  }
}

impl CacheConfig {
  /// Resolved path of the cache file.
  pub fn cache_path(&self) -> Result<PathBuf> {
    match &self.path {
      Some(p) => Ok(p.clone()),
      None => Ok(data_dir()?.join("posts_cache.json")),
    }
  }

  /// Resolved backup directory.
  pub fn backup_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.backup_dir {
      return Ok(dir.clone());
    }
    let cache_path = self.cache_path()?;
    let parent = cache_path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| PathBuf::from("."));
    Ok(parent.join("backups"))
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostsConfig {
  /// Characters of content kept in a derived excerpt
  pub excerpt_length: usize,
}

impl Default for PostsConfig {
  fn default() -> Self {
    Self {
      excerpt_length: 150,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub bind: SocketAddr,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      bind: SocketAddr::from(([0, 0, 0, 0], 4050)),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// Default filter directive; RUST_LOG takes precedence
  pub filter: String,
  /// Also write logs to this file
  pub file: Option<PathBuf>,
  /// Emit JSON lines instead of human-readable output
  pub json: bool,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      filter: "info".to_string(),
      file: None,
      json: false,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./hackpost.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/hackpost/config.yaml
  ///
  /// Falls back to built-in defaults when no file is found.
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
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("hackpost.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("hackpost").join("config.yaml");
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

  fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file deserializes to null, which should mean "all defaults"
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Get the HackMD API token from environment variables.
  ///
  /// Checks HACKPOST_API_TOKEN first, then HACKMD_API_KEY as fallback.
  /// The token is optional: it is passed through to upstream, never validated.
  pub fn get_api_token() -> Option<String> {
    std::env::var("HACKPOST_API_TOKEN")
      .or_else(|_| std::env::var("HACKMD_API_KEY"))
      .ok()
      .filter(|t| !t.is_empty())
  }
}

/// Default data directory for the cache file.
fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("hackpost"))
}
