use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::RetryPolicy;
use crate::cache::TtlPolicy;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub http: HttpConfig,
  pub cache: CacheConfig,
  pub auth: AuthConfig,
  pub preload: PreloadConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Base URL of the backend REST API (e.g., "http://localhost:8000/api/v1")
  pub base_url: String,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: DEFAULT_API_URL.to_string(),
    }
  }
}

/// Timeout and retry policy applied to every request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
  pub timeout_secs: u64,
  pub max_retries: u32,
  pub backoff_ms: u64,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      timeout_secs: 8,
      max_retries: 2,
      backoff_ms: 500,
    }
  }
}

impl HttpConfig {
  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      timeout: Duration::from_secs(self.timeout_secs),
      max_retries: self.max_retries,
      backoff: Duration::from_millis(self.backoff_ms),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// TTL for list/discovery endpoints (trending, top rated, popular, search)
  pub catalog_ttl_secs: u64,
  /// TTL for movie detail aggregates and genre lists
  pub detail_ttl_secs: u64,
  /// TTL for user-specific endpoints (favorites, watchlist, profile)
  pub user_ttl_secs: u64,
  /// Upper bound on cached responses; oldest entries are evicted first
  pub max_entries: usize,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      catalog_ttl_secs: 30 * 60,
      detail_ttl_secs: 30 * 60,
      user_ttl_secs: 60,
      max_entries: 512,
    }
  }
}

impl CacheConfig {
  pub fn ttl_policy(&self) -> TtlPolicy {
    TtlPolicy {
      catalog: Duration::from_secs(self.catalog_ttl_secs),
      detail: Duration::from_secs(self.detail_ttl_secs),
      user: Duration::from_secs(self.user_ttl_secs),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
  /// How often the background monitor checks the access token for expiry
  pub expiry_check_secs: u64,
}

impl Default for AuthConfig {
  fn default() -> Self {
    Self {
      expiry_check_secs: 10 * 60,
    }
  }
}

impl AuthConfig {
  pub fn expiry_check_interval(&self) -> Duration {
    Duration::from_secs(self.expiry_check_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreloadConfig {
  /// A persisted snapshot younger than this skips the splash screen
  pub window_secs: u64,
  /// The splash gives up waiting on warm-up fetches after this long
  pub timeout_secs: u64,
  /// Minimum time the splash stays visible once shown
  pub min_splash_ms: u64,
}

impl Default for PreloadConfig {
  fn default() -> Self {
    Self {
      window_secs: 15 * 60,
      timeout_secs: 10,
      min_splash_ms: 1500,
    }
  }
}

impl PreloadConfig {
  pub fn window(&self) -> Duration {
    Duration::from_secs(self.window_secs)
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }

  pub fn min_splash(&self) -> Duration {
    Duration::from_millis(self.min_splash_ms)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shimy.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shimy/config.yaml
  ///
  /// Unlike an explicit path, a missing file in the default locations is not
  /// an error: every setting has a default and the app works anonymously.
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
      None => Config::default(),
    };

    Ok(config.with_env_overrides())
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("shimy.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shimy").join("config.yaml");
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

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file deserializes to null, which should mean "all defaults"
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents)
  }

  fn with_env_overrides(mut self) -> Self {
    if let Ok(url) = std::env::var("SHIMY_API_URL") {
      if !url.trim().is_empty() {
        self.api.base_url = url;
      }
    }
    self
  }

  /// Get the account password from environment variables.
  ///
  /// Checks SHIMY_PASSWORD.
  pub fn get_password() -> Result<String> {
    std::env::var("SHIMY_PASSWORD")
      .map_err(|_| eyre!("Password not found. Set the SHIMY_PASSWORD environment variable."))
  }

  /// Directory for the local state database and log files.
  pub fn data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("shimy"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_config_uses_defaults() {
    let config = Config::parse("").unwrap();
    assert_eq!(config.api.base_url, DEFAULT_API_URL);
    assert_eq!(config.http.max_retries, 2);
    assert_eq!(config.cache.max_entries, 512);
    assert_eq!(config.preload.window(), Duration::from_secs(900));
  }

  #[test]
  fn test_partial_config_keeps_other_defaults() {
    let yaml = r#"
api:
  base_url: https://movies.example.com/api/v1
cache:
  user_ttl_secs: 5
"#;
    let config = Config::parse(yaml).unwrap();
    assert_eq!(config.api.base_url, "https://movies.example.com/api/v1");
    assert_eq!(config.cache.user_ttl_secs, 5);
    assert_eq!(config.cache.catalog_ttl_secs, 30 * 60);
    assert_eq!(config.http.timeout_secs, 8);
  }

  #[test]
  fn test_retry_policy_from_http_config() {
    let http = HttpConfig {
      timeout_secs: 3,
      max_retries: 4,
      backoff_ms: 250,
    };
    let policy = http.retry_policy();
    assert_eq!(policy.timeout, Duration::from_secs(3));
    assert_eq!(policy.max_retries, 4);
    assert_eq!(policy.backoff, Duration::from_millis(250));
  }

  #[test]
  fn test_missing_explicit_path_is_error() {
    let result = Config::load(Some(Path::new("/definitely/not/here.yaml")));
    assert!(result.is_err());
  }
}
