//! Durable key/value storage for client state that must survive a restart.
//!
//! Only the auth tokens, user settings, the legacy favorite-ID list and the
//! preload snapshot live here. Response caching is deliberately memory-only
//! (see `crate::cache`).

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use color_eyre::Result;

/// Well-known storage keys.
pub mod keys {
  pub const ACCESS_TOKEN: &str = "access_token";
  pub const REFRESH_TOKEN: &str = "refresh_token";
  pub const USER_SETTINGS: &str = "userSettings";
  pub const LEGACY_FAVORITES: &str = "favorites";
  pub const LAST_PRELOAD: &str = "shimy_last_preload";
  pub const PRELOAD_SNAPSHOT: &str = "shimy_cached_content";
}

/// Trait for persistent string storage backends.
pub trait KeyValueStore: Send + Sync {
  /// Read the value stored under `key`.
  fn get(&self, key: &str) -> Result<Option<String>>;

  /// Insert or overwrite the value stored under `key`.
  fn set(&self, key: &str, value: &str) -> Result<()>;

  /// Remove `key`. Removing a missing key is not an error.
  fn remove(&self, key: &str) -> Result<()>;
}
