//! Cache keys, resource scopes and invalidation selectors.

use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

/// Parameter strings longer than this are hashed to keep keys bounded.
const MAX_PARAM_LEN: usize = 50;

/// Resource category a cache key belongs to. The scope is always the first
/// `:`-separated segment of the key, so invalidating a scope is a prefix match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
  /// Trending / top rated / popular / movies / tv listings
  Lists,
  Search,
  /// Single movie detail aggregate
  Detail,
  Genres,
  Favorites,
  Watchlist,
  /// Profile and profile stats
  Profile,
}

impl Scope {
  pub const USER_SCOPED: [Scope; 3] = [Scope::Favorites, Scope::Watchlist, Scope::Profile];

  pub fn prefix(self) -> &'static str {
    match self {
      Scope::Lists => "movies:",
      Scope::Search => "search:",
      Scope::Detail => "movie:",
      Scope::Genres => "genres:",
      Scope::Favorites => "favorites:",
      Scope::Watchlist => "watchlist:",
      Scope::Profile => "profile:",
    }
  }

  /// Whether entries in this scope belong to the signed-in user.
  pub fn is_user_scoped(self) -> bool {
    Self::USER_SCOPED.contains(&self)
  }
}

/// Deterministic string identifying one request: `scope:param:param...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
  /// Build a key from a scope and its normalized parameters.
  pub fn new(scope: Scope, params: &[&str]) -> Self {
    let joined = params.join(":");
    let params = if joined.len() > MAX_PARAM_LEN {
      // SHA256 hash for stable, fixed-length keys
      let mut hasher = Sha256::new();
      hasher.update(joined.as_bytes());
      hex::encode(hasher.finalize())
    } else {
      joined
    };
    Self(format!("{}{}", scope.prefix(), params))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Scope parsed back from the key prefix.
  pub fn scope(&self) -> Option<Scope> {
    [
      Scope::Lists,
      Scope::Search,
      Scope::Detail,
      Scope::Genres,
      Scope::Favorites,
      Scope::Watchlist,
      Scope::Profile,
    ]
    .into_iter()
    .find(|scope| self.0.starts_with(scope.prefix()))
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Predicate selecting cache keys to invalidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
  All,
  Exact(String),
  Prefix(String),
  Scope(Scope),
  /// Matches if any inner selector matches
  Any(Vec<Selector>),
}

impl Selector {
  pub fn matches(&self, key: &str) -> bool {
    match self {
      Selector::All => true,
      Selector::Exact(exact) => key == exact,
      Selector::Prefix(prefix) => key.starts_with(prefix.as_str()),
      Selector::Scope(scope) => key.starts_with(scope.prefix()),
      Selector::Any(selectors) => selectors.iter().any(|s| s.matches(key)),
    }
  }

  /// Every favorites, watchlist and profile entry.
  pub fn user_scoped() -> Self {
    Selector::Any(Scope::USER_SCOPED.into_iter().map(Selector::Scope).collect())
  }

  /// Everything that can differ between sessions: the user-scoped entries
  /// plus movie details, which carry the caller's own rating.
  pub fn session_scoped() -> Self {
    Selector::Any(vec![Selector::user_scoped(), Selector::Scope(Scope::Detail)])
  }

  pub fn key(key: &CacheKey) -> Self {
    Selector::Exact(key.as_str().to_string())
  }
}

/// How long each class of response stays fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
  /// Lists and search results change infrequently upstream
  pub catalog: Duration,
  pub detail: Duration,
  /// User-specific data is also invalidated eagerly on every mutation
  pub user: Duration,
}

impl Default for TtlPolicy {
  fn default() -> Self {
    Self {
      catalog: Duration::from_secs(30 * 60),
      detail: Duration::from_secs(30 * 60),
      user: Duration::from_secs(60),
    }
  }
}

impl TtlPolicy {
  pub fn ttl_for(&self, scope: Scope) -> Duration {
    match scope {
      Scope::Lists | Scope::Search => self.catalog,
      Scope::Detail | Scope::Genres => self.detail,
      Scope::Favorites | Scope::Watchlist | Scope::Profile => self.user,
    }
  }
}
