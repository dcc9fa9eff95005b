//! Keyed, time-bounded in-memory store of decoded responses.

use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::keys::Selector;

/// How many recent invalidations are remembered for in-flight writes.
const INVALIDATION_LOG_LEN: usize = 64;

/// One cached response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  pub payload: Value,
  pub stored_at: Instant,
  pub ttl: Duration,
}

impl CacheEntry {
  pub fn is_stale(&self, now: Instant) -> bool {
    now.saturating_duration_since(self.stored_at) > self.ttl
  }
}

/// Memory-only response cache. Cloning shares the underlying map.
///
/// Besides entries, the cache counts invalidations (`generation`) and keeps a
/// short log of recent selectors. A fetch that started before an invalidation
/// covering its key must not write its (pre-invalidation) result back; see
/// [`ResponseCache::set_if_current`].
#[derive(Clone)]
pub struct ResponseCache {
  inner: Arc<Mutex<Inner>>,
}

struct Inner {
  entries: HashMap<String, CacheEntry>,
  max_entries: usize,
  generation: u64,
  /// (generation after the invalidation, selector), oldest first
  invalidations: VecDeque<(u64, Selector)>,
}

impl ResponseCache {
  pub fn new(max_entries: usize) -> Self {
    Self {
      inner: Arc::new(Mutex::new(Inner {
        entries: HashMap::new(),
        max_entries: max_entries.max(1),
        generation: 0,
        invalidations: VecDeque::new(),
      })),
    }
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Return the payload if an entry exists and is still fresh.
  pub fn get(&self, key: &str) -> Option<Value> {
    let mut inner = self.lock();
    let now = Instant::now();
    match inner.entries.get(key) {
      Some(entry) if !entry.is_stale(now) => Some(entry.payload.clone()),
      Some(_) => {
        inner.entries.remove(key);
        debug!(key, "cache entry expired");
        None
      }
      None => None,
    }
  }

  /// Insert or overwrite unconditionally.
  pub fn set(&self, key: &str, payload: Value, ttl: Duration) {
    let mut inner = self.lock();
    inner.insert(key, payload, ttl);
  }

  /// Insert only if no invalidation matching `key` happened after `generation`
  /// was observed. Returns whether the entry was stored.
  pub fn set_if_current(&self, key: &str, payload: Value, ttl: Duration, generation: u64) -> bool {
    let mut inner = self.lock();
    if inner.invalidated_since(key, generation) {
      debug!(key, "dropping response invalidated while in flight");
      return false;
    }
    inner.insert(key, payload, ttl);
    true
  }

  /// Current invalidation counter; capture it before starting a fetch.
  pub fn generation(&self) -> u64 {
    self.lock().generation
  }

  /// Remove every entry whose key matches `selector`. Returns the count removed.
  pub fn invalidate(&self, selector: &Selector) -> usize {
    let mut inner = self.lock();
    let before = inner.entries.len();
    inner.entries.retain(|key, _| !selector.matches(key));
    let removed = before - inner.entries.len();

    inner.generation += 1;
    let generation = inner.generation;
    inner.invalidations.push_back((generation, selector.clone()));
    if inner.invalidations.len() > INVALIDATION_LOG_LEN {
      inner.invalidations.pop_front();
    }

    debug!(?selector, removed, "cache invalidated");
    removed
  }

  /// Drop all entries.
  pub fn clear(&self) {
    self.invalidate(&Selector::All);
  }

  pub fn len(&self) -> usize {
    self.lock().entries.len()
  }

  #[allow(dead_code)]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Whether any (possibly stale) entry exists for `key`.
  pub fn contains(&self, key: &str) -> bool {
    self.lock().entries.contains_key(key)
  }
}

impl Inner {
  fn insert(&mut self, key: &str, payload: Value, ttl: Duration) {
    let now = Instant::now();
    if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
      self.entries.retain(|_, entry| !entry.is_stale(now));
      if self.entries.len() >= self.max_entries {
        self.evict_oldest();
      }
    }
    self.entries.insert(
      key.to_string(),
      CacheEntry {
        payload,
        stored_at: now,
        ttl,
      },
    );
  }

  fn evict_oldest(&mut self) {
    let oldest = self
      .entries
      .iter()
      .min_by_key(|(_, entry)| entry.stored_at)
      .map(|(key, _)| key.clone());
    if let Some(key) = oldest {
      debug!(key, "evicting oldest cache entry");
      self.entries.remove(&key);
    }
  }

  fn invalidated_since(&self, key: &str, generation: u64) -> bool {
    if generation >= self.generation {
      return false;
    }
    // Log no longer reaches back far enough to tell; assume the worst
    let oldest_logged = self.invalidations.front().map(|(g, _)| *g).unwrap_or(u64::MAX);
    if oldest_logged > generation + 1 {
      return true;
    }
    self
      .invalidations
      .iter()
      .filter(|(g, _)| *g > generation)
      .any(|(_, selector)| selector.matches(key))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::keys::Scope;
  use serde_json::json;

  const MINUTE: Duration = Duration::from_secs(60);

  #[tokio::test(start_paused = true)]
  async fn test_entry_expires_after_ttl() {
    let cache = ResponseCache::new(16);
    cache.set("movies:trending:1", json!([1, 2]), MINUTE);

    tokio::time::advance(Duration::from_secs(59)).await;
    assert_eq!(cache.get("movies:trending:1"), Some(json!([1, 2])));

    tokio::time::advance(Duration::from_secs(2)).await;
    assert_eq!(cache.get("movies:trending:1"), None);
    // Stale entries are dropped on read
    assert!(!cache.contains("movies:trending:1"));
  }

  #[tokio::test]
  async fn test_invalidate_scope_leaves_other_scopes() {
    let cache = ResponseCache::new(16);
    cache.set("favorites:1", json!("f1"), MINUTE);
    cache.set("favorites:2", json!("f2"), MINUTE);
    cache.set("movies:trending:1", json!("t"), MINUTE);

    let removed = cache.invalidate(&Selector::Scope(Scope::Favorites));
    assert_eq!(removed, 2);
    assert_eq!(cache.get("favorites:1"), None);
    assert_eq!(cache.get("movies:trending:1"), Some(json!("t")));
  }

  #[tokio::test]
  async fn test_clear_drops_everything() {
    let cache = ResponseCache::new(16);
    cache.set("genres:movie", json!([]), MINUTE);
    cache.set("profile:me", json!({}), MINUTE);
    cache.clear();
    assert_eq!(cache.len(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_cap_evicts_oldest_first() {
    let cache = ResponseCache::new(2);
    cache.set("movie:1", json!(1), MINUTE);
    tokio::time::advance(Duration::from_millis(10)).await;
    cache.set("movie:2", json!(2), MINUTE);
    tokio::time::advance(Duration::from_millis(10)).await;
    cache.set("movie:3", json!(3), MINUTE);

    assert_eq!(cache.len(), 2);
    assert!(!cache.contains("movie:1"));
    assert!(cache.contains("movie:2"));
    assert!(cache.contains("movie:3"));
  }

  #[tokio::test]
  async fn test_overwrite_does_not_evict() {
    let cache = ResponseCache::new(2);
    cache.set("movie:1", json!(1), MINUTE);
    cache.set("movie:2", json!(2), MINUTE);
    cache.set("movie:2", json!(22), MINUTE);
    assert_eq!(cache.get("movie:1"), Some(json!(1)));
    assert_eq!(cache.get("movie:2"), Some(json!(22)));
  }

  #[tokio::test]
  async fn test_in_flight_write_after_matching_invalidation_is_dropped() {
    let cache = ResponseCache::new(16);
    let generation = cache.generation();

    cache.invalidate(&Selector::Scope(Scope::Favorites));

    assert!(!cache.set_if_current("favorites:1", json!("old"), MINUTE, generation));
    assert!(cache.set_if_current("movies:popular:1", json!("p"), MINUTE, generation));
    assert_eq!(cache.get("favorites:1"), None);
  }
}
