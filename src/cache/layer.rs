//! Cache layer that orchestrates caching logic with network fetching.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use super::dedup::Deduplicator;
use super::keys::{CacheKey, Selector, TtlPolicy};
use super::response::ResponseCache;
use super::traits::CacheResult;
use crate::api::FetchError;

type Payload = Result<Value, FetchError>;

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the API client and the network, providing
/// transparent caching and single-flight deduplication. Clones share state.
#[derive(Clone)]
pub struct CacheLayer {
  cache: ResponseCache,
  inflight: Deduplicator<Payload>,
  ttl: TtlPolicy,
}

impl CacheLayer {
  /// Create a new cache layer bounded to `max_entries` responses.
  pub fn new(max_entries: usize, ttl: TtlPolicy) -> Self {
    Self {
      cache: ResponseCache::new(max_entries),
      inflight: Deduplicator::new(),
      ttl,
    }
  }

  /// Access the underlying response cache.
  pub fn cache(&self) -> &ResponseCache {
    &self.cache
  }

  /// Fetch with a cache-first strategy.
  ///
  /// 1. Fresh cache entry - return immediately
  /// 2. Identical request in flight - wait for it
  /// 3. Otherwise run `fetcher`, store the result with the key's TTL
  ///
  /// Failures are returned to every waiter and never cached.
  pub async fn fetch<T, F, Fut>(&self, key: &CacheKey, fetcher: F) -> Result<CacheResult<T>, FetchError>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    if let Some(payload) = self.cache.get(key.as_str()) {
      debug!(%key, "cache hit");
      return decode(payload).map(CacheResult::from_cache);
    }
    debug!(%key, "cache miss");

    let cache = self.cache.clone();
    let ttl = key
      .scope()
      .map(|scope| self.ttl.ttl_for(scope))
      .unwrap_or(self.ttl.catalog);
    let owned_key = key.clone();

    let payload = self
      .inflight
      .fetch_once(key.as_str(), move || {
        let generation = cache.generation();
        let request = fetcher();
        async move {
          let data = request.await?;
          let payload =
            serde_json::to_value(&data).map_err(|e| FetchError::Decode(e.to_string()))?;
          cache.set_if_current(owned_key.as_str(), payload.clone(), ttl, generation);
          Ok(payload)
        }
      })
      .await?;

    decode(payload).map(CacheResult::from_network)
  }

  /// Store `data` under `key` as if it had been fetched `age` ago. Data
  /// already older than its scope's TTL is not stored.
  pub fn prime<T: Serialize>(
    &self,
    key: &CacheKey,
    data: &T,
    age: Duration,
  ) -> Result<(), FetchError> {
    let ttl = key
      .scope()
      .map(|scope| self.ttl.ttl_for(scope))
      .unwrap_or(self.ttl.catalog)
      .saturating_sub(age);
    if ttl.is_zero() {
      debug!(key = %key, ?age, "not priming an already stale entry");
      return Ok(());
    }
    let payload = serde_json::to_value(data).map_err(|e| FetchError::Decode(e.to_string()))?;
    self.cache.set(key.as_str(), payload, ttl);
    Ok(())
  }

  /// Remove matching entries and detach matching in-flight requests, so the
  /// next read for any matching key is guaranteed to reach the network.
  pub fn invalidate(&self, selector: &Selector) -> usize {
    let removed = self.cache.invalidate(selector);
    let detached = self.inflight.forget(selector);
    if detached > 0 {
      debug!(?selector, detached, "detached in-flight requests");
    }
    removed
  }

  /// Drop every cached response (manual reset).
  pub fn clear(&self) {
    self.invalidate(&Selector::All);
  }
}

fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, FetchError> {
  serde_json::from_value(payload).map_err(|e| FetchError::Decode(e.to_string()))
}
