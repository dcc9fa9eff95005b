//! Single-flight request deduplication.
//!
//! Concurrent requests for the same key share one underlying future. The
//! registration is removed as soon as that future settles, success or
//! failure, so failures are never cached: the next call after a rejection
//! starts a fresh request.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use super::keys::Selector;

struct InFlight<V> {
  id: u64,
  future: Shared<BoxFuture<'static, V>>,
}

type InFlightMap<V> = Arc<Mutex<HashMap<String, InFlight<V>>>>;

/// Registry of in-flight requests, keyed like the response cache.
pub struct Deduplicator<V: Clone> {
  inflight: InFlightMap<V>,
  next_id: Arc<AtomicU64>,
}

impl<V: Clone> Clone for Deduplicator<V> {
  fn clone(&self) -> Self {
    Self {
      inflight: Arc::clone(&self.inflight),
      next_id: Arc::clone(&self.next_id),
    }
  }
}

impl<V: Clone> Default for Deduplicator<V> {
  fn default() -> Self {
    Self {
      inflight: Arc::new(Mutex::new(HashMap::new())),
      next_id: Arc::new(AtomicU64::new(0)),
    }
  }
}

impl<V> Deduplicator<V>
where
  V: Clone + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self::default()
  }

  /// Join the in-flight request for `key`, or start one with `producer`.
  ///
  /// `producer` is only invoked when no request for `key` is in flight.
  pub async fn fetch_once<F, Fut>(&self, key: &str, producer: F) -> V
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = V> + Send + 'static,
  {
    let future = {
      let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
      if let Some(existing) = inflight.get(key) {
        debug!(key, "joining in-flight request");
        existing.future.clone()
      } else {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self.inflight);
        let owned_key = key.to_string();
        let request = producer();

        let future = async move {
          let value = request.await;
          let mut inflight = registry.lock().unwrap_or_else(PoisonError::into_inner);
          // A newer registration may have replaced ours after `forget`
          if inflight.get(&owned_key).is_some_and(|f| f.id == id) {
            inflight.remove(&owned_key);
          }
          value
        }
        .boxed()
        .shared();

        inflight.insert(
          key.to_string(),
          InFlight {
            id,
            future: future.clone(),
          },
        );
        future
      }
    };

    future.await
  }

  /// Detach in-flight requests matching `selector` so later callers start
  /// fresh ones. Callers already waiting still receive the detached result.
  pub fn forget(&self, selector: &Selector) -> usize {
    let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
    let before = inflight.len();
    inflight.retain(|key, _| !selector.matches(key));
    before - inflight.len()
  }

  /// Number of requests currently in flight.
  pub fn len(&self) -> usize {
    self.inflight.lock().unwrap_or_else(PoisonError::into_inner).len()
  }
}
