//! Startup warm-up of the landing lists behind the splash screen.
//!
//! A snapshot of the landing lists is persisted after every successful
//! warm-up. A recent enough snapshot is hydrated into the response cache and
//! the splash is skipped entirely. Otherwise the lists are fetched in
//! parallel while the splash shows progress; the splash stays up for a
//! minimum time and gives up waiting after a timeout, leaving the fetches to
//! finish in the background.

use chrono::Utc;
use futures::future::join3;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{FetchError, ListKind, MovieClient, MoviePage};
use crate::config::PreloadConfig;
use crate::store::{keys, KeyValueStore};

/// Lists shown on the landing screen, in display order.
pub const LANDING_LISTS: [ListKind; 3] = [ListKind::Trending, ListKind::TopRated, ListKind::Popular];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreloadSnapshot {
  pub trending: MoviePage,
  pub top_rated: MoviePage,
  pub popular: MoviePage,
  /// Unix millis
  pub saved_at: i64,
}

impl PreloadSnapshot {
  fn lists(&self) -> [(ListKind, &MoviePage); 3] {
    [
      (ListKind::Trending, &self.trending),
      (ListKind::TopRated, &self.top_rated),
      (ListKind::Popular, &self.popular),
    ]
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadProgress {
  pub completed: usize,
  pub failed: usize,
  pub total: usize,
}

impl PreloadProgress {
  pub fn ratio(&self) -> f64 {
    if self.total == 0 {
      return 1.0;
    }
    (self.completed + self.failed) as f64 / self.total as f64
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreloadOutcome {
  /// Recent snapshot restored, no splash shown
  Hydrated(PreloadSnapshot),
  /// Every landing list fetched before the timeout
  Warmed(PreloadSnapshot),
  /// A fetch failed or the timeout passed; views load their own data
  Degraded,
}

impl PreloadOutcome {
  pub fn showed_splash(&self) -> bool {
    !matches!(self, PreloadOutcome::Hydrated(_))
  }
}

pub struct Preloader {
  movies: MovieClient,
  store: Arc<dyn KeyValueStore>,
  config: PreloadConfig,
  progress: Arc<watch::Sender<PreloadProgress>>,
}

impl Preloader {
  pub fn new(movies: MovieClient, store: Arc<dyn KeyValueStore>, config: PreloadConfig) -> Self {
    let (progress, _) = watch::channel(PreloadProgress {
      total: LANDING_LISTS.len(),
      ..Default::default()
    });
    Self {
      movies,
      store,
      config,
      progress: Arc::new(progress),
    }
  }

  /// Follow warm-up progress, e.g. to draw the splash gauge.
  pub fn progress(&self) -> watch::Receiver<PreloadProgress> {
    self.progress.subscribe()
  }

  /// The persisted snapshot, if it is younger than the window at `now_millis`.
  pub fn fresh_snapshot(&self, now_millis: i64) -> Option<PreloadSnapshot> {
    let last = self
      .store
      .get(keys::LAST_PRELOAD)
      .ok()
      .flatten()
      .and_then(|raw| raw.trim().parse::<i64>().ok())?;
    let age = now_millis.saturating_sub(last);
    let window = i64::try_from(self.config.window().as_millis()).unwrap_or(i64::MAX);
    if age < 0 || age >= window {
      debug!(age_ms = age, "preload snapshot too old");
      return None;
    }
    let raw = self.store.get(keys::PRELOAD_SNAPSHOT).ok().flatten()?;
    match serde_json::from_str(&raw) {
      Ok(snapshot) => Some(snapshot),
      Err(e) => {
        warn!(error = %e, "ignoring unreadable preload snapshot");
        None
      }
    }
  }

  /// Decide whether to splash, warm up if so, and return once the UI may be
  /// revealed.
  pub async fn run(&self) -> PreloadOutcome {
    match self.try_hydrate() {
      Some(snapshot) => PreloadOutcome::Hydrated(snapshot),
      None => self.warm().await,
    }
  }

  /// Restore a recent snapshot into the cache without waiting on anything.
  pub fn try_hydrate(&self) -> Option<PreloadSnapshot> {
    let now = Utc::now().timestamp_millis();
    let snapshot = self.fresh_snapshot(now)?;
    self.hydrate(&snapshot, now);
    info!("restored landing lists from snapshot");
    Some(snapshot)
  }

  /// The splash path: parallel warm-up bounded by the timeout, shown for at
  /// least the minimum splash time.
  pub async fn warm(&self) -> PreloadOutcome {
    let started = Instant::now();
    let mut warm_up = tokio::spawn(warm_up(
      self.movies.clone(),
      self.store.clone(),
      self.progress.clone(),
    ));

    let outcome = match tokio::time::timeout(self.config.timeout(), &mut warm_up).await {
      Ok(Ok(Some(snapshot))) => PreloadOutcome::Warmed(snapshot),
      Ok(Ok(None)) => PreloadOutcome::Degraded,
      Ok(Err(e)) => {
        warn!(error = %e, "warm-up task failed");
        PreloadOutcome::Degraded
      }
      Err(_) => {
        warn!("warm-up still running after timeout, revealing anyway");
        PreloadOutcome::Degraded
      }
    };

    tokio::time::sleep_until(started + self.config.min_splash()).await;
    info!(warmed = matches!(outcome, PreloadOutcome::Warmed(_)), "preload finished");
    outcome
  }

  /// Prime the landing lists with whatever freshness they have left.
  fn hydrate(&self, snapshot: &PreloadSnapshot, now_millis: i64) {
    let age = Duration::from_millis(u64::try_from(now_millis - snapshot.saved_at).unwrap_or(0));
    for (kind, page) in snapshot.lists() {
      if let Err(e) = self.movies.prime_list(kind, page, age) {
        warn!(list = kind.as_param(), error = %e, "failed to hydrate list");
      }
    }
  }
}

/// Fetch every landing list; persist a snapshot only if all succeeded.
async fn warm_up(
  movies: MovieClient,
  store: Arc<dyn KeyValueStore>,
  progress: Arc<watch::Sender<PreloadProgress>>,
) -> Option<PreloadSnapshot> {
  let fetch = |kind: ListKind| {
    let movies = movies.clone();
    let progress = progress.clone();
    async move {
      let result = movies.list(kind, 1).await;
      let ok = result.is_ok();
      progress.send_modify(|p| {
        if ok {
          p.completed += 1;
        } else {
          p.failed += 1;
        }
      });
      result
    }
  };

  let (trending, top_rated, popular) = join3(
    fetch(ListKind::Trending),
    fetch(ListKind::TopRated),
    fetch(ListKind::Popular),
  )
  .await;

  let snapshot = match collect(trending, top_rated, popular) {
    Ok(snapshot) => snapshot,
    Err(e) => {
      warn!(error = %e, "landing list warm-up failed");
      return None;
    }
  };
  persist(store.as_ref(), &snapshot);
  Some(snapshot)
}

fn collect(
  trending: Result<MoviePage, FetchError>,
  top_rated: Result<MoviePage, FetchError>,
  popular: Result<MoviePage, FetchError>,
) -> Result<PreloadSnapshot, FetchError> {
  Ok(PreloadSnapshot {
    trending: trending?,
    top_rated: top_rated?,
    popular: popular?,
    saved_at: Utc::now().timestamp_millis(),
  })
}

fn persist(store: &dyn KeyValueStore, snapshot: &PreloadSnapshot) {
  let raw = match serde_json::to_string(snapshot) {
    Ok(raw) => raw,
    Err(e) => {
      warn!(error = %e, "failed to encode preload snapshot");
      return;
    }
  };
  let saved = store
    .set(keys::PRELOAD_SNAPSHOT, &raw)
    .and_then(|_| store.set(keys::LAST_PRELOAD, &snapshot.saved_at.to_string()));
  if let Err(e) = saved {
    warn!(error = %e, "failed to persist preload snapshot");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::Method;
  use crate::test_support::{page_json, services, FakeTransport, Reply};

  fn snapshot_at(saved_at: i64) -> PreloadSnapshot {
    let page = |total_results: u64| MoviePage {
      page: 1,
      total_pages: 1,
      total_results,
      results: vec![],
    };
    PreloadSnapshot {
      trending: page(1),
      top_rated: page(2),
      popular: page(3),
      saved_at,
    }
  }

  #[tokio::test]
  async fn test_recent_snapshot_skips_splash() {
    let transport = FakeTransport::new();
    let services = services(&transport);
    let snapshot = snapshot_at(Utc::now().timestamp_millis() - 60_000);
    persist(services.store.as_ref(), &snapshot);

    let outcome = services.preloader().run().await;
    assert_eq!(outcome, PreloadOutcome::Hydrated(snapshot.clone()));
    assert!(!outcome.showed_splash());
    assert!(transport.calls().is_empty());

    // Views read the hydrated lists from the cache
    let top_rated = services.movies.list(ListKind::TopRated, 1).await.unwrap();
    assert_eq!(top_rated, snapshot.top_rated);
    assert!(transport.calls().is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_hydrated_lists_keep_their_age() {
    let transport = FakeTransport::new();
    transport.reply(Method::Get, "movies/", Reply::ok(page_json(1, 1, &[(550, "Fight Club")])));
    let services = services(&transport);
    let ttl = services.config.cache.ttl_policy().catalog;
    let age = Duration::from_secs(10 * 60);
    let saved_at = Utc::now().timestamp_millis() - age.as_millis() as i64;
    persist(services.store.as_ref(), &snapshot_at(saved_at));

    assert!(services.preloader().try_hydrate().is_some());
    tokio::time::advance(ttl - age - Duration::from_secs(5)).await;
    services.movies.list(ListKind::Trending, 1).await.unwrap();
    assert!(transport.calls().is_empty());

    // Stale once the snapshot's own age plus the elapsed time reaches the TTL
    tokio::time::advance(Duration::from_secs(10)).await;
    services.movies.list(ListKind::Trending, 1).await.unwrap();
    assert_eq!(transport.count(Method::Get, "movies/"), 1);
  }

  #[test]
  fn test_window_boundary() {
    let transport = FakeTransport::new();
    let services = services(&transport);
    let preloader = services.preloader();
    persist(services.store.as_ref(), &snapshot_at(1_000_000));

    let window = 15 * 60 * 1000;
    assert!(preloader.fresh_snapshot(1_000_000 + window - 1).is_some());
    assert!(preloader.fresh_snapshot(1_000_000 + window).is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn test_warm_up_persists_and_holds_minimum_splash() {
    let transport = FakeTransport::new();
    transport.reply(Method::Get, "movies/", Reply::ok(page_json(1, 3, &[(550, "Fight Club")])));
    let services = services(&transport);
    let preloader = services.preloader();
    let progress = preloader.progress();

    let started = Instant::now();
    let outcome = preloader.run().await;
    assert!(started.elapsed() >= Duration::from_millis(1500));

    let PreloadOutcome::Warmed(snapshot) = outcome else {
      panic!("expected a warmed outcome, got {:?}", outcome);
    };
    assert_eq!(snapshot.popular.results[0].id, 550);
    assert_eq!(transport.count(Method::Get, "movies/"), 3);
    assert_eq!(progress.borrow().completed, 3);
    assert_eq!(progress.borrow().ratio(), 1.0);

    let saved = preloader.fresh_snapshot(Utc::now().timestamp_millis());
    assert_eq!(saved, Some(snapshot));
  }

  #[tokio::test(start_paused = true)]
  async fn test_failed_list_degrades_without_snapshot() {
    let transport = FakeTransport::new();
    transport.on(Method::Get, "movies/", |request, _| {
      if request.url.query().unwrap_or("").contains("type=popular") {
        Reply::Raw(400, r#"{"error": "bad type"}"#.into())
      } else {
        Reply::ok(page_json(1, 1, &[(13, "Forrest Gump")]))
      }
    });
    let services = services(&transport);
    let preloader = services.preloader();

    assert_eq!(preloader.run().await, PreloadOutcome::Degraded);
    assert_eq!(preloader.progress().borrow().failed, 1);
    assert_eq!(services.store.get(keys::LAST_PRELOAD).unwrap(), None);
  }

  #[tokio::test(start_paused = true)]
  async fn test_timeout_reveals_while_fetches_continue() {
    let transport = FakeTransport::new();
    // First attempts outlive the request timeout, the retries answer late
    transport.on(Method::Get, "movies/", |_, previous| {
      if previous < 3 {
        Reply::Hang
      } else {
        Reply::after(Duration::from_secs(3), Reply::ok(page_json(1, 1, &[(1, "Late")])))
      }
    });
    let services = services(&transport);
    let preloader = services.preloader();

    let started = Instant::now();
    assert_eq!(preloader.run().await, PreloadOutcome::Degraded);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));
    assert_eq!(services.store.get(keys::LAST_PRELOAD).unwrap(), None);

    // The background fetches still land and are persisted
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(services.store.get(keys::LAST_PRELOAD).unwrap().is_some());
    assert_eq!(preloader.progress().borrow().completed, 3);
  }
}
