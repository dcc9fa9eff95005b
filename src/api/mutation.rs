//! Writes that change user state, followed by cache invalidation and a
//! broadcast to every mounted view.

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::bus::{AppEvent, Change, EventBus};
use crate::cache::{CacheLayer, Selector};

use super::cache::{collection_scope, ApiQueryKey};
use super::cached_client::MovieClient;
use super::client::{Access, HttpClient, Method};
use super::error::FetchError;
use super::types::{Collection, MovieId, ProfileUpdate};

/// A write against the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
  Add {
    collection: Collection,
    movie_id: MovieId,
  },
  /// Remove by catalog id; the record id is looked up first
  Remove {
    collection: Collection,
    movie_id: MovieId,
  },
  RemoveRecord {
    collection: Collection,
    record_id: u64,
  },
  Rate {
    movie_id: MovieId,
    rating: u8,
    review: Option<String>,
  },
  UpdateProfile(ProfileUpdate),
}

/// Resource category a mutation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
  Favorites,
  Watchlist,
  Ratings,
  Profile,
}

impl Mutation {
  pub fn resource(&self) -> Resource {
    match self {
      Mutation::Add { collection, .. }
      | Mutation::Remove { collection, .. }
      | Mutation::RemoveRecord { collection, .. } => match collection {
        Collection::Favorites => Resource::Favorites,
        Collection::Watchlist => Resource::Watchlist,
      },
      Mutation::Rate { .. } => Resource::Ratings,
      Mutation::UpdateProfile(_) => Resource::Profile,
    }
  }

  /// Cache keys made stale by this mutation. Stats count favorites,
  /// watchlist entries and ratings, so they go with each of those.
  pub fn invalidation(&self) -> Selector {
    let stats = Selector::key(&ApiQueryKey::Stats.cache_key());
    match self {
      Mutation::Add { collection, .. }
      | Mutation::Remove { collection, .. }
      | Mutation::RemoveRecord { collection, .. } => {
        Selector::Any(vec![Selector::Scope(collection_scope(*collection)), stats])
      }
      Mutation::Rate { movie_id, .. } => Selector::Any(vec![
        Selector::key(&ApiQueryKey::Detail { id: *movie_id }.cache_key()),
        stats,
      ]),
      Mutation::UpdateProfile(_) => Selector::key(&ApiQueryKey::Profile.cache_key()),
    }
  }

  pub fn event(&self) -> AppEvent {
    let changed = |collection: Collection, movie_id: Option<MovieId>, change: Change| {
      match collection {
        Collection::Favorites => AppEvent::FavoritesChanged { movie_id, change },
        Collection::Watchlist => AppEvent::WatchlistChanged { movie_id, change },
      }
    };
    match self {
      Mutation::Add {
        collection,
        movie_id,
      } => changed(*collection, Some(*movie_id), Change::Added),
      Mutation::Remove {
        collection,
        movie_id,
      } => changed(*collection, Some(*movie_id), Change::Removed),
      Mutation::RemoveRecord { collection, .. } => changed(*collection, None, Change::Removed),
      Mutation::Rate { movie_id, .. } => AppEvent::RatingsChanged {
        movie_id: *movie_id,
      },
      Mutation::UpdateProfile(_) => AppEvent::ProfileChanged,
    }
  }
}

/// Performs mutations and keeps every consumer consistent afterwards.
///
/// On success the affected cache partition is invalidated and only then is
/// the event emitted, so a listener that refetches on receipt always misses
/// the cache. On failure neither happens.
#[derive(Clone)]
pub struct MutationBroadcaster {
  http: HttpClient,
  movies: MovieClient,
  cache: CacheLayer,
  bus: EventBus,
}

impl MutationBroadcaster {
  pub fn new(http: HttpClient, movies: MovieClient, cache: CacheLayer, bus: EventBus) -> Self {
    Self {
      http,
      movies,
      cache,
      bus,
    }
  }

  pub async fn mutate(&self, mutation: Mutation) -> Result<Value, FetchError> {
    let response = self.perform(&mutation).await?;

    let removed = self.cache.invalidate(&mutation.invalidation());
    debug!(resource = ?mutation.resource(), removed, "invalidated after mutation");
    let event = mutation.event();
    let delivered = self.bus.emit(event);
    info!(resource = ?mutation.resource(), delivered, "mutation applied");

    Ok(response)
  }

  pub async fn add(&self, collection: Collection, movie_id: MovieId) -> Result<(), FetchError> {
    self.mutate(Mutation::Add {
      collection,
      movie_id,
    })
    .await
    .map(drop)
  }

  pub async fn remove(&self, collection: Collection, movie_id: MovieId) -> Result<(), FetchError> {
    self.mutate(Mutation::Remove {
      collection,
      movie_id,
    })
    .await
    .map(drop)
  }

  /// Add when `member` is false, remove otherwise.
  pub async fn toggle(
    &self,
    collection: Collection,
    movie_id: MovieId,
    member: bool,
  ) -> Result<(), FetchError> {
    if member {
      self.remove(collection, movie_id).await
    } else {
      self.add(collection, movie_id).await
    }
  }

  pub async fn rate(
    &self,
    movie_id: MovieId,
    rating: u8,
    review: Option<String>,
  ) -> Result<(), FetchError> {
    self.mutate(Mutation::Rate {
      movie_id,
      rating,
      review,
    })
    .await
    .map(drop)
  }

  async fn perform(&self, mutation: &Mutation) -> Result<Value, FetchError> {
    match mutation {
      Mutation::Add {
        collection,
        movie_id,
      } => {
        let body = json!({ "movie_id": movie_id });
        self
          .http
          .request(Method::Post, collection.path(), &[], Some(body), Access::Required)
          .await
      }
      Mutation::Remove {
        collection,
        movie_id,
      } => {
        let record_id = self
          .movies
          .find_record(*collection, *movie_id)
          .await?
          .ok_or_else(|| {
            FetchError::NotFound(format!(
              "movie {} is not in your {}",
              movie_id,
              collection.label().to_lowercase()
            ))
          })?;
        self.delete_record(*collection, record_id).await
      }
      Mutation::RemoveRecord {
        collection,
        record_id,
      } => self.delete_record(*collection, *record_id).await,
      Mutation::Rate {
        movie_id,
        rating,
        review,
      } => {
        if !(1..=5).contains(rating) {
          return Err(FetchError::Rejected {
            status: 400,
            message: "Rating must be between 1 and 5".to_string(),
          });
        }
        let body = json!({
          "movie_id": movie_id,
          "rating": rating,
          "review": review.clone().unwrap_or_default(),
        });
        self
          .http
          .request(
            Method::Post,
            &format!("movies/{}/rate/", movie_id),
            &[],
            Some(body),
            Access::Required,
          )
          .await
      }
      Mutation::UpdateProfile(update) => {
        let body = serde_json::to_value(update).map_err(|e| FetchError::Decode(e.to_string()))?;
        self
          .http
          .request(Method::Patch, "users/profile/", &[], Some(body), Access::Required)
          .await
      }
    }
  }

  async fn delete_record(&self, collection: Collection, record_id: u64) -> Result<Value, FetchError> {
    let path = format!("{}{}/", collection.path(), record_id);
    self
      .http
      .request(Method::Delete, &path, &[], None, Access::Required)
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::ListKind;
  use crate::bus::Topic;
  use crate::test_support::{page_json, records_json, services, FakeTransport, Reply};
  use std::time::Duration;

  fn signed_in(transport: &std::sync::Arc<FakeTransport>) -> crate::services::Services {
    let services = services(transport);
    services.session.sign_in("token", None);
    services
  }

  #[tokio::test]
  async fn test_favorites_mutation_scopes_invalidation() {
    let transport = FakeTransport::new();
    transport.reply(Method::Get, "movies/", Reply::ok(page_json(1, 1, &[(550, "a")])));
    transport.reply(Method::Get, "movies/favorites/", Reply::ok(records_json(&[])));
    transport.reply(Method::Get, "movies/watchlist/", Reply::ok(records_json(&[])));
    transport.reply(Method::Post, "movies/favorites/", Reply::Json(201, json!({"id": 1})));
    let services = signed_in(&transport);

    services.movies.list(ListKind::Trending, 1).await.unwrap();
    services.movies.favorites(1).await.unwrap();
    services.movies.watchlist(1).await.unwrap();

    services.mutations.add(Collection::Favorites, 550).await.unwrap();

    let cache = services.cache.cache();
    assert!(!cache.contains("favorites:1"));
    assert!(cache.contains("watchlist:1"));
    assert!(cache.contains("movies:trending:1"));
  }

  #[tokio::test]
  async fn test_listener_refetch_after_event_misses_cache() {
    let transport = FakeTransport::new();
    transport.on(Method::Get, "movies/favorites/", |_, n| {
      if n == 0 {
        Reply::ok(records_json(&[]))
      } else {
        Reply::ok(records_json(&[(1, 550)]))
      }
    });
    transport.reply(Method::Post, "movies/favorites/", Reply::Json(201, json!({"id": 1})));
    let services = signed_in(&transport);
    let mut events = services.bus.subscribe(&[Topic::Favorites]);

    assert!(services.movies.favorites(1).await.unwrap().results.is_empty());
    services.mutations.add(Collection::Favorites, 550).await.unwrap();

    let event = events.recv().await.unwrap();
    assert_eq!(
      event,
      AppEvent::FavoritesChanged {
        movie_id: Some(550),
        change: Change::Added
      }
    );
    // Reacting to the event sees fresh data
    let fresh = services.movies.favorites(1).await.unwrap();
    assert!(fresh.find(550).is_some());
    assert_eq!(transport.count(Method::Get, "movies/favorites/"), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_read_in_flight_during_mutation_is_not_cached() {
    let transport = FakeTransport::new();
    transport.reply(
      Method::Get,
      "movies/favorites/",
      Reply::after(Duration::from_millis(500), Reply::ok(records_json(&[]))),
    );
    transport.reply(Method::Post, "movies/favorites/", Reply::Json(201, json!({"id": 1})));
    let services = signed_in(&transport);

    let (stale, mutated) = tokio::join!(
      services.movies.favorites(1),
      services.mutations.add(Collection::Favorites, 550),
    );
    assert!(stale.is_ok());
    assert!(mutated.is_ok());
    assert!(!services.cache.cache().contains("favorites:1"));
  }

  #[tokio::test]
  async fn test_failed_mutation_neither_invalidates_nor_emits() {
    let transport = FakeTransport::new();
    transport.reply(Method::Get, "movies/favorites/", Reply::ok(records_json(&[])));
    transport.reply(
      Method::Post,
      "movies/favorites/",
      Reply::Json(400, json!({"non_field_errors": ["This movie is already in your favorites"]})),
    );
    let services = signed_in(&transport);
    let mut events = services.bus.subscribe_all();
    services.movies.favorites(1).await.unwrap();

    let err = services.mutations.add(Collection::Favorites, 550).await.unwrap_err();
    assert!(err.is_expected());
    assert_eq!(err.to_string(), "This movie is already in your favorites");
    assert!(services.cache.cache().contains("favorites:1"));
    assert!(events.drain().is_empty());
  }

  #[tokio::test]
  async fn test_remove_by_catalog_id_resolves_record() {
    let transport = FakeTransport::new();
    transport.reply(Method::Get, "movies/watchlist/", Reply::ok(records_json(&[(42, 155)])));
    transport.reply(Method::Delete, "movies/watchlist/42/", Reply::Raw(204, String::new()));
    let services = signed_in(&transport);

    services.mutations.remove(Collection::Watchlist, 155).await.unwrap();
    assert_eq!(transport.count(Method::Delete, "movies/watchlist/42/"), 1);

    let missing = services.mutations.remove(Collection::Watchlist, 999).await;
    assert!(matches!(missing, Err(FetchError::NotFound(_))));
  }

  #[tokio::test]
  async fn test_rating_invalidates_detail_and_stats_only() {
    let transport = FakeTransport::new();
    transport.reply(Method::Post, "movies/550/rate/", Reply::Json(201, json!({"id": 9})));
    let services = signed_in(&transport);
    let minute = Duration::from_secs(60);
    let cache = services.cache.cache();
    cache.set("movie:550", json!({}), minute);
    cache.set("movie:5501", json!({}), minute);
    cache.set("profile:stats", json!({}), minute);
    cache.set("profile:me", json!({}), minute);

    services.mutations.rate(550, 4, None).await.unwrap();

    assert!(!cache.contains("movie:550"));
    assert!(!cache.contains("profile:stats"));
    assert!(cache.contains("movie:5501"));
    assert!(cache.contains("profile:me"));

    let out_of_range = services.mutations.rate(550, 6, None).await;
    assert!(matches!(out_of_range, Err(FetchError::Rejected { status: 400, .. })));
    assert_eq!(transport.count(Method::Post, "movies/550/rate/"), 1);
  }
}
