//! Read side of the backend API with transparent caching.

use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

use crate::cache::CacheLayer;

use super::api_types::{ApiMovie, ApiMovieDetail, ApiPage, ApiRecord, GenreList};
use super::cache::ApiQueryKey;
use super::client::{Access, HttpClient};
use super::error::FetchError;
use super::types::{
  Collection, Genre, ListKind, MembershipRecord, MembershipStatus, MovieDetail, MovieId,
  MoviePage, Profile, RecordPage, UserStats,
};

/// Stop walking a collection after this many pages.
const MAX_COLLECTION_PAGES: u32 = 25;

/// Movie API client with transparent caching.
///
/// Every read goes through the [`CacheLayer`]: a fresh entry is returned as
/// is, concurrent identical reads share one request, and the normalized
/// result is cached with the TTL of its scope.
#[derive(Clone)]
pub struct MovieClient {
  http: HttpClient,
  cache: CacheLayer,
}

impl MovieClient {
  pub fn new(http: HttpClient, cache: CacheLayer) -> Self {
    Self { http, cache }
  }

  /// One page of a catalog listing.
  pub async fn list(&self, kind: ListKind, page: u32) -> Result<MoviePage, FetchError> {
    let page = page.max(1);
    let key = ApiQueryKey::List { kind, page }.cache_key();
    let result = self
      .cache
      .fetch(&key, || {
        let http = self.http.clone();
        async move {
          let query = [("type", kind.as_param().to_string()), ("page", page.to_string())];
          let raw: ApiPage<ApiMovie> = http.get("movies/", &query, Access::Public).await?;
          Ok(raw.into_movie_page(page))
        }
      })
      .await?;

    Ok(result.data)
  }

  /// Seed the cache with a listing page obtained `age` ago.
  pub fn prime_list(
    &self,
    kind: ListKind,
    movies: &MoviePage,
    age: Duration,
  ) -> Result<(), FetchError> {
    let key = ApiQueryKey::List {
      kind,
      page: movies.page.max(1),
    }
    .cache_key();
    self.cache.prime(&key, movies, age)
  }

  /// Search the catalog. A blank query yields an empty page without a request.
  pub async fn search(&self, query: &str, page: u32) -> Result<MoviePage, FetchError> {
    let page = page.max(1);
    let trimmed = query.trim().to_string();
    if trimmed.is_empty() {
      return Ok(MoviePage {
        page: 1,
        total_pages: 0,
        total_results: 0,
        results: Vec::new(),
      });
    }

    let key = ApiQueryKey::Search {
      query: trimmed.clone(),
      page,
    }
    .cache_key();
    let result = self
      .cache
      .fetch(&key, || {
        let http = self.http.clone();
        async move {
          let query = [("q", trimmed), ("page", page.to_string())];
          let raw: ApiPage<ApiMovie> = http.get("movies/search/", &query, Access::Public).await?;
          Ok(raw.into_movie_page(page))
        }
      })
      .await?;

    Ok(result.data)
  }

  /// Movie detail aggregate. Genre names are filled in from the genre list
  /// when the detail only carries ids; that lookup is best effort.
  pub async fn detail(&self, id: MovieId) -> Result<MovieDetail, FetchError> {
    let key = ApiQueryKey::Detail { id }.cache_key();
    let result = self
      .cache
      .fetch(&key, || {
        let http = self.http.clone();
        async move {
          let raw: ApiMovieDetail = http
            .get(&format!("movies/{}/", id), &[], Access::Optional)
            .await?;
          raw
            .normalize()
            .ok_or_else(|| FetchError::Decode(format!("movie {} has no catalog id", id)))
        }
      })
      .await?;

    let mut detail = result.data;
    if detail.genres.is_empty() && !detail.movie.genre_ids.is_empty() {
      if let Some(genres) = self.genre_names(&detail.movie.genre_ids).await {
        detail.genres = genres;
      }
    }
    Ok(detail)
  }

  pub async fn genres(&self) -> Result<Vec<Genre>, FetchError> {
    let key = ApiQueryKey::Genres.cache_key();
    let result = self
      .cache
      .fetch(&key, || {
        let http = self.http.clone();
        async move {
          let raw: GenreList = http.get("movies/genres/", &[], Access::Public).await?;
          Ok(raw.into_genres())
        }
      })
      .await?;

    Ok(result.data)
  }

  /// Resolve genre ids to genres. Auxiliary: a failure is logged and yields
  /// `None` rather than failing the caller.
  pub async fn genre_names(&self, ids: &[u64]) -> Option<Vec<Genre>> {
    match self.genres().await {
      Ok(genres) => {
        let by_id: HashMap<u64, &Genre> = genres.iter().map(|g| (g.id, g)).collect();
        Some(
          ids
            .iter()
            .filter_map(|id| by_id.get(id).map(|g| (*g).clone()))
            .collect(),
        )
      }
      Err(e) => {
        warn!(error = %e, "genre lookup failed");
        None
      }
    }
  }

  /// One page of the signed-in user's favorites or watchlist.
  pub async fn collection(
    &self,
    collection: Collection,
    page: u32,
  ) -> Result<RecordPage, FetchError> {
    let page = page.max(1);
    let key = ApiQueryKey::Collection { collection, page }.cache_key();
    let result = self
      .cache
      .fetch(&key, || {
        let http = self.http.clone();
        async move {
          let query = [("page", page.to_string())];
          let raw: ApiPage<ApiRecord> = http.get(collection.path(), &query, Access::Required).await?;
          Ok(raw.into_record_page(page))
        }
      })
      .await?;

    Ok(result.data)
  }

  pub async fn favorites(&self, page: u32) -> Result<RecordPage, FetchError> {
    self.collection(Collection::Favorites, page).await
  }

  pub async fn watchlist(&self, page: u32) -> Result<RecordPage, FetchError> {
    self.collection(Collection::Watchlist, page).await
  }

  /// Every record of a collection, page by page (each page cached).
  pub async fn collection_all(
    &self,
    collection: Collection,
  ) -> Result<Vec<MembershipRecord>, FetchError> {
    let mut records = Vec::new();
    for page in 1..=MAX_COLLECTION_PAGES {
      let current = self.collection(collection, page).await?;
      let has_next = current.has_next && !current.results.is_empty();
      records.extend(current.results);
      if !has_next {
        break;
      }
    }
    Ok(records)
  }

  /// Record id of `movie_id` in `collection`, if it is a member.
  pub async fn find_record(
    &self,
    collection: Collection,
    movie_id: MovieId,
  ) -> Result<Option<u64>, FetchError> {
    let records = self.collection_all(collection).await?;
    Ok(
      records
        .iter()
        .find(|record| record.movie.id == movie_id)
        .map(|record| record.record_id),
    )
  }

  /// Favorite and watchlist membership of one movie. Signed-out users are
  /// members of nothing; no request is made.
  pub async fn membership(&self, movie_id: MovieId) -> Result<MembershipStatus, FetchError> {
    if !self.http.session().is_authenticated() {
      return Ok(MembershipStatus::default());
    }
    let (favorite_record, watchlist_record) = futures::try_join!(
      self.find_record(Collection::Favorites, movie_id),
      self.find_record(Collection::Watchlist, movie_id),
    )?;
    Ok(MembershipStatus {
      favorite_record,
      watchlist_record,
    })
  }

  pub async fn profile(&self) -> Result<Profile, FetchError> {
    let key = ApiQueryKey::Profile.cache_key();
    let result = self
      .cache
      .fetch(&key, || {
        let http = self.http.clone();
        async move { http.get("users/profile/", &[], Access::Required).await }
      })
      .await?;

    Ok(result.data)
  }

  pub async fn stats(&self) -> Result<UserStats, FetchError> {
    let key = ApiQueryKey::Stats.cache_key();
    let result = self
      .cache
      .fetch(&key, || {
        let http = self.http.clone();
        async move { http.get("users/stats/", &[], Access::Required).await }
      })
      .await?;

    Ok(result.data)
  }
}

#[cfg(test)]
mod tests {
  use crate::api::{FetchError, ListKind, Method};
  use crate::test_support::{movie_json, page_json, records_json, services, FakeTransport, Reply};
  use futures::future::join_all;
  use serde_json::json;
  use std::time::Duration;

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_mounts_make_one_request() {
    let transport = FakeTransport::new();
    transport.reply(
      Method::Get,
      "movies/",
      Reply::after(
        Duration::from_millis(200),
        Reply::ok(page_json(1, 3, &[(550, "Fight Club")])),
      ),
    );
    let services = services(&transport);

    // Eight cards mounting in the same tick
    let results =
      join_all((0..8).map(|_| services.movies.list(ListKind::Trending, 1))).await;

    assert_eq!(transport.count(Method::Get, "movies/"), 1);
    let first = results[0].as_ref().unwrap();
    assert!(results.iter().all(|r| r.as_ref().unwrap() == first));
  }

  #[tokio::test(start_paused = true)]
  async fn test_shared_rejection_then_fresh_retry() {
    let transport = FakeTransport::new();
    transport.on(Method::Get, "movies/", |_, n| {
      if n < 3 {
        // First request and its two retries
        Reply::after(Duration::from_millis(50), Reply::Raw(502, String::new()))
      } else {
        Reply::ok(page_json(1, 1, &[(1, "a")]))
      }
    });
    let services = services(&transport);

    let results = join_all((0..4).map(|_| services.movies.list(ListKind::Popular, 1))).await;
    assert!(results
      .iter()
      .all(|r| matches!(r, Err(FetchError::Server { status: 502, .. }))));
    assert_eq!(transport.count(Method::Get, "movies/"), 3);

    // Failures are not cached
    assert!(services.movies.list(ListKind::Popular, 1).await.is_ok());
    assert_eq!(transport.count(Method::Get, "movies/"), 4);
  }

  #[tokio::test(start_paused = true)]
  async fn test_ttl_expiry_refetches() {
    let transport = FakeTransport::new();
    transport.reply(Method::Get, "movies/", Reply::ok(page_json(1, 1, &[(1, "a")])));
    let services = services(&transport);
    let ttl = services.config.cache.ttl_policy().catalog;

    services.movies.list(ListKind::Trending, 1).await.unwrap();
    tokio::time::advance(ttl - Duration::from_secs(1)).await;
    services.movies.list(ListKind::Trending, 1).await.unwrap();
    assert_eq!(transport.count(Method::Get, "movies/"), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    services.movies.list(ListKind::Trending, 1).await.unwrap();
    assert_eq!(transport.count(Method::Get, "movies/"), 2);
  }

  #[tokio::test]
  async fn test_search_pagination_uses_distinct_keys() {
    let transport = FakeTransport::new();
    transport.on(Method::Get, "movies/search/", |request, _| {
      let page: u32 = request
        .url
        .query_pairs()
        .find(|(k, _)| k == "page")
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(1);
      match page {
        1 => Reply::ok(page_json(1, 2, &[(268, "Batman"), (272, "Batman Begins")])),
        _ => Reply::ok(page_json(2, 2, &[(414, "Batman Forever")])),
      }
    });
    let services = services(&transport);

    let first = services.movies.search("batman", 1).await.unwrap();
    assert!(!first.results.is_empty());
    assert!(first.total_pages >= 1);

    let second = services.movies.search("batman", 2).await.unwrap();
    assert_eq!(second.page, 2);
    assert_eq!(second.results[0].title, "Batman Forever");

    let cache = services.cache.cache();
    assert!(cache.contains("search:batman:1"));
    assert!(cache.contains("search:batman:2"));

    // Both pages now come from cache, whatever the query's casing
    services.movies.search(" Batman ", 1).await.unwrap();
    services.movies.search("batman", 2).await.unwrap();
    assert_eq!(transport.count(Method::Get, "movies/search/"), 2);
  }

  #[tokio::test]
  async fn test_blank_search_makes_no_request() {
    let transport = FakeTransport::new();
    let services = services(&transport);
    let page = services.movies.search("   ", 1).await.unwrap();
    assert!(page.results.is_empty());
    assert!(transport.calls().is_empty());
  }

  #[tokio::test]
  async fn test_detail_survives_genre_lookup_failure() {
    let transport = FakeTransport::new();
    transport.reply(
      Method::Get,
      "movies/550/",
      Reply::ok(json!({
        "id": 1, "tmdb_id": 550, "title": "Fight Club", "genre_ids": [18],
        "videos": {"results": [{"key": "abc", "site": "YouTube", "type": "Trailer", "name": "t"}]}
      })),
    );
    transport.reply(Method::Get, "movies/genres/", Reply::Raw(400, "{}".into()));
    let services = services(&transport);

    let detail = services.movies.detail(550).await.unwrap();
    assert_eq!(detail.movie.title, "Fight Club");
    assert_eq!(detail.trailer_key.as_deref(), Some("abc"));
    assert!(detail.genres.is_empty());

    transport.reply(
      Method::Get,
      "movies/genres/",
      Reply::ok(json!({"genres": [{"id": 18, "name": "Drama"}]})),
    );
    let detail = services.movies.detail(550).await.unwrap();
    assert_eq!(detail.genres[0].name, "Drama");
    // The detail itself came from cache both times
    assert_eq!(transport.count(Method::Get, "movies/550/"), 1);
  }

  #[tokio::test]
  async fn test_detail_rating_does_not_outlive_session() {
    let transport = FakeTransport::new();
    // The backend only includes the caller's rating for authenticated requests
    transport.on(Method::Get, "movies/550/", |req, _| {
      let mut body = movie_json(550, "Fight Club");
      if req.bearer.as_deref() == Some("alice") {
        body["user_rating"] = json!(4);
      }
      Reply::ok(body)
    });
    transport.reply(Method::Get, "movies/genres/", Reply::ok(json!([])));
    let services = services(&transport);

    services.session.sign_in("alice", None);
    let detail = services.movies.detail(550).await.unwrap();
    assert_eq!(detail.movie.user_rating, Some(4));

    services.session.sign_out();
    let detail = services.movies.detail(550).await.unwrap();
    assert_eq!(detail.movie.user_rating, None);
    assert_eq!(transport.count(Method::Get, "movies/550/"), 2);

    services.session.sign_in("bob", None);
    let detail = services.movies.detail(550).await.unwrap();
    assert_eq!(detail.movie.user_rating, None);
    assert_eq!(transport.count(Method::Get, "movies/550/"), 3);
  }

  #[tokio::test]
  async fn test_membership_requires_session() {
    let transport = FakeTransport::new();
    let services = services(&transport);
    let status = services.movies.membership(550).await.unwrap();
    assert!(!status.is_favorite());
    assert!(transport.calls().is_empty());

    assert_eq!(
      services.movies.favorites(1).await.unwrap_err(),
      FetchError::Unauthorized
    );
    assert!(transport.calls().is_empty());
  }

  #[tokio::test]
  async fn test_membership_from_collections() {
    let transport = FakeTransport::new();
    transport.reply(Method::Get, "movies/favorites/", Reply::ok(records_json(&[(7, 550)])));
    transport.reply(Method::Get, "movies/watchlist/", Reply::ok(records_json(&[])));
    let services = services(&transport);
    services.session.sign_in("opaque-token", None);

    let status = services.movies.membership(550).await.unwrap();
    assert_eq!(status.favorite_record, Some(7));
    assert!(!status.is_watchlisted());

    let call = &transport.calls()[0];
    assert_eq!(call.bearer.as_deref(), Some("opaque-token"));
  }
}
