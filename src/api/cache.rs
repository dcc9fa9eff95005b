//! Cache keys for backend API calls.

use crate::cache::{CacheKey, Scope};

use super::types::{Collection, ListKind, MovieId};

/// Query key types for backend API calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiQueryKey {
  /// One page of a catalog listing
  List { kind: ListKind, page: u32 },
  Search { query: String, page: u32 },
  Detail { id: MovieId },
  Genres,
  /// One page of the user's favorites or watchlist
  Collection { collection: Collection, page: u32 },
  Profile,
  Stats,
}

impl ApiQueryKey {
  pub fn cache_key(&self) -> CacheKey {
    match self {
      Self::List { kind, page } => {
        CacheKey::new(Scope::Lists, &[kind.as_param(), &page.to_string()])
      }
      Self::Search { query, page } => {
        CacheKey::new(Scope::Search, &[&normalize_query(query), &page.to_string()])
      }
      Self::Detail { id } => CacheKey::new(Scope::Detail, &[&id.to_string()]),
      Self::Genres => CacheKey::new(Scope::Genres, &["movie"]),
      Self::Collection { collection, page } => {
        CacheKey::new(collection_scope(*collection), &[&page.to_string()])
      }
      Self::Profile => CacheKey::new(Scope::Profile, &["me"]),
      Self::Stats => CacheKey::new(Scope::Profile, &["stats"]),
    }
  }

  pub fn description(&self) -> String {
    match self {
      Self::List { kind, page } => format!("{} (page {})", kind.label(), page),
      Self::Search { query, page } => format!("search \"{}\" (page {})", query.trim(), page),
      Self::Detail { id } => format!("movie {}", id),
      Self::Genres => "genres".to_string(),
      Self::Collection { collection, page } => {
        format!("{} (page {})", collection.label().to_lowercase(), page)
      }
      Self::Profile => "profile".to_string(),
      Self::Stats => "profile stats".to_string(),
    }
  }
}

pub fn collection_scope(collection: Collection) -> Scope {
  match collection {
    Collection::Favorites => Scope::Favorites,
    Collection::Watchlist => Scope::Watchlist,
  }
}

/// Normalize a search query for consistent keys.
/// Trims, lowercases and collapses inner whitespace.
pub fn normalize_query(query: &str) -> String {
  query
    .split_whitespace()
    .map(str::to_lowercase)
    .collect::<Vec<_>>()
    .join(" ")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_search_pages_have_distinct_keys() {
    let page = |page| ApiQueryKey::Search {
      query: "  Batman ".into(),
      page,
    };
    assert_eq!(page(1).cache_key().as_str(), "search:batman:1");
    assert_eq!(page(2).cache_key().as_str(), "search:batman:2");
  }

  #[test]
  fn test_key_shapes() {
    let key = |k: ApiQueryKey| k.cache_key().as_str().to_string();
    assert_eq!(
      key(ApiQueryKey::List {
        kind: ListKind::TopRated,
        page: 3
      }),
      "movies:top_rated:3"
    );
    assert_eq!(key(ApiQueryKey::Detail { id: 550 }), "movie:550");
    assert_eq!(
      key(ApiQueryKey::Collection {
        collection: Collection::Watchlist,
        page: 1
      }),
      "watchlist:1"
    );
    assert_eq!(key(ApiQueryKey::Stats), "profile:stats");
  }

  #[test]
  fn test_query_normalization() {
    assert_eq!(normalize_query("The   Dark\tKnight"), "the dark knight");
  }
}
