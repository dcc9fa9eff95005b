//! Serde-deserializable types matching backend responses, and the single
//! normalization step that turns them into canonical records.
//!
//! The backend proxies the upstream catalog, so the same movie can arrive in
//! several shapes: with a database `id` plus the catalog `tmdb_id`, with only
//! the catalog `id`, or nested under `movie` inside a favorite/watchlist
//! record. Nothing outside this module sees those variations.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::types::{
  CastMember, Genre, MembershipRecord, Movie, MovieDetail, MoviePage, RecordPage, Review, User,
  Video,
};

// ============================================================================
// Movie records
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ApiMovie {
  pub id: Option<u64>,
  pub tmdb_id: Option<u64>,
  pub title: Option<String>,
  /// TV shows use `name`
  pub name: Option<String>,
  pub overview: Option<String>,
  pub poster_path: Option<String>,
  pub backdrop_path: Option<String>,
  pub release_date: Option<String>,
  pub first_air_date: Option<String>,
  pub vote_average: Option<f64>,
  pub vote_count: Option<u64>,
  #[serde(default)]
  pub genre_ids: Vec<u64>,
  pub media_type: Option<String>,
  pub runtime: Option<u32>,
  pub user_rating: Option<f64>,
  pub movie: Option<Box<ApiMovie>>,
}

impl ApiMovie {
  /// Canonical record, or `None` if no catalog id can be found.
  pub fn normalize(self) -> Option<Movie> {
    if let Some(inner) = self.movie {
      let user_rating = self.user_rating;
      let mut movie = inner.normalize()?;
      movie.user_rating = movie.user_rating.or(user_rating.map(to_stars));
      return Some(movie);
    }

    let Some(id) = self.tmdb_id.or(self.id) else {
      debug!(title = ?self.title, "dropping record without a catalog id");
      return None;
    };
    Some(Movie {
      id,
      title: self
        .title
        .or(self.name)
        .unwrap_or_else(|| format!("Untitled #{}", id)),
      overview: self.overview.unwrap_or_default(),
      poster_path: self.poster_path.filter(|p| !p.is_empty()),
      backdrop_path: self.backdrop_path.filter(|p| !p.is_empty()),
      release_date: self
        .release_date
        .or(self.first_air_date)
        .filter(|d| !d.is_empty()),
      vote_average: self.vote_average.unwrap_or_default(),
      vote_count: self.vote_count.unwrap_or_default(),
      genre_ids: self.genre_ids,
      media_type: self.media_type.unwrap_or_else(|| "movie".to_string()),
      runtime: self.runtime,
      user_rating: self.user_rating.map(to_stars),
    })
  }
}

fn to_stars(rating: f64) -> u8 {
  rating.round().clamp(0.0, 5.0) as u8
}

// ============================================================================
// Pagination: the backend paginates two ways, and some endpoints return a
// bare array
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiPage<T> {
  /// Catalog style: `{page, results, total_pages, total_results}`
  /// Django style: `{count, next, previous, results}`
  Paged {
    page: Option<u32>,
    results: Vec<T>,
    total_pages: Option<u32>,
    total_results: Option<u64>,
    count: Option<u64>,
    next: Option<String>,
  },
  Bare(Vec<T>),
}

impl ApiPage<ApiMovie> {
  /// `requested` fills in the page number when the response omits it.
  pub fn into_movie_page(self, requested: u32) -> MoviePage {
    match self {
      ApiPage::Paged {
        page,
        results,
        total_pages,
        total_results,
        count,
        next,
      } => {
        let results: Vec<Movie> = results.into_iter().filter_map(ApiMovie::normalize).collect();
        let page = page.unwrap_or(requested).max(1);
        let total_pages = total_pages
          .unwrap_or(if next.is_some() { page + 1 } else { page })
          .max(1);
        MoviePage {
          page,
          total_pages,
          total_results: total_results.or(count).unwrap_or(results.len() as u64),
          results,
        }
      }
      ApiPage::Bare(results) => {
        let results: Vec<Movie> = results.into_iter().filter_map(ApiMovie::normalize).collect();
        MoviePage {
          page: 1,
          total_pages: 1,
          total_results: results.len() as u64,
          results,
        }
      }
    }
  }
}

// ============================================================================
// Favorite / watchlist records
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiRecord {
  pub id: u64,
  pub movie: Option<ApiMovie>,
  /// Older responses inline the catalog id instead of nesting the movie
  pub movie_id: Option<u64>,
  pub tmdb_id: Option<u64>,
  pub created_at: Option<String>,
}

impl ApiRecord {
  pub fn normalize(self) -> Option<MembershipRecord> {
    let movie = match self.movie {
      Some(movie) => movie.normalize(),
      None => ApiMovie {
        id: self.movie_id,
        tmdb_id: self.tmdb_id,
        ..ApiMovie::default()
      }
      .normalize(),
    }?;
    Some(MembershipRecord {
      record_id: self.id,
      movie,
      added_at: self.created_at,
    })
  }
}

impl ApiPage<ApiRecord> {
  pub fn into_record_page(self, requested: u32) -> RecordPage {
    match self {
      ApiPage::Paged {
        page,
        results,
        total_pages,
        count,
        next,
        ..
      } => {
        let page = page.unwrap_or(requested).max(1);
        let results: Vec<MembershipRecord> =
          results.into_iter().filter_map(ApiRecord::normalize).collect();
        RecordPage {
          page,
          count: count.unwrap_or(results.len() as u64),
          has_next: next.is_some() || total_pages.is_some_and(|total| page < total),
          results,
        }
      }
      ApiPage::Bare(results) => {
        let results: Vec<MembershipRecord> =
          results.into_iter().filter_map(ApiRecord::normalize).collect();
        RecordPage {
          page: 1,
          count: results.len() as u64,
          has_next: false,
          results,
        }
      }
    }
  }
}

// ============================================================================
// Detail aggregate
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiMovieDetail {
  #[serde(flatten)]
  pub movie: ApiMovie,
  pub tagline: Option<String>,
  pub genres: Option<Value>,
  pub credits: Option<Value>,
  pub videos: Option<Value>,
  pub reviews: Option<Value>,
  pub similar: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ApiCredits {
  #[serde(default)]
  cast: Vec<ApiCast>,
}

#[derive(Debug, Deserialize)]
struct ApiCast {
  name: String,
  character: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiVideo {
  key: String,
  #[serde(default)]
  name: String,
  #[serde(default)]
  site: String,
  #[serde(rename = "type", default)]
  kind: String,
}

#[derive(Debug, Deserialize)]
struct ApiReview {
  #[serde(default)]
  author: String,
  #[serde(default)]
  content: String,
  author_details: Option<ApiAuthorDetails>,
}

#[derive(Debug, Deserialize)]
struct ApiAuthorDetails {
  rating: Option<f64>,
}

impl ApiMovieDetail {
  /// Canonical detail. The appended sections are optional: one that is
  /// missing or malformed becomes empty instead of failing the detail.
  pub fn normalize(self) -> Option<MovieDetail> {
    let movie = self.movie.normalize()?;

    let cast = lenient::<ApiCredits>("credits", self.credits)
      .map(|credits| {
        credits
          .cast
          .into_iter()
          .map(|c| CastMember {
            name: c.name,
            character: c.character.filter(|s| !s.is_empty()),
          })
          .collect()
      })
      .unwrap_or_default();

    let videos: Vec<Video> = lenient::<ApiPage<ApiVideo>>("videos", self.videos)
      .map(page_items)
      .unwrap_or_default()
      .into_iter()
      .map(|v| Video {
        key: v.key,
        name: v.name,
        site: v.site,
        kind: v.kind,
      })
      .collect();

    let reviews = lenient::<ApiPage<ApiReview>>("reviews", self.reviews)
      .map(page_items)
      .unwrap_or_default()
      .into_iter()
      .map(|r| Review {
        author: r.author,
        content: r.content,
        rating: r.author_details.and_then(|d| d.rating),
      })
      .collect();

    let similar = lenient::<ApiPage<ApiMovie>>("similar", self.similar)
      .map(|page| page.into_movie_page(1).results)
      .unwrap_or_default();

    let genres = lenient::<GenreList>("genres", self.genres)
      .map(GenreList::into_genres)
      .unwrap_or_default();

    Some(MovieDetail {
      trailer_key: trailer_key(&videos),
      movie,
      tagline: self.tagline.filter(|t| !t.is_empty()),
      genres,
      cast,
      videos,
      reviews,
      similar,
    })
  }
}

fn page_items<T>(page: ApiPage<T>) -> Vec<T> {
  match page {
    ApiPage::Paged { results, .. } => results,
    ApiPage::Bare(items) => items,
  }
}

fn lenient<T: DeserializeOwned>(section: &str, value: Option<Value>) -> Option<T> {
  match value? {
    Value::Null => None,
    value => serde_json::from_value(value)
      .map_err(|e| warn!(section, error = %e, "ignoring malformed detail section"))
      .ok(),
  }
}

/// First YouTube trailer, else the first YouTube video of any kind.
pub fn trailer_key(videos: &[Video]) -> Option<String> {
  let youtube = || videos.iter().filter(|v| v.site.eq_ignore_ascii_case("youtube"));
  youtube()
    .find(|v| v.kind == "Trailer")
    .or_else(|| youtube().next())
    .map(|v| v.key.clone())
}

// ============================================================================
// Genres
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum GenreList {
  Wrapped { genres: Vec<Genre> },
  Bare(Vec<Genre>),
}

impl GenreList {
  pub fn into_genres(self) -> Vec<Genre> {
    match self {
      GenreList::Wrapped { genres } | GenreList::Bare(genres) => genres,
    }
  }
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiTokens {
  pub access: String,
  pub refresh: Option<String>,
}

/// Login and registration response.
#[derive(Debug, Deserialize)]
pub struct ApiAuthResponse {
  pub tokens: ApiTokens,
  pub user: User,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn movie(value: Value) -> Option<Movie> {
    serde_json::from_value::<ApiMovie>(value).unwrap().normalize()
  }

  #[test]
  fn test_catalog_id_prefers_tmdb_id() {
    let m = movie(json!({"id": 7, "tmdb_id": 550, "title": "Fight Club"})).unwrap();
    assert_eq!(m.id, 550);
    let m = movie(json!({"id": 550, "title": "Fight Club"})).unwrap();
    assert_eq!(m.id, 550);
    assert!(movie(json!({"title": "No id"})).is_none());
  }

  #[test]
  fn test_tv_shape() {
    let m = movie(json!({"id": 1399, "name": "Game of Thrones", "first_air_date": "2011-04-17"}))
      .unwrap();
    assert_eq!(m.title, "Game of Thrones");
    assert_eq!(m.year(), Some("2011"));
  }

  #[test]
  fn test_nested_record_uses_catalog_id_not_record_id() {
    let record: ApiRecord = serde_json::from_value(json!({
      "id": 3,
      "movie": {"id": 99, "tmdb_id": 155, "title": "The Dark Knight"},
      "created_at": "2024-05-01T10:00:00Z"
    }))
    .unwrap();
    let record = record.normalize().unwrap();
    assert_eq!(record.record_id, 3);
    assert_eq!(record.movie.id, 155);
  }

  #[test]
  fn test_pagination_shapes() {
    let catalog: ApiPage<ApiMovie> = serde_json::from_value(json!({
      "page": 2, "results": [{"id": 1, "title": "a"}], "total_pages": 5, "total_results": 100
    }))
    .unwrap();
    let page = catalog.into_movie_page(2);
    assert_eq!((page.page, page.total_pages, page.total_results), (2, 5, 100));

    let bare: ApiPage<ApiMovie> = serde_json::from_value(json!([{"id": 1}, {"id": 2}])).unwrap();
    let page = bare.into_movie_page(1);
    assert_eq!(page.results.len(), 2);
    assert_eq!(page.total_pages, 1);

    let django: ApiPage<ApiRecord> = serde_json::from_value(json!({
      "count": 21, "next": "http://x/?page=2", "previous": null,
      "results": [{"id": 1, "movie_id": 550}]
    }))
    .unwrap();
    let records = django.into_record_page(1);
    assert!(records.has_next);
    assert_eq!(records.count, 21);
    assert_eq!(records.results[0].movie.id, 550);
  }

  #[test]
  fn test_trailer_selection() {
    let video = |key: &str, site: &str, kind: &str| Video {
      key: key.into(),
      name: String::new(),
      site: site.into(),
      kind: kind.into(),
    };
    let videos = vec![
      video("vimeo", "Vimeo", "Trailer"),
      video("teaser", "YouTube", "Teaser"),
      video("trailer", "YouTube", "Trailer"),
    ];
    assert_eq!(trailer_key(&videos).as_deref(), Some("trailer"));
    assert_eq!(trailer_key(&videos[..2]).as_deref(), Some("teaser"));
    assert_eq!(trailer_key(&videos[..1]), None);
  }

  #[test]
  fn test_malformed_detail_section_does_not_fail_detail() {
    let detail: ApiMovieDetail = serde_json::from_value(json!({
      "id": 1, "tmdb_id": 550, "title": "Fight Club",
      "videos": {"results": "oops"},
      "credits": {"cast": [{"name": "Edward Norton", "character": "Narrator"}]},
      "similar": {"page": 1, "results": [{"id": 807, "title": "Se7en"}], "total_pages": 1}
    }))
    .unwrap();
    let detail = detail.normalize().unwrap();
    assert!(detail.videos.is_empty());
    assert_eq!(detail.trailer_key, None);
    assert_eq!(detail.cast[0].name, "Edward Norton");
    assert_eq!(detail.similar[0].id, 807);
  }
}
