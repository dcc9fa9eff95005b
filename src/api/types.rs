use serde::{Deserialize, Serialize};

/// Numeric catalog identifier (the upstream movie database id).
pub type MovieId = u64;

/// Canonical movie record. Every response shape is normalized into this at
/// the fetch boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
  pub id: MovieId,
  pub title: String,
  pub overview: String,
  pub poster_path: Option<String>,
  pub backdrop_path: Option<String>,
  pub release_date: Option<String>,
  pub vote_average: f64,
  pub vote_count: u64,
  pub genre_ids: Vec<u64>,
  pub media_type: String,
  pub runtime: Option<u32>,
  /// Rating the signed-in user gave, 1 to 5
  pub user_rating: Option<u8>,
}

impl Movie {
  pub fn year(&self) -> Option<&str> {
    self
      .release_date
      .as_deref()
      .and_then(|date| date.get(..4))
      .filter(|year| !year.is_empty())
  }
}

/// One page of a paginated movie listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoviePage {
  pub page: u32,
  pub total_pages: u32,
  pub total_results: u64,
  pub results: Vec<Movie>,
}

impl MoviePage {
  pub fn has_next(&self) -> bool {
    self.page < self.total_pages
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
  pub id: u64,
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastMember {
  pub name: String,
  pub character: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
  pub key: String,
  pub name: String,
  pub site: String,
  /// "Trailer", "Teaser", "Clip", ...
  pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
  pub author: String,
  pub content: String,
  pub rating: Option<f64>,
}

/// Movie detail aggregate: the record plus credits, videos, reviews and
/// similar titles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovieDetail {
  pub movie: Movie,
  pub tagline: Option<String>,
  pub genres: Vec<Genre>,
  pub cast: Vec<CastMember>,
  pub videos: Vec<Video>,
  pub reviews: Vec<Review>,
  pub similar: Vec<Movie>,
  /// YouTube key of the best trailer, if any
  pub trailer_key: Option<String>,
}

/// A favorite or watchlist entry. `record_id` addresses the entry itself and
/// is what removal endpoints expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipRecord {
  pub record_id: u64,
  pub movie: Movie,
  pub added_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPage {
  pub page: u32,
  pub count: u64,
  pub has_next: bool,
  pub results: Vec<MembershipRecord>,
}

impl RecordPage {
  pub fn find(&self, movie_id: MovieId) -> Option<&MembershipRecord> {
    self.results.iter().find(|record| record.movie.id == movie_id)
  }

  /// The listed movies as a page. Collections only say whether another page
  /// exists, so `total_pages` never runs more than one ahead.
  pub fn into_movie_page(self) -> MoviePage {
    MoviePage {
      page: self.page,
      total_pages: if self.has_next { self.page + 1 } else { self.page },
      total_results: self.count,
      results: self.results.into_iter().map(|record| record.movie).collect(),
    }
  }
}

/// Favorite/watchlist membership of one movie for the signed-in user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipStatus {
  pub favorite_record: Option<u64>,
  pub watchlist_record: Option<u64>,
}

impl MembershipStatus {
  pub fn is_favorite(&self) -> bool {
    self.favorite_record.is_some()
  }

  pub fn is_watchlisted(&self) -> bool {
    self.watchlist_record.is_some()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub id: u64,
  pub email: String,
  pub username: String,
  #[serde(default)]
  pub first_name: String,
  #[serde(default)]
  pub last_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
  pub email: String,
  pub username: String,
  pub first_name: String,
  pub last_name: String,
  pub bio: Option<String>,
  pub birth_date: Option<String>,
}

impl Profile {
  pub fn display_name(&self) -> &str {
    if self.first_name.is_empty() {
      &self.username
    } else {
      &self.first_name
    }
  }
}

/// Editable profile fields; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub first_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub last_name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub bio: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserStats {
  pub favorites_count: u64,
  pub watchlist_count: u64,
  pub ratings_count: u64,
  /// e.g. "May 2024"
  pub member_since: String,
}

/// Landing-page and browse listings served by the unified movies endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListKind {
  Trending,
  TopRated,
  Popular,
  Movies,
  Tv,
}

impl ListKind {
  pub const ALL: [ListKind; 5] = [
    ListKind::Trending,
    ListKind::TopRated,
    ListKind::Popular,
    ListKind::Movies,
    ListKind::Tv,
  ];

  /// Value of the `type` query parameter.
  pub fn as_param(self) -> &'static str {
    match self {
      ListKind::Trending => "trending",
      ListKind::TopRated => "top_rated",
      ListKind::Popular => "popular",
      ListKind::Movies => "movies",
      ListKind::Tv => "tv",
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      ListKind::Trending => "Trending",
      ListKind::TopRated => "Top Rated",
      ListKind::Popular => "Popular",
      ListKind::Movies => "Movies",
      ListKind::Tv => "TV Shows",
    }
  }

  pub fn from_param(param: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|kind| kind.as_param() == param)
  }
}

/// The two per-user movie collections. They share one REST shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
  Favorites,
  Watchlist,
}

impl Collection {
  pub fn path(self) -> &'static str {
    match self {
      Collection::Favorites => "movies/favorites/",
      Collection::Watchlist => "movies/watchlist/",
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Collection::Favorites => "Favorites",
      Collection::Watchlist => "Watchlist",
    }
  }
}
