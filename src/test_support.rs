//! Scripted transport and fixtures shared by the unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::api::{FetchError, HttpRequest, HttpResponse, Method, Transport};
use crate::config::Config;
use crate::services::Services;
use crate::store::MemoryStore;

pub const BASE_URL: &str = "http://backend.test/api/v1";

/// What the fake server does with a matched request.
#[derive(Debug, Clone)]
pub enum Reply {
  Json(u16, Value),
  Raw(u16, String),
  /// Reply after a delay (tokio time, so paused clocks apply)
  Delay(Duration, Box<Reply>),
  /// Never reply; exercises the timeout
  Hang,
  Fail(FetchError),
}

impl Reply {
  pub fn ok(body: Value) -> Self {
    Reply::Json(200, body)
  }

  pub fn after(delay: Duration, reply: Reply) -> Self {
    Reply::Delay(delay, Box::new(reply))
  }
}

type Responder = Box<dyn Fn(&HttpRequest, usize) -> Reply + Send + Sync>;

struct Route {
  method: Method,
  path: String,
  responder: Responder,
}

/// In-memory [`Transport`] that matches requests on method and path (query
/// ignored), records every call and replays scripted replies. Later routes
/// shadow earlier ones; unmatched requests get a 404.
#[derive(Default)]
pub struct FakeTransport {
  routes: Mutex<Vec<Route>>,
  calls: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  /// Route with a responder that also sees how many times this route was hit
  /// before (0 for the first call).
  pub fn on<F>(&self, method: Method, path: &str, responder: F)
  where
    F: Fn(&HttpRequest, usize) -> Reply + Send + Sync + 'static,
  {
    self.routes.lock().unwrap_or_else(PoisonError::into_inner).push(Route {
      method,
      path: path.trim_matches('/').to_string(),
      responder: Box::new(responder),
    });
  }

  pub fn reply(&self, method: Method, path: &str, reply: Reply) {
    self.on(method, path, move |_, _| reply.clone());
  }

  pub fn calls(&self) -> Vec<HttpRequest> {
    self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  /// Calls made to `method path`, ignoring the query string.
  pub fn count(&self, method: Method, path: &str) -> usize {
    let path = path.trim_matches('/');
    self
      .calls()
      .iter()
      .filter(|call| call.method == method && relative_path(call) == path)
      .count()
  }
}

fn relative_path(request: &HttpRequest) -> &str {
  request
    .url
    .path()
    .trim_start_matches("/api/v1")
    .trim_matches('/')
}

#[async_trait]
impl Transport for FakeTransport {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, FetchError> {
    let reply = {
      let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
      let path = relative_path(&request);
      let previous = calls
        .iter()
        .filter(|c| c.method == request.method && relative_path(c) == path)
        .count();
      let routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
      let reply = routes
        .iter()
        .rev()
        .find(|route| route.method == request.method && route.path == path)
        .map(|route| (route.responder)(&request, previous))
        .unwrap_or_else(|| Reply::Raw(404, r#"{"detail": "Not found."}"#.into()));
      calls.push(request);
      reply
    };
    resolve(reply).await
  }
}

async fn resolve(mut reply: Reply) -> Result<HttpResponse, FetchError> {
  loop {
    match reply {
      Reply::Json(status, body) => {
        return Ok(HttpResponse {
          status,
          body: body.to_string(),
        })
      }
      Reply::Raw(status, body) => return Ok(HttpResponse { status, body }),
      Reply::Delay(delay, inner) => {
        tokio::time::sleep(delay).await;
        reply = *inner;
      }
      Reply::Hang => std::future::pending::<()>().await,
      Reply::Fail(e) => return Err(e),
    }
  }
}

/// Configuration pointing at the fake backend, with defaults otherwise.
pub fn test_config() -> Config {
  let mut config = Config::default();
  config.api.base_url = BASE_URL.to_string();
  config
}

/// Services wired to `transport` and an empty in-memory store.
pub fn services(transport: &Arc<FakeTransport>) -> Services {
  Services::init(test_config(), Arc::new(MemoryStore::new()), transport.clone()).unwrap()
}

/// A catalog record the way the backend serializes it.
pub fn movie_json(tmdb_id: u64, title: &str) -> Value {
  serde_json::json!({
    "id": tmdb_id + 10_000,
    "tmdb_id": tmdb_id,
    "title": title,
    "overview": "",
    "poster_path": "/p.jpg",
    "release_date": "2008-07-18",
    "vote_average": 8.5,
    "genre_ids": [28, 80],
    "media_type": "movie"
  })
}

/// A paginated page of catalog records.
pub fn page_json(page: u32, total_pages: u32, movies: &[(u64, &str)]) -> Value {
  let results: Vec<Value> = movies.iter().map(|(id, title)| movie_json(*id, title)).collect();
  serde_json::json!({
    "page": page,
    "results": results,
    "total_pages": total_pages,
    "total_results": total_pages * 20,
  })
}

/// A favorites/watchlist page: records wrap the movie under `movie`.
pub fn records_json(records: &[(u64, u64)]) -> Value {
  let results: Vec<Value> = records
    .iter()
    .map(|(record_id, tmdb_id)| {
      serde_json::json!({
        "id": record_id,
        "movie": movie_json(*tmdb_id, &format!("Movie {}", tmdb_id)),
        "created_at": "2024-05-01T10:00:00Z",
      })
    })
    .collect();
  serde_json::json!({
    "count": records.len(),
    "next": null,
    "previous": null,
    "results": results,
  })
}
