//! Async query abstraction for view data.
//!
//! A `Query<T>` owns one fetch at a time. Starting a new fetch aborts the
//! previous one, and dropping the query aborts whatever is still running, so
//! a view that navigates away never receives a result meant for an older
//! request.
//!
//! # Example
//!
//! ```ignore
//! let movies = services.movies.clone();
//! let mut query = Query::new(move || {
//!     let movies = movies.clone();
//!     async move { movies.list(ListKind::Trending, 1).await }
//! });
//!
//! query.fetch();
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, trigger re-render
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::api::FetchError;

/// The state of a query
#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// Query is currently fetching data
  Loading,
  Success(T),
  Error(FetchError),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, FetchError>> + Send>>;

type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<T> + Send + Sync>;

/// Results are tagged with the request number that produced them.
type Tagged<T> = (u64, Result<T, FetchError>);

pub struct Query<T> {
  state: QueryState<T>,
  fetcher: FetcherFn<T>,
  sender: mpsc::UnboundedSender<Tagged<T>>,
  receiver: mpsc::UnboundedReceiver<Tagged<T>>,
  task: Option<JoinHandle<()>>,
  /// Number of the request whose result will be applied
  current: u64,
}

impl<T: Send + 'static> Query<T> {
  /// Create a new query with the given fetcher function.
  ///
  /// The fetcher is called each time `fetch()` or `refetch()` starts a
  /// request.
  pub fn new<F, Fut>(fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
  {
    let (sender, receiver) = mpsc::unbounded_channel();
    Self {
      state: QueryState::Idle,
      fetcher: Box::new(move || Box::pin(fetcher())),
      sender,
      receiver,
      task: None,
      current: 0,
    }
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  /// Start fetching data if not already loading.
  pub fn fetch(&mut self) {
    if self.state.is_loading() {
      return;
    }
    self.start_fetch();
  }

  /// Abandon any pending request and start a new one.
  pub fn refetch(&mut self) {
    self.cancel();
    self.start_fetch();
  }

  /// Abort the pending request, if any. Loaded data is kept.
  pub fn cancel(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
    // Anything already sent belongs to the aborted request
    self.current += 1;
    if self.state.is_loading() {
      self.state = QueryState::Idle;
    }
  }

  /// Apply a finished result, if any.
  ///
  /// Returns `true` if the state changed. Results from superseded requests
  /// are dropped here.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;
    while let Ok((request, result)) = self.receiver.try_recv() {
      if request != self.current {
        continue;
      }
      self.task = None;
      self.state = match result {
        Ok(data) => QueryState::Success(data),
        Err(e) => QueryState::Error(e),
      };
      changed = true;
    }
    changed
  }

  fn start_fetch(&mut self) {
    self.current += 1;
    let request = self.current;
    self.state = QueryState::Loading;

    let future = (self.fetcher)();
    let sender = self.sender.clone();
    self.task = Some(tokio::spawn(async move {
      let result = future.await;
      let _ = sender.send((request, result));
    }));
  }
}

impl<T> Drop for Query<T> {
  fn drop(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .field("current", &self.current)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;
  use std::time::Duration;

  #[tokio::test]
  async fn test_query_success() {
    let mut query = Query::new(|| async { Ok(vec![1, 2, 3]) });

    assert!(matches!(query.state(), QueryState::Idle));

    query.fetch();
    assert!(query.is_loading());

    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(query.poll());
    assert!(matches!(query.state(), QueryState::Success(_)));
    assert_eq!(query.data(), Some(&vec![1, 2, 3]));
  }

  #[tokio::test]
  async fn test_query_error() {
    let mut query: Query<i32> = Query::new(|| async { Err(FetchError::NotFound("movie".into())) });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(query.poll());
    assert!(matches!(
      query.state(),
      QueryState::Error(FetchError::NotFound(what)) if what == "movie"
    ));
  }

  #[tokio::test]
  async fn test_fetch_while_loading_is_noop() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let mut query = Query::new(move || {
      counter.fetch_add(1, Ordering::SeqCst);
      async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(42)
      }
    });

    query.fetch();
    query.fetch();
    assert!(query.is_loading());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_superseded_result_is_discarded() {
    let counter = Arc::new(AtomicU32::new(0));
    let counter_clone = counter.clone();

    // The first request is slower than the second
    let mut query = Query::new(move || {
      let n = counter_clone.fetch_add(1, Ordering::SeqCst);
      async move {
        let delay = if n == 0 { 100 } else { 10 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(n)
      }
    });

    query.fetch();
    tokio::time::sleep(Duration::from_millis(5)).await;
    query.refetch();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(query.poll());
    assert_eq!(query.data(), Some(&1));
    assert!(!query.poll());
  }

  #[tokio::test(start_paused = true)]
  async fn test_drop_aborts_pending_request() {
    let finished = Arc::new(AtomicU32::new(0));
    let flag = finished.clone();
    let mut query = Query::new(move || {
      let flag = flag.clone();
      async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        flag.fetch_add(1, Ordering::SeqCst);
        Ok(())
      }
    });

    query.fetch();
    tokio::task::yield_now().await;
    drop(query);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(finished.load(Ordering::SeqCst), 0);
  }
}
