//! Apply-then-confirm updates of view state.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::api::{Collection, FetchError, MembershipStatus, MovieId, MutationBroadcaster};

/// Apply a local change, run the mutation, and revert the change if the
/// mutation fails. The state lock is only held while `apply` and `revert`
/// run, never across the await.
pub async fn perform_optimistic_mutation<S, T, E, Fut>(
  state: &Mutex<S>,
  apply: impl FnOnce(&mut S),
  mutate: impl FnOnce() -> Fut,
  revert: impl FnOnce(&mut S),
) -> Result<T, E>
where
  Fut: Future<Output = Result<T, E>>,
{
  apply(&mut state.lock().unwrap_or_else(PoisonError::into_inner));
  match mutate().await {
    Ok(value) => Ok(value),
    Err(e) => {
      debug!("optimistic update rolled back");
      revert(&mut state.lock().unwrap_or_else(PoisonError::into_inner));
      Err(e)
    }
  }
}

/// Membership flags as a view displays them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MembershipFlags {
  pub favorite: bool,
  pub watchlist: bool,
}

impl MembershipFlags {
  pub fn get(&self, collection: Collection) -> bool {
    match collection {
      Collection::Favorites => self.favorite,
      Collection::Watchlist => self.watchlist,
    }
  }

  pub fn set(&mut self, collection: Collection, value: bool) {
    match collection {
      Collection::Favorites => self.favorite = value,
      Collection::Watchlist => self.watchlist = value,
    }
  }
}

impl From<MembershipStatus> for MembershipFlags {
  fn from(status: MembershipStatus) -> Self {
    Self {
      favorite: status.is_favorite(),
      watchlist: status.is_watchlisted(),
    }
  }
}

/// Flip one membership flag immediately and persist the flip. Returns the
/// new membership on success; on failure the flag is back where it was.
pub async fn toggle_membership(
  mutations: &MutationBroadcaster,
  flags: &Mutex<MembershipFlags>,
  collection: Collection,
  movie_id: MovieId,
) -> Result<bool, FetchError> {
  let was = flags
    .lock()
    .unwrap_or_else(PoisonError::into_inner)
    .get(collection);
  perform_optimistic_mutation(
    flags,
    |f| f.set(collection, !was),
    || mutations.toggle(collection, movie_id, was),
    |f| f.set(collection, was),
  )
  .await?;
  Ok(!was)
}
