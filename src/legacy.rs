//! Local favorite-ID list from before favorites lived on the backend.
//!
//! Only consulted while signed out. Nothing here talks to the backend and
//! the list is never merged into the account's favorites.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::warn;

use crate::api::MovieId;
use crate::store::{keys, KeyValueStore};

#[deprecated(note = "favorites are stored on the backend; use MutationBroadcaster")]
#[derive(Clone)]
pub struct LegacyFavorites {
  store: Arc<dyn KeyValueStore>,
}

#[allow(deprecated)]
impl LegacyFavorites {
  pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
    Self { store }
  }

  /// Stored IDs in insertion order. Unreadable data reads as empty.
  pub fn list(&self) -> Vec<MovieId> {
    let raw = match self.store.get(keys::LEGACY_FAVORITES) {
      Ok(Some(raw)) => raw,
      Ok(None) => return Vec::new(),
      Err(e) => {
        warn!(error = %e, "failed to read local favorites");
        return Vec::new();
      }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
      warn!(error = %e, "ignoring malformed local favorites");
      Vec::new()
    })
  }

  pub fn contains(&self, id: MovieId) -> bool {
    self.list().contains(&id)
  }

  /// Add or remove `id`. Returns whether it is a favorite afterwards.
  pub fn toggle(&self, id: MovieId) -> Result<bool> {
    let mut ids = self.list();
    let now_favorite = match ids.iter().position(|&existing| existing == id) {
      Some(index) => {
        ids.remove(index);
        false
      }
      None => {
        ids.push(id);
        true
      }
    };
    let raw =
      serde_json::to_string(&ids).map_err(|e| eyre!("Failed to encode local favorites: {}", e))?;
    self
      .store
      .set(keys::LEGACY_FAVORITES, &raw)
      .map_err(|e| eyre!("Failed to save local favorites: {}", e))?;
    Ok(now_favorite)
  }
}
