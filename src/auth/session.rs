//! Authentication lifecycle: `Anonymous -> Authenticated -> Expired -> Anonymous`.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

use super::token::{AuthToken, TokenStore};
use crate::bus::{AppEvent, AuthChangeReason, EventBus, Notice};
use crate::cache::{CacheLayer, Selector};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
  Anonymous,
  Authenticated,
  /// Expiry was detected; tokens and user data are gone and the user has to
  /// sign in again. Signing out from here returns to `Anonymous`.
  Expired,
}

/// Shared authentication state. Clones observe the same session.
#[derive(Clone)]
pub struct AuthSession {
  inner: Arc<Inner>,
}

struct Inner {
  tokens: TokenStore,
  cache: CacheLayer,
  bus: EventBus,
  state: Mutex<AuthState>,
}

impl AuthSession {
  /// Resume from persisted tokens. An expired access token is still
  /// `Authenticated` here; the first expiry check decides whether a refresh
  /// can rescue it.
  pub fn restore(tokens: TokenStore, cache: CacheLayer, bus: EventBus) -> Self {
    let state = if tokens.has_token() {
      AuthState::Authenticated
    } else {
      AuthState::Anonymous
    };
    info!(?state, "restored auth session");
    Self {
      inner: Arc::new(Inner {
        tokens,
        cache,
        bus,
        state: Mutex::new(state),
      }),
    }
  }

  pub fn state(&self) -> AuthState {
    *self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn is_authenticated(&self) -> bool {
    self.state() == AuthState::Authenticated
  }

  /// Current access token, if signed in.
  pub fn bearer(&self) -> Option<AuthToken> {
    if self.is_authenticated() {
      self.inner.tokens.access()
    } else {
      None
    }
  }

  pub fn refresh_token(&self) -> Option<String> {
    self.inner.tokens.refresh()
  }

  /// Whether the access token is past its expiry at `now`.
  pub fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
    self.bearer().is_some_and(|token| token.is_expired_at(now))
  }

  pub fn sign_in(&self, access: &str, refresh: Option<&str>) {
    self.inner.tokens.save(access, refresh);
    // Whatever was cached belonged to somebody else, or to nobody
    self.inner.cache.invalidate(&Selector::session_scoped());
    self.set_state(AuthState::Authenticated);
    info!("signed in");
    self.emit(AuthChangeReason::LoggedIn);
  }

  pub fn sign_out(&self) {
    let was = self.set_state(AuthState::Anonymous);
    self.inner.tokens.clear();
    self.inner.cache.invalidate(&Selector::session_scoped());
    info!(?was, "signed out");
    self.emit(AuthChangeReason::LoggedOut);
  }

  pub fn token_refreshed(&self, access: &str) {
    self.inner.tokens.set_access(access);
    info!("access token refreshed");
    self.emit(AuthChangeReason::Refreshed);
  }

  /// Run the expiry cascade once: clear tokens, drop session-scoped cache
  /// entries, broadcast `Expired` and raise a notice. Catalog entries are
  /// left alone. Returns false if the session was not authenticated, so
  /// concurrent detections produce a single event.
  pub fn expire(&self) -> bool {
    {
      let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
      if *state != AuthState::Authenticated {
        return false;
      }
      *state = AuthState::Expired;
    }
    self.inner.tokens.clear();
    self.inner.cache.invalidate(&Selector::session_scoped());
    info!("session expired");
    self.emit(AuthChangeReason::Expired);
    self.inner.bus.emit(AppEvent::Notice(Notice::warning(
      "Session expired",
      "Your session has expired. Please sign in again.",
    )));
    true
  }

  fn set_state(&self, next: AuthState) -> AuthState {
    let mut state = self.inner.state.lock().unwrap_or_else(PoisonError::into_inner);
    std::mem::replace(&mut *state, next)
  }

  fn emit(&self, reason: AuthChangeReason) {
    self.inner.bus.emit(AppEvent::AuthStateChanged { reason });
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::auth::token::tests::jwt_expiring_at;
  use crate::bus::Topic;
  use crate::cache::TtlPolicy;
  use crate::store::MemoryStore;
  use serde_json::json;
  use std::time::Duration;

  fn session() -> (AuthSession, CacheLayer, EventBus) {
    let store = Arc::new(MemoryStore::new());
    let cache = CacheLayer::new(64, TtlPolicy::default());
    let bus = EventBus::default();
    let session = AuthSession::restore(TokenStore::load(store), cache.clone(), bus.clone());
    (session, cache, bus)
  }

  #[test]
  fn test_starts_anonymous_without_tokens() {
    let (session, _, _) = session();
    assert_eq!(session.state(), AuthState::Anonymous);
    assert!(session.bearer().is_none());
  }

  #[tokio::test]
  async fn test_expiry_cascade() {
    let (session, cache, bus) = session();
    session.sign_in(&jwt_expiring_at(1), Some("refresh"));
    let mut auth_events = bus.subscribe(&[Topic::Auth]);
    let mut notices = bus.subscribe(&[Topic::Notice]);

    let minute = Duration::from_secs(60);
    cache.cache().set("favorites:1", json!([]), minute);
    cache.cache().set("profile:stats", json!({}), minute);
    cache.cache().set("movies:trending:1", json!([]), minute);
    cache.cache().set("movie:550", json!({}), minute);

    assert!(session.expire());
    // A second detection (e.g. a racing 401) is a no-op
    assert!(!session.expire());

    assert_eq!(session.state(), AuthState::Expired);
    assert!(session.bearer().is_none());
    assert!(session.refresh_token().is_none());
    assert!(!cache.cache().contains("favorites:1"));
    assert!(!cache.cache().contains("profile:stats"));
    assert!(cache.cache().contains("movies:trending:1"));
    // Details carry the user's rating
    assert!(!cache.cache().contains("movie:550"));
    assert_eq!(
      auth_events.drain(),
      vec![AppEvent::AuthStateChanged {
        reason: AuthChangeReason::Expired
      }]
    );
    assert_eq!(notices.drain().len(), 1);
  }

  #[test]
  fn test_sign_out_from_expired_returns_to_anonymous() {
    let (session, _, bus) = session();
    session.sign_in("opaque", None);
    session.expire();
    let mut events = bus.subscribe(&[Topic::Auth]);

    session.sign_out();
    assert_eq!(session.state(), AuthState::Anonymous);
    assert_eq!(
      events.drain(),
      vec![AppEvent::AuthStateChanged {
        reason: AuthChangeReason::LoggedOut
      }]
    );
  }

  #[test]
  fn test_needs_refresh() {
    let (session, _, _) = session();
    let exp = 1_900_000_000;
    session.sign_in(&jwt_expiring_at(exp), None);
    let before = DateTime::from_timestamp(exp - 10, 0).unwrap();
    let after = DateTime::from_timestamp(exp + 10, 0).unwrap();
    assert!(!session.needs_refresh_at(before));
    assert!(session.needs_refresh_at(after));
  }
}
