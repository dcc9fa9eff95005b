//! Bearer tokens and their persistence.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

use crate::store::{keys, KeyValueStore};

/// An opaque bearer string plus the expiry decoded from it, when it is a JWT.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
  raw: String,
  expires_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct Claims {
  exp: Option<i64>,
}

impl AuthToken {
  pub fn parse(raw: impl Into<String>) -> Self {
    let raw = raw.into();
    let expires_at = decode_expiry(&raw);
    Self { raw, expires_at }
  }

  pub fn as_str(&self) -> &str {
    &self.raw
  }

  pub fn expires_at(&self) -> Option<DateTime<Utc>> {
    self.expires_at
  }

  /// Tokens without a readable expiry never expire client-side; the server
  /// still has the final word through a 401.
  pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
    self.expires_at.is_some_and(|exp| exp <= now)
  }

  pub fn is_expired(&self) -> bool {
    self.is_expired_at(Utc::now())
  }
}

impl std::fmt::Debug for AuthToken {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AuthToken")
      .field("raw", &"<redacted>")
      .field("expires_at", &self.expires_at)
      .finish()
  }
}

fn decode_expiry(raw: &str) -> Option<DateTime<Utc>> {
  let payload = raw.split('.').nth(1)?;
  let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
  let claims: Claims = serde_json::from_slice(&bytes).ok()?;
  Utc.timestamp_opt(claims.exp?, 0).single()
}

/// Access and refresh tokens, mirrored in memory and in the key/value store.
///
/// Reads never touch storage after construction; a failed write is logged and
/// only costs persistence across restarts.
#[derive(Clone)]
pub struct TokenStore {
  store: Arc<dyn KeyValueStore>,
  current: Arc<RwLock<Tokens>>,
}

#[derive(Default)]
struct Tokens {
  access: Option<AuthToken>,
  refresh: Option<String>,
}

impl TokenStore {
  pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
    let read = |key: &str| match store.get(key) {
      Ok(value) => value.filter(|v| !v.is_empty()),
      Err(e) => {
        warn!(key, error = %e, "failed to read token");
        None
      }
    };
    let tokens = Tokens {
      access: read(keys::ACCESS_TOKEN).map(AuthToken::parse),
      refresh: read(keys::REFRESH_TOKEN),
    };
    Self {
      store,
      current: Arc::new(RwLock::new(tokens)),
    }
  }

  pub fn access(&self) -> Option<AuthToken> {
    self
      .current
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .access
      .clone()
  }

  pub fn refresh(&self) -> Option<String> {
    self
      .current
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .refresh
      .clone()
  }

  pub fn has_token(&self) -> bool {
    self.access().is_some()
  }

  /// Store a fresh pair after login or registration.
  pub fn save(&self, access: &str, refresh: Option<&str>) {
    {
      let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
      current.access = Some(AuthToken::parse(access));
      current.refresh = refresh.map(String::from);
    }
    self.persist(keys::ACCESS_TOKEN, Some(access));
    self.persist(keys::REFRESH_TOKEN, refresh);
  }

  /// Replace only the access token (after a refresh).
  pub fn set_access(&self, access: &str) {
    self
      .current
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .access = Some(AuthToken::parse(access));
    self.persist(keys::ACCESS_TOKEN, Some(access));
  }

  pub fn clear(&self) {
    *self.current.write().unwrap_or_else(PoisonError::into_inner) = Tokens::default();
    self.persist(keys::ACCESS_TOKEN, None);
    self.persist(keys::REFRESH_TOKEN, None);
  }

  fn persist(&self, key: &str, value: Option<&str>) {
    let result = match value {
      Some(value) => self.store.set(key, value),
      None => self.store.remove(key),
    };
    if let Err(e) = result {
      warn!(key, error = %e, "failed to persist token");
    }
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::store::MemoryStore;

  /// Unsigned JWT carrying only an `exp` claim.
  pub(crate) fn jwt_expiring_at(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{},"user_id":1}}"#, exp));
    format!("{}.{}.signature", header, payload)
  }

  #[test]
  fn test_decodes_jwt_expiry() {
    let token = AuthToken::parse(jwt_expiring_at(1_700_000_000));
    let exp = token.expires_at().unwrap();
    assert_eq!(exp.timestamp(), 1_700_000_000);
    assert!(token.is_expired_at(exp));
    assert!(!token.is_expired_at(exp - chrono::Duration::seconds(1)));
  }

  #[test]
  fn test_opaque_token_never_expires_locally() {
    let token = AuthToken::parse("not-a-jwt");
    assert_eq!(token.expires_at(), None);
    assert!(!token.is_expired());
  }

  #[test]
  fn test_tokens_survive_reload() {
    let store = Arc::new(MemoryStore::new());
    let tokens = TokenStore::load(store.clone());
    assert!(!tokens.has_token());

    tokens.save("access", Some("refresh"));
    let reloaded = TokenStore::load(store.clone());
    assert_eq!(reloaded.access().unwrap().as_str(), "access");
    assert_eq!(reloaded.refresh().as_deref(), Some("refresh"));

    reloaded.clear();
    assert!(!TokenStore::load(store).has_token());
  }

  #[test]
  fn test_debug_redacts_token() {
    let token = AuthToken::parse("secret");
    assert!(!format!("{:?}", token).contains("secret"));
  }
}
