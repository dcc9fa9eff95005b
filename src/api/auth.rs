//! Account endpoints: sign in/up/out, password and account management.

use serde_json::json;
use tracing::info;

use crate::auth::AuthSession;

use super::api_types::ApiAuthResponse;
use super::client::{decode, Access, HttpClient, Method};
use super::error::FetchError;
use super::mutation::{Mutation, MutationBroadcaster};
use super::types::{Profile, ProfileUpdate, User};

/// Fields accepted by the registration endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct Registration {
  pub email: String,
  pub username: String,
  pub password: String,
  pub confirm_password: String,
  pub first_name: String,
  pub last_name: String,
}

#[derive(Clone)]
pub struct AuthApi {
  http: HttpClient,
  session: AuthSession,
  mutations: MutationBroadcaster,
}

impl AuthApi {
  pub fn new(http: HttpClient, session: AuthSession, mutations: MutationBroadcaster) -> Self {
    Self {
      http,
      session,
      mutations,
    }
  }

  pub async fn login(&self, email: &str, password: &str) -> Result<User, FetchError> {
    let body = json!({ "email": email.trim(), "password": password });
    let value = self
      .http
      .request(Method::Post, "users/login/", &[], Some(body), Access::Public)
      .await?;
    let response: ApiAuthResponse = decode(value)?;
    self
      .session
      .sign_in(&response.tokens.access, response.tokens.refresh.as_deref());
    info!(user = %response.user.username, "logged in");
    Ok(response.user)
  }

  /// Create an account and sign in with it.
  pub async fn register(&self, registration: &Registration) -> Result<User, FetchError> {
    if registration.password != registration.confirm_password {
      return Err(FetchError::Rejected {
        status: 400,
        message: "Passwords do not match".to_string(),
      });
    }
    let body =
      serde_json::to_value(registration).map_err(|e| FetchError::Decode(e.to_string()))?;
    let value = self
      .http
      .request(Method::Post, "users/register/", &[], Some(body), Access::Public)
      .await?;
    let response: ApiAuthResponse = decode(value)?;
    self
      .session
      .sign_in(&response.tokens.access, response.tokens.refresh.as_deref());
    info!(user = %response.user.username, "registered");
    Ok(response.user)
  }

  /// Tokens are stateless, so signing out is purely local.
  pub fn logout(&self) {
    self.session.sign_out();
  }

  /// Validate the session now (refreshing once if possible).
  pub async fn refresh(&self) -> bool {
    self.http.check_session().await
  }

  pub async fn change_password(&self, old: &str, new: &str) -> Result<(), FetchError> {
    let body = json!({ "old_password": old, "new_password": new });
    self
      .http
      .request(
        Method::Post,
        "users/change-password/",
        &[],
        Some(body),
        Access::Required,
      )
      .await
      .map(drop)
  }

  /// Update profile fields; goes through the broadcaster so the cached
  /// profile is dropped and views are told.
  pub async fn update_profile(&self, update: ProfileUpdate) -> Result<Profile, FetchError> {
    let value = self.mutations.mutate(Mutation::UpdateProfile(update)).await?;
    decode(value)
  }

  /// Delete the account, then sign out.
  pub async fn delete_account(&self) -> Result<(), FetchError> {
    self
      .http
      .request(Method::Delete, "users/profile/", &[], None, Access::Required)
      .await?;
    self.session.sign_out();
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::auth::token::tests::jwt_expiring_at;
  use crate::auth::AuthState;
  use crate::bus::{AppEvent, AuthChangeReason, Topic};
  use crate::test_support::{services, FakeTransport, Reply};

  fn login_reply(access: &str) -> Reply {
    Reply::ok(json!({
      "message": "Login successful",
      "user": {"id": 1, "email": "ana@example.com", "username": "ana", "date_joined": "2024-05-01"},
      "tokens": {"access": access, "refresh": "refresh-token"}
    }))
  }

  #[tokio::test]
  async fn test_login_stores_tokens_and_broadcasts() {
    let transport = FakeTransport::new();
    transport.reply(Method::Post, "users/login/", login_reply("access-token"));
    let services = services(&transport);
    let mut events = services.bus.subscribe(&[Topic::Auth]);

    let user = services.auth.login("ana@example.com", "pw").await.unwrap();
    assert_eq!(user.username, "ana");
    assert_eq!(services.session.state(), AuthState::Authenticated);
    assert_eq!(services.session.bearer().unwrap().as_str(), "access-token");
    assert_eq!(
      events.drain(),
      vec![AppEvent::AuthStateChanged {
        reason: AuthChangeReason::LoggedIn
      }]
    );
    // Login itself is sent without a token
    assert!(transport.calls()[0].bearer.is_none());
  }

  #[tokio::test]
  async fn test_bad_credentials_are_an_inline_error() {
    let transport = FakeTransport::new();
    transport.reply(
      Method::Post,
      "users/login/",
      Reply::Json(400, json!({"non_field_errors": ["Invalid email or password"]})),
    );
    let services = services(&transport);

    let err = services.auth.login("ana@example.com", "nope").await.unwrap_err();
    assert!(err.is_expected());
    assert_eq!(err.to_string(), "Invalid email or password");
    assert_eq!(services.session.state(), AuthState::Anonymous);
  }

  #[tokio::test]
  async fn test_register_checks_password_confirmation_locally() {
    let transport = FakeTransport::new();
    let services = services(&transport);
    let registration = Registration {
      email: "ana@example.com".into(),
      username: "ana".into(),
      password: "a".into(),
      confirm_password: "b".into(),
      ..Registration::default()
    };
    assert!(services.auth.register(&registration).await.is_err());
    assert!(transport.calls().is_empty());
  }

  #[tokio::test]
  async fn test_logout_clears_user_data() {
    let transport = FakeTransport::new();
    transport.reply(
      Method::Post,
      "users/login/",
      login_reply(&jwt_expiring_at(4_000_000_000)),
    );
    let services = services(&transport);
    services.auth.login("ana@example.com", "pw").await.unwrap();
    services
      .cache
      .cache()
      .set("profile:me", json!({}), std::time::Duration::from_secs(60));

    services.auth.logout();
    assert_eq!(services.session.state(), AuthState::Anonymous);
    assert!(!services.cache.cache().contains("profile:me"));
    assert!(services.session.refresh_token().is_none());
  }
}
