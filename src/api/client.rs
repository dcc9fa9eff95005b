use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use super::error::{ErrorShape, FetchError};
use crate::auth::{AuthSession, AuthToken};
use crate::cache::Deduplicator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
  Patch,
  Delete,
}

impl Method {
  fn as_reqwest(self) -> reqwest::Method {
    match self {
      Method::Get => reqwest::Method::GET,
      Method::Post => reqwest::Method::POST,
      Method::Patch => reqwest::Method::PATCH,
      Method::Delete => reqwest::Method::DELETE,
    }
  }
}

/// A fully resolved request, as handed to a [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
  pub method: Method,
  pub url: Url,
  pub body: Option<Value>,
  pub bearer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
  pub status: u16,
  pub body: String,
}

/// Moves one request over the wire. Implementations report connection-level
/// failures as `FetchError::Transport`; status codes are interpreted by
/// [`HttpClient`].
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, FetchError>;
}

/// Production transport over reqwest.
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("shimy/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;
    Ok(Self { client })
  }
}

#[async_trait]
impl Transport for ReqwestTransport {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse, FetchError> {
    let mut builder = self
      .client
      .request(request.method.as_reqwest(), request.url)
      .header(reqwest::header::ACCEPT, "application/json");
    if let Some(token) = &request.bearer {
      builder = builder.bearer_auth(token);
    }
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let response = builder.send().await.map_err(map_reqwest_error)?;
    let status = response.status().as_u16();
    let body = response.text().await.map_err(map_reqwest_error)?;
    Ok(HttpResponse { status, body })
  }
}

fn map_reqwest_error(e: reqwest::Error) -> FetchError {
  if e.is_timeout() {
    FetchError::Timeout
  } else {
    FetchError::Transport(e.to_string())
  }
}

/// Timeout and retry behaviour applied uniformly to every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Per attempt
  pub timeout: Duration,
  /// Additional attempts after the first, for transient failures only
  pub max_retries: u32,
  /// Fixed delay between attempts
  pub backoff: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      timeout: Duration::from_secs(8),
      max_retries: 2,
      backoff: Duration::from_millis(500),
    }
  }
}

/// How an endpoint treats the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
  /// Never send a token (login, register, refresh)
  Public,
  /// Send a token when signed in; anonymous is fine (catalog reads)
  Optional,
  /// Fail with `Unauthorized` without touching the network when signed out
  Required,
}

#[derive(Deserialize)]
struct RefreshResponse {
  access: String,
}

/// HTTP fetch wrapper for the backend API.
///
/// Attaches the bearer token, enforces the [`RetryPolicy`], maps status codes
/// onto [`FetchError`] and turns a 401 on an authenticated call into the
/// session-expiry cascade. It never touches the response cache.
#[derive(Clone)]
pub struct HttpClient {
  transport: Arc<dyn Transport>,
  base: Url,
  policy: RetryPolicy,
  session: AuthSession,
  refresh: Deduplicator<Result<AuthToken, FetchError>>,
}

impl HttpClient {
  pub fn new(
    transport: Arc<dyn Transport>,
    base_url: &str,
    policy: RetryPolicy,
    session: AuthSession,
  ) -> Result<Self> {
    // A trailing slash makes relative joins append instead of replace
    let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
      .map_err(|e| eyre!("Invalid API base url {}: {}", base_url, e))?;
    Ok(Self {
      transport,
      base,
      policy,
      session,
      refresh: Deduplicator::new(),
    })
  }

  pub fn session(&self) -> &AuthSession {
    &self.session
  }

  pub fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, FetchError> {
    let mut url = self
      .base
      .join(path.trim_start_matches('/'))
      .map_err(|e| FetchError::Transport(format!("invalid path {}: {}", path, e)))?;
    if !query.is_empty() {
      url.query_pairs_mut().extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
    }
    Ok(url)
  }

  pub async fn get<T: DeserializeOwned>(
    &self,
    path: &str,
    query: &[(&str, String)],
    access: Access,
  ) -> Result<T, FetchError> {
    let value = self.request(Method::Get, path, query, None, access).await?;
    decode(value)
  }

  /// Issue a request and return the decoded JSON body (`Null` when empty).
  pub async fn request(
    &self,
    method: Method,
    path: &str,
    query: &[(&str, String)],
    body: Option<Value>,
    access: Access,
  ) -> Result<Value, FetchError> {
    let bearer = self.bearer_for(access).await?;
    let request = HttpRequest {
      method,
      url: self.url(path, query)?,
      body,
      bearer: bearer.as_ref().map(|t| t.as_str().to_string()),
    };

    match self.send_with_retry(request).await {
      Err(FetchError::Unauthorized) if bearer.is_some() => {
        warn!(path, "authenticated request rejected, expiring session");
        self.session.expire();
        Err(FetchError::Unauthorized)
      }
      other => other,
    }
  }

  /// Just-in-time expiry check: returns the token to send, refreshing it once
  /// if it has expired and a refresh token is available.
  async fn bearer_for(&self, access: Access) -> Result<Option<AuthToken>, FetchError> {
    if access == Access::Public {
      return Ok(None);
    }
    let token = match self.session.bearer() {
      Some(token) if token.is_expired() => self.refresh_or_expire().await,
      other => other,
    };
    match (token, access) {
      (None, Access::Required) => Err(FetchError::Unauthorized),
      (token, _) => Ok(token),
    }
  }

  /// Validate the current session, as the periodic check does. Returns
  /// whether a session is still active afterwards.
  pub async fn check_session(&self) -> bool {
    if self.session.needs_refresh_at(chrono::Utc::now()) {
      debug!("periodic check found an expired access token");
      return self.refresh_or_expire().await.is_some();
    }
    self.session.is_authenticated()
  }

  async fn refresh_or_expire(&self) -> Option<AuthToken> {
    let Some(refresh) = self.session.refresh_token() else {
      self.session.expire();
      return None;
    };

    let client = self.clone();
    let result = self
      .refresh
      .fetch_once("refresh", move || async move { client.refresh_access(refresh).await })
      .await;

    match result {
      Ok(token) => Some(token),
      Err(e) => {
        warn!(error = %e, "token refresh failed");
        self.session.expire();
        None
      }
    }
  }

  async fn refresh_access(&self, refresh: String) -> Result<AuthToken, FetchError> {
    let request = HttpRequest {
      method: Method::Post,
      url: self.url("users/refresh/", &[])?,
      body: Some(serde_json::json!({ "refresh": refresh })),
      bearer: None,
    };
    let response: RefreshResponse = decode(self.send_with_retry(request).await?)?;
    let token = AuthToken::parse(&response.access);
    if token.is_expired() {
      return Err(FetchError::Unauthorized);
    }
    self.session.token_refreshed(&response.access);
    info!("refreshed access token");
    Ok(token)
  }

  async fn send_with_retry(&self, request: HttpRequest) -> Result<Value, FetchError> {
    let mut attempt = 0;
    loop {
      let result = match tokio::time::timeout(
        self.policy.timeout,
        self.transport.send(request.clone()),
      )
      .await
      {
        Ok(sent) => sent.and_then(|response| interpret(response, request.bearer.is_some())),
        Err(_) => Err(FetchError::Timeout),
      };

      match result {
        Err(e) if e.is_transient() && attempt < self.policy.max_retries => {
          attempt += 1;
          warn!(
            method = ?request.method,
            url = %request.url,
            attempt,
            error = %e,
            "transient failure, retrying"
          );
          tokio::time::sleep(self.policy.backoff).await;
        }
        Err(e) => {
          debug!(method = ?request.method, url = %request.url, error = %e, "request failed");
          return Err(e);
        }
        Ok(value) => return Ok(value),
      }
    }
  }
}

fn interpret(response: HttpResponse, authenticated: bool) -> Result<Value, FetchError> {
  if response.status == 401 && !authenticated {
    // Without a token a 401 is a plain rejection (bad credentials)
    let message = ErrorShape::parse(&response.body)
      .and_then(ErrorShape::into_message)
      .unwrap_or_else(|| "invalid credentials".to_string());
    return Err(FetchError::Rejected {
      status: 401,
      message,
    });
  }
  if !(200..300).contains(&response.status) {
    return Err(FetchError::from_status(response.status, &response.body));
  }
  if response.body.trim().is_empty() {
    return Ok(Value::Null);
  }
  serde_json::from_str(&response.body).map_err(|e| FetchError::Decode(e.to_string()))
}

pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T, FetchError> {
  serde_json::from_value(value).map_err(|e| FetchError::Decode(e.to_string()))
}
