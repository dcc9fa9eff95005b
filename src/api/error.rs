//! Failure taxonomy of the fetch layer.

use serde::Deserialize;
use thiserror::Error;

/// Why a request did not produce a usable response.
///
/// Cloneable so a single failure can be handed to every caller that joined a
/// deduplicated request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
  /// 4xx other than 401/404: validation and similar, shown inline
  #[error("{message}")]
  Rejected { status: u16, message: String },
  #[error("{0}")]
  NotFound(String),
  /// The session is missing or no longer accepted
  #[error("please sign in to continue")]
  Unauthorized,
  #[error("the request timed out")]
  Timeout,
  #[error("connection error: {0}")]
  Transport(String),
  #[error("server error ({status}): {message}")]
  Server { status: u16, message: String },
  #[error("unexpected response: {0}")]
  Decode(String),
}

impl FetchError {
  /// Expected failures are rendered in place; the rest go to the view
  /// boundary as a generic error with a retry affordance.
  pub fn is_expected(&self) -> bool {
    matches!(
      self,
      FetchError::Rejected { .. } | FetchError::NotFound(_) | FetchError::Unauthorized
    )
  }

  /// Timeouts, transport failures and 5xx responses are worth another try.
  pub fn is_transient(&self) -> bool {
    matches!(
      self,
      FetchError::Timeout | FetchError::Transport(_) | FetchError::Server { .. }
    )
  }

  /// Build the error for a non-success status and its (possibly empty) body.
  pub fn from_status(status: u16, body: &str) -> Self {
    let message = ErrorShape::parse(body)
      .and_then(ErrorShape::into_message)
      .unwrap_or_else(|| reason_phrase(status).to_string());
    match status {
      401 => FetchError::Unauthorized,
      404 => FetchError::NotFound(message),
      500..=599 => FetchError::Server { status, message },
      _ => FetchError::Rejected { status, message },
    }
  }
}

/// Error body returned by the backend. Django REST framework uses `detail`,
/// the hand-written views use `error`, a few use `message`; validation
/// failures come back as `{field: [messages]}` or `non_field_errors`.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorShape {
  pub detail: Option<String>,
  pub message: Option<String>,
  pub error: Option<String>,
  #[serde(default)]
  pub non_field_errors: Vec<String>,
  #[serde(flatten)]
  pub fields: serde_json::Map<String, serde_json::Value>,
}

impl ErrorShape {
  pub fn parse(body: &str) -> Option<Self> {
    serde_json::from_str(body).ok()
  }

  /// Most specific human-readable message, if the body carries one.
  pub fn into_message(self) -> Option<String> {
    if let Some(message) = self.detail.or(self.message).or(self.error) {
      return Some(message);
    }
    if let Some(first) = self.non_field_errors.into_iter().next() {
      return Some(first);
    }
    // First field-level validation message, e.g. {"email": ["already taken"]}
    self.fields.into_iter().find_map(|(field, value)| {
      let text = match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Array(items) => items.into_iter().find_map(|v| match v {
          serde_json::Value::String(s) => Some(s),
          _ => None,
        })?,
        _ => return None,
      };
      Some(format!("{}: {}", field, text))
    })
  }
}

fn reason_phrase(status: u16) -> &'static str {
  match status {
    400 => "bad request",
    401 => "unauthorized",
    403 => "forbidden",
    404 => "not found",
    409 => "conflict",
    429 => "too many requests",
    500..=599 => "server error",
    _ => "request failed",
  }
}
