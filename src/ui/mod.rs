pub mod components;
pub mod renderfns;
pub mod theme;
pub mod view;
pub mod views;

use crate::api::FetchError;
use crate::bus::Notice;
use ratatui::widgets::ListState;

/// Keep a list selection inside `0..len`, selecting the first row when
/// nothing is selected.
pub fn ensure_valid_selection(state: &mut ListState, len: usize) {
  if len == 0 {
    state.select(None);
    return;
  }
  match state.selected() {
    Some(i) if i >= len => state.select(Some(len - 1)),
    None => state.select(Some(0)),
    _ => {}
  }
}

/// Text for an error shown in place of a view's content.
pub fn error_text(error: &FetchError) -> String {
  if error.is_expected() {
    let message = error.to_string();
    let mut chars = message.chars();
    match chars.next() {
      Some(first) => first.to_uppercase().chain(chars).collect(),
      None => message,
    }
  } else {
    "Something went wrong while loading this page.".to_string()
  }
}

/// The notice for a failed user action. `Unauthorized` yields none: the
/// session expiry already raised its own notice.
pub fn notice_for(error: &FetchError, action: &str) -> Option<Notice> {
  match error {
    FetchError::Unauthorized => None,
    FetchError::Rejected { .. } | FetchError::NotFound(_) => Some(Notice::warning(
      format!("Could not {}", action),
      error_text(error),
    )),
    _ => Some(Notice::error(
      format!("Could not {}", action),
      format!("{}. Please try again.", error),
    )),
  }
}
