use ratatui::prelude::*;

use crate::settings::{ResolvedTheme, Theme};

/// Colors used by every view, derived from the theme setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
  pub text: Color,
  pub dim: Color,
  pub accent: Color,
  pub highlight: Color,
  pub selection_bg: Color,
  pub border: Color,
  pub bar_bg: Color,
  pub error: Color,
  pub success: Color,
}

impl Palette {
  pub fn dark() -> Self {
    Self {
      text: Color::White,
      dim: Color::DarkGray,
      accent: Color::Cyan,
      highlight: Color::Yellow,
      selection_bg: Color::DarkGray,
      border: Color::Blue,
      bar_bg: Color::Black,
      error: Color::Red,
      success: Color::Green,
    }
  }

  pub fn light() -> Self {
    Self {
      text: Color::Black,
      dim: Color::Gray,
      accent: Color::Blue,
      highlight: Color::Magenta,
      selection_bg: Color::Gray,
      border: Color::Blue,
      bar_bg: Color::White,
      error: Color::Red,
      success: Color::Green,
    }
  }

  pub fn for_theme(theme: Theme) -> Self {
    match theme.resolve_from_env() {
      ResolvedTheme::Dark => Self::dark(),
      ResolvedTheme::Light => Self::light(),
    }
  }
}

impl Default for Palette {
  fn default() -> Self {
    Self::dark()
  }
}
