use ratatui::prelude::Color;

/// Truncate to at most `max_len` characters, ending in "..." if cut.
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

/// Color for a 0-10 community score
pub fn score_color(vote_average: f64) -> Color {
  if vote_average >= 7.5 {
    Color::Green
  } else if vote_average >= 6.0 {
    Color::Yellow
  } else if vote_average > 0.0 {
    Color::Red
  } else {
    Color::DarkGray
  }
}

/// "★★★☆☆" for a 1-5 rating
pub fn stars(rating: u8) -> String {
  let filled = usize::from(rating.min(5));
  format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}
