use crate::api::{Profile, UserStats};
use crate::ui::theme::Palette;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// What the header knows about the signed-in user.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum HeaderUser {
  #[default]
  Anonymous,
  Loading,
  SignedIn {
    profile: Profile,
    stats: Option<UserStats>,
  },
}

/// Draw the header bar with logo, backend and user summary
pub fn draw_header(
  frame: &mut Frame,
  area: Rect,
  api_url: &str,
  user: &HeaderUser,
  palette: &Palette,
) {
  let host = extract_host(api_url);

  let mut spans = vec![
    Span::styled(" shimy ", Style::default().fg(palette.accent).bold()),
    Span::styled("│", Style::default().fg(palette.dim)),
    Span::styled(format!(" {} ", host), Style::default().fg(palette.text)),
    Span::styled("│", Style::default().fg(palette.dim)),
  ];

  match user {
    HeaderUser::Anonymous => {
      spans.push(Span::styled(" not signed in ", Style::default().fg(palette.dim)));
      spans.push(Span::styled("(:login)", Style::default().fg(palette.dim)));
    }
    HeaderUser::Loading => {
      spans.push(Span::styled(" ... ", Style::default().fg(palette.dim)));
    }
    HeaderUser::SignedIn { profile, stats } => {
      spans.push(Span::styled(
        format!(" {} ", profile.display_name()),
        Style::default().fg(palette.highlight).bold(),
      ));
      if let Some(stats) = stats {
        spans.push(Span::styled(
          format!(
            " ♥ {}  ◷ {}  ★ {}",
            stats.favorites_count, stats.watchlist_count, stats.ratings_count
          ),
          Style::default().fg(palette.dim),
        ));
      }
    }
  }

  let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(palette.bar_bg));
  frame.render_widget(paragraph, area);
}

/// Host (and port) of the API base url
fn extract_host(url: &str) -> &str {
  url
    .strip_prefix("https://")
    .or_else(|| url.strip_prefix("http://"))
    .unwrap_or(url)
    .split('/')
    .next()
    .unwrap_or(url)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_extract_host() {
    assert_eq!(
      extract_host("https://movies.example.com/api/v1"),
      "movies.example.com"
    );
    assert_eq!(extract_host("http://localhost:8000/api/v1"), "localhost:8000");
  }
}
