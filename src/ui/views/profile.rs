use std::sync::Arc;

use crate::api::{FetchError, Profile, UserStats};
use crate::bus::{AppEvent, AuthChangeReason};
use crate::query::{Query, QueryState};
use crate::services::Services;
use crate::ui::error_text;
use crate::ui::theme::Palette;
use crate::ui::view::{Shortcut, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

/// Account overview: profile fields and activity counts
pub struct ProfileView {
  query: Query<(Profile, UserStats)>,
}

impl ProfileView {
  pub fn new(services: Arc<Services>) -> Self {
    let movies = services.movies.clone();
    let mut query = Query::new(move || {
      let movies = movies.clone();
      async move { tokio::try_join!(movies.profile(), movies.stats()) }
    });
    query.fetch();
    Self { query }
  }
}

impl View for ProfileView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('r') => self.query.refetch(),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let block = Block::default()
      .title(" Profile ")
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(palette.border));
    let dim = Style::default().fg(palette.dim);

    let lines: Vec<Line> = match self.query.state() {
      QueryState::Success((profile, stats)) => {
        let field = |name: &'static str, value: String| {
          Line::from(vec![Span::styled(format!("{:<16}", name), dim), Span::raw(value)])
        };
        let full_name = format!("{} {}", profile.first_name, profile.last_name);
        vec![
          field("Username", profile.username.clone()),
          field("Email", profile.email.clone()),
          field("Name", full_name.trim().to_string()),
          field("Bio", profile.bio.clone().unwrap_or_default()),
          field("Birth date", profile.birth_date.clone().unwrap_or_default()),
          Line::default(),
          field("Favorites", stats.favorites_count.to_string()),
          field("Watchlist", stats.watchlist_count.to_string()),
          field("Ratings", stats.ratings_count.to_string()),
          field("Member since", stats.member_since.clone()),
        ]
      }
      QueryState::Error(FetchError::Unauthorized) => {
        vec![Line::styled("Sign in with :login to see your profile.", dim)]
      }
      QueryState::Error(e) => vec![
        Line::styled(error_text(e), Style::default().fg(palette.error)),
        Line::default(),
        Line::styled("Press 'r' to retry.", dim),
      ],
      QueryState::Loading | QueryState::Idle => vec![Line::styled("Loading profile...", dim)],
    };

    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false }).block(block);
    frame.render_widget(paragraph, area);
  }

  fn breadcrumb_label(&self) -> String {
    "Profile".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    self.query.poll();
    ViewAction::None
  }

  fn on_event(&mut self, event: &AppEvent) {
    match event {
      AppEvent::ProfileChanged
      | AppEvent::FavoritesChanged { .. }
      | AppEvent::WatchlistChanged { .. }
      | AppEvent::RatingsChanged { .. }
      | AppEvent::AuthStateChanged {
        reason: AuthChangeReason::LoggedIn | AuthChangeReason::LoggedOut | AuthChangeReason::Expired,
      } => self.query.refetch(),
      _ => {}
    }
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![Shortcut::new("r", "refresh"), Shortcut::new("q", "back")]
  }
}
