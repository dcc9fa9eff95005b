use std::sync::{Arc, Mutex, PoisonError};

use crate::api::{Collection, MembershipStatus, MovieDetail, MovieId};
use crate::bus::{AppEvent, AuthChangeReason, Notice};
use crate::optimistic::{toggle_membership, MembershipFlags};
use crate::query::{Query, QueryState};
use crate::services::Services;
use crate::settings::Quality;
use crate::ui::renderfns::{score_color, stars, truncate};
use crate::ui::theme::Palette;
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::{error_text, notice_for};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};

/// View for one movie: details, trailer, cast, reviews and the user's own
/// rating and list membership.
pub struct MovieDetailView {
  services: Arc<Services>,
  id: MovieId,
  title: String,
  query: Query<MovieDetail>,
  membership_query: Query<MembershipStatus>,
  flags: Arc<Mutex<MembershipFlags>>,
  /// Rating sent and not yet confirmed
  pending_rating: Option<u8>,
  scroll: u16,
}

impl MovieDetailView {
  pub fn new(services: Arc<Services>, id: MovieId, title: String) -> Self {
    let movies = services.movies.clone();
    let mut query = Query::new(move || {
      let movies = movies.clone();
      async move { movies.detail(id).await }
    });
    query.fetch();

    let movies = services.movies.clone();
    let mut membership_query = Query::new(move || {
      let movies = movies.clone();
      async move { movies.membership(id).await }
    });
    membership_query.fetch();

    Self {
      services,
      id,
      title,
      query,
      membership_query,
      flags: Arc::new(Mutex::new(MembershipFlags::default())),
      pending_rating: None,
      scroll: 0,
    }
  }

  fn flags(&self) -> MembershipFlags {
    *self.flags.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn require_sign_in(&self, what: &str) -> bool {
    if self.services.session.is_authenticated() {
      return false;
    }
    self.services.bus.emit(AppEvent::Notice(Notice::info(
      "Sign in required",
      format!("Sign in with :login to {}.", what),
    )));
    true
  }

  fn toggle(&self, collection: Collection) {
    if self.require_sign_in(&format!("use your {}", collection.label().to_lowercase())) {
      return;
    }
    let services = self.services.clone();
    let flags = self.flags.clone();
    let id = self.id;
    tokio::spawn(async move {
      if let Err(e) = toggle_membership(&services.mutations, &flags, collection, id).await {
        if let Some(notice) = notice_for(&e, &format!("update your {}", collection.label())) {
          services.bus.emit(AppEvent::Notice(notice));
        }
      }
    });
  }

  fn rate(&mut self, rating: u8) {
    if self.require_sign_in("rate movies") {
      return;
    }
    self.pending_rating = Some(rating);
    let services = self.services.clone();
    let id = self.id;
    tokio::spawn(async move {
      if let Err(e) = services.mutations.rate(id, rating, None).await {
        if let Some(notice) = notice_for(&e, "save your rating") {
          services.bus.emit(AppEvent::Notice(notice));
        }
      }
    });
  }

  fn show_trailer(&self) {
    let key = self.query.data().and_then(|d| d.trailer_key.clone());
    let notice = match key {
      Some(key) => {
        let settings = self.services.settings.get();
        Notice::info(
          "Trailer",
          trailer_url(&key, settings.quality, settings.auto_play),
        )
      }
      None => Notice::info("Trailer", "No trailer available for this title."),
    };
    self.services.bus.emit(AppEvent::Notice(notice));
  }

  fn detail_lines(&self, detail: &MovieDetail, palette: &Palette) -> Vec<Line<'static>> {
    let movie = &detail.movie;
    let dim = Style::default().fg(palette.dim);
    let label = |text: &'static str| Span::styled(text, dim);
    let mut lines = Vec::new();

    let mut facts = vec![Span::styled(
      movie.title.clone(),
      Style::default().fg(palette.text).bold(),
    )];
    if let Some(year) = movie.year() {
      facts.push(Span::styled(format!(" ({})", year), dim));
    }
    if let Some(runtime) = movie.runtime {
      facts.push(Span::styled(format!("  {}h {:02}m", runtime / 60, runtime % 60), dim));
    }
    facts.push(Span::styled(
      format!("  {:.1}", movie.vote_average),
      Style::default().fg(score_color(movie.vote_average)),
    ));
    facts.push(Span::styled(format!(" ({} votes)", movie.vote_count), dim));
    lines.push(Line::from(facts));

    if let Some(tagline) = detail.tagline.as_deref().filter(|t| !t.is_empty()) {
      lines.push(Line::from(Span::styled(
        tagline.to_string(),
        Style::default().fg(palette.dim).italic(),
      )));
    }
    if !detail.genres.is_empty() {
      let names: Vec<&str> = detail.genres.iter().map(|g| g.name.as_str()).collect();
      lines.push(Line::from(vec![label("Genres: "), Span::raw(names.join(", "))]));
    }

    let flags = self.flags();
    let rating = self.pending_rating.or(movie.user_rating);
    lines.push(Line::from(vec![
      label("Yours:  "),
      Span::styled(
        if flags.favorite { "♥ favorite  " } else { "♡ favorite  " },
        Style::default().fg(palette.error),
      ),
      Span::styled(
        if flags.watchlist { "◷ on watchlist  " } else { "○ watchlist  " },
        Style::default().fg(palette.accent),
      ),
      Span::styled(
        rating.map(stars).unwrap_or_else(|| "not rated".to_string()),
        Style::default().fg(palette.highlight),
      ),
      Span::styled(
        if self.pending_rating.is_some() { " (saving...)" } else { "" },
        dim,
      ),
    ]));

    lines.push(Line::default());
    lines.push(Line::from(if movie.overview.is_empty() {
      "No overview available.".to_string()
    } else {
      movie.overview.clone()
    }));

    if !detail.cast.is_empty() {
      lines.push(Line::default());
      lines.push(Line::from(label("Cast")));
      for member in detail.cast.iter().take(8) {
        let mut spans = vec![Span::raw(format!("  {}", member.name))];
        if let Some(character) = member.character.as_deref().filter(|c| !c.is_empty()) {
          spans.push(Span::styled(format!(" as {}", character), dim));
        }
        lines.push(Line::from(spans));
      }
    }

    if !detail.reviews.is_empty() {
      lines.push(Line::default());
      lines.push(Line::from(label("Reviews")));
      for review in detail.reviews.iter().take(3) {
        let score = review
          .rating
          .map(|r| format!(" ({:.0}/10)", r))
          .unwrap_or_default();
        lines.push(Line::from(Span::styled(
          format!("  {}{}", review.author, score),
          Style::default().fg(palette.accent),
        )));
        lines.push(Line::from(format!("  {}", truncate(&review.content, 240))));
      }
    }

    if !detail.similar.is_empty() {
      lines.push(Line::default());
      lines.push(Line::from(label("Similar")));
      for similar in detail.similar.iter().take(5) {
        lines.push(Line::from(format!(
          "  {} ({})",
          similar.title,
          similar.year().unwrap_or("----")
        )));
      }
    }

    lines
  }
}

impl View for MovieDetailView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.scroll = self.scroll.saturating_add(1),
      KeyCode::Char('k') | KeyCode::Up => self.scroll = self.scroll.saturating_sub(1),
      KeyCode::Char('f') => self.toggle(Collection::Favorites),
      KeyCode::Char('w') => self.toggle(Collection::Watchlist),
      KeyCode::Char('t') => self.show_trailer(),
      KeyCode::Char(c @ '1'..='5') => self.rate(c as u8 - b'0'),
      KeyCode::Char('r') => {
        self.query.refetch();
        self.membership_query.refetch();
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let title = match self.query.state() {
      QueryState::Loading => format!(" {} (loading...) ", self.title),
      _ => format!(" {} ", self.title),
    };
    let block = Block::default()
      .title(title)
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(palette.border));

    let paragraph = match self.query.state() {
      QueryState::Success(detail) => Paragraph::new(self.detail_lines(detail, palette))
        .wrap(Wrap { trim: false })
        .scroll((self.scroll, 0)),
      QueryState::Error(e) => Paragraph::new(format!("{}\n\nPress 'r' to retry.", error_text(e)))
        .style(Style::default().fg(palette.error)),
      QueryState::Loading | QueryState::Idle => {
        Paragraph::new("Loading movie details...").style(Style::default().fg(palette.dim))
      }
    };
    frame.render_widget(paragraph.block(block), area);
  }

  fn breadcrumb_label(&self) -> String {
    truncate(&self.title, 30)
  }

  fn tick(&mut self) -> ViewAction {
    self.query.poll();
    if self.membership_query.poll() {
      if let Some(status) = self.membership_query.data() {
        *self.flags.lock().unwrap_or_else(PoisonError::into_inner) = (*status).into();
      }
    }
    ViewAction::None
  }

  fn on_event(&mut self, event: &AppEvent) {
    match event {
      AppEvent::RatingsChanged { movie_id } if *movie_id == self.id => {
        self.pending_rating = None;
        self.query.refetch();
      }
      AppEvent::FavoritesChanged { .. } | AppEvent::WatchlistChanged { .. } => {
        self.membership_query.refetch();
      }
      AppEvent::AuthStateChanged { reason } => match reason {
        AuthChangeReason::LoggedOut | AuthChangeReason::Expired => {
          self.pending_rating = None;
          *self.flags.lock().unwrap_or_else(PoisonError::into_inner) = MembershipFlags::default();
          self.membership_query.cancel();
        }
        AuthChangeReason::LoggedIn => {
          self.query.refetch();
          self.membership_query.refetch();
        }
        AuthChangeReason::Refreshed => {}
      },
      AppEvent::Notice(_) => {
        // A failed rating surfaces as a notice; stop showing it as pending
        self.pending_rating = None;
      }
      _ => {}
    }
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new("f", "favorite"),
      Shortcut::new("w", "watchlist"),
      Shortcut::new("1-5", "rate"),
      Shortcut::new("t", "trailer"),
      Shortcut::new("r", "refresh"),
      Shortcut::new("q", "back"),
    ]
  }
}

/// YouTube link for a trailer honoring the quality and autoplay settings.
pub fn trailer_url(key: &str, quality: Quality, autoplay: bool) -> String {
  let mut url = format!("https://www.youtube.com/watch?v={}", key);
  let vq = match quality {
    Quality::Auto => None,
    Quality::Sd => Some("large"),
    Quality::Hd => Some("hd720"),
    Quality::FullHd => Some("hd1080"),
    Quality::Uhd => Some("hd2160"),
  };
  if let Some(vq) = vq {
    url.push_str("&vq=");
    url.push_str(vq);
  }
  if autoplay {
    url.push_str("&autoplay=1");
  }
  url
}
