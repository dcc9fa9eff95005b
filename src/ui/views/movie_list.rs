//! Paginated movie lists: catalog listings, search results and the user's
//! favorites and watchlist.

#![allow(deprecated)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use crate::api::{Collection, FetchError, ListKind, Movie, MovieId, MoviePage};
use crate::bus::{AppEvent, AuthChangeReason, Notice};
use crate::optimistic::{perform_optimistic_mutation, MembershipFlags};
use crate::query::{Query, QueryState};
use crate::services::Services;
use crate::ui::components::{KeyResult, SearchEvent, SearchInput};
use crate::ui::renderfns::{score_color, truncate};
use crate::ui::theme::Palette;
use crate::ui::view::{Shortcut, View, ViewAction};
use crate::ui::views::MovieDetailView;
use crate::ui::{ensure_valid_selection, error_text, notice_for};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use tracing::debug;

/// Where a list's movies come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
  Catalog(ListKind),
  Search(String),
  Collection(Collection),
}

impl Source {
  fn label(&self) -> String {
    match self {
      Source::Catalog(kind) => kind.label().to_string(),
      Source::Search(query) => format!("Search \"{}\"", query),
      Source::Collection(collection) => collection.label().to_string(),
    }
  }
}

type MembershipMap = HashMap<MovieId, MembershipFlags>;

pub struct MovieListView {
  services: Arc<Services>,
  source: Source,
  page: u32,
  query: Query<MoviePage>,
  /// Shared with in-flight toggles, which update it optimistically
  membership: Arc<Mutex<MembershipMap>>,
  membership_query: Query<MembershipMap>,
  /// Signed-out favorites kept on this machine only
  local_favorites: HashSet<MovieId>,
  list_state: ListState,
  search: SearchInput,
}

impl MovieListView {
  pub fn new(services: Arc<Services>, source: Source) -> Self {
    let mut query = page_query(&services, &source, 1);
    query.fetch();
    let mut membership_query = membership_query(&services);
    membership_query.fetch();
    let local_favorites = services.legacy.list().into_iter().collect();

    Self {
      services,
      source,
      page: 1,
      query,
      membership: Arc::new(Mutex::new(HashMap::new())),
      membership_query,
      local_favorites,
      list_state: ListState::default(),
      search: SearchInput::new(),
    }
  }

  fn movies(&self) -> &[Movie] {
    self.query.data().map(|p| p.results.as_slice()).unwrap_or(&[])
  }

  fn selected(&self) -> Option<&Movie> {
    self.list_state.selected().and_then(|i| self.movies().get(i))
  }

  /// Load `page` in place of the current one. Dropping the old query aborts
  /// its request if still running.
  fn go_to_page(&mut self, page: u32) {
    self.page = page.max(1);
    self.query = page_query(&self.services, &self.source, self.page);
    self.query.fetch();
    self.list_state.select(Some(0));
  }

  fn flags(&self, id: MovieId) -> MembershipFlags {
    if self.services.session.is_authenticated() {
      self
        .membership
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
        .copied()
        .unwrap_or_default()
    } else {
      MembershipFlags {
        favorite: self.local_favorites.contains(&id),
        watchlist: false,
      }
    }
  }

  fn toggle(&mut self, collection: Collection) {
    let Some(id) = self.selected().map(|m| m.id) else {
      return;
    };

    if !self.services.session.is_authenticated() {
      self.toggle_signed_out(collection, id);
      return;
    }

    let services = self.services.clone();
    let membership = self.membership.clone();
    tokio::spawn(async move {
      let was = membership
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
        .copied()
        .unwrap_or_default()
        .get(collection);
      let result = perform_optimistic_mutation(
        membership.as_ref(),
        |m| m.entry(id).or_default().set(collection, !was),
        || services.mutations.toggle(collection, id, was),
        |m| m.entry(id).or_default().set(collection, was),
      )
      .await;
      if let Err(e) = result {
        if let Some(notice) = notice_for(&e, &format!("update your {}", collection.label())) {
          services.bus.emit(AppEvent::Notice(notice));
        }
      }
    });
  }

  fn toggle_signed_out(&mut self, collection: Collection, id: MovieId) {
    match collection {
      Collection::Favorites => match self.services.legacy.toggle(id) {
        Ok(_) => self.local_favorites = self.services.legacy.list().into_iter().collect(),
        Err(e) => {
          self
            .services
            .bus
            .emit(AppEvent::Notice(Notice::error("Favorites", e.to_string())));
        }
      },
      Collection::Watchlist => {
        self.services.bus.emit(AppEvent::Notice(Notice::info(
          "Sign in required",
          "Sign in with :login to keep a watchlist.",
        )));
      }
    }
  }

  fn title(&self) -> String {
    let label = self.source.label();
    match self.query.state() {
      QueryState::Loading => format!(" {} · page {} (loading...) ", label, self.page),
      QueryState::Success(page) if page.total_pages > 0 => format!(
        " {} · page {}/{} ({} results) ",
        label, page.page, page.total_pages, page.total_results
      ),
      _ => format!(" {} ", label),
    }
  }

  fn render_list(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let len = self.movies().len();
    ensure_valid_selection(&mut self.list_state, len);

    let block = Block::default()
      .title(self.title())
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(palette.border));

    if len == 0 {
      let content = match self.query.state() {
        QueryState::Loading | QueryState::Idle => "Loading...".to_string(),
        QueryState::Error(FetchError::Unauthorized) => {
          format!("Sign in with :login to see your {}.", self.source.label().to_lowercase())
        }
        QueryState::Error(e) => format!("{}\n\nPress 'r' to retry.", error_text(e)),
        QueryState::Success(_) => match &self.source {
          Source::Search(_) => "No movies match your search.".to_string(),
          Source::Collection(collection) => {
            format!("Your {} list is empty.", collection.label().to_lowercase())
          }
          Source::Catalog(_) => "No movies found.".to_string(),
        },
      };
      let paragraph = Paragraph::new(content)
        .block(block)
        .style(Style::default().fg(palette.dim));
      frame.render_widget(paragraph, area);
      return;
    }

    let items: Vec<ListItem> = self
      .movies()
      .iter()
      .map(|movie| {
        let flags = self.flags(movie.id);
        let line = Line::from(vec![
          Span::styled(
            format!("{:<44}", truncate(&movie.title, 44)),
            Style::default().fg(palette.text),
          ),
          Span::styled(
            format!(" {:<4} ", movie.year().unwrap_or("----")),
            Style::default().fg(palette.dim),
          ),
          Span::styled(
            format!("{:>4.1}", movie.vote_average),
            Style::default().fg(score_color(movie.vote_average)),
          ),
          Span::styled(
            if flags.favorite { "  ♥" } else { "   " },
            Style::default().fg(palette.error),
          ),
          Span::styled(
            if flags.watchlist { " ◷" } else { "  " },
            Style::default().fg(palette.accent),
          ),
        ]);
        ListItem::new(line)
      })
      .collect();

    let list = List::new(items)
      .block(block)
      .highlight_style(
        Style::default()
          .bg(palette.selection_bg)
          .add_modifier(Modifier::BOLD),
      )
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }
}

impl View for MovieListView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match self.search.handle_key(key) {
      KeyResult::Event(SearchEvent::Submitted(text)) => {
        if matches!(self.source, Source::Search(_)) {
          // Searching again replaces this search; the old request is dropped
          self.source = Source::Search(text);
          self.go_to_page(1);
          return ViewAction::None;
        }
        return ViewAction::Push(Box::new(MovieListView::new(
          self.services.clone(),
          Source::Search(text),
        )));
      }
      KeyResult::Event(SearchEvent::Cancelled) | KeyResult::Handled => return ViewAction::None,
      KeyResult::NotHandled => {}
    }

    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Char('g') | KeyCode::Home => self.list_state.select_first(),
      KeyCode::Char('G') | KeyCode::End => self.list_state.select_last(),
      KeyCode::Char('n') | KeyCode::Right => {
        if self.query.data().is_some_and(MoviePage::has_next) {
          self.go_to_page(self.page + 1);
        }
      }
      KeyCode::Char('p') | KeyCode::Left => {
        if self.page > 1 {
          self.go_to_page(self.page - 1);
        }
      }
      KeyCode::Char('r') => {
        self.query.refetch();
        self.membership_query.refetch();
      }
      KeyCode::Char('f') => self.toggle(Collection::Favorites),
      KeyCode::Char('w') => self.toggle(Collection::Watchlist),
      KeyCode::Enter => {
        if let Some(movie) = self.selected() {
          return ViewAction::Push(Box::new(MovieDetailView::new(
            self.services.clone(),
            movie.id,
            movie.title.clone(),
          )));
        }
      }
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    self.render_list(frame, area, palette);
    self.search.render_overlay(frame, area, palette);
  }

  fn breadcrumb_label(&self) -> String {
    self.source.label()
  }

  fn tick(&mut self) -> ViewAction {
    self.query.poll();
    if self.membership_query.poll() {
      if let Some(loaded) = self.membership_query.data() {
        *self.membership.lock().unwrap_or_else(PoisonError::into_inner) = loaded.clone();
      }
    }
    ViewAction::None
  }

  fn on_event(&mut self, event: &AppEvent) {
    match event {
      AppEvent::FavoritesChanged { .. } | AppEvent::WatchlistChanged { .. } => {
        self.membership_query.refetch();
        let changed = match event {
          AppEvent::FavoritesChanged { .. } => Collection::Favorites,
          _ => Collection::Watchlist,
        };
        if self.source == Source::Collection(changed) {
          debug!(collection = changed.label(), "collection changed, reloading page");
          self.query.refetch();
        }
      }
      AppEvent::AuthStateChanged { reason } => {
        match reason {
          AuthChangeReason::LoggedOut | AuthChangeReason::Expired => {
            self.membership.lock().unwrap_or_else(PoisonError::into_inner).clear();
            self.membership_query.cancel();
          }
          AuthChangeReason::LoggedIn => self.membership_query.refetch(),
          AuthChangeReason::Refreshed => return,
        }
        self.local_favorites = self.services.legacy.list().into_iter().collect();
        if matches!(self.source, Source::Collection(_)) {
          self.query.refetch();
        }
      }
      _ => {}
    }
  }

  fn is_capturing_input(&self) -> bool {
    self.search.is_active()
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new("enter", "details"),
      Shortcut::new("f", "favorite"),
      Shortcut::new("w", "watchlist"),
      Shortcut::new("n/p", "page"),
      Shortcut::new("/", "search"),
      Shortcut::new("r", "refresh"),
    ]
  }
}

fn page_query(services: &Arc<Services>, source: &Source, page: u32) -> Query<MoviePage> {
  let services = services.clone();
  let source = source.clone();
  Query::new(move || {
    let services = services.clone();
    let source = source.clone();
    async move {
      match source {
        Source::Catalog(kind) => services.movies.list(kind, page).await,
        Source::Search(text) => services.movies.search(&text, page).await,
        Source::Collection(collection) => services
          .movies
          .collection(collection, page)
          .await
          .map(|records| records.into_movie_page()),
      }
    }
  })
}

/// Favorite and watchlist flags for every movie in either collection.
/// Signed out, there is nothing to load.
fn membership_query(services: &Arc<Services>) -> Query<MembershipMap> {
  let services = services.clone();
  Query::new(move || {
    let services = services.clone();
    async move {
      if !services.session.is_authenticated() {
        return Ok(HashMap::new());
      }
      let (favorites, watchlist) = tokio::try_join!(
        services.movies.collection_all(Collection::Favorites),
        services.movies.collection_all(Collection::Watchlist),
      )?;
      let mut map = MembershipMap::new();
      for record in favorites {
        map.entry(record.movie.id).or_default().favorite = true;
      }
      for record in watchlist {
        map.entry(record.movie.id).or_default().watchlist = true;
      }
      Ok(map)
    }
  })
}
