use crate::api::{Collection, FetchError, ListKind, Profile, UserStats};
use crate::bus::{AppEvent, AuthChangeReason, Notice};
use crate::commands::Invocation;
use crate::event::{Event, EventHandler};
use crate::preload::{PreloadOutcome, PreloadProgress};
use crate::query::{Query, QueryState};
use crate::services::Services;
use crate::ui::components::{CommandEvent, CommandInput, KeyResult, Notifier};
use crate::ui::renderfns::{draw_footer, draw_header, draw_splash, HeaderUser};
use crate::ui::theme::Palette;
use crate::ui::view::{View, ViewAction};
use crate::ui::views::{LoginView, MovieListView, ProfileView, SettingsView, Source};
use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crossterm::terminal::{
  disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use futures::FutureExt;
use ratatui::prelude::*;
use std::io::stdout;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Warm-up in progress behind the splash screen
struct Splash {
  progress: watch::Receiver<PreloadProgress>,
  task: JoinHandle<PreloadOutcome>,
}

/// Main application state
pub struct App {
  services: Arc<Services>,

  /// Navigation stack - root is always at index 0. Empty while the splash
  /// is up.
  view_stack: Vec<Box<dyn View>>,

  command_input: CommandInput,
  notifier: Notifier,

  header: HeaderUser,
  header_query: Option<Query<(Profile, UserStats)>>,

  palette: Palette,
  splash: Option<Splash>,

  should_quit: bool,
}

impl App {
  pub fn new(services: Arc<Services>) -> Self {
    let palette = Palette::for_theme(services.settings.theme());
    Self {
      services,
      view_stack: Vec::new(),
      command_input: CommandInput::new(),
      notifier: Notifier::new(),
      header: HeaderUser::Anonymous,
      header_query: None,
      palette,
      splash: None,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    // Subscribe before anything can emit
    let mut events = EventHandler::new(Duration::from_millis(100), self.services.bus.subscribe_all());

    self.services.start_monitor();
    self.start();

    let result = self.event_loop(&mut terminal, &mut events).await;

    self.services.dispose();

    // Cleanup terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
  }

  async fn event_loop(
    &mut self,
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    events: &mut EventHandler,
  ) -> Result<()> {
    while !self.should_quit {
      terminal.draw(|frame| self.draw(frame))?;

      if let Some(event) = events.next().await {
        self.handle_event(event);
      } else {
        break;
      }
    }
    Ok(())
  }

  /// Show the landing view straight away when a recent snapshot exists,
  /// otherwise put up the splash while the landing lists warm up.
  fn start(&mut self) {
    let preloader = self.services.preloader();
    if preloader.try_hydrate().is_some() {
      self.mount_root();
    } else {
      let progress = preloader.progress();
      let task = tokio::spawn(async move { preloader.warm().await });
      self.splash = Some(Splash { progress, task });
    }
    self.refresh_header();
  }

  fn mount_root(&mut self) {
    let root = MovieListView::new(self.services.clone(), Source::Catalog(ListKind::Trending));
    self.view_stack = vec![Box::new(root)];
  }

  fn finish_splash(&mut self) {
    let Some(splash) = self.splash.as_mut() else {
      return;
    };
    if !splash.task.is_finished() {
      return;
    }
    match (&mut splash.task).now_or_never() {
      Some(Ok(outcome)) => debug!(?outcome, "splash done"),
      Some(Err(e)) => warn!(error = %e, "preload task failed"),
      None => return,
    }
    self.splash = None;
    self.mount_root();
  }

  fn handle_event(&mut self, event: Event) {
    match event {
      Event::Key(key) => self.handle_key(key),
      Event::Tick => self.tick(),
      Event::Bus(event) => self.handle_bus_event(event),
    }
  }

  fn tick(&mut self) {
    self.finish_splash();

    if let Some(query) = self.header_query.as_mut() {
      if query.poll() {
        self.header = match query.state() {
          QueryState::Success((profile, stats)) => HeaderUser::SignedIn {
            profile: profile.clone(),
            stats: Some(stats.clone()),
          },
          QueryState::Error(FetchError::Unauthorized) => HeaderUser::Anonymous,
          // Keep the last known user if only the refresh failed
          QueryState::Error(_) => match &self.header {
            HeaderUser::Loading => HeaderUser::Anonymous,
            other => other.clone(),
          },
          QueryState::Loading | QueryState::Idle => self.header.clone(),
        };
      }
    }

    // Covered views still poll so their data is ready when revealed
    let top = self.view_stack.len().saturating_sub(1);
    let mut action = ViewAction::None;
    for (i, view) in self.view_stack.iter_mut().enumerate() {
      let result = view.tick();
      if i == top {
        action = result;
      }
    }
    self.apply(action);
  }

  fn handle_bus_event(&mut self, event: AppEvent) {
    match &event {
      AppEvent::Notice(notice) => self.notifier.push(notice.clone()),
      AppEvent::AuthStateChanged { reason } => match reason {
        AuthChangeReason::LoggedIn => self.refresh_header(),
        AuthChangeReason::LoggedOut | AuthChangeReason::Expired => {
          self.header_query = None;
          self.header = HeaderUser::Anonymous;
        }
        AuthChangeReason::Refreshed => {}
      },
      AppEvent::ProfileChanged
      | AppEvent::FavoritesChanged { .. }
      | AppEvent::WatchlistChanged { .. }
      | AppEvent::RatingsChanged { .. } => {
        if let Some(query) = self.header_query.as_mut() {
          query.refetch();
        }
      }
      AppEvent::SettingsChanged(settings) => {
        self.palette = Palette::for_theme(settings.theme);
      }
    }

    for view in self.view_stack.iter_mut() {
      view.on_event(&event);
    }
  }

  fn refresh_header(&mut self) {
    if !self.services.session.is_authenticated() {
      self.header_query = None;
      self.header = HeaderUser::Anonymous;
      return;
    }
    let movies = self.services.movies.clone();
    let mut query = Query::new(move || {
      let movies = movies.clone();
      async move { tokio::try_join!(movies.profile(), movies.stats()) }
    });
    query.fetch();
    self.header_query = Some(query);
    if !matches!(self.header, HeaderUser::SignedIn { .. }) {
      self.header = HeaderUser::Loading;
    }
  }

  fn handle_key(&mut self, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
      self.should_quit = true;
      return;
    }

    // The notice modal sits above everything else
    if self.notifier.handle_key(key) {
      return;
    }
    if self.splash.is_some() {
      return;
    }

    if self.command_input.is_active() {
      match self.command_input.handle_key(key) {
        KeyResult::Event(CommandEvent::Submitted(line)) => self.execute_command(&line),
        KeyResult::Event(CommandEvent::Cancelled) | KeyResult::Handled | KeyResult::NotHandled => {}
      }
      return;
    }

    let capturing = self
      .view_stack
      .last()
      .is_some_and(|view| view.is_capturing_input());
    if !capturing && key.code == KeyCode::Char(':') {
      self.command_input.activate();
      return;
    }

    if let Some(view) = self.view_stack.last_mut() {
      let action = view.handle_key(key);
      self.apply(action);
    }
  }

  fn apply(&mut self, action: ViewAction) {
    match action {
      ViewAction::None => {}
      ViewAction::Push(view) => self.view_stack.push(view),
      ViewAction::Pop => {
        if self.view_stack.len() > 1 {
          self.view_stack.pop();
        } else {
          self.should_quit = true;
        }
      }
    }
  }

  /// Replace the whole stack with a new root view
  fn set_root(&mut self, view: Box<dyn View>) {
    self.view_stack.clear();
    self.view_stack.push(view);
  }

  fn list_root(&mut self, source: Source) {
    let view = MovieListView::new(self.services.clone(), source);
    self.set_root(Box::new(view));
  }

  fn execute_command(&mut self, line: &str) {
    let invocation = Invocation::parse(line);
    debug!(command = %invocation.name, "executing command");

    match invocation.name.as_str() {
      "" => {}
      "trending" => self.list_root(Source::Catalog(ListKind::Trending)),
      "top" => self.list_root(Source::Catalog(ListKind::TopRated)),
      "popular" => self.list_root(Source::Catalog(ListKind::Popular)),
      "movies" => self.list_root(Source::Catalog(ListKind::Movies)),
      "tv" => self.list_root(Source::Catalog(ListKind::Tv)),
      "search" => {
        if invocation.args.is_empty() {
          self.notifier.push(Notice::info("Search", "Usage: search <title>"));
        } else {
          self.list_root(Source::Search(invocation.args));
        }
      }
      "favorites" => self.list_root(Source::Collection(Collection::Favorites)),
      "watchlist" => self.list_root(Source::Collection(Collection::Watchlist)),
      "profile" => {
        let view = ProfileView::new(self.services.clone());
        self.view_stack.push(Box::new(view));
      }
      "settings" => {
        let view = SettingsView::new(self.services.clone());
        self.view_stack.push(Box::new(view));
      }
      "login" => {
        if self.services.session.is_authenticated() {
          self.notifier.push(Notice::info("Signed in", "You are already signed in."));
        } else {
          let view = LoginView::new(self.services.clone());
          self.view_stack.push(Box::new(view));
        }
      }
      "logout" => {
        if self.services.session.is_authenticated() {
          self.services.auth.logout();
          info!("signed out from the command line");
        }
      }
      "clear-cache" => {
        self.services.cache.clear();
        self.notifier.push(Notice::info("Cache cleared", "Cached responses were dropped."));
      }
      "quit" => self.should_quit = true,
      other => {
        self.notifier.push(Notice::warning(
          "Unknown command",
          format!("'{}' is not a command. Press : and Tab to see them all.", other),
        ));
      }
    }
  }

  fn draw(&mut self, frame: &mut Frame) {
    let chunks = Layout::default()
      .direction(Direction::Vertical)
      .constraints([
        Constraint::Length(1), // Header
        Constraint::Min(1),    // Main content
        Constraint::Length(1), // Footer
      ])
      .split(frame.area());

    let palette = self.palette;
    draw_header(
      frame,
      chunks[0],
      &self.services.config.api.base_url,
      &self.header,
      &palette,
    );

    if let Some(splash) = &self.splash {
      let progress = *splash.progress.borrow();
      draw_splash(frame, chunks[1], &progress, &palette);
    } else if let Some(view) = self.view_stack.last_mut() {
      view.render(frame, chunks[1], &palette);
    }

    let breadcrumb: Vec<String> = self
      .view_stack
      .iter()
      .map(|view| view.breadcrumb_label())
      .collect();
    let shortcuts = self
      .view_stack
      .last()
      .map(|view| view.shortcuts())
      .unwrap_or_default();
    draw_footer(frame, chunks[2], &breadcrumb, &shortcuts, &palette);

    self.command_input.render_overlay(frame, chunks[1], &palette);
    self.notifier.render(frame, frame.area(), &palette);
  }
}
