use std::sync::Arc;

use crate::bus::{AppEvent, Notice};
use crate::services::Services;
use crate::settings::UserSettings;
use crate::ui::ensure_valid_selection;
use crate::ui::theme::Palette;
use crate::ui::view::{Shortcut, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState};
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Row {
  Notifications,
  EmailUpdates,
  AutoPlay,
  Language,
  Theme,
  Quality,
}

const ROWS: [Row; 6] = [
  Row::Notifications,
  Row::EmailUpdates,
  Row::AutoPlay,
  Row::Language,
  Row::Theme,
  Row::Quality,
];

impl Row {
  fn label(self) -> &'static str {
    match self {
      Row::Notifications => "Notifications",
      Row::EmailUpdates => "Email updates",
      Row::AutoPlay => "Autoplay trailers",
      Row::Language => "Language",
      Row::Theme => "Theme",
      Row::Quality => "Video quality",
    }
  }

  fn value(self, settings: &UserSettings) -> String {
    let on_off = |on: bool| (if on { "on" } else { "off" }).to_string();
    match self {
      Row::Notifications => on_off(settings.notifications),
      Row::EmailUpdates => on_off(settings.email_updates),
      Row::AutoPlay => on_off(settings.auto_play),
      Row::Language => settings.language.label().to_string(),
      Row::Theme => settings.theme.to_string(),
      Row::Quality => settings.quality.to_string(),
    }
  }

  fn cycle(self, settings: &mut UserSettings) {
    match self {
      Row::Notifications => settings.notifications = !settings.notifications,
      Row::EmailUpdates => settings.email_updates = !settings.email_updates,
      Row::AutoPlay => settings.auto_play = !settings.auto_play,
      Row::Language => settings.language = settings.language.next(),
      Row::Theme => settings.theme = settings.theme.next(),
      Row::Quality => settings.quality = settings.quality.next(),
    }
  }
}

/// Preferences editor. Every change is saved immediately.
pub struct SettingsView {
  services: Arc<Services>,
  settings: UserSettings,
  list_state: ListState,
}

impl SettingsView {
  pub fn new(services: Arc<Services>) -> Self {
    let settings = services.settings.get();
    Self {
      services,
      settings,
      list_state: ListState::default().with_selected(Some(0)),
    }
  }

  fn save(&mut self, updated: UserSettings) {
    match self.services.settings.save(&updated) {
      Ok(()) => self.settings = updated,
      Err(e) => {
        error!(error = %e, "saving settings failed");
        self
          .services
          .bus
          .emit(AppEvent::Notice(Notice::error("Settings not saved", e.to_string())));
      }
    }
  }
}

impl View for SettingsView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    match key.code {
      KeyCode::Char('j') | KeyCode::Down => self.list_state.select_next(),
      KeyCode::Char('k') | KeyCode::Up => self.list_state.select_previous(),
      KeyCode::Enter | KeyCode::Char(' ') | KeyCode::Char('l') | KeyCode::Right => {
        if let Some(row) = self.list_state.selected().and_then(|i| ROWS.get(i)) {
          let mut updated = self.settings;
          row.cycle(&mut updated);
          self.save(updated);
        }
      }
      KeyCode::Char('R') => self.save(UserSettings::default()),
      KeyCode::Char('q') | KeyCode::Esc => return ViewAction::Pop,
      _ => {}
    }
    ViewAction::None
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    ensure_valid_selection(&mut self.list_state, ROWS.len());

    let items: Vec<ListItem> = ROWS
      .iter()
      .map(|row| {
        ListItem::new(Line::from(vec![
          Span::styled(format!("{:<20}", row.label()), Style::default().fg(palette.text)),
          Span::styled(row.value(&self.settings), Style::default().fg(palette.accent)),
        ]))
      })
      .collect();

    let list = List::new(items)
      .block(
        Block::default()
          .title(" Settings ")
          .title_alignment(Alignment::Center)
          .borders(Borders::ALL)
          .border_style(Style::default().fg(palette.border)),
      )
      .highlight_style(Style::default().bg(palette.selection_bg).add_modifier(Modifier::BOLD))
      .highlight_symbol("> ");

    frame.render_stateful_widget(list, area, &mut self.list_state);
  }

  fn breadcrumb_label(&self) -> String {
    "Settings".to_string()
  }

  fn on_event(&mut self, event: &AppEvent) {
    if let AppEvent::SettingsChanged(settings) = event {
      self.settings = *settings;
    }
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![
      Shortcut::new("enter", "change"),
      Shortcut::new("R", "reset"),
      Shortcut::new("q", "back"),
    ]
  }
}
