use std::sync::Arc;

use crate::api::User;
use crate::bus::{AppEvent, Notice};
use crate::query::{Query, QueryState};
use crate::services::Services;
use crate::ui::components::{InputResult, TextInput};
use crate::ui::error_text;
use crate::ui::theme::Palette;
use crate::ui::view::{Shortcut, View, ViewAction};
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
  Email,
  Password,
}

/// Sign-in form
pub struct LoginView {
  services: Arc<Services>,
  email: TextInput,
  password: TextInput,
  focus: Field,
  attempt: Option<Query<User>>,
}

impl LoginView {
  pub fn new(services: Arc<Services>) -> Self {
    Self {
      services,
      email: TextInput::new(),
      password: TextInput::masked(),
      focus: Field::Email,
      attempt: None,
    }
  }

  fn submit(&mut self) {
    if self.email.is_empty() || self.password.is_empty() {
      return;
    }
    let auth = self.services.auth.clone();
    let email = self.email.value().to_string();
    let password = self.password.value().to_string();
    let mut attempt = Query::new(move || {
      let auth = auth.clone();
      let email = email.clone();
      let password = password.clone();
      async move { auth.login(&email, &password).await }
    });
    attempt.fetch();
    self.attempt = Some(attempt);
  }

  fn is_submitting(&self) -> bool {
    self.attempt.as_ref().is_some_and(Query::is_loading)
  }
}

impl View for LoginView {
  fn handle_key(&mut self, key: KeyEvent) -> ViewAction {
    if self.is_submitting() {
      return ViewAction::None;
    }
    if key.code == KeyCode::Tab || key.code == KeyCode::BackTab {
      self.focus = match self.focus {
        Field::Email => Field::Password,
        Field::Password => Field::Email,
      };
      return ViewAction::None;
    }

    let input = match self.focus {
      Field::Email => &mut self.email,
      Field::Password => &mut self.password,
    };
    match input.handle_key(key) {
      InputResult::Cancelled => ViewAction::Pop,
      InputResult::Submitted(_) => {
        match self.focus {
          Field::Email => self.focus = Field::Password,
          Field::Password => self.submit(),
        }
        ViewAction::None
      }
      InputResult::Consumed | InputResult::NotHandled => ViewAction::None,
    }
  }

  fn render(&mut self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let width = 50.min(area.width);
    let height = 8.min(area.height);
    let form = Rect::new(
      area.x + area.width.saturating_sub(width) / 2,
      area.y + area.height.saturating_sub(height) / 3,
      width,
      height,
    );
    frame.render_widget(Clear, form);

    let dim = Style::default().fg(palette.dim);
    let row = |name: &'static str, input: &TextInput, focused: bool| {
      let mut spans = vec![Span::styled(format!("{:<10}", name), dim)];
      spans.extend(input.spans(focused, palette.highlight));
      Line::from(spans)
    };

    let status = match self.attempt.as_ref().map(Query::state) {
      Some(QueryState::Loading) => Line::styled("Signing in...", dim),
      Some(QueryState::Error(e)) => Line::styled(error_text(e), Style::default().fg(palette.error)),
      _ => Line::styled("<tab> switch field  <enter> sign in  <esc> cancel", dim),
    };

    let lines = vec![
      Line::default(),
      row("Email", &self.email, self.focus == Field::Email),
      row("Password", &self.password, self.focus == Field::Password),
      Line::default(),
      status,
    ];

    let block = Block::default()
      .title(" Sign in ")
      .title_alignment(Alignment::Center)
      .borders(Borders::ALL)
      .border_style(Style::default().fg(palette.highlight));
    frame.render_widget(Paragraph::new(lines).block(block), form);
  }

  fn breadcrumb_label(&self) -> String {
    "Sign in".to_string()
  }

  fn tick(&mut self) -> ViewAction {
    let Some(attempt) = self.attempt.as_mut() else {
      return ViewAction::None;
    };
    if attempt.poll() {
      if let Some(user) = attempt.data() {
        self.services.bus.emit(AppEvent::Notice(Notice::info(
          "Signed in",
          format!("Welcome back, {}.", user.username),
        )));
        return ViewAction::Pop;
      }
      self.password.clear();
    }
    ViewAction::None
  }

  fn is_capturing_input(&self) -> bool {
    true
  }

  fn shortcuts(&self) -> Vec<Shortcut> {
    vec![Shortcut::new("tab", "next field"), Shortcut::new("esc", "cancel")]
  }
}
