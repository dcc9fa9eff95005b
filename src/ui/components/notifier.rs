//! The single modal used for every user-facing notice.

use std::collections::VecDeque;

use crate::bus::{Notice, NoticeLevel};
use crate::ui::theme::Palette;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

/// Queue of notices, shown one at a time until dismissed.
#[derive(Debug, Default)]
pub struct Notifier {
  queue: VecDeque<Notice>,
}

impl Notifier {
  pub fn new() -> Self {
    Self::default()
  }

  /// Queue a notice. An identical notice already waiting is not queued
  /// twice.
  pub fn push(&mut self, notice: Notice) {
    if !self.queue.contains(&notice) {
      self.queue.push_back(notice);
    }
  }

  pub fn current(&self) -> Option<&Notice> {
    self.queue.front()
  }

  pub fn is_active(&self) -> bool {
    !self.queue.is_empty()
  }

  pub fn len(&self) -> usize {
    self.queue.len()
  }

  /// While a notice is showing it takes every key; Enter, Esc, Space and
  /// `q` dismiss it. Returns whether the key was consumed.
  pub fn handle_key(&mut self, key: KeyEvent) -> bool {
    if !self.is_active() {
      return false;
    }
    if matches!(
      key.code,
      KeyCode::Enter | KeyCode::Esc | KeyCode::Char(' ') | KeyCode::Char('q')
    ) {
      self.queue.pop_front();
    }
    true
  }

  pub fn render(&self, frame: &mut Frame, area: Rect, palette: &Palette) {
    let Some(notice) = self.current() else {
      return;
    };

    let color = match notice.level {
      NoticeLevel::Error => palette.error,
      NoticeLevel::Warning => palette.highlight,
      NoticeLevel::Info => palette.accent,
    };
    let width = (area.width * 50 / 100).clamp(30, 70).min(area.width);
    let height = 7.min(area.height);
    let modal = Rect::new(
      area.x + (area.width.saturating_sub(width)) / 2,
      area.y + (area.height.saturating_sub(height)) / 2,
      width,
      height,
    );

    frame.render_widget(Clear, modal);
    let more = if self.len() > 1 {
      format!(" (+{}) ", self.len() - 1)
    } else {
      String::new()
    };
    let block = Block::default()
      .borders(Borders::ALL)
      .border_style(Style::default().fg(color))
      .title(format!(" {} {}", notice.title, more))
      .title_bottom(Line::from(" <enter> dismiss ").right_aligned());
    let body = Paragraph::new(notice.message.as_str())
      .wrap(Wrap { trim: true })
      .style(Style::default().fg(palette.text))
      .block(block);
    frame.render_widget(body, modal);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crossterm::event::KeyModifiers;

  fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
  }

  #[test]
  fn test_duplicate_notices_collapse() {
    let mut notifier = Notifier::new();
    notifier.push(Notice::warning("Session expired", "Please sign in again."));
    notifier.push(Notice::warning("Session expired", "Please sign in again."));
    assert_eq!(notifier.len(), 1);
  }

  #[test]
  fn test_modal_swallows_keys_until_dismissed() {
    let mut notifier = Notifier::new();
    assert!(!notifier.handle_key(key(KeyCode::Char('j'))));

    notifier.push(Notice::error("Error", "first"));
    notifier.push(Notice::info("Saved", "second"));
    assert!(notifier.handle_key(key(KeyCode::Char('j'))));
    assert_eq!(notifier.current().map(|n| n.message.as_str()), Some("first"));

    assert!(notifier.handle_key(key(KeyCode::Enter)));
    assert_eq!(notifier.current().map(|n| n.message.as_str()), Some("second"));
    notifier.handle_key(key(KeyCode::Esc));
    assert!(!notifier.is_active());
  }
}
