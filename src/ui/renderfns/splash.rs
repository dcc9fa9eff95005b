use crate::preload::PreloadProgress;
use crate::ui::theme::Palette;
use ratatui::prelude::*;
use ratatui::widgets::{Gauge, Paragraph};

/// Full-screen splash with warm-up progress
pub fn draw_splash(frame: &mut Frame, area: Rect, progress: &PreloadProgress, palette: &Palette) {
  let chunks = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Percentage(40),
      Constraint::Length(2),
      Constraint::Length(1),
      Constraint::Min(0),
    ])
    .split(area);

  let title = Paragraph::new(Line::from(vec![
    Span::styled("shimy", Style::default().fg(palette.accent).bold()),
    Span::styled("  loading the catalog", Style::default().fg(palette.dim)),
  ]))
  .alignment(Alignment::Center);
  frame.render_widget(title, chunks[1]);

  let bar = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([
      Constraint::Percentage(25),
      Constraint::Percentage(50),
      Constraint::Percentage(25),
    ])
    .split(chunks[2]);

  let gauge = Gauge::default()
    .gauge_style(Style::default().fg(palette.accent).bg(palette.bar_bg))
    .ratio(progress.ratio().clamp(0.0, 1.0))
    .label(format!("{}/{}", progress.completed + progress.failed, progress.total));
  frame.render_widget(gauge, bar[1]);
}
