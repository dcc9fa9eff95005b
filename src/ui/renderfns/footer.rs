use crate::ui::theme::Palette;
use crate::ui::view::ShortcutInfo;
use ratatui::prelude::*;
use ratatui::widgets::Paragraph;

/// Draw the footer: breadcrumb on the left, view shortcuts on the right
pub fn draw_footer(
  frame: &mut Frame,
  area: Rect,
  breadcrumb: &[String],
  shortcuts: &[ShortcutInfo],
  palette: &Palette,
) {
  let mut spans = vec![Span::raw(" ")];

  for (i, part) in breadcrumb.iter().enumerate() {
    if i > 0 {
      spans.push(Span::styled(" > ", Style::default().fg(palette.dim)));
    }
    let style = if i == breadcrumb.len() - 1 {
      Style::default().fg(palette.accent).bold()
    } else {
      Style::default().fg(palette.text)
    };
    spans.push(Span::styled(part.clone(), style));
  }

  let mut hints = Vec::new();
  for shortcut in shortcuts {
    hints.push(Span::styled(
      format!("<{}>", shortcut.key),
      Style::default().fg(palette.accent),
    ));
    hints.push(Span::styled(
      format!(" {}  ", shortcut.label),
      Style::default().fg(palette.dim),
    ));
  }

  let chunks = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
    .split(area);

  let style = Style::default().bg(palette.bar_bg);
  frame.render_widget(Paragraph::new(Line::from(spans)).style(style), chunks[0]);
  frame.render_widget(
    Paragraph::new(Line::from(hints).right_aligned()).style(style),
    chunks[1],
  );
}
