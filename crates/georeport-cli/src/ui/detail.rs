//! Detail pane: right panel.

use ratatui::{
  Frame,
  layout::Rect,
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, Borders, Paragraph, Wrap},
};

use crate::app::Row;

/// Render the fields of `row` into `area`.
pub fn draw(f: &mut Frame, area: Rect, row: Option<&Row>) {
  let title = row.map(|r| format!(" {} ", r.title)).unwrap_or_else(|| " Detalle ".into());
  let block = Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::DarkGray));
  let inner = block.inner(area);
  f.render_widget(block, area);

  let Some(row) = row else {
    f.render_widget(
      Paragraph::new("Sin registros.").style(Style::default().fg(Color::DarkGray)),
      inner,
    );
    return;
  };

  let mut lines: Vec<Line> = row
    .fields
    .iter()
    .map(|(label, value)| {
      Line::from(vec![
        Span::styled(
          format!("{label:<14}"),
          Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ),
        Span::raw(value.clone()),
      ])
    })
    .collect();

  lines.push(Line::from(""));
  lines.push(Line::from(Span::styled(
    format!("id {}", row.id),
    Style::default().fg(Color::DarkGray),
  )));
  if !row.activo {
    lines.push(Line::from(Span::styled("inactivo", Style::default().fg(Color::Red))));
  }

  f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
}
