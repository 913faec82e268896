//! Row list pane: left panel.

use georeport_core::selection::SelectionState;
use ratatui::{
  Frame,
  layout::Rect,
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
};

use crate::app::{App, Row, Tab};

/// Render `rows` (already filtered) into `area`.
pub fn draw(f: &mut Frame, area: Rect, app: &App, rows: &[Row]) {
  let total = app.rows().len();
  let checkbox = match app.selection.state(rows) {
    SelectionState::All => "[x]",
    SelectionState::Partial => "[-]",
    SelectionState::None => "[ ]",
  };

  let title = if app.tab == Tab::Activity {
    let from = app.activity_offset + 1;
    let to = app.activity_offset as usize + app.activity_fetched;
    format!(" {} {from}–{to} ", app.tab.title())
  } else if app.filter_active || !app.filter.is_empty() {
    format!(" {checkbox} {} ({}/{total}) ", app.tab.title(), rows.len())
  } else {
    format!(" {checkbox} {} ({total}) ", app.tab.title())
  };

  let block = Block::default()
    .title(title)
    .borders(Borders::ALL)
    .border_style(Style::default().fg(Color::DarkGray));

  let items: Vec<ListItem> = rows
    .iter()
    .map(|row| {
      let mark = if app.tab == Tab::Activity {
        ""
      } else if app.selection.contains(row.id) {
        "■ "
      } else {
        "□ "
      };
      let text_style = if row.activo {
        Style::default()
      } else {
        Style::default().fg(Color::DarkGray)
      };
      let swatch = row
        .color
        .as_deref()
        .and_then(|c| c.parse::<Color>().ok())
        .map(|c| Span::styled("● ", Style::default().fg(c)))
        .unwrap_or_else(|| Span::raw("  "));

      ListItem::new(Line::from(vec![
        Span::styled(mark, Style::default().fg(Color::Yellow)),
        swatch,
        Span::styled(row.title.clone(), text_style.add_modifier(Modifier::BOLD)),
        Span::styled(format!("  {}", row.subtitle), Style::default().fg(Color::DarkGray)),
      ]))
    })
    .collect();

  let mut inner_area = block.inner(area);
  f.render_widget(block, area);

  if (app.filter_active || !app.filter.is_empty()) && inner_area.height > 2 {
    let filter_area = Rect {
      x:      inner_area.x,
      y:      inner_area.y + inner_area.height - 1,
      width:  inner_area.width,
      height: 1,
    };
    inner_area.height = inner_area.height.saturating_sub(1);

    let filter_text = if app.filter_active {
      format!("/{}_", app.filter)
    } else {
      format!("/{}", app.filter)
    };
    f.render_widget(
      Paragraph::new(filter_text).style(Style::default().fg(Color::Yellow)),
      filter_area,
    );
  }

  let mut state = ListState::default();
  state.select(if rows.is_empty() { None } else { Some(app.list_cursor) });

  f.render_stateful_widget(
    List::new(items).highlight_style(
      Style::default()
        .bg(Color::Blue)
        .fg(Color::White)
        .add_modifier(Modifier::BOLD),
    ),
    inner_area,
    &mut state,
  );
}
