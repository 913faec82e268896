//! TUI rendering: orchestrates all panes.

pub mod detail;
pub mod list;
pub mod overlay;

use chrono::Local;
use georeport_core::bulk::BulkFlow;
use ratatui::{
  Frame,
  layout::{Constraint, Direction, Layout, Rect},
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Paragraph, Tabs},
};
use strum::IntoEnumIterator;

use crate::app::{App, Tab};

// ─── Root draw ────────────────────────────────────────────────────────────────

/// Main draw function called each frame.
pub fn draw(f: &mut Frame, app: &App) {
  let area = f.area();
  let banner = u16::from(app.banner.is_some());

  let rows = Layout::default()
    .direction(Direction::Vertical)
    .constraints([
      Constraint::Length(1),      // header
      Constraint::Length(banner), // security banner
      Constraint::Min(0),         // body
      Constraint::Length(1),      // status bar
    ])
    .split(area);

  draw_header(f, rows[0], app);
  if let Some(text) = &app.banner {
    f.render_widget(
      Paragraph::new(format!(" ⚠ {text}"))
        .style(Style::default().fg(Color::Black).bg(Color::Yellow)),
      rows[1],
    );
  }
  draw_body(f, rows[2], app);
  draw_status(f, rows[3], app);

  overlay::draw_toasts(f, rows[2], app);
  if let Some(picker) = &app.picker {
    overlay::draw_picker(f, area, picker);
  }
  if let BulkFlow::Confirming { action, ids } = &app.bulk {
    overlay::draw_confirm(f, area, action, ids.len());
  }
}

// ─── Header ───────────────────────────────────────────────────────────────────

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
  let cols = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Min(0), Constraint::Length(34)])
    .split(area);

  let titles: Vec<Line> = Tab::iter()
    .enumerate()
    .map(|(i, t)| {
      let label = match t {
        Tab::Notifications if app.unread_count() > 0 => {
          format!("{} {} ({})", i + 1, t.title(), app.unread_count())
        }
        _ => format!("{} {}", i + 1, t.title()),
      };
      Line::from(label)
    })
    .collect();
  let selected = Tab::iter().position(|t| t == app.tab).unwrap_or(0);
  let tabs = Tabs::new(titles)
    .select(selected)
    .style(Style::default().fg(Color::White).bg(Color::DarkGray))
    .highlight_style(
      Style::default()
        .fg(Color::Black)
        .bg(Color::Cyan)
        .add_modifier(Modifier::BOLD),
    );
  f.render_widget(tabs, cols[0]);

  let who = app
    .me
    .as_ref()
    .map(|u| u.fields.email.as_str())
    .unwrap_or("—");
  let date = Local::now().format("%Y-%m-%d");
  f.render_widget(
    Paragraph::new(Line::from(vec![Span::raw(format!("{who}  {date} "))]))
      .alignment(ratatui::layout::Alignment::Right)
      .style(Style::default().fg(Color::Gray).bg(Color::DarkGray)),
    cols[1],
  );
}

// ─── Body ─────────────────────────────────────────────────────────────────────

fn draw_body(f: &mut Frame, area: Rect, app: &App) {
  let cols = Layout::default()
    .direction(Direction::Horizontal)
    .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
    .split(area);

  let rows = app.visible_rows();
  list::draw(f, cols[0], app, &rows);
  detail::draw(f, cols[1], rows.get(app.list_cursor));
}

// ─── Status bar ───────────────────────────────────────────────────────────────

fn draw_status(f: &mut Frame, area: Rect, app: &App) {
  let (mode_label, hints) = match (&app.bulk, app.tab) {
    (BulkFlow::Processing { .. }, _) => ("BUSY", ""),
    _ if app.picker.is_some() => ("PICK", "↑↓ elegir  Enter aplicar  Esc cancelar"),
    _ if app.filter_active => ("SEARCH", "Escribe para filtrar  Esc cancelar  Enter aplicar"),
    (_, Tab::Reportes) => (
      "NORMAL",
      "␣ marcar  a todos  d borrar  t activo  e estado  c categoría  A asignar  X csv  q salir",
    ),
    (_, Tab::Notifications) => ("NORMAL", "␣ marcar  r leída  R todas leídas  d borrar  q salir"),
    (_, Tab::Activity) => ("NORMAL", "/ buscar  [ ] página  X csv  g recargar  q salir"),
    _ => ("NORMAL", "␣ marcar  a todos  d borrar  t activo  X csv  / filtrar  q salir"),
  };

  let summary = app.selection_summary();
  let message = if !app.status_msg.is_empty() {
    app.status_msg.clone()
  } else {
    hints.to_string()
  };

  let mut spans = vec![Span::styled(
    format!(" {mode_label} "),
    Style::default()
      .fg(Color::Black)
      .bg(Color::Cyan)
      .add_modifier(Modifier::BOLD),
  )];
  if !summary.is_empty() {
    spans.push(Span::styled(
      format!(" {summary} "),
      Style::default().fg(Color::Black).bg(Color::Yellow),
    ));
  }
  spans.push(Span::styled(format!("  {message}"), Style::default().fg(Color::DarkGray)));

  f.render_widget(
    Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Black)),
    area,
  );
}
