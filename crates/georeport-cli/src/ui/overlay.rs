//! Floating widgets drawn over the body: toasts, the bulk confirmation
//! dialog, and the target picker.

use georeport_core::bulk::BulkAction;
use ratatui::{
  Frame,
  layout::Rect,
  style::{Color, Modifier, Style},
  text::{Line, Span},
  widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
};

use crate::app::{App, PickKind, Picker, ToastLevel};

fn centered(area: Rect, width: u16, height: u16) -> Rect {
  let width = width.min(area.width);
  let height = height.min(area.height);
  Rect {
    x: area.x + (area.width - width) / 2,
    y: area.y + (area.height - height) / 2,
    width,
    height,
  }
}

/// Stack toasts in the top-right corner of `area`, newest at the bottom.
pub fn draw_toasts(f: &mut Frame, area: Rect, app: &App) {
  let width = 48.min(area.width);
  let mut y = area.y + 1;
  for toast in &app.toasts {
    if y + 3 > area.y + area.height {
      break;
    }
    let color = match toast.level {
      ToastLevel::Info => Color::Green,
      ToastLevel::Warn => Color::Yellow,
      ToastLevel::Error => Color::Red,
    };
    let rect = Rect { x: area.x + area.width - width, y, width, height: 3 };
    f.render_widget(Clear, rect);
    f.render_widget(
      Paragraph::new(toast.text.clone())
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(color))),
      rect,
    );
    y += 3;
  }
}

fn describe(action: &BulkAction) -> &'static str {
  match action {
    BulkAction::Delete => "Eliminar",
    BulkAction::ToggleStatus => "Cambiar estado activo de",
    BulkAction::ChangeCategory(_) => "Cambiar categoría de",
    BulkAction::ChangeEstado(_) => "Cambiar estado de",
    BulkAction::Assign(None) => "Quitar asignación de",
    BulkAction::Assign(Some(_)) => "Asignar",
  }
}

pub fn draw_confirm(f: &mut Frame, area: Rect, action: &BulkAction, count: usize) {
  let rect = centered(area, 50, 5);
  f.render_widget(Clear, rect);
  let text = vec![
    Line::from(format!("{} {count} registro(s)?", describe(action))),
    Line::from(Span::styled(
      "y/Enter confirmar   n/Esc cancelar",
      Style::default().fg(Color::DarkGray),
    )),
  ];
  f.render_widget(
    Paragraph::new(text).wrap(Wrap { trim: true }).block(
      Block::default()
        .title(" Confirmar ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow)),
    ),
    rect,
  );
}

pub fn draw_picker(f: &mut Frame, area: Rect, picker: &Picker) {
  let title = match picker.kind {
    PickKind::Estado => " Nuevo estado ",
    PickKind::Category => " Nueva categoría ",
    PickKind::Assignee => " Asignar a ",
  };
  let height = (picker.options.len() as u16 + 2).min(area.height.saturating_sub(2));
  let rect = centered(area, 40, height);
  f.render_widget(Clear, rect);

  let items: Vec<ListItem> = picker
    .options
    .iter()
    .map(|(_, label)| ListItem::new(label.clone()))
    .collect();
  let mut state = ListState::default();
  state.select(Some(picker.cursor));
  f.render_stateful_widget(
    List::new(items)
      .block(Block::default().title(title).borders(Borders::ALL))
      .highlight_style(
        Style::default()
          .bg(Color::Blue)
          .fg(Color::White)
          .add_modifier(Modifier::BOLD),
      ),
    rect,
    &mut state,
  );
}
