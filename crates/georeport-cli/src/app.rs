//! Application state machine and event dispatcher.

use std::{
  collections::VecDeque,
  sync::Arc,
  time::{Duration, Instant},
};

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use fuzzy_matcher::{FuzzyMatcher, skim::SkimMatcherV2};
use georeport_core::{
  audit::{ActivityRecord, AuditFilter, AuditQuery},
  bulk::{BulkAction, BulkFlow, BulkReport, ItemOutcome},
  entity::{
    Category, CategoryFields, EntityKind, Estado, EstadoFields, Reporte, ReporteFields, User,
    UserFields,
  },
  notification::{ChangeKind, Notification, NotificationEvent},
  selection::{Selectable, SelectionSet},
};
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::client::{ApiClient, ApiFailure};

/// How long a toast stays on screen.
pub const TOAST_TTL: Duration = Duration::from_secs(5);

/// Activity rows fetched per page.
pub const ACTIVITY_PAGE: u32 = 100;

// ─── Tabs ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumIter)]
pub enum Tab {
  Reportes,
  Categories,
  Estados,
  Users,
  Notifications,
  Activity,
}

impl Tab {
  pub fn title(self) -> &'static str {
    match self {
      Tab::Reportes => "Reportes",
      Tab::Categories => "Categorías",
      Tab::Estados => "Estados",
      Tab::Users => "Usuarios",
      Tab::Notifications => "Notificaciones",
      Tab::Activity => "Actividad",
    }
  }

  /// The table behind the tab, for tabs that support bulk actions.
  pub fn kind(self) -> Option<EntityKind> {
    match self {
      Tab::Reportes => Some(EntityKind::Reporte),
      Tab::Categories => Some(EntityKind::Category),
      Tab::Estados => Some(EntityKind::Estado),
      Tab::Users => Some(EntityKind::User),
      Tab::Notifications | Tab::Activity => None,
    }
  }

  fn dataset(self) -> Option<&'static str> {
    match self {
      Tab::Notifications => None,
      Tab::Activity => Some("activities"),
      other => other.kind().map(EntityKind::table),
    }
  }

  fn step(self, forward: bool) -> Tab {
    let all: Vec<Tab> = Tab::iter().collect();
    let i = all.iter().position(|t| *t == self).unwrap_or(0);
    let n = all.len();
    all[if forward { (i + 1) % n } else { (i + n - 1) % n }]
  }
}

// ─── Rows ─────────────────────────────────────────────────────────────────────

/// A display row: whatever the tab holds, flattened for the list and detail
/// panes.
#[derive(Debug, Clone)]
pub struct Row {
  pub id:       Uuid,
  pub title:    String,
  pub subtitle: String,
  /// Rendered dim when false (inactive record, read notification).
  pub activo:   bool,
  /// `#rrggbb` swatch, when the record has one.
  pub color:    Option<String>,
  pub fields:   Vec<(&'static str, String)>,
}

impl Selectable for Row {
  fn selection_id(&self) -> Uuid { self.id }
}

fn or_dash(value: Option<&str>) -> String {
  value.filter(|s| !s.is_empty()).unwrap_or("—").to_string()
}

// ─── Overlays ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickKind {
  Estado,
  Category,
  Assignee,
}

/// Target chooser for reporte-only bulk actions.
#[derive(Debug, Clone)]
pub struct Picker {
  pub kind:    PickKind,
  pub options: Vec<(Option<Uuid>, String)>,
  pub cursor:  usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
  Info,
  Warn,
  Error,
}

#[derive(Debug, Clone)]
pub struct Toast {
  pub level: ToastLevel,
  pub text:  String,
  pub at:    Instant,
}

// ─── App ──────────────────────────────────────────────────────────────────────

/// Top-level application state.
pub struct App {
  pub tab: Tab,

  /// The logged-in user, once `/auth/login` succeeded.
  pub me: Option<User>,

  pub reportes:      Vec<Reporte>,
  pub categories:    Vec<Category>,
  pub estados:       Vec<Estado>,
  pub users:         Vec<User>,
  pub notifications: Vec<Notification>,
  pub activities:    Vec<ActivityRecord>,

  pub activity_offset:  u32,
  /// Rows the server returned for the current activity page before its
  /// filter ran; a full page means there may be another.
  pub activity_fetched: usize,

  /// Current fuzzy-filter string (only active when `filter_active`).
  pub filter:        String,
  pub filter_active: bool,

  /// Cursor position within the *filtered* list.
  pub list_cursor: usize,

  pub selection: SelectionSet,
  pub bulk:      BulkFlow,
  pub picker:    Option<Picker>,

  pub toasts: VecDeque<Toast>,
  /// Sticky warning, e.g. rejected or throttled credentials.
  pub banner: Option<String>,

  /// One-line status message shown in the status bar.
  pub status_msg: String,

  pub client: Arc<ApiClient>,
}

impl App {
  pub fn new(client: ApiClient) -> Self {
    Self {
      tab: Tab::Reportes,
      me: None,
      reportes: Vec::new(),
      categories: Vec::new(),
      estados: Vec::new(),
      users: Vec::new(),
      notifications: Vec::new(),
      activities: Vec::new(),
      activity_offset: 0,
      activity_fetched: 0,
      filter: String::new(),
      filter_active: false,
      list_cursor: 0,
      selection: SelectionSet::new(),
      bulk: BulkFlow::Idle,
      picker: None,
      toasts: VecDeque::new(),
      banner: None,
      status_msg: String::new(),
      client: Arc::new(client),
    }
  }

  // ── Feedback ──────────────────────────────────────────────────────────────

  pub fn toast(&mut self, level: ToastLevel, text: impl Into<String>) {
    self.toasts.push_back(Toast { level, text: text.into(), at: Instant::now() });
    while self.toasts.len() > 4 {
      self.toasts.pop_front();
    }
  }

  pub fn expire_toasts(&mut self, now: Instant) {
    self.toasts.retain(|t| now.duration_since(t.at) < TOAST_TTL);
  }

  /// Backend errors are logged and shown, never retried.
  pub fn report_error(&mut self, e: anyhow::Error) {
    tracing::warn!(error = %format!("{e:#}"), "request failed");
    if let Some(failure) = e.downcast_ref::<ApiFailure>()
      && failure.is_auth()
    {
      self.banner = Some(failure.message.clone());
    }
    self.toast(ToastLevel::Error, format!("{e:#}"));
  }

  // ── Data loading ──────────────────────────────────────────────────────────

  /// Log in and fetch every tab.
  pub async fn load_all(&mut self) -> anyhow::Result<()> {
    self.status_msg = "Cargando…".into();
    let me = self.client.login().await?;
    self.status_msg = format!("Sesión de {}", me.fields.email);
    self.me = Some(me);
    for tab in Tab::iter() {
      if let Err(e) = self.fetch(tab).await {
        self.report_error(e);
      }
    }
    Ok(())
  }

  async fn fetch(&mut self, tab: Tab) -> anyhow::Result<()> {
    match tab {
      Tab::Reportes => self.reportes = self.client.list::<ReporteFields>().await?,
      Tab::Categories => self.categories = self.client.list::<CategoryFields>().await?,
      Tab::Estados => {
        let mut estados = self.client.list::<EstadoFields>().await?;
        estados.sort_by_key(|e| e.fields.orden);
        self.estados = estados;
      }
      Tab::Users => self.users = self.client.list::<UserFields>().await?,
      Tab::Notifications => self.notifications = self.client.notifications().await?,
      Tab::Activity => {
        let query = AuditQuery {
          limit: Some(ACTIVITY_PAGE),
          offset: self.activity_offset,
          ..AuditQuery::default()
        };
        let filter = AuditFilter {
          search: (!self.filter.is_empty()).then(|| self.filter.clone()),
          ..AuditFilter::default()
        };
        let page = self.client.activities(&query, &filter).await?;
        self.activity_fetched = page.fetched;
        self.activities = page.rows;
      }
    }
    Ok(())
  }

  async fn reload(&mut self) {
    if let Err(e) = self.fetch(self.tab).await {
      self.report_error(e);
    }
    self.clamp_cursor();
  }

  fn clamp_cursor(&mut self) {
    let len = self.visible_rows().len();
    if self.list_cursor >= len {
      self.list_cursor = len.saturating_sub(1);
    }
  }

  // ── Realtime ──────────────────────────────────────────────────────────────

  /// Apply one realtime change to the notification list.
  pub fn on_notification_event(&mut self, event: NotificationEvent) {
    match event.event {
      ChangeKind::Insert => {
        if let Some(n) = event.new
          && !self.notifications.iter().any(|x| x.id == n.id)
        {
          self.toast(ToastLevel::Info, format!("{}: {}", n.title, n.message));
          self.notifications.insert(0, n);
        }
      }
      ChangeKind::Update => {
        if let Some(n) = event.new
          && let Some(slot) = self.notifications.iter_mut().find(|x| x.id == n.id)
        {
          *slot = n;
        }
      }
      ChangeKind::Delete => {
        if let Some(old) = event.old {
          self.notifications.retain(|x| x.id != old.id);
          if self.tab == Tab::Notifications {
            self.clamp_cursor();
          }
        }
      }
    }
  }

  pub fn unread_count(&self) -> usize { self.notifications.iter().filter(|n| !n.read).count() }

  // ── Rows ──────────────────────────────────────────────────────────────────

  fn category_name(&self, id: Uuid) -> String {
    self
      .categories
      .iter()
      .find(|c| c.id == id)
      .map(|c| c.fields.nombre.clone())
      .unwrap_or_else(|| id.to_string())
  }

  fn estado_name(&self, id: Uuid) -> String {
    self
      .estados
      .iter()
      .find(|e| e.id == id)
      .map(|e| e.fields.nombre.clone())
      .unwrap_or_else(|| id.to_string())
  }

  fn user_email(&self, id: Uuid) -> String {
    self
      .users
      .iter()
      .find(|u| u.id == id)
      .map(|u| u.fields.email.clone())
      .unwrap_or_else(|| id.to_string())
  }

  /// Every row of the current tab.
  pub fn rows(&self) -> Vec<Row> {
    match self.tab {
      Tab::Reportes => self
        .reportes
        .iter()
        .map(|r| {
          let f = &r.fields;
          let location = match (f.latitud, f.longitud) {
            (Some(lat), Some(lon)) => format!("{lat:.5}, {lon:.5}"),
            _ => "—".into(),
          };
          Row {
            id:       r.id,
            title:    f.titulo.clone(),
            subtitle: format!(
              "{} · {}",
              self.category_name(f.category_id),
              self.estado_name(f.estado_id)
            ),
            activo:   r.activo,
            color:    self
              .categories
              .iter()
              .find(|c| c.id == f.category_id)
              .and_then(|c| c.fields.color.clone()),
            fields:   vec![
              ("descripción", or_dash(f.descripcion.as_deref())),
              ("categoría", self.category_name(f.category_id)),
              ("estado", self.estado_name(f.estado_id)),
              ("autor", self.user_email(f.user_id)),
              (
                "asignado a",
                f.assigned_to.map(|id| self.user_email(id)).unwrap_or_else(|| "—".into()),
              ),
              ("ubicación", location),
              ("dirección", or_dash(f.direccion.as_deref())),
              ("imágenes", f.imagenes.len().to_string()),
              ("creado", r.created_at.format("%Y-%m-%d %H:%M").to_string()),
            ],
          }
        })
        .collect(),
      Tab::Categories => self
        .categories
        .iter()
        .map(|c| Row {
          id:       c.id,
          title:    c.fields.nombre.clone(),
          subtitle: c.fields.descripcion.clone().unwrap_or_default(),
          activo:   c.activo,
          color:    c.fields.color.clone(),
          fields:   vec![
            ("descripción", or_dash(c.fields.descripcion.as_deref())),
            ("color", or_dash(c.fields.color.as_deref())),
            ("icono", or_dash(c.fields.icono.as_deref())),
          ],
        })
        .collect(),
      Tab::Estados => self
        .estados
        .iter()
        .map(|e| Row {
          id:       e.id,
          title:    format!("{}. {}", e.fields.orden, e.fields.nombre),
          subtitle: e.fields.descripcion.clone().unwrap_or_default(),
          activo:   e.activo,
          color:    e.fields.color.clone(),
          fields:   vec![
            ("descripción", or_dash(e.fields.descripcion.as_deref())),
            ("color", or_dash(e.fields.color.as_deref())),
            ("orden", e.fields.orden.to_string()),
          ],
        })
        .collect(),
      Tab::Users => self
        .users
        .iter()
        .map(|u| {
          let f = &u.fields;
          let name = match &f.apellido {
            Some(a) => format!("{} {a}", f.nombre),
            None => f.nombre.clone(),
          };
          Row {
            id:       u.id,
            title:    f.email.clone(),
            subtitle: name.clone(),
            activo:   u.activo,
            color:    None,
            fields:   vec![
              ("nombre", name),
              ("teléfono", or_dash(f.telefono.as_deref())),
              ("rol", f.role_id.map(|r| r.to_string()).unwrap_or_else(|| "—".into())),
            ],
          }
        })
        .collect(),
      Tab::Notifications => self
        .notifications
        .iter()
        .map(|n| Row {
          id:       n.id,
          title:    n.title.clone(),
          subtitle: n.message.clone(),
          activo:   !n.read,
          color:    None,
          fields:   vec![
            ("tipo", n.kind.to_string()),
            ("mensaje", n.message.clone()),
            ("recibida", n.created_at.format("%Y-%m-%d %H:%M").to_string()),
            ("datos", n.data.to_string()),
          ],
        })
        .collect(),
      Tab::Activity => self
        .activities
        .iter()
        .map(|a| Row {
          id:       a.id,
          title:    a.descripcion.clone(),
          subtitle: format!(
            "{} {} {}",
            a.created_at.format("%m-%d %H:%M"),
            a.activity_type,
            a.user_email.as_deref().unwrap_or("sistema")
          ),
          activo:   true,
          color:    None,
          fields:   vec![
            ("tipo", a.activity_type.to_string()),
            ("usuario", or_dash(a.user_email.as_deref())),
            ("tabla", or_dash(a.tabla_nombre.as_deref())),
            (
              "registro",
              a.registro_id.map(|r| r.to_string()).unwrap_or_else(|| "—".into()),
            ),
            ("ip", or_dash(a.ip_address.as_deref())),
            ("metadatos", a.metadatos.to_string()),
          ],
        })
        .collect(),
    }
  }

  /// Rows that match the current filter. The activity tab filters on the
  /// server, so its rows are never narrowed here.
  pub fn visible_rows(&self) -> Vec<Row> {
    let rows = self.rows();
    if self.filter.is_empty() || self.tab == Tab::Activity {
      return rows;
    }
    let matcher = SkimMatcherV2::default();
    rows
      .into_iter()
      .filter(|r| {
        matcher.fuzzy_match(&r.title, &self.filter).is_some()
          || matcher.fuzzy_match(&r.subtitle, &self.filter).is_some()
      })
      .collect()
  }

  pub fn cursor_row(&self) -> Option<Row> { self.visible_rows().into_iter().nth(self.list_cursor) }

  /// e.g. `3 seleccionados (2 ocultos)`; empty when nothing is selected.
  pub fn selection_summary(&self) -> String {
    if self.selection.is_empty() {
      return String::new();
    }
    let visible = self.visible_rows();
    let hidden = self.selection.hidden_count(&visible);
    let count = self.selection.selected_count();
    if hidden > 0 {
      format!("{count} seleccionados ({hidden} ocultos)")
    } else {
      format!("{count} seleccionados")
    }
  }

  /// Ids the next action applies to: the visible selected rows, or the row
  /// under the cursor when nothing visible is selected.
  fn targets(&self) -> Vec<Uuid> {
    let visible = self.visible_rows();
    let selected: Vec<Uuid> = self
      .selection
      .selected_data(&visible)
      .into_iter()
      .map(|r| r.id)
      .collect();
    if !selected.is_empty() {
      return selected;
    }
    visible.get(self.list_cursor).map(|r| vec![r.id]).unwrap_or_default()
  }

  // ── Key handling ──────────────────────────────────────────────────────────

  /// Process a key event. Returns `true` to continue, `false` to quit.
  pub async fn handle_key(&mut self, key: KeyEvent) -> anyhow::Result<bool> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
      return Ok(false);
    }

    if matches!(self.bulk, BulkFlow::Confirming { .. }) {
      self.handle_confirm_key(key).await;
      return Ok(true);
    }
    if self.picker.is_some() {
      self.handle_picker_key(key);
      return Ok(true);
    }
    if self.filter_active {
      self.handle_filter_key(key).await;
      return Ok(true);
    }
    self.handle_list_key(key).await
  }

  async fn handle_confirm_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Char('y') | KeyCode::Enter => self.run_confirmed().await,
      KeyCode::Char('n') | KeyCode::Esc => {
        self.bulk.cancel();
        self.status_msg = "Acción cancelada".into();
      }
      _ => {}
    }
  }

  fn handle_picker_key(&mut self, key: KeyEvent) {
    let Some(picker) = self.picker.as_mut() else {
      return;
    };
    match key.code {
      KeyCode::Esc => self.picker = None,
      KeyCode::Down | KeyCode::Char('j') => {
        if picker.cursor + 1 < picker.options.len() {
          picker.cursor += 1;
        }
      }
      KeyCode::Up | KeyCode::Char('k') => picker.cursor = picker.cursor.saturating_sub(1),
      KeyCode::Enter => {
        let kind = picker.kind;
        let choice = picker.options.get(picker.cursor).map(|(id, _)| *id);
        self.picker = None;
        let action = match (kind, choice) {
          (PickKind::Estado, Some(Some(id))) => BulkAction::ChangeEstado(id),
          (PickKind::Category, Some(Some(id))) => BulkAction::ChangeCategory(id),
          (PickKind::Assignee, Some(target)) => BulkAction::Assign(target),
          _ => return,
        };
        self.request_bulk(action);
      }
      _ => {}
    }
  }

  async fn handle_filter_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Esc => {
        self.filter_active = false;
        self.filter.clear();
        self.list_cursor = 0;
        if self.tab == Tab::Activity {
          self.reload().await;
        }
      }
      KeyCode::Enter => {
        self.filter_active = false;
        self.list_cursor = 0;
        if self.tab == Tab::Activity {
          self.activity_offset = 0;
          self.reload().await;
        }
      }
      KeyCode::Backspace => {
        self.filter.pop();
        self.list_cursor = 0;
      }
      KeyCode::Char(c) => {
        self.filter.push(c);
        self.list_cursor = 0;
      }
      _ => {}
    }
  }

  async fn handle_list_key(&mut self, key: KeyEvent) -> anyhow::Result<bool> {
    match key.code {
      KeyCode::Char('q') => return Ok(false),

      // Tabs
      KeyCode::Tab => self.switch_tab(self.tab.step(true)),
      KeyCode::BackTab => self.switch_tab(self.tab.step(false)),
      KeyCode::Char(c @ '1'..='6') => {
        let idx = c as usize - '1' as usize;
        if let Some(tab) = Tab::iter().nth(idx) {
          self.switch_tab(tab);
        }
      }

      // Navigation
      KeyCode::Down | KeyCode::Char('j') => {
        let len = self.visible_rows().len();
        if len > 0 && self.list_cursor + 1 < len {
          self.list_cursor += 1;
        }
      }
      KeyCode::Up | KeyCode::Char('k') => self.list_cursor = self.list_cursor.saturating_sub(1),

      KeyCode::Char('/') => {
        self.filter_active = true;
        self.filter.clear();
        self.list_cursor = 0;
      }
      KeyCode::Char('g') => self.reload().await,

      // Selection
      KeyCode::Char(' ') if self.tab != Tab::Activity => {
        if let Some(row) = self.cursor_row() {
          self.selection.toggle(row.id);
        }
      }
      KeyCode::Char('a') if self.tab != Tab::Activity => {
        let visible = self.visible_rows();
        self.selection.select_all(&visible);
      }
      KeyCode::Char('x') => {
        let visible = self.visible_rows();
        let dropped = self.selection.reconcile(&visible);
        self.status_msg = format!("{dropped} selecciones ocultas descartadas");
      }
      KeyCode::Esc => {
        self.selection.clear();
        if !self.filter.is_empty() {
          self.filter.clear();
          self.list_cursor = 0;
          if self.tab == Tab::Activity {
            self.reload().await;
          }
        }
      }

      KeyCode::Char('X') => self.export().await,

      _ => match self.tab {
        Tab::Notifications => self.handle_notification_key(key).await,
        Tab::Activity => self.handle_activity_key(key).await,
        _ => self.handle_record_key(key),
      },
    }
    Ok(true)
  }

  fn handle_record_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Char('d') => self.request_bulk(BulkAction::Delete),
      KeyCode::Char('t') => self.request_bulk(BulkAction::ToggleStatus),
      KeyCode::Char('e') if self.tab == Tab::Reportes => self.open_picker(PickKind::Estado),
      KeyCode::Char('c') if self.tab == Tab::Reportes => self.open_picker(PickKind::Category),
      KeyCode::Char('A') if self.tab == Tab::Reportes => self.open_picker(PickKind::Assignee),
      _ => {}
    }
  }

  async fn handle_notification_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Char('r') => {
        let ids = self.targets();
        let mut failed = 0;
        for id in ids {
          let read = !self.notifications.iter().any(|n| n.id == id && n.read);
          match self.client.set_read(id, read).await {
            Ok(n) => self.on_notification_event(NotificationEvent {
              event:   ChangeKind::Update,
              user_id: n.user_id,
              new:     Some(n),
              old:     None,
            }),
            Err(e) => {
              failed += 1;
              tracing::warn!(%id, error = %e, "could not update notification");
            }
          }
        }
        if failed > 0 {
          self.toast(ToastLevel::Warn, format!("{failed} notificaciones no se actualizaron"));
        }
        self.selection.clear();
      }
      KeyCode::Char('R') => match self.client.mark_all_read().await {
        Ok(n) => {
          self.status_msg = format!("{n} marcadas como leídas");
          self.reload().await;
        }
        Err(e) => self.report_error(e),
      },
      KeyCode::Char('d') => {
        let ids = self.targets();
        let total = ids.len();
        let mut removed = 0;
        for id in ids {
          match self.client.delete_notification(id).await {
            Ok(()) => {
              removed += 1;
              self.notifications.retain(|n| n.id != id);
            }
            Err(e) => tracing::warn!(%id, error = %e, "could not delete notification"),
          }
        }
        self.status_msg = format!("{removed}/{total} notificaciones eliminadas");
        self.selection.clear();
        self.clamp_cursor();
      }
      _ => {}
    }
  }

  async fn handle_activity_key(&mut self, key: KeyEvent) {
    match key.code {
      KeyCode::Char(']') | KeyCode::PageDown => {
        if self.activity_fetched as u32 >= ACTIVITY_PAGE {
          self.activity_offset += ACTIVITY_PAGE;
          self.list_cursor = 0;
          self.reload().await;
        }
      }
      KeyCode::Char('[') | KeyCode::PageUp => {
        if self.activity_offset > 0 {
          self.activity_offset = self.activity_offset.saturating_sub(ACTIVITY_PAGE);
          self.list_cursor = 0;
          self.reload().await;
        }
      }
      _ => {}
    }
  }

  fn switch_tab(&mut self, tab: Tab) {
    if tab == self.tab {
      return;
    }
    self.tab = tab;
    self.selection.clear();
    self.filter.clear();
    self.list_cursor = 0;
  }

  // ── Bulk actions ──────────────────────────────────────────────────────────

  fn open_picker(&mut self, kind: PickKind) {
    let options: Vec<(Option<Uuid>, String)> = match kind {
      PickKind::Estado => self
        .estados
        .iter()
        .filter(|e| e.activo)
        .map(|e| (Some(e.id), e.fields.nombre.clone()))
        .collect(),
      PickKind::Category => self
        .categories
        .iter()
        .filter(|c| c.activo)
        .map(|c| (Some(c.id), c.fields.nombre.clone()))
        .collect(),
      PickKind::Assignee => std::iter::once((None, "Sin asignar".to_string()))
        .chain(
          self
            .users
            .iter()
            .filter(|u| u.activo)
            .map(|u| (Some(u.id), u.fields.email.clone())),
        )
        .collect(),
    };
    if options.is_empty() {
      self.status_msg = "No hay opciones disponibles".into();
      return;
    }
    self.picker = Some(Picker { kind, options, cursor: 0 });
  }

  fn request_bulk(&mut self, action: BulkAction) {
    let ids = self.targets();
    if !self.bulk.request(action, ids) {
      self.status_msg = "Nada seleccionado".into();
    }
  }

  async fn run_confirmed(&mut self) {
    let Some((action, ids)) = self.bulk.confirm() else {
      return;
    };
    self.status_msg = format!("Procesando {} registros…", ids.len());
    let result = match self.tab {
      Tab::Reportes => self.client.bulk::<ReporteFields>(&action, &ids).await,
      Tab::Categories => self.client.bulk::<CategoryFields>(&action, &ids).await,
      Tab::Estados => self.client.bulk::<EstadoFields>(&action, &ids).await,
      Tab::Users => self.client.bulk::<UserFields>(&action, &ids).await,
      Tab::Notifications | Tab::Activity => {
        self.bulk.finish();
        return;
      }
    };
    self.bulk.finish();
    match result {
      Ok(report) => self.show_report(&report),
      Err(e) => self.report_error(e),
    }
    self.selection.clear();
    self.reload().await;
  }

  fn show_report(&mut self, report: &BulkReport) {
    self.status_msg = report.summary();
    if let Some(first) = report.failures().next() {
      let reason = match &first.outcome {
        ItemOutcome::Failed { error } => error.as_str(),
        ItemOutcome::Succeeded => "",
      };
      self.toast(
        ToastLevel::Warn,
        format!("{} fallidos; p. ej. {}: {reason}", report.failed(), first.id),
      );
    } else {
      self.toast(ToastLevel::Info, report.summary());
    }
  }

  // ── Export ────────────────────────────────────────────────────────────────

  async fn export(&mut self) {
    let Some(dataset) = self.tab.dataset() else {
      return;
    };
    match self.client.export(dataset).await {
      Ok(csv) => {
        let path = format!("{dataset}.csv");
        match std::fs::write(&path, csv) {
          Ok(()) => self.toast(ToastLevel::Info, format!("Exportado a {path}")),
          Err(e) => self.toast(ToastLevel::Error, format!("No se pudo escribir {path}: {e}")),
        }
      }
      Err(e) => self.report_error(e),
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use georeport_core::{entity::Record, notification::NotificationType};

  use super::*;
  use crate::client::ApiConfig;

  fn app() -> App {
    App::new(
      ApiClient::new(ApiConfig {
        base_url: "http://127.0.0.1:9".into(),
        username: String::new(),
        password: String::new(),
      })
      .unwrap(),
    )
  }

  fn category(nombre: &str) -> Category {
    Record {
      id:         Uuid::new_v4(),
      fields:     CategoryFields {
        nombre:      nombre.into(),
        descripcion: None,
        color:       None,
        icono:       None,
      },
      activo:     true,
      created_at: Utc::now(),
      updated_at: Utc::now(),
      deleted_at: None,
    }
  }

  fn notification(title: &str) -> Notification {
    Notification {
      id:         Uuid::new_v4(),
      user_id:    Uuid::new_v4(),
      kind:       NotificationType::ReporteAsignado,
      title:      title.into(),
      message:    "Bache".into(),
      data:       serde_json::json!({}),
      read:       false,
      created_at: Utc::now(),
    }
  }

  #[test]
  fn hidden_selection_is_reported() {
    let mut app = app();
    app.tab = Tab::Categories;
    app.categories = vec![category("Agua"), category("Alumbrado"), category("Parques")];
    let visible = app.visible_rows();
    app.selection.select_all(&visible);
    assert_eq!(app.selection_summary(), "3 seleccionados");

    app.filter = "parq".into();
    assert_eq!(app.visible_rows().len(), 1);
    assert_eq!(app.selection_summary(), "3 seleccionados (2 ocultos)");
    assert_eq!(app.targets().len(), 1);
  }

  #[test]
  fn bulk_requires_a_target() {
    let mut app = app();
    app.tab = Tab::Categories;
    app.request_bulk(BulkAction::Delete);
    assert_eq!(app.bulk, BulkFlow::Idle);

    app.categories = vec![category("Agua")];
    app.request_bulk(BulkAction::Delete);
    assert!(matches!(app.bulk, BulkFlow::Confirming { ref ids, .. } if ids.len() == 1));
  }

  #[test]
  fn realtime_events_update_the_list() {
    let mut app = app();
    let n = notification("Reporte asignado");
    let insert = NotificationEvent {
      event:   ChangeKind::Insert,
      user_id: n.user_id,
      new:     Some(n.clone()),
      old:     None,
    };
    app.on_notification_event(insert.clone());
    app.on_notification_event(insert);
    assert_eq!(app.notifications.len(), 1);
    assert_eq!(app.toasts.len(), 1);
    assert_eq!(app.unread_count(), 1);

    let mut read = n.clone();
    read.read = true;
    app.on_notification_event(NotificationEvent {
      event:   ChangeKind::Update,
      user_id: n.user_id,
      new:     Some(read),
      old:     Some(n.clone()),
    });
    assert_eq!(app.unread_count(), 0);

    app.on_notification_event(NotificationEvent {
      event:   ChangeKind::Delete,
      user_id: n.user_id,
      new:     None,
      old:     Some(n),
    });
    assert!(app.notifications.is_empty());
  }

  #[test]
  fn toasts_expire() {
    let mut app = app();
    app.toast(ToastLevel::Info, "hola");
    app.expire_toasts(Instant::now() + TOAST_TTL);
    assert!(app.toasts.is_empty());
  }

  #[test]
  fn tabs_cycle() {
    assert_eq!(Tab::Reportes.step(false), Tab::Activity);
    assert_eq!(Tab::Activity.step(true), Tab::Reportes);
    assert_eq!(Tab::Activity.dataset(), Some("activities"));
    assert_eq!(Tab::Notifications.dataset(), None);
  }
}
