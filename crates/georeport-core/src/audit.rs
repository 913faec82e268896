//! Audit rows, the parameters of the two audit RPCs, and the client-side
//! filter applied to the page they return.
//!
//! Both audit tables are append-only. The backend fills them on every write;
//! clients only read them.
//!
//! Filtering is deliberately page-local: [`AuditFilter`] scans the rows an RPC
//! already returned, so a search only ever sees the current page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Page size when the caller does not ask for one.
pub const DEFAULT_AUDIT_LIMIT: u32 = 50;

/// The largest page the RPCs will return. A requested limit of `0` means
/// "everything" and is sent as this value.
pub const MAX_AUDIT_LIMIT: u32 = 1000;

// ─── Enums ───────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActivityType {
  Login,
  Logout,
  Create,
  Read,
  Update,
  Delete,
  Export,
  Import,
  SecurityEvent,
  BulkAction,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::EnumIter,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum OperationType {
  Insert,
  Update,
  Delete,
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// One entry of the user activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
  pub id:            Uuid,
  pub user_id:       Option<Uuid>,
  pub user_email:    Option<String>,
  pub activity_type: ActivityType,
  pub tabla_nombre:  Option<String>,
  pub registro_id:   Option<Uuid>,
  pub descripcion:   String,
  pub metadatos:     serde_json::Value,
  pub ip_address:    Option<String>,
  pub created_at:    DateTime<Utc>,
}

/// One row-level change captured by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
  pub id:                 Uuid,
  pub tabla_nombre:       String,
  pub registro_id:        Uuid,
  pub operation_type:     OperationType,
  pub user_id:            Option<Uuid>,
  pub user_email:         Option<String>,
  pub valores_anteriores: Option<serde_json::Value>,
  pub valores_nuevos:     Option<serde_json::Value>,
  /// Top-level keys whose value differs between the two snapshots.
  pub campos_modificados: Vec<String>,
  pub created_at:         DateTime<Utc>,
}

/// Input to `registrar_actividad`.
#[derive(Debug, Clone)]
pub struct NewActivity {
  pub user_id:       Option<Uuid>,
  pub activity_type: ActivityType,
  pub tabla_nombre:  Option<String>,
  pub registro_id:   Option<Uuid>,
  pub descripcion:   String,
  pub metadatos:     serde_json::Value,
  pub ip_address:    Option<String>,
}

impl NewActivity {
  pub fn new(activity_type: ActivityType, descripcion: impl Into<String>) -> Self {
    Self {
      user_id: None,
      activity_type,
      tabla_nombre: None,
      registro_id: None,
      descripcion: descripcion.into(),
      metadatos: serde_json::Value::Object(Default::default()),
      ip_address: None,
    }
  }

  pub fn by(mut self, user_id: Option<Uuid>) -> Self {
    self.user_id = user_id;
    self
  }

  pub fn on(mut self, tabla: impl Into<String>, registro_id: Option<Uuid>) -> Self {
    self.tabla_nombre = Some(tabla.into());
    self.registro_id = registro_id;
    self
  }

  pub fn with_metadata(mut self, metadatos: serde_json::Value) -> Self {
    self.metadatos = metadatos;
    self
  }

  pub fn from_ip(mut self, ip: Option<String>) -> Self {
    self.ip_address = ip;
    self
  }
}

// ─── RPC parameters ──────────────────────────────────────────────────────────

/// Parameters shared by `get_user_activities` and `get_change_history`.
///
/// `get_user_activities` only looks at `user_id`, `limit`, and `offset`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditQuery {
  pub tabla_nombre: Option<String>,
  pub registro_id:  Option<Uuid>,
  pub user_id:      Option<Uuid>,
  /// `None` → [`DEFAULT_AUDIT_LIMIT`]; `Some(0)` → [`MAX_AUDIT_LIMIT`].
  pub limit:        Option<u32>,
  #[serde(default)]
  pub offset:       u32,
}

impl AuditQuery {
  /// The `p_limit` actually sent to the RPC.
  pub fn request_limit(&self) -> u32 {
    match self.limit {
      None => DEFAULT_AUDIT_LIMIT,
      Some(0) => MAX_AUDIT_LIMIT,
      Some(n) => n.min(MAX_AUDIT_LIMIT),
    }
  }
}

// ─── Client-side filter ──────────────────────────────────────────────────────

/// Secondary filters applied to an already-fetched page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditFilter {
  /// Case-insensitive substring over descriptions, table names, and the JSON
  /// payloads.
  pub search:         Option<String>,
  pub activity_type:  Option<ActivityType>,
  pub operation_type: Option<OperationType>,
  /// Case-insensitive substring of the acting user's email.
  pub user_email:     Option<String>,
}

/// A row [`AuditFilter`] can inspect. A filter dimension the row does not
/// carry (an operation type on an activity row) never excludes it.
pub trait AuditRow {
  fn haystack(&self) -> String;
  fn user_email(&self) -> Option<&str>;
  fn activity_type(&self) -> Option<ActivityType> { None }
  fn operation_type(&self) -> Option<OperationType> { None }
}

impl AuditRow for ActivityRecord {
  fn haystack(&self) -> String {
    format!(
      "{} {} {} {}",
      self.descripcion,
      self.tabla_nombre.as_deref().unwrap_or_default(),
      self.activity_type,
      self.metadatos
    )
  }

  fn user_email(&self) -> Option<&str> { self.user_email.as_deref() }

  fn activity_type(&self) -> Option<ActivityType> { Some(self.activity_type) }
}

impl AuditRow for ChangeRecord {
  fn haystack(&self) -> String {
    let before = self
      .valores_anteriores
      .as_ref()
      .map(ToString::to_string)
      .unwrap_or_default();
    let after = self
      .valores_nuevos
      .as_ref()
      .map(ToString::to_string)
      .unwrap_or_default();
    format!(
      "{} {} {} {before} {after}",
      self.tabla_nombre,
      self.operation_type,
      self.campos_modificados.join(" ")
    )
  }

  fn user_email(&self) -> Option<&str> { self.user_email.as_deref() }

  fn operation_type(&self) -> Option<OperationType> { Some(self.operation_type) }
}

impl AuditFilter {
  pub fn is_empty(&self) -> bool {
    self.search.as_deref().is_none_or(str::is_empty)
      && self.activity_type.is_none()
      && self.operation_type.is_none()
      && self.user_email.as_deref().is_none_or(str::is_empty)
  }

  pub fn matches<R: AuditRow>(&self, row: &R) -> bool {
    if let Some(want) = self.activity_type
      && row.activity_type().is_some_and(|t| t != want)
    {
      return false;
    }
    if let Some(want) = self.operation_type
      && row.operation_type().is_some_and(|t| t != want)
    {
      return false;
    }
    if let Some(email) = self.user_email.as_deref().filter(|e| !e.is_empty()) {
      let needle = email.to_lowercase();
      let found = row
        .user_email()
        .is_some_and(|e| e.to_lowercase().contains(&needle));
      if !found {
        return false;
      }
    }
    if let Some(text) = self.search.as_deref().filter(|t| !t.is_empty()) {
      let needle = text.to_lowercase();
      if !row.haystack().to_lowercase().contains(&needle) {
        return false;
      }
    }
    true
  }

  /// Keep the rows of `page` that match, preserving order.
  pub fn apply<R: AuditRow + Clone>(&self, page: &[R]) -> Vec<R> {
    page.iter().filter(|r| self.matches(*r)).cloned().collect()
  }
}

/// Top-level keys whose values differ between two JSON object snapshots.
/// Keys are returned sorted.
pub fn changed_fields(
  before: Option<&serde_json::Value>,
  after: Option<&serde_json::Value>,
) -> Vec<String> {
  use std::collections::BTreeSet;

  let empty = serde_json::Map::new();
  let b = before.and_then(|v| v.as_object()).unwrap_or(&empty);
  let a = after.and_then(|v| v.as_object()).unwrap_or(&empty);

  let keys: BTreeSet<&String> = b.keys().chain(a.keys()).collect();
  keys
    .into_iter()
    .filter(|k| b.get(*k) != a.get(*k))
    .cloned()
    .collect()
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn activity(kind: ActivityType, desc: &str, email: Option<&str>) -> ActivityRecord {
    ActivityRecord {
      id:            Uuid::new_v4(),
      user_id:       None,
      user_email:    email.map(str::to_owned),
      activity_type: kind,
      tabla_nombre:  Some("reportes".into()),
      registro_id:   None,
      descripcion:   desc.into(),
      metadatos:     json!({"campo": "valor"}),
      ip_address:    None,
      created_at:    Utc::now(),
    }
  }

  #[test]
  fn zero_limit_becomes_sentinel() {
    let q = AuditQuery { limit: Some(0), ..Default::default() };
    assert_eq!(q.request_limit(), 1000);
  }

  #[test]
  fn missing_limit_defaults_to_fifty() {
    assert_eq!(AuditQuery::default().request_limit(), 50);
  }

  #[test]
  fn limit_is_capped() {
    let q = AuditQuery { limit: Some(5000), ..Default::default() };
    assert_eq!(q.request_limit(), MAX_AUDIT_LIMIT);
    let q = AuditQuery { limit: Some(10), ..Default::default() };
    assert_eq!(q.request_limit(), 10);
  }

  #[test]
  fn activity_type_round_trips() {
    assert_eq!(ActivityType::SecurityEvent.to_string(), "security_event");
    assert_eq!(
      serde_json::to_value(OperationType::Insert).unwrap(),
      json!("INSERT")
    );
    assert_eq!("DELETE".parse::<OperationType>().unwrap(), OperationType::Delete);
  }

  #[test]
  fn empty_filter_keeps_everything() {
    let page = vec![
      activity(ActivityType::Login, "a", None),
      activity(ActivityType::Create, "b", None),
    ];
    let f = AuditFilter::default();
    assert!(f.is_empty());
    assert_eq!(f.apply(&page).len(), 2);
  }

  #[test]
  fn filters_by_type_email_and_text() {
    let page = vec![
      activity(ActivityType::Login, "Inicio de sesión", Some("Ana@Muni.go")),
      activity(ActivityType::Create, "Reporte creado", Some("luis@muni.go")),
      activity(ActivityType::Create, "Categoría creada", Some("ana@muni.go")),
    ];

    let by_type = AuditFilter {
      activity_type: Some(ActivityType::Create),
      ..Default::default()
    };
    assert_eq!(by_type.apply(&page).len(), 2);

    let by_email = AuditFilter {
      user_email: Some("ANA@".into()),
      ..Default::default()
    };
    assert_eq!(by_email.apply(&page).len(), 2);

    let combined = AuditFilter {
      activity_type: Some(ActivityType::Create),
      user_email:    Some("ana".into()),
      search:        Some("categoría".into()),
      ..Default::default()
    };
    let hits = combined.apply(&page);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].descripcion, "Categoría creada");
  }

  #[test]
  fn search_reaches_json_payload() {
    let page = vec![activity(ActivityType::Update, "x", None)];
    let f = AuditFilter { search: Some("VALOR".into()), ..Default::default() };
    assert_eq!(f.apply(&page).len(), 1);
  }

  #[test]
  fn operation_filter_ignored_for_activities() {
    let page = vec![activity(ActivityType::Update, "x", None)];
    let f = AuditFilter {
      operation_type: Some(OperationType::Delete),
      ..Default::default()
    };
    assert_eq!(f.apply(&page).len(), 1);
  }

  #[test]
  fn changed_fields_diffs_top_level_keys() {
    let before = json!({"titulo": "a", "estado_id": "1", "activo": true});
    let after = json!({"titulo": "a", "estado_id": "2", "activo": false});
    assert_eq!(
      changed_fields(Some(&before), Some(&after)),
      vec!["activo".to_string(), "estado_id".to_string()]
    );
    assert_eq!(changed_fields(None, Some(&after)).len(), 3);
  }
}
