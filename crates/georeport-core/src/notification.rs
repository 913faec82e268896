//! In-app notifications and the realtime events that announce them.
//!
//! Notifications are created by the backend in response to domain events
//! (a reporte assigned, an estado changed). Clients only flip `read` or hard
//! delete them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What caused a notification. Closed set; the string form is stored.
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
pub enum NotificationType {
  ReporteCreado,
  ReporteAsignado,
  ReporteActualizado,
  EstadoCambiado,
  Comentario,
  Sistema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
  pub id:         Uuid,
  /// Recipient.
  pub user_id:    Uuid,
  #[serde(rename = "type")]
  pub kind:       NotificationType,
  pub title:      String,
  pub message:    String,
  /// Free-form context, e.g. `{"reporte_id": "..."}`.
  pub data:       serde_json::Value,
  pub read:       bool,
  pub created_at: DateTime<Utc>,
}

/// Input to [`crate::store::GeoStore::create_notification`].
#[derive(Debug, Clone)]
pub struct NewNotification {
  pub user_id: Uuid,
  pub kind:    NotificationType,
  pub title:   String,
  pub message: String,
  pub data:    serde_json::Value,
}

impl NewNotification {
  pub fn new(
    user_id: Uuid,
    kind: NotificationType,
    title: impl Into<String>,
    message: impl Into<String>,
  ) -> Self {
    Self {
      user_id,
      kind,
      title: title.into(),
      message: message.into(),
      data: serde_json::Value::Object(Default::default()),
    }
  }

  pub fn with_data(mut self, data: serde_json::Value) -> Self {
    self.data = data;
    self
  }
}

// ─── Realtime events ─────────────────────────────────────────────────────────

/// Row-change kind delivered on a realtime channel.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum ChangeKind {
  Insert,
  Update,
  Delete,
}

/// A change to one row of the notifications table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
  pub event:   ChangeKind,
  /// Owner of the row; channels filter on this.
  pub user_id: Uuid,
  /// Row after the change; `None` for deletes.
  pub new:     Option<Notification>,
  /// Row before the change; `None` for inserts.
  pub old:     Option<Notification>,
}

impl NotificationEvent {
  /// The newly inserted notification, if this event is an insert.
  pub fn inserted(&self) -> Option<&Notification> {
    match self.event {
      ChangeKind::Insert => self.new.as_ref(),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn type_serialises_snake_case() {
    assert_eq!(
      serde_json::to_value(NotificationType::EstadoCambiado).unwrap(),
      serde_json::json!("estado_cambiado")
    );
    assert_eq!(
      "reporte_asignado".parse::<NotificationType>().unwrap(),
      NotificationType::ReporteAsignado
    );
  }

  #[test]
  fn unknown_type_rejected() {
    assert!("whatever".parse::<NotificationType>().is_err());
  }

  #[test]
  fn only_inserts_report_inserted() {
    let n = Notification {
      id:         Uuid::new_v4(),
      user_id:    Uuid::new_v4(),
      kind:       NotificationType::Sistema,
      title:      "t".into(),
      message:    "m".into(),
      data:       serde_json::json!({}),
      read:       false,
      created_at: Utc::now(),
    };
    let insert = NotificationEvent {
      event:   ChangeKind::Insert,
      user_id: n.user_id,
      new:     Some(n.clone()),
      old:     None,
    };
    let update = NotificationEvent {
      event: ChangeKind::Update,
      old: Some(n.clone()),
      ..insert.clone()
    };
    assert!(insert.inserted().is_some());
    assert!(update.inserted().is_none());
  }
}
