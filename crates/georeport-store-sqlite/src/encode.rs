//! Encoding and decoding helpers between GeoReport domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so that text ordering is chronological. UUIDs are stored as hyphenated
//! lowercase strings; JSON columns as compact JSON.

use chrono::{DateTime, SecondsFormat, Utc};
use georeport_core::{
  audit::{ActivityRecord, ActivityType, ChangeRecord, OperationType},
  entity::{Entity, Record},
  notification::{Notification, NotificationType},
};
use rusqlite::Row;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// Parse a stored enum discriminant via its `FromStr` impl.
fn decode_enum<T: std::str::FromStr>(kind: &'static str, s: &str) -> Result<T> {
  s.parse().map_err(|_| {
    Error::Core(georeport_core::Error::UnknownVariant {
      kind,
      value: s.to_owned(),
    })
  })
}

// ─── Records ─────────────────────────────────────────────────────────────────

pub const RECORD_COLUMNS: &str =
  "id, fields_json, activo, created_at, updated_at, deleted_at";

/// Raw strings read directly from a record table row.
pub struct RawRecord {
  pub id:          String,
  pub fields_json: String,
  pub activo:      bool,
  pub created_at:  String,
  pub updated_at:  String,
  pub deleted_at:  Option<String>,
}

impl RawRecord {
  /// Read the columns listed in [`RECORD_COLUMNS`], starting at `offset`.
  pub fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      id:          row.get(offset)?,
      fields_json: row.get(offset + 1)?,
      activo:      row.get(offset + 2)?,
      created_at:  row.get(offset + 3)?,
      updated_at:  row.get(offset + 4)?,
      deleted_at:  row.get(offset + 5)?,
    })
  }

  pub fn is_deleted(&self) -> bool { self.deleted_at.is_some() }

  pub fn into_record<E: Entity>(self) -> Result<Record<E>> {
    Ok(Record {
      id:         decode_uuid(&self.id)?,
      fields:     serde_json::from_str(&self.fields_json)?,
      activo:     self.activo,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
      deleted_at: self.deleted_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

// ─── Notifications ───────────────────────────────────────────────────────────

pub const NOTIFICATION_COLUMNS: &str =
  "id, user_id, type, title, message, data_json, read, created_at";

pub struct RawNotification {
  pub id:         String,
  pub user_id:    String,
  pub kind:       String,
  pub title:      String,
  pub message:    String,
  pub data_json:  String,
  pub read:       bool,
  pub created_at: String,
}

impl RawNotification {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:         row.get(0)?,
      user_id:    row.get(1)?,
      kind:       row.get(2)?,
      title:      row.get(3)?,
      message:    row.get(4)?,
      data_json:  row.get(5)?,
      read:       row.get(6)?,
      created_at: row.get(7)?,
    })
  }

  pub fn into_notification(self) -> Result<Notification> {
    Ok(Notification {
      id:         decode_uuid(&self.id)?,
      user_id:    decode_uuid(&self.user_id)?,
      kind:       decode_enum::<NotificationType>("notification type", &self.kind)?,
      title:      self.title,
      message:    self.message,
      data:       serde_json::from_str(&self.data_json)?,
      read:       self.read,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

// ─── Audit rows ──────────────────────────────────────────────────────────────

/// Activity columns plus the acting user's email resolved through `users`.
pub const ACTIVITY_SELECT: &str = "
  SELECT a.id, a.user_id, json_extract(u.fields_json, '$.email'),
         a.activity_type, a.tabla_nombre, a.registro_id, a.descripcion,
         a.metadatos, a.ip_address, a.created_at
    FROM activities a
    LEFT JOIN users u ON u.id = a.user_id";

pub struct RawActivity {
  pub id:            String,
  pub user_id:       Option<String>,
  pub user_email:    Option<String>,
  pub activity_type: String,
  pub tabla_nombre:  Option<String>,
  pub registro_id:   Option<String>,
  pub descripcion:   String,
  pub metadatos:     String,
  pub ip_address:    Option<String>,
  pub created_at:    String,
}

impl RawActivity {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:            row.get(0)?,
      user_id:       row.get(1)?,
      user_email:    row.get(2)?,
      activity_type: row.get(3)?,
      tabla_nombre:  row.get(4)?,
      registro_id:   row.get(5)?,
      descripcion:   row.get(6)?,
      metadatos:     row.get(7)?,
      ip_address:    row.get(8)?,
      created_at:    row.get(9)?,
    })
  }

  pub fn into_activity(self) -> Result<ActivityRecord> {
    Ok(ActivityRecord {
      id:            decode_uuid(&self.id)?,
      user_id:       decode_opt_uuid(self.user_id)?,
      user_email:    self.user_email,
      activity_type: decode_enum::<ActivityType>("activity type", &self.activity_type)?,
      tabla_nombre:  self.tabla_nombre,
      registro_id:   decode_opt_uuid(self.registro_id)?,
      descripcion:   self.descripcion,
      metadatos:     serde_json::from_str(&self.metadatos)?,
      ip_address:    self.ip_address,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

pub const CHANGE_SELECT: &str = "
  SELECT c.id, c.tabla_nombre, c.registro_id, c.operation_type, c.user_id,
         json_extract(u.fields_json, '$.email'), c.valores_anteriores,
         c.valores_nuevos, c.campos_modificados, c.created_at
    FROM change_history c
    LEFT JOIN users u ON u.id = c.user_id";

pub struct RawChange {
  pub id:                 String,
  pub tabla_nombre:       String,
  pub registro_id:        String,
  pub operation_type:     String,
  pub user_id:            Option<String>,
  pub user_email:         Option<String>,
  pub valores_anteriores: Option<String>,
  pub valores_nuevos:     Option<String>,
  pub campos_modificados: String,
  pub created_at:         String,
}

impl RawChange {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:                 row.get(0)?,
      tabla_nombre:       row.get(1)?,
      registro_id:        row.get(2)?,
      operation_type:     row.get(3)?,
      user_id:            row.get(4)?,
      user_email:         row.get(5)?,
      valores_anteriores: row.get(6)?,
      valores_nuevos:     row.get(7)?,
      campos_modificados: row.get(8)?,
      created_at:         row.get(9)?,
    })
  }

  pub fn into_change(self) -> Result<ChangeRecord> {
    let json = |s: Option<String>| -> Result<Option<serde_json::Value>> {
      Ok(s.as_deref().map(serde_json::from_str).transpose()?)
    };
    Ok(ChangeRecord {
      id:                 decode_uuid(&self.id)?,
      tabla_nombre:       self.tabla_nombre,
      registro_id:        decode_uuid(&self.registro_id)?,
      operation_type:     decode_enum::<OperationType>(
        "operation type",
        &self.operation_type,
      )?,
      user_id:            decode_opt_uuid(self.user_id)?,
      user_email:         self.user_email,
      valores_anteriores: json(self.valores_anteriores)?,
      valores_nuevos:     json(self.valores_nuevos)?,
      campos_modificados: serde_json::from_str(&self.campos_modificados)?,
      created_at:         decode_dt(&self.created_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn timestamps_sort_as_text() {
    let early = "2024-05-01T10:00:00Z".parse::<DateTime<Utc>>().unwrap();
    let late = early + chrono::Duration::microseconds(1500);
    assert!(encode_dt(early) < encode_dt(late));
    assert_eq!(encode_dt(early).len(), encode_dt(late).len());
    assert_eq!(decode_dt(&encode_dt(late)).unwrap(), late);
  }

  #[test]
  fn unknown_discriminant_is_core_error() {
    let err = decode_enum::<ActivityType>("activity type", "nope").unwrap_err();
    assert!(matches!(
      err,
      Error::Core(georeport_core::Error::UnknownVariant { .. })
    ));
  }
}
