//! Synchronous write paths, run inside a single transaction on the database
//! thread.
//!
//! These functions stand in for the backend's row triggers. A record write
//! and everything it implies (change history, activity log, notifications)
//! commit together or not at all.

use chrono::Utc;
use georeport_core::{
  audit::{ActivityRecord, ActivityType, NewActivity, OperationType, changed_fields},
  entity::{Entity, EntityKind, Record, ReporteFields},
  notification::{NewNotification, Notification, NotificationType},
  store::Actor,
};
use rusqlite::{Connection, OptionalExtension as _, params};
use serde_json::json;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    ACTIVITY_SELECT, NOTIFICATION_COLUMNS, RECORD_COLUMNS, RawActivity,
    RawNotification, RawRecord, encode_dt, encode_uuid,
  },
};

/// A committed record write and the notifications it produced.
pub struct Written<E> {
  pub record:        Record<E>,
  pub notifications: Vec<Notification>,
}

// ─── Reads used by writers ───────────────────────────────────────────────────

pub fn select_record(
  conn: &Connection,
  kind: EntityKind,
  id: Uuid,
) -> Result<Option<RawRecord>> {
  let sql = format!("SELECT {RECORD_COLUMNS} FROM {} WHERE id = ?1", kind.table());
  Ok(
    conn
      .query_row(&sql, params![encode_uuid(id)], |row| RawRecord::from_row(row, 0))
      .optional()?,
  )
}

fn select_live<E: Entity>(conn: &Connection, id: Uuid) -> Result<Record<E>> {
  let raw = select_record(conn, E::KIND, id)?
    .ok_or(georeport_core::Error::NotFound { kind: E::KIND, id })?;
  if raw.is_deleted() {
    return Err(georeport_core::Error::Deleted { kind: E::KIND, id }.into());
  }
  raw.into_record()
}

fn ensure_live_refs(conn: &Connection, refs: &[(EntityKind, Uuid)]) -> Result<()> {
  for &(kind, id) in refs {
    match select_record(conn, kind, id)? {
      Some(raw) if !raw.is_deleted() => {}
      _ => return Err(Error::BrokenReference { kind, id }),
    }
  }
  Ok(())
}

fn ensure_unique_email(conn: &Connection, email: &str, except: Option<Uuid>) -> Result<()> {
  let taken: Option<String> = conn
    .query_row(
      "SELECT id FROM users
        WHERE lower(json_extract(fields_json, '$.email')) = lower(?1)
          AND (?2 IS NULL OR id != ?2)",
      params![email, except.map(encode_uuid)],
      |r| r.get(0),
    )
    .optional()?;
  match taken {
    Some(_) => Err(Error::DuplicateEmail(email.to_owned())),
    None => Ok(()),
  }
}

/// Checks every record write shares: field validation, live foreign keys,
/// and unique emails for users. On an update only the references that differ
/// from `before`, slot by slot, must be live; unchanged ones may point at rows
/// deleted since.
fn check_fields<E: Entity>(
  conn: &Connection,
  fields: &E,
  before: Option<&E>,
  id: Option<Uuid>,
) -> Result<()> {
  fields.validate()?;
  let kept = before.map(E::references).unwrap_or_default();
  let fresh: Vec<_> = fields
    .references()
    .into_iter()
    .enumerate()
    .filter(|(i, r)| kept.get(*i) != Some(r))
    .map(|(_, r)| r)
    .collect();
  ensure_live_refs(conn, &fresh)?;
  if E::KIND == EntityKind::User {
    let json = serde_json::to_value(fields)?;
    if let Some(email) = json["email"].as_str() {
      ensure_unique_email(conn, email, id)?;
    }
  }
  Ok(())
}

// ─── Record writes ───────────────────────────────────────────────────────────

fn store_record<E: Entity>(conn: &Connection, record: &Record<E>) -> Result<()> {
  let sql = format!(
    "INSERT INTO {} ({RECORD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
     ON CONFLICT(id) DO UPDATE SET
       fields_json = excluded.fields_json,
       activo      = excluded.activo,
       updated_at  = excluded.updated_at,
       deleted_at  = excluded.deleted_at",
    E::KIND.table()
  );
  conn.execute(&sql, params![
    encode_uuid(record.id),
    serde_json::to_string(&record.fields)?,
    record.activo,
    encode_dt(record.created_at),
    encode_dt(record.updated_at),
    record.deleted_at.map(encode_dt),
  ])?;
  Ok(())
}

pub fn insert<E: Entity>(conn: &mut Connection, fields: E, actor: Actor) -> Result<Written<E>> {
  let tx = conn.transaction()?;
  check_fields(&tx, &fields, None, None)?;

  let now = Utc::now();
  let record = Record {
    id: Uuid::new_v4(),
    fields,
    activo: true,
    created_at: now,
    updated_at: now,
    deleted_at: None,
  };
  store_record(&tx, &record)?;

  let after = serde_json::to_value(&record)?;
  record_change(&tx, E::KIND, record.id, OperationType::Insert, actor, None, Some(&after))?;
  record_activity(
    &tx,
    NewActivity::new(
      ActivityType::Create,
      format!("Registro creado en {}: {}", E::KIND, record.fields.label()),
    )
    .by(actor)
    .on(E::KIND.table(), Some(record.id)),
  )?;
  let notifications = notify_reporte(&tx, None, &record, actor)?;

  tx.commit()?;
  Ok(Written { record, notifications })
}

/// What a mutation of an existing row does to it.
pub enum Mutation<P> {
  Patch(P),
  Toggle,
  SoftDelete,
}

pub fn mutate<E: Entity>(
  conn: &mut Connection,
  id: Uuid,
  mutation: Mutation<E::Patch>,
  actor: Actor,
) -> Result<Written<E>> {
  let tx = conn.transaction()?;
  let mut record = select_live::<E>(&tx, id)?;
  let before_record = record.clone();
  let before = serde_json::to_value(&record)?;
  let now = Utc::now();

  let (activity_type, verb) = match mutation {
    Mutation::Patch(patch) => {
      record.fields.apply(patch);
      check_fields(&tx, &record.fields, Some(&before_record.fields), Some(id))?;
      (ActivityType::Update, "actualizado")
    }
    Mutation::Toggle => {
      record.activo = !record.activo;
      let verb = if record.activo { "activado" } else { "desactivado" };
      (ActivityType::Update, verb)
    }
    Mutation::SoftDelete => {
      record.activo = false;
      record.deleted_at = Some(now);
      (ActivityType::Delete, "eliminado")
    }
  };
  record.updated_at = now;
  store_record(&tx, &record)?;

  // A soft delete is an UPDATE of the row as far as history is concerned.
  let after = serde_json::to_value(&record)?;
  record_change(&tx, E::KIND, id, OperationType::Update, actor, Some(&before), Some(&after))?;
  record_activity(
    &tx,
    NewActivity::new(
      activity_type,
      format!("Registro {verb} en {}: {}", E::KIND, record.fields.label()),
    )
    .by(actor)
    .on(E::KIND.table(), Some(id)),
  )?;
  let notifications = notify_reporte(&tx, Some(&before_record), &record, actor)?;

  tx.commit()?;
  Ok(Written { record, notifications })
}

// ─── Audit ───────────────────────────────────────────────────────────────────

fn record_change(
  conn: &Connection,
  kind: EntityKind,
  id: Uuid,
  op: OperationType,
  actor: Actor,
  before: Option<&serde_json::Value>,
  after: Option<&serde_json::Value>,
) -> Result<()> {
  let campos = changed_fields(before, after);
  conn.execute(
    "INSERT INTO change_history (
       id, tabla_nombre, registro_id, operation_type, user_id,
       valores_anteriores, valores_nuevos, campos_modificados, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    params![
      encode_uuid(Uuid::new_v4()),
      kind.table(),
      encode_uuid(id),
      op.to_string(),
      actor.map(encode_uuid),
      before.map(ToString::to_string),
      after.map(ToString::to_string),
      serde_json::to_string(&campos)?,
      encode_dt(Utc::now()),
    ],
  )?;
  Ok(())
}

pub fn record_activity(conn: &Connection, input: NewActivity) -> Result<ActivityRecord> {
  let id = encode_uuid(Uuid::new_v4());
  conn.execute(
    "INSERT INTO activities (
       id, user_id, activity_type, tabla_nombre, registro_id,
       descripcion, metadatos, ip_address, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    params![
      id,
      input.user_id.map(encode_uuid),
      input.activity_type.to_string(),
      input.tabla_nombre,
      input.registro_id.map(encode_uuid),
      input.descripcion,
      input.metadatos.to_string(),
      input.ip_address,
      encode_dt(Utc::now()),
    ],
  )?;
  let raw = conn.query_row(
    &format!("{ACTIVITY_SELECT} WHERE a.id = ?1"),
    params![id],
    RawActivity::from_row,
  )?;
  raw.into_activity()
}

// ─── Notifications ───────────────────────────────────────────────────────────

pub fn insert_notification(conn: &Connection, input: NewNotification) -> Result<Notification> {
  let notification = Notification {
    id:         Uuid::new_v4(),
    user_id:    input.user_id,
    kind:       input.kind,
    title:      input.title,
    message:    input.message,
    data:       input.data,
    read:       false,
    created_at: Utc::now(),
  };
  conn.execute(
    &format!(
      "INSERT INTO notifications ({NOTIFICATION_COLUMNS})
       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
    ),
    params![
      encode_uuid(notification.id),
      encode_uuid(notification.user_id),
      notification.kind.to_string(),
      notification.title,
      notification.message,
      notification.data.to_string(),
      notification.read,
      encode_dt(notification.created_at),
    ],
  )?;
  Ok(notification)
}

pub fn select_notification(conn: &Connection, id: Uuid) -> Result<Option<Notification>> {
  conn
    .query_row(
      &format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?1"),
      params![encode_uuid(id)],
      RawNotification::from_row,
    )
    .optional()?
    .map(RawNotification::into_notification)
    .transpose()
}

/// Notifications implied by a reporte write. Other tables produce none.
fn notify_reporte<E: Entity>(
  conn: &Connection,
  before: Option<&Record<E>>,
  after: &Record<E>,
  actor: Actor,
) -> Result<Vec<Notification>> {
  if E::KIND != EntityKind::Reporte {
    return Ok(Vec::new());
  }
  let after_fields: ReporteFields = serde_json::from_value(serde_json::to_value(&after.fields)?)?;
  let before_fields: Option<ReporteFields> = before
    .map(|b| serde_json::to_value(&b.fields).and_then(serde_json::from_value))
    .transpose()?;

  let mut out = Vec::new();
  for input in reporte_notifications(after.id, before_fields.as_ref(), &after_fields, actor) {
    out.push(insert_notification(conn, input)?);
  }
  Ok(out)
}

fn reporte_notifications(
  id: Uuid,
  before: Option<&ReporteFields>,
  after: &ReporteFields,
  actor: Actor,
) -> Vec<NewNotification> {
  let data = json!({ "reporte_id": id });
  let titulo = &after.titulo;
  let mut out = Vec::new();

  let Some(before) = before else {
    if let Some(assignee) = after.assigned_to
      && actor != Some(assignee)
    {
      out.push(
        NewNotification::new(
          assignee,
          NotificationType::ReporteAsignado,
          "Reporte asignado",
          format!("Se te asignó el reporte \"{titulo}\""),
        )
        .with_data(data),
      );
    }
    return out;
  };

  if before.assigned_to != after.assigned_to
    && let Some(assignee) = after.assigned_to
    && actor != Some(assignee)
  {
    out.push(
      NewNotification::new(
        assignee,
        NotificationType::ReporteAsignado,
        "Reporte asignado",
        format!("Se te asignó el reporte \"{titulo}\""),
      )
      .with_data(data.clone()),
    );
  }

  if actor == Some(after.user_id) {
    return out;
  }

  let estado_changed = before.estado_id != after.estado_id;
  let other_changed = {
    let mut normalised = before.clone();
    normalised.estado_id = after.estado_id;
    normalised.assigned_to = after.assigned_to;
    normalised != *after
  };

  if estado_changed {
    out.push(
      NewNotification::new(
        after.user_id,
        NotificationType::EstadoCambiado,
        "Estado actualizado",
        format!("El estado de tu reporte \"{titulo}\" cambió"),
      )
      .with_data(data),
    );
  } else if other_changed {
    out.push(
      NewNotification::new(
        after.user_id,
        NotificationType::ReporteActualizado,
        "Reporte actualizado",
        format!("Tu reporte \"{titulo}\" fue actualizado"),
      )
      .with_data(data),
    );
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  fn reporte(author: Uuid) -> ReporteFields {
    ReporteFields {
      titulo:      "Fuga de agua".into(),
      descripcion: None,
      category_id: Uuid::new_v4(),
      estado_id:   Uuid::new_v4(),
      user_id:     author,
      assigned_to: None,
      latitud:     None,
      longitud:    None,
      direccion:   None,
      imagenes:    vec![],
    }
  }

  #[test]
  fn new_unassigned_reporte_notifies_nobody() {
    let r = reporte(Uuid::new_v4());
    assert!(reporte_notifications(Uuid::nil(), None, &r, None).is_empty());
  }

  #[test]
  fn estado_change_by_staff_notifies_author() {
    let author = Uuid::new_v4();
    let before = reporte(author);
    let mut after = before.clone();
    after.estado_id = Uuid::new_v4();

    let out = reporte_notifications(Uuid::nil(), Some(&before), &after, Some(Uuid::new_v4()));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].user_id, author);
    assert_eq!(out[0].kind, NotificationType::EstadoCambiado);
  }

  #[test]
  fn author_edits_are_silent() {
    let author = Uuid::new_v4();
    let before = reporte(author);
    let mut after = before.clone();
    after.titulo = "Fuga grande".into();
    assert!(reporte_notifications(Uuid::nil(), Some(&before), &after, Some(author)).is_empty());
  }

  #[test]
  fn assignment_notifies_assignee_only() {
    let author = Uuid::new_v4();
    let staff = Uuid::new_v4();
    let before = reporte(author);
    let mut after = before.clone();
    after.assigned_to = Some(staff);

    let out = reporte_notifications(Uuid::nil(), Some(&before), &after, Some(author));
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].user_id, staff);
    assert_eq!(out[0].kind, NotificationType::ReporteAsignado);
  }

  #[test]
  fn self_assignment_is_silent() {
    let author = Uuid::new_v4();
    let staff = Uuid::new_v4();
    let before = reporte(author);
    let mut after = before.clone();
    after.assigned_to = Some(staff);
    assert!(reporte_notifications(Uuid::nil(), Some(&before), &after, Some(staff)).is_empty());

    let mut created = reporte(author);
    created.assigned_to = Some(author);
    assert!(reporte_notifications(Uuid::nil(), None, &created, Some(author)).is_empty());
  }
}
