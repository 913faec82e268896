//! [`SqliteStore`]: the SQLite implementation of [`GeoStore`].

use std::path::Path;

use chrono::Utc;
use georeport_core::{
  audit::{ActivityRecord, AuditQuery, ChangeRecord, NewActivity},
  entity::{Entity, EntityKind, Record, User, UserFields},
  notification::{ChangeKind, NewNotification, Notification, NotificationEvent},
  store::{Actor, GeoStore},
};
use rusqlite::{OptionalExtension as _, params};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    ACTIVITY_SELECT, CHANGE_SELECT, NOTIFICATION_COLUMNS, RECORD_COLUMNS, RawActivity,
    RawChange, RawNotification, RawRecord, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
  write::{self, Mutation, Written},
};

/// Events buffered for the slowest realtime subscriber.
const EVENT_CAPACITY: usize = 256;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A GeoReport backend stored in a single SQLite file.
///
/// Cloning is cheap: the connection and the change feed are both
/// reference-counted, and clones share them.
#[derive(Clone)]
pub struct SqliteStore {
  conn:   tokio_rusqlite::Connection,
  events: broadcast::Sender<NotificationEvent>,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store: useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self {
      conn,
      events: broadcast::channel(EVENT_CAPACITY).0,
    })
  }

  fn emit(
    &self,
    event: ChangeKind,
    old: Option<Notification>,
    new: Option<Notification>,
  ) {
    let Some(user_id) = new.as_ref().or(old.as_ref()).map(|n| n.user_id) else {
      return;
    };
    // An error only means nobody is subscribed right now.
    if self
      .events
      .send(NotificationEvent { event, user_id, new, old })
      .is_err()
    {
      debug!(%user_id, %event, "notification change with no subscribers");
    }
  }

  fn finish<E>(&self, written: Written<E>) -> Record<E> {
    for n in written.notifications {
      self.emit(ChangeKind::Insert, None, Some(n));
    }
    written.record
  }

  async fn mutate<E: Entity>(
    &self,
    id: Uuid,
    mutation: Mutation<E::Patch>,
    actor: Actor,
  ) -> Result<Record<E>> {
    let written = self
      .conn
      .call(move |conn| Ok(write::mutate::<E>(conn, id, mutation, actor)))
      .await??;
    Ok(self.finish(written))
  }

  /// Apply a read/unread flip to rows selected by `filter`, returning the
  /// before and after images of each changed row.
  async fn set_read_where(
    &self,
    filter: &'static str,
    arg: String,
    read: bool,
  ) -> Result<Vec<(Notification, Notification)>> {
    let raws: Vec<RawNotification> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let rows = {
          let mut stmt = tx.prepare(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE {filter}"
          ))?;
          stmt
            .query_map(params![arg], RawNotification::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        tx.execute(
          &format!("UPDATE notifications SET read = ?2 WHERE {filter}"),
          params![arg, read],
        )?;
        tx.commit()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|raw| {
        let old = raw.into_notification()?;
        let new = Notification { read, ..old.clone() };
        Ok((old, new))
      })
      .collect()
  }
}

// ─── GeoStore impl ───────────────────────────────────────────────────────────

impl GeoStore for SqliteStore {
  type Error = Error;

  // ── Records ───────────────────────────────────────────────────────────────

  async fn list<E: Entity>(&self) -> Result<Vec<Record<E>>> {
    let sql = format!(
      "SELECT {RECORD_COLUMNS} FROM {}
        WHERE deleted_at IS NULL
        ORDER BY created_at DESC, rowid DESC",
      E::KIND.table()
    );
    let raws: Vec<RawRecord> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], |row| RawRecord::from_row(row, 0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawRecord::into_record::<E>).collect()
  }

  async fn get<E: Entity>(&self, id: Uuid) -> Result<Option<Record<E>>> {
    let raw = self
      .conn
      .call(move |conn| Ok(write::select_record(conn, E::KIND, id)))
      .await??;
    raw.map(RawRecord::into_record::<E>).transpose()
  }

  async fn insert<E: Entity>(&self, fields: E, actor: Actor) -> Result<Record<E>> {
    let written = self
      .conn
      .call(move |conn| Ok(write::insert(conn, fields, actor)))
      .await??;
    debug!(kind = %E::KIND, id = %written.record.id, "record inserted");
    Ok(self.finish(written))
  }

  async fn update<E: Entity>(
    &self,
    id: Uuid,
    patch: E::Patch,
    actor: Actor,
  ) -> Result<Record<E>> {
    self.mutate(id, Mutation::Patch(patch), actor).await
  }

  async fn toggle_active<E: Entity>(&self, id: Uuid, actor: Actor) -> Result<Record<E>> {
    self.mutate(id, Mutation::Toggle, actor).await
  }

  async fn soft_delete<E: Entity>(&self, id: Uuid, actor: Actor) -> Result<Record<E>> {
    self.mutate(id, Mutation::SoftDelete, actor).await
  }

  // ── Credentials ───────────────────────────────────────────────────────────

  async fn set_password_hash(&self, user_id: Uuid, password_hash: String) -> Result<()> {
    let id_str = encode_uuid(user_id);
    let exists = self
      .conn
      .call(move |conn| {
        let exists = conn
          .query_row("SELECT 1 FROM users WHERE id = ?1", params![id_str], |_| {
            Ok(true)
          })
          .optional()?
          .unwrap_or(false);
        if exists {
          conn.execute(
            "INSERT INTO credentials (user_id, password_hash, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
               password_hash = excluded.password_hash,
               updated_at    = excluded.updated_at",
            params![id_str, password_hash, encode_dt(Utc::now())],
          )?;
        }
        Ok(exists)
      })
      .await?;
    if !exists {
      return Err(
        georeport_core::Error::NotFound { kind: EntityKind::User, id: user_id }.into(),
      );
    }
    Ok(())
  }

  async fn find_credentials<'a>(&'a self, email: &'a str) -> Result<Option<(User, String)>> {
    let email = email.to_owned();
    let found: Option<(RawRecord, String)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT u.id, u.fields_json, u.activo, u.created_at, u.updated_at,
                      u.deleted_at, c.password_hash
                 FROM users u
                 JOIN credentials c ON c.user_id = u.id
                WHERE lower(json_extract(u.fields_json, '$.email')) = lower(?1)
                  AND u.deleted_at IS NULL",
              params![email],
              |row| Ok((RawRecord::from_row(row, 0)?, row.get(6)?)),
            )
            .optional()?,
        )
      })
      .await?;
    found
      .map(|(raw, hash)| Ok((raw.into_record::<UserFields>()?, hash)))
      .transpose()
  }

  async fn find_user_by_email<'a>(&'a self, email: &'a str) -> Result<Option<User>> {
    let email = email.to_owned();
    let found: Option<RawRecord> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT id, fields_json, activo, created_at, updated_at, deleted_at
                 FROM users
                WHERE lower(json_extract(fields_json, '$.email')) = lower(?1)
                  AND deleted_at IS NULL",
              params![email],
              |row| RawRecord::from_row(row, 0),
            )
            .optional()?,
        )
      })
      .await?;
    found.map(RawRecord::into_record::<UserFields>).transpose()
  }

  async fn has_users(&self) -> Result<bool> {
    Ok(
      self
        .conn
        .call(|conn| {
          Ok(conn.query_row("SELECT EXISTS(SELECT 1 FROM users)", [], |r| r.get(0))?)
        })
        .await?,
    )
  }

  // ── Notifications ─────────────────────────────────────────────────────────

  async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>> {
    let id_str = encode_uuid(user_id);
    let raws: Vec<RawNotification> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {NOTIFICATION_COLUMNS} FROM notifications
            WHERE user_id = ?1
            ORDER BY created_at DESC, rowid DESC"
        ))?;
        let rows = stmt
          .query_map(params![id_str], RawNotification::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawNotification::into_notification).collect()
  }

  async fn create_notification(&self, input: NewNotification) -> Result<Notification> {
    let notification = self
      .conn
      .call(move |conn| Ok(write::insert_notification(conn, input)))
      .await??;
    self.emit(ChangeKind::Insert, None, Some(notification.clone()));
    Ok(notification)
  }

  async fn set_notification_read(
    &self,
    id: Uuid,
    user_id: Uuid,
    read: bool,
  ) -> Result<Notification> {
    let existing = self
      .conn
      .call(move |conn| Ok(write::select_notification(conn, id)))
      .await??;
    if existing.is_none_or(|n| n.user_id != user_id) {
      return Err(georeport_core::Error::NotificationNotFound(id).into());
    }

    let mut changed = self.set_read_where("id = ?1", encode_uuid(id), read).await?;
    let (old, new) = changed
      .pop()
      .ok_or(georeport_core::Error::NotificationNotFound(id))?;
    self.emit(ChangeKind::Update, Some(old), Some(new.clone()));
    Ok(new)
  }

  async fn mark_all_read(&self, user_id: Uuid) -> Result<usize> {
    let changed = self
      .set_read_where("user_id = ?1 AND read = 0", encode_uuid(user_id), true)
      .await?;
    let count = changed.len();
    for (old, new) in changed {
      self.emit(ChangeKind::Update, Some(old), Some(new));
    }
    Ok(count)
  }

  async fn delete_notification(&self, id: Uuid, user_id: Uuid) -> Result<()> {
    let id_str = encode_uuid(id);
    let removed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let existing = match write::select_notification(&tx, id) {
          Ok(n) => n,
          Err(e) => return Ok(Err(e)),
        };
        let Some(existing) = existing.filter(|n| n.user_id == user_id) else {
          return Ok(Ok(None));
        };
        tx.execute("DELETE FROM notifications WHERE id = ?1", params![id_str])?;
        tx.commit()?;
        Ok(Ok(Some(existing)))
      })
      .await??;

    let old = removed.ok_or(georeport_core::Error::NotificationNotFound(id))?;
    self.emit(ChangeKind::Delete, Some(old), None);
    Ok(())
  }

  fn notification_events(&self) -> broadcast::Receiver<NotificationEvent> {
    self.events.subscribe()
  }

  // ── Audit ─────────────────────────────────────────────────────────────────

  async fn get_user_activities<'a>(
    &'a self,
    query: &'a AuditQuery,
  ) -> Result<Vec<ActivityRecord>> {
    let user = query.user_id.map(encode_uuid);
    let limit = query.request_limit();
    let offset = query.offset;
    let raws: Vec<RawActivity> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "{ACTIVITY_SELECT}
            WHERE (?1 IS NULL OR a.user_id = ?1)
            ORDER BY a.created_at DESC, a.rowid DESC
            LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt
          .query_map(params![user, limit, offset], RawActivity::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawActivity::into_activity).collect()
  }

  async fn get_change_history<'a>(
    &'a self,
    query: &'a AuditQuery,
  ) -> Result<Vec<ChangeRecord>> {
    let tabla = query.tabla_nombre.clone();
    let registro = query.registro_id.map(encode_uuid);
    let user = query.user_id.map(encode_uuid);
    let limit = query.request_limit();
    let offset = query.offset;
    let raws: Vec<RawChange> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "{CHANGE_SELECT}
            WHERE (?1 IS NULL OR c.tabla_nombre = ?1)
              AND (?2 IS NULL OR c.registro_id = ?2)
              AND (?3 IS NULL OR c.user_id = ?3)
            ORDER BY c.created_at DESC, c.rowid DESC
            LIMIT ?4 OFFSET ?5"
        ))?;
        let rows = stmt
          .query_map(params![tabla, registro, user, limit, offset], RawChange::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawChange::into_change).collect()
  }

  async fn registrar_actividad(&self, input: NewActivity) -> Result<ActivityRecord> {
    self
      .conn
      .call(move |conn| Ok(write::record_activity(conn, input)))
      .await?
  }
}
