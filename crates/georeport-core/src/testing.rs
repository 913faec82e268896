//! In-memory [`GeoStore`] for unit tests of the orchestration layers.

use std::{
  collections::HashMap,
  sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
  },
};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
  Error, Result,
  audit::{ActivityRecord, AuditQuery, ChangeRecord, NewActivity},
  entity::{CategoryFields, Entity, Record, User},
  notification::{
    ChangeKind, NewNotification, Notification, NotificationEvent,
  },
  store::{Actor, GeoStore},
};

pub(crate) struct MemoryStore {
  rows:          Mutex<HashMap<Uuid, serde_json::Value>>,
  notifications: Mutex<Vec<Notification>>,
  activities:    Mutex<Vec<ActivityRecord>>,
  soft_deletes:  AtomicUsize,
  events:        broadcast::Sender<NotificationEvent>,
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self {
      rows:          Mutex::default(),
      notifications: Mutex::default(),
      activities:    Mutex::default(),
      soft_deletes:  AtomicUsize::new(0),
      events:        broadcast::channel(16).0,
    }
  }
}

impl MemoryStore {
  pub fn seed_category(&self, nombre: &str) -> Uuid {
    let now = Utc::now();
    let record = Record {
      id:         Uuid::new_v4(),
      fields:     CategoryFields {
        nombre:      nombre.to_string(),
        descripcion: None,
        color:       None,
        icono:       None,
      },
      activo:     true,
      created_at: now,
      updated_at: now,
      deleted_at: None,
    };
    self.save(&record).unwrap();
    record.id
  }

  pub fn soft_delete_calls(&self) -> usize {
    self.soft_deletes.load(Ordering::SeqCst)
  }

  pub fn deleted_at(&self, id: Uuid) -> Option<DateTime<Utc>> {
    let rows = self.rows.lock().unwrap();
    serde_json::from_value(rows.get(&id)?["deleted_at"].clone()).ok()?
  }

  pub fn activities(&self) -> usize { self.activities.lock().unwrap().len() }

  fn save<E: Entity>(&self, record: &Record<E>) -> Result<()> {
    let mut value = serde_json::to_value(record)?;
    value["kind"] = serde_json::to_value(E::KIND)?;
    self.rows.lock().unwrap().insert(record.id, value);
    Ok(())
  }

  fn load<E: Entity>(&self, id: Uuid) -> Result<Option<Record<E>>> {
    let rows = self.rows.lock().unwrap();
    match rows.get(&id) {
      Some(v) if v["kind"] == serde_json::to_value(E::KIND)? => {
        Ok(Some(serde_json::from_value(v.clone())?))
      }
      _ => Ok(None),
    }
  }

  fn load_live<E: Entity>(&self, id: Uuid) -> Result<Record<E>> {
    let record = self
      .load::<E>(id)?
      .ok_or(Error::NotFound { kind: E::KIND, id })?;
    if record.is_deleted() {
      return Err(Error::Deleted { kind: E::KIND, id });
    }
    Ok(record)
  }
}

impl GeoStore for MemoryStore {
  type Error = Error;

  async fn list<E: Entity>(&self) -> Result<Vec<Record<E>>> {
    let ids: Vec<Uuid> = self.rows.lock().unwrap().keys().copied().collect();
    let mut out = Vec::new();
    for id in ids {
      if let Some(r) = self.load::<E>(id)?
        && !r.is_deleted()
      {
        out.push(r);
      }
    }
    Ok(out)
  }

  async fn get<E: Entity>(&self, id: Uuid) -> Result<Option<Record<E>>> {
    self.load(id)
  }

  async fn insert<E: Entity>(&self, fields: E, _actor: Actor) -> Result<Record<E>> {
    fields.validate()?;
    let now = Utc::now();
    let record = Record {
      id: Uuid::new_v4(),
      fields,
      activo: true,
      created_at: now,
      updated_at: now,
      deleted_at: None,
    };
    self.save(&record)?;
    Ok(record)
  }

  async fn update<E: Entity>(
    &self,
    id: Uuid,
    patch: E::Patch,
    _actor: Actor,
  ) -> Result<Record<E>> {
    let mut record = self.load_live::<E>(id)?;
    record.fields.apply(patch);
    record.fields.validate()?;
    record.updated_at = Utc::now();
    self.save(&record)?;
    Ok(record)
  }

  async fn toggle_active<E: Entity>(&self, id: Uuid, _actor: Actor) -> Result<Record<E>> {
    let mut record = self.load_live::<E>(id)?;
    record.activo = !record.activo;
    self.save(&record)?;
    Ok(record)
  }

  async fn soft_delete<E: Entity>(&self, id: Uuid, _actor: Actor) -> Result<Record<E>> {
    self.soft_deletes.fetch_add(1, Ordering::SeqCst);
    let mut record = self.load_live::<E>(id)?;
    record.activo = false;
    record.deleted_at = Some(Utc::now());
    self.save(&record)?;
    Ok(record)
  }

  async fn set_password_hash(&self, _user_id: Uuid, _hash: String) -> Result<()> {
    unimplemented!()
  }

  async fn find_credentials<'a>(&'a self, _email: &'a str) -> Result<Option<(User, String)>> {
    unimplemented!()
  }

  async fn find_user_by_email<'a>(&'a self, _email: &'a str) -> Result<Option<User>> {
    unimplemented!()
  }

  async fn has_users(&self) -> Result<bool> { unimplemented!() }

  async fn list_notifications(&self, user_id: Uuid) -> Result<Vec<Notification>> {
    let all = self.notifications.lock().unwrap();
    Ok(all.iter().filter(|n| n.user_id == user_id).cloned().collect())
  }

  async fn create_notification(&self, input: NewNotification) -> Result<Notification> {
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
    self.notifications.lock().unwrap().push(notification.clone());
    let _ = self.events.send(NotificationEvent {
      event:   ChangeKind::Insert,
      user_id: notification.user_id,
      new:     Some(notification.clone()),
      old:     None,
    });
    Ok(notification)
  }

  async fn set_notification_read(
    &self,
    _id: Uuid,
    _user_id: Uuid,
    _read: bool,
  ) -> Result<Notification> {
    unimplemented!()
  }

  async fn mark_all_read(&self, _user_id: Uuid) -> Result<usize> { unimplemented!() }

  async fn delete_notification(&self, _id: Uuid, _user_id: Uuid) -> Result<()> {
    unimplemented!()
  }

  fn notification_events(&self) -> broadcast::Receiver<NotificationEvent> {
    self.events.subscribe()
  }

  async fn get_user_activities<'a>(
    &'a self,
    _query: &'a AuditQuery,
  ) -> Result<Vec<ActivityRecord>> {
    unimplemented!()
  }

  async fn get_change_history<'a>(
    &'a self,
    _query: &'a AuditQuery,
  ) -> Result<Vec<ChangeRecord>> {
    unimplemented!()
  }

  async fn registrar_actividad(&self, input: NewActivity) -> Result<ActivityRecord> {
    let record = ActivityRecord {
      id:            Uuid::new_v4(),
      user_id:       input.user_id,
      user_email:    None,
      activity_type: input.activity_type,
      tabla_nombre:  input.tabla_nombre,
      registro_id:   input.registro_id,
      descripcion:   input.descripcion,
      metadatos:     input.metadatos,
      ip_address:    input.ip_address,
      created_at:    Utc::now(),
    };
    self.activities.lock().unwrap().push(record.clone());
    Ok(record)
  }
}
