//! Integration tests for `SqliteStore` against an in-memory database.

use georeport_core::{
  ClassifyError, ErrorClass,
  audit::{ActivityType, AuditQuery, OperationType},
  bulk::{BulkAction, run_bulk},
  entity::{
    CategoryFields, CategoryPatch, EntityKind, EstadoFields, ReporteFields, ReportePatch,
    UserFields,
  },
  notification::{ChangeKind, NewNotification, NotificationType},
  store::GeoStore,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn category(nombre: &str) -> CategoryFields {
  CategoryFields {
    nombre:      nombre.into(),
    descripcion: None,
    color:       Some("#3366ff".into()),
    icono:       None,
  }
}

fn user(email: &str) -> UserFields {
  UserFields {
    email:    email.into(),
    nombre:   "Ana".into(),
    apellido: None,
    telefono: None,
    role_id:  None,
  }
}

/// A category, an estado, and an author to hang reportes off.
async fn fixtures(s: &SqliteStore) -> (Uuid, Uuid, Uuid) {
  let cat = s.insert(category("Vialidad"), None).await.unwrap();
  let estado = s
    .insert(
      EstadoFields {
        nombre:      "Pendiente".into(),
        descripcion: None,
        color:       None,
        orden:       1,
      },
      None,
    )
    .await
    .unwrap();
  let author = s.insert(user("autor@example.com"), None).await.unwrap();
  (cat.id, estado.id, author.id)
}

fn reporte(category_id: Uuid, estado_id: Uuid, user_id: Uuid) -> ReporteFields {
  ReporteFields {
    titulo: "Bache en Av. Central".into(),
    descripcion: Some("Profundo".into()),
    category_id,
    estado_id,
    user_id,
    assigned_to: None,
    latitud: Some(9.93),
    longitud: Some(-84.08),
    direccion: None,
    imagenes: vec![],
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn insert_and_get_record() {
  let s = store().await;
  let cat = s.insert(category("Alumbrado"), None).await.unwrap();
  assert!(cat.activo);
  assert!(cat.deleted_at.is_none());

  let fetched = s.get::<CategoryFields>(cat.id).await.unwrap().unwrap();
  assert_eq!(fetched, cat);
  assert!(s.get::<CategoryFields>(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn get_with_wrong_kind_returns_none() {
  let s = store().await;
  let cat = s.insert(category("Alumbrado"), None).await.unwrap();
  assert!(s.get::<EstadoFields>(cat.id).await.unwrap().is_none());
}

#[tokio::test]
async fn list_is_newest_first_and_hides_deleted() {
  let s = store().await;
  let a = s.insert(category("a"), None).await.unwrap();
  let b = s.insert(category("b"), None).await.unwrap();
  let c = s.insert(category("c"), None).await.unwrap();
  s.soft_delete::<CategoryFields>(b.id, None).await.unwrap();

  let ids: Vec<Uuid> = s
    .list::<CategoryFields>()
    .await
    .unwrap()
    .into_iter()
    .map(|r| r.id)
    .collect();
  assert_eq!(ids, vec![c.id, a.id]);
}

#[tokio::test]
async fn invalid_fields_never_reach_storage() {
  let s = store().await;
  let err = s.insert(category("  "), None).await.unwrap_err();
  assert_eq!(err.class(), ErrorClass::Validation);
  assert!(s.list::<CategoryFields>().await.unwrap().is_empty());
}

#[tokio::test]
async fn update_applies_patch() {
  let s = store().await;
  let cat = s.insert(category("Agua"), None).await.unwrap();
  let updated = s
    .update::<CategoryFields>(
      cat.id,
      CategoryPatch {
        nombre: Some("Agua potable".into()),
        ..Default::default()
      },
      None,
    )
    .await
    .unwrap();
  assert_eq!(updated.fields.nombre, "Agua potable");
  assert_eq!(updated.fields.color, cat.fields.color);
  assert!(updated.updated_at >= cat.updated_at);
}

#[tokio::test]
async fn toggle_flips_activo() {
  let s = store().await;
  let cat = s.insert(category("Parques"), None).await.unwrap();
  let off = s.toggle_active::<CategoryFields>(cat.id, None).await.unwrap();
  assert!(!off.activo);
  let on = s.toggle_active::<CategoryFields>(cat.id, None).await.unwrap();
  assert!(on.activo);
}

#[tokio::test]
async fn soft_delete_keeps_row() {
  let s = store().await;
  let cat = s.insert(category("Basura"), None).await.unwrap();
  let deleted = s.soft_delete::<CategoryFields>(cat.id, None).await.unwrap();
  assert!(!deleted.activo);
  assert!(deleted.deleted_at.is_some());

  let row = s.get::<CategoryFields>(cat.id).await.unwrap().unwrap();
  assert!(row.is_deleted());
}

#[tokio::test]
async fn deleted_rows_reject_further_writes() {
  let s = store().await;
  let cat = s.insert(category("Ruido"), None).await.unwrap();
  s.soft_delete::<CategoryFields>(cat.id, None).await.unwrap();

  let again = s.soft_delete::<CategoryFields>(cat.id, None).await.unwrap_err();
  assert!(matches!(
    again,
    Error::Core(georeport_core::Error::Deleted { .. })
  ));
  assert_eq!(again.class(), ErrorClass::Conflict);

  let toggle = s.toggle_active::<CategoryFields>(cat.id, None).await.unwrap_err();
  assert_eq!(toggle.class(), ErrorClass::Conflict);

  let missing = s
    .soft_delete::<CategoryFields>(Uuid::new_v4(), None)
    .await
    .unwrap_err();
  assert_eq!(missing.class(), ErrorClass::NotFound);
}

#[tokio::test]
async fn reporte_requires_live_references() {
  let s = store().await;
  let (cat, estado, author) = fixtures(&s).await;
  s.soft_delete::<CategoryFields>(cat, None).await.unwrap();

  let err = s
    .insert(reporte(cat, estado, author), Some(author))
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::BrokenReference { kind: EntityKind::Category, .. }
  ));
  assert_eq!(err.class(), ErrorClass::Validation);
}

#[tokio::test]
async fn patch_checks_only_changed_references() {
  let s = Arc::new(store().await);
  let (cat, estado, author) = fixtures(&s).await;
  let staff = s.insert(user("staff@example.com"), None).await.unwrap();
  let resuelto = s
    .insert(
      EstadoFields {
        nombre:      "Resuelto".into(),
        descripcion: None,
        color:       None,
        orden:       3,
      },
      None,
    )
    .await
    .unwrap();
  let r = s
    .insert(reporte(cat, estado, author), Some(author))
    .await
    .unwrap();
  s.soft_delete::<UserFields>(author, None).await.unwrap();
  s.soft_delete::<CategoryFields>(cat, None).await.unwrap();

  let updated = s
    .update::<ReporteFields>(
      r.id,
      ReportePatch {
        estado_id: Some(resuelto.id),
        ..Default::default()
      },
      Some(staff.id),
    )
    .await
    .unwrap();
  assert_eq!(updated.fields.estado_id, resuelto.id);

  let report = run_bulk(
    s.clone(),
    EntityKind::Reporte,
    BulkAction::Assign(Some(staff.id)),
    vec![r.id],
    None,
    4,
  )
  .await
  .unwrap();
  assert_eq!(report.succeeded(), 1);

  // A newly named reference still has to be live.
  let err = s
    .update::<ReporteFields>(
      r.id,
      ReportePatch {
        estado_id: Some(estado),
        assigned_to: Some(Some(author)),
        ..Default::default()
      },
      Some(staff.id),
    )
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::BrokenReference { kind: EntityKind::User, id } if id == author
  ));
}

#[tokio::test]
async fn duplicate_email_is_conflict() {
  let s = store().await;
  s.insert(user("ana@example.com"), None).await.unwrap();
  let err = s.insert(user("ANA@example.com"), None).await.unwrap_err();
  assert!(matches!(err, Error::DuplicateEmail(_)));
  assert_eq!(err.class(), ErrorClass::Conflict);
}

// ─── Audit trail ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn writes_leave_history_and_activity() {
  let s = store().await;
  let admin = s.insert(user("admin@example.com"), None).await.unwrap();
  let cat = s.insert(category("Semáforos"), Some(admin.id)).await.unwrap();
  s.update::<CategoryFields>(
    cat.id,
    CategoryPatch {
      color: Some("#ff0000".into()),
      ..Default::default()
    },
    Some(admin.id),
  )
  .await
  .unwrap();
  s.soft_delete::<CategoryFields>(cat.id, Some(admin.id))
    .await
    .unwrap();

  let history = s
    .get_change_history(&AuditQuery {
      tabla_nombre: Some("categories".into()),
      registro_id: Some(cat.id),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(history.len(), 3);
  assert_eq!(history[2].operation_type, OperationType::Insert);
  assert!(history[2].valores_anteriores.is_none());
  assert!(history[1].campos_modificados.contains(&"color".to_string()));
  // Soft delete is recorded as an update of the row.
  assert_eq!(history[0].operation_type, OperationType::Update);
  assert!(history[0].campos_modificados.contains(&"deleted_at".to_string()));
  assert_eq!(history[0].user_email.as_deref(), Some("admin@example.com"));

  let activities = s
    .get_user_activities(&AuditQuery {
      user_id: Some(admin.id),
      ..Default::default()
    })
    .await
    .unwrap();
  let kinds: Vec<ActivityType> = activities.iter().map(|a| a.activity_type).collect();
  assert_eq!(kinds, vec![
    ActivityType::Delete,
    ActivityType::Update,
    ActivityType::Create
  ]);
}

#[tokio::test]
async fn audit_limit_and_offset_page() {
  let s = store().await;
  for n in 0..5 {
    s.insert(category(&format!("c{n}")), None).await.unwrap();
  }
  let page = s
    .get_change_history(&AuditQuery {
      limit: Some(2),
      offset: 1,
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(page.len(), 2);

  let everything = s
    .get_change_history(&AuditQuery {
      limit: Some(0),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(everything.len(), 5);
}

#[tokio::test]
async fn logging_rpcs_record_activities() {
  let s = store().await;
  let u = s.insert(user("ops@example.com"), None).await.unwrap();

  let login = s
    .log_user_login(u.id, Some("10.0.0.7".into()))
    .await
    .unwrap();
  assert_eq!(login.activity_type, ActivityType::Login);
  assert_eq!(login.user_email.as_deref(), Some("ops@example.com"));
  assert_eq!(login.ip_address.as_deref(), Some("10.0.0.7"));

  let export = s
    .log_data_export(Some(u.id), "reportes", 12, "abc123")
    .await
    .unwrap();
  assert_eq!(export.metadatos["rows"], 12);
  assert_eq!(export.metadatos["sha256"], "abc123");

  let import = s.log_data_import(Some(u.id), "categories", 3).await.unwrap();
  assert_eq!(import.activity_type, ActivityType::Import);

  let security = s
    .log_security_event(None, "login_throttled", serde_json::json!({"email": "x"}))
    .await
    .unwrap();
  assert_eq!(security.activity_type, ActivityType::SecurityEvent);
  assert!(security.user_id.is_none());
}

// ─── Credentials ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn credentials_lookup_is_case_insensitive() {
  let s = store().await;
  assert!(!s.has_users().await.unwrap());

  let u = s.insert(user("Ana@Example.com"), None).await.unwrap();
  assert!(s.has_users().await.unwrap());
  assert!(s.find_credentials("ana@example.com").await.unwrap().is_none());

  s.set_password_hash(u.id, "$argon2id$fake".into()).await.unwrap();
  let (found, hash) = s
    .find_credentials("ana@example.com")
    .await
    .unwrap()
    .unwrap();
  assert_eq!(found.id, u.id);
  assert_eq!(hash, "$argon2id$fake");

  s.soft_delete::<UserFields>(u.id, None).await.unwrap();
  assert!(s.find_credentials("ana@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn users_without_password_are_found_by_email() {
  let s = store().await;
  let u = s.insert(user("nuevo@example.com"), None).await.unwrap();
  assert!(s.find_credentials("nuevo@example.com").await.unwrap().is_none());

  let found = s.find_user_by_email("NUEVO@example.com").await.unwrap().unwrap();
  assert_eq!(found.id, u.id);

  s.set_password_hash(found.id, "$argon2id$fake".into()).await.unwrap();
  assert!(s.find_credentials("nuevo@example.com").await.unwrap().is_some());

  s.soft_delete::<UserFields>(u.id, None).await.unwrap();
  assert!(s.find_user_by_email("nuevo@example.com").await.unwrap().is_none());
  assert!(s.find_user_by_email("nadie@example.com").await.unwrap().is_none());
}

#[tokio::test]
async fn password_for_unknown_user_is_not_found() {
  let s = store().await;
  let err = s
    .set_password_hash(Uuid::new_v4(), "h".into())
    .await
    .unwrap_err();
  assert_eq!(err.class(), ErrorClass::NotFound);
}

// ─── Notifications ───────────────────────────────────────────────────────────

#[tokio::test]
async fn assignment_creates_notification_and_event() {
  let s = store().await;
  let (cat, estado, author) = fixtures(&s).await;
  let staff = s.insert(user("staff@example.com"), None).await.unwrap();
  let mut feed = s.notification_events();

  let r = s
    .insert(reporte(cat, estado, author), Some(author))
    .await
    .unwrap();
  s.update::<ReporteFields>(
    r.id,
    ReportePatch {
      assigned_to: Some(Some(staff.id)),
      ..Default::default()
    },
    Some(author),
  )
  .await
  .unwrap();

  let inbox = s.list_notifications(staff.id).await.unwrap();
  assert_eq!(inbox.len(), 1);
  assert_eq!(inbox[0].kind, NotificationType::ReporteAsignado);
  assert_eq!(inbox[0].data["reporte_id"], r.id.to_string());

  let event = feed.recv().await.unwrap();
  assert_eq!(event.event, ChangeKind::Insert);
  assert_eq!(event.user_id, staff.id);
}

#[tokio::test]
async fn estado_change_notifies_author() {
  let s = store().await;
  let (cat, estado, author) = fixtures(&s).await;
  let staff = s.insert(user("staff@example.com"), None).await.unwrap();
  let resuelto = s
    .insert(
      EstadoFields {
        nombre:      "Resuelto".into(),
        descripcion: None,
        color:       None,
        orden:       3,
      },
      None,
    )
    .await
    .unwrap();
  let r = s
    .insert(reporte(cat, estado, author), Some(author))
    .await
    .unwrap();

  s.update::<ReporteFields>(
    r.id,
    ReportePatch {
      estado_id: Some(resuelto.id),
      ..Default::default()
    },
    Some(staff.id),
  )
  .await
  .unwrap();

  let inbox = s.list_notifications(author).await.unwrap();
  assert_eq!(inbox.len(), 1);
  assert_eq!(inbox[0].kind, NotificationType::EstadoCambiado);
}

#[tokio::test]
async fn read_flags_and_delete() {
  let s = store().await;
  let me = Uuid::new_v4();
  let someone = Uuid::new_v4();
  let mut feed = s.notification_events();

  let a = s
    .create_notification(NewNotification::new(me, NotificationType::Sistema, "a", ""))
    .await
    .unwrap();
  s.create_notification(NewNotification::new(me, NotificationType::Comentario, "b", ""))
    .await
    .unwrap();
  assert!(!a.read);

  let read = s.set_notification_read(a.id, me, true).await.unwrap();
  assert!(read.read);
  let err = s.set_notification_read(a.id, someone, true).await.unwrap_err();
  assert_eq!(err.class(), ErrorClass::NotFound);

  assert_eq!(s.mark_all_read(me).await.unwrap(), 1);
  assert_eq!(s.mark_all_read(me).await.unwrap(), 0);
  assert!(s.list_notifications(me).await.unwrap().iter().all(|n| n.read));

  assert!(s.delete_notification(a.id, someone).await.is_err());
  s.delete_notification(a.id, me).await.unwrap();
  assert_eq!(s.list_notifications(me).await.unwrap().len(), 1);

  let kinds: Vec<ChangeKind> = std::iter::from_fn(|| feed.try_recv().ok())
    .map(|e| e.event)
    .collect();
  assert_eq!(kinds, vec![
    ChangeKind::Insert,
    ChangeKind::Insert,
    ChangeKind::Update,
    ChangeKind::Update,
    ChangeKind::Delete
  ]);
}

// ─── Bulk ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn bulk_assign_over_sqlite() {
  let s = Arc::new(store().await);
  let (cat, estado, author) = fixtures(&s).await;
  let staff = s.insert(user("staff@example.com"), None).await.unwrap();
  let admin = s.insert(user("admin@example.com"), None).await.unwrap();
  let mut ids = Vec::new();
  for _ in 0..3 {
    ids.push(
      s.insert(reporte(cat, estado, author), Some(author))
        .await
        .unwrap()
        .id,
    );
  }

  let report = run_bulk(
    s.clone(),
    EntityKind::Reporte,
    BulkAction::Assign(Some(staff.id)),
    ids.clone(),
    Some(admin.id),
    4,
  )
  .await
  .unwrap();
  assert_eq!(report.succeeded(), 3);
  assert_eq!(s.list_notifications(staff.id).await.unwrap().len(), 3);

  let bulk_activities = s
    .get_user_activities(&AuditQuery {
      user_id: Some(admin.id),
      ..Default::default()
    })
    .await
    .unwrap()
    .into_iter()
    .filter(|a| a.activity_type == ActivityType::BulkAction)
    .count();
  assert_eq!(bulk_activities, 1);
}
