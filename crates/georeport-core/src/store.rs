//! The `GeoStore` trait: everything a client can ask of the backend.
//!
//! The trait is implemented by storage backends (e.g. `georeport-store-sqlite`).
//! Higher layers (`georeport-api`, the bulk orchestrator, the realtime
//! subscription manager) depend on this abstraction, not on any concrete
//! backend.
//!
//! Write semantics mirror a managed Postgres backend with row triggers:
//! every record write appends a change-history row and an activity row, and
//! some reporte writes create notifications for the people involved.

use std::future::Future;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::{
  audit::{
    ActivityRecord, ActivityType, AuditQuery, ChangeRecord, NewActivity,
  },
  entity::{Entity, Record, User},
  error::ClassifyError,
  notification::{NewNotification, Notification, NotificationEvent},
};

/// The user a write is attributed to; `None` for system writes.
pub type Actor = Option<Uuid>;

/// Abstraction over a GeoReport backend.
///
/// Record "deletes" are soft: they set `deleted_at` and clear `activo`.
/// Nothing in this trait physically removes a record.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait GeoStore: Send + Sync {
  type Error: std::error::Error + ClassifyError + Send + Sync + 'static;

  // ── Records ───────────────────────────────────────────────────────────

  /// Live rows of `E`'s table (`deleted_at IS NULL`), newest first.
  fn list<E: Entity>(
    &self,
  ) -> impl Future<Output = Result<Vec<Record<E>>, Self::Error>> + Send + '_;

  /// Fetch one row, deleted or not. Returns `None` if it never existed.
  fn get<E: Entity>(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Record<E>>, Self::Error>> + Send + '_;

  /// Validate and insert a new row. Timestamps and the id are assigned by
  /// the store; new rows start active.
  fn insert<E: Entity>(
    &self,
    fields: E,
    actor: Actor,
  ) -> impl Future<Output = Result<Record<E>, Self::Error>> + Send + '_;

  /// Apply a partial update to a live row.
  fn update<E: Entity>(
    &self,
    id: Uuid,
    patch: E::Patch,
    actor: Actor,
  ) -> impl Future<Output = Result<Record<E>, Self::Error>> + Send + '_;

  /// Flip `activo` on a live row.
  fn toggle_active<E: Entity>(
    &self,
    id: Uuid,
    actor: Actor,
  ) -> impl Future<Output = Result<Record<E>, Self::Error>> + Send + '_;

  /// Soft delete: set `deleted_at`, clear `activo`. Errors if the row is
  /// already deleted.
  fn soft_delete<E: Entity>(
    &self,
    id: Uuid,
    actor: Actor,
  ) -> impl Future<Output = Result<Record<E>, Self::Error>> + Send + '_;

  // ── Credentials ───────────────────────────────────────────────────────

  /// Store (or replace) the argon2 PHC string for a user.
  fn set_password_hash(
    &self,
    user_id: Uuid,
    password_hash: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Look up a live user by email, with their password hash.
  fn find_credentials<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<(User, String)>, Self::Error>> + Send + 'a;

  /// Look up a live user by email, whether or not they have a password yet.
  fn find_user_by_email<'a>(
    &'a self,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<User>, Self::Error>> + Send + 'a;

  /// `has_users` RPC: whether any user exists at all.
  fn has_users(
    &self,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Notifications ─────────────────────────────────────────────────────

  /// A user's notifications, newest first.
  fn list_notifications(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Notification>, Self::Error>> + Send + '_;

  fn create_notification(
    &self,
    input: NewNotification,
  ) -> impl Future<Output = Result<Notification, Self::Error>> + Send + '_;

  /// Set `read` on one of `user_id`'s notifications.
  fn set_notification_read(
    &self,
    id: Uuid,
    user_id: Uuid,
    read: bool,
  ) -> impl Future<Output = Result<Notification, Self::Error>> + Send + '_;

  /// Mark every unread notification of `user_id` read. Returns how many
  /// changed.
  fn mark_all_read(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Hard delete one of `user_id`'s notifications.
  fn delete_notification(
    &self,
    id: Uuid,
    user_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Realtime feed of every change to the notifications table. Consumers
  /// filter by `user_id`.
  fn notification_events(&self) -> broadcast::Receiver<NotificationEvent>;

  // ── Audit RPCs ────────────────────────────────────────────────────────

  /// `get_user_activities(p_user_id, p_limit, p_offset)`.
  fn get_user_activities<'a>(
    &'a self,
    query: &'a AuditQuery,
  ) -> impl Future<Output = Result<Vec<ActivityRecord>, Self::Error>> + Send + 'a;

  /// `get_change_history(p_tabla_nombre, p_registro_id, p_user_id, p_limit,
  /// p_offset)`.
  fn get_change_history<'a>(
    &'a self,
    query: &'a AuditQuery,
  ) -> impl Future<Output = Result<Vec<ChangeRecord>, Self::Error>> + Send + 'a;

  /// `registrar_actividad`: append one activity row.
  fn registrar_actividad(
    &self,
    input: NewActivity,
  ) -> impl Future<Output = Result<ActivityRecord, Self::Error>> + Send + '_;

  // ── Logging RPCs (provided) ───────────────────────────────────────────

  /// `log_user_login`.
  fn log_user_login(
    &self,
    user_id: Uuid,
    ip_address: Option<String>,
  ) -> impl Future<Output = Result<ActivityRecord, Self::Error>> + Send + '_ {
    self.registrar_actividad(
      NewActivity::new(ActivityType::Login, "Inicio de sesión")
        .by(Some(user_id))
        .from_ip(ip_address),
    )
  }

  /// `log_user_logout`.
  fn log_user_logout(
    &self,
    user_id: Uuid,
    ip_address: Option<String>,
  ) -> impl Future<Output = Result<ActivityRecord, Self::Error>> + Send + '_ {
    self.registrar_actividad(
      NewActivity::new(ActivityType::Logout, "Cierre de sesión")
        .by(Some(user_id))
        .from_ip(ip_address),
    )
  }

  /// `log_security_event`: e.g. repeated failed logins.
  fn log_security_event(
    &self,
    actor: Actor,
    event: &str,
    details: serde_json::Value,
  ) -> impl Future<Output = Result<ActivityRecord, Self::Error>> + Send + '_ {
    self.registrar_actividad(
      NewActivity::new(ActivityType::SecurityEvent, event)
        .by(actor)
        .with_metadata(details),
    )
  }

  /// `log_data_export`: what was exported, how many rows, and the digest of
  /// the file handed out.
  fn log_data_export(
    &self,
    actor: Actor,
    dataset: &str,
    rows: usize,
    sha256: &str,
  ) -> impl Future<Output = Result<ActivityRecord, Self::Error>> + Send + '_ {
    self.registrar_actividad(
      NewActivity::new(ActivityType::Export, format!("Exportación de {dataset}"))
        .by(actor)
        .on(dataset, None)
        .with_metadata(serde_json::json!({
          "format": "csv",
          "rows": rows,
          "sha256": sha256,
        })),
    )
  }

  /// `log_data_import`: rows brought in from an external file.
  fn log_data_import(
    &self,
    actor: Actor,
    dataset: &str,
    rows: usize,
  ) -> impl Future<Output = Result<ActivityRecord, Self::Error>> + Send + '_ {
    self.registrar_actividad(
      NewActivity::new(ActivityType::Import, format!("Importación de {dataset}"))
        .by(actor)
        .on(dataset, None)
        .with_metadata(serde_json::json!({ "format": "csv", "rows": rows })),
    )
  }
}
