//! Domain records: the rows every list view in GeoReport is built from.
//!
//! Every table shares one envelope ([`Record`]): identity, an active flag,
//! audit timestamps, and a soft-delete marker. The entity-specific payload is
//! flattened into the envelope on the wire, so a category serialises as
//! `{"id": ..., "nombre": ..., "activo": true, ...}`.
//!
//! Records are never physically removed. Deleting sets `deleted_at` and
//! clears `activo`; there is no restore path.

use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Kinds ───────────────────────────────────────────────────────────────────

/// The tables that hold soft-deletable domain records. The string form is
/// the table name.
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
pub enum EntityKind {
  #[serde(rename = "categories")]
  #[strum(serialize = "categories")]
  Category,
  #[serde(rename = "estados")]
  #[strum(serialize = "estados")]
  Estado,
  #[serde(rename = "roles")]
  #[strum(serialize = "roles")]
  Role,
  #[serde(rename = "reportes")]
  #[strum(serialize = "reportes")]
  Reporte,
  #[serde(rename = "users")]
  #[strum(serialize = "users")]
  User,
}

impl EntityKind {
  /// Table name in the backing store.
  pub fn table(self) -> &'static str {
    match self {
      Self::Category => "categories",
      Self::Estado => "estados",
      Self::Role => "roles",
      Self::Reporte => "reportes",
      Self::User => "users",
    }
  }
}

// ─── Envelope ────────────────────────────────────────────────────────────────

/// A stored row: identity, payload, active flag, audit timestamps.
///
/// The client never holds authoritative copies; every list of records is a
/// cache that is refetched after a mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<F> {
  pub id:         Uuid,
  #[serde(flatten)]
  pub fields:     F,
  /// Users historically call this flag `asset`.
  #[serde(alias = "asset")]
  pub activo:     bool,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  pub deleted_at: Option<DateTime<Utc>>,
}

impl<F> Record<F> {
  pub fn is_deleted(&self) -> bool { self.deleted_at.is_some() }
}

pub type Category = Record<CategoryFields>;
pub type Estado = Record<EstadoFields>;
pub type Role = Record<RoleFields>;
pub type Reporte = Record<ReporteFields>;
pub type User = Record<UserFields>;

// ─── Entity trait ────────────────────────────────────────────────────────────

/// Implemented by every record payload. Lets the store and the bulk
/// orchestrator work over any table without per-table code.
pub trait Entity:
  Debug + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
  const KIND: EntityKind;

  /// Partial update accepted by `PATCH`; every field optional.
  type Patch: Debug
    + Clone
    + Default
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static;

  /// Field-level checks run before any write reaches the store.
  fn validate(&self) -> Result<()>;

  fn apply(&mut self, patch: Self::Patch);

  /// Human-readable name used in toasts, notifications, and audit text.
  fn label(&self) -> &str;

  /// Foreign keys this payload holds, in a fixed slot order with optional
  /// keys last. A key must name a live row when it is first written.
  fn references(&self) -> Vec<(EntityKind, Uuid)> { Vec::new() }
}

// ─── Validation helpers ──────────────────────────────────────────────────────

fn require_text(field: &str, value: &str) -> Result<()> {
  if value.trim().is_empty() {
    return Err(Error::validation(format!("{field} must not be empty")));
  }
  Ok(())
}

fn check_color(value: Option<&str>) -> Result<()> {
  let Some(c) = value else { return Ok(()) };
  let hex = c.strip_prefix('#').unwrap_or("");
  if hex.len() != 6 || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
    return Err(Error::validation(format!("color {c:?} is not #rrggbb")));
  }
  Ok(())
}

/// Deserialise a present-but-null field as `Some(None)` so a patch can tell
/// "clear this" apart from "leave this alone".
fn double_option<'de, D, T>(d: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(d).map(Some)
}

// ─── Category ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryFields {
  pub nombre:      String,
  pub descripcion: Option<String>,
  /// `#rrggbb`.
  pub color:       Option<String>,
  pub icono:       Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryPatch {
  pub nombre:      Option<String>,
  pub descripcion: Option<String>,
  pub color:       Option<String>,
  pub icono:       Option<String>,
}

impl Entity for CategoryFields {
  type Patch = CategoryPatch;

  const KIND: EntityKind = EntityKind::Category;

  fn validate(&self) -> Result<()> {
    require_text("nombre", &self.nombre)?;
    check_color(self.color.as_deref())
  }

  fn apply(&mut self, patch: CategoryPatch) {
    if let Some(v) = patch.nombre {
      self.nombre = v;
    }
    if let Some(v) = patch.descripcion {
      self.descripcion = Some(v);
    }
    if let Some(v) = patch.color {
      self.color = Some(v);
    }
    if let Some(v) = patch.icono {
      self.icono = Some(v);
    }
  }

  fn label(&self) -> &str { &self.nombre }
}

// ─── Estado ──────────────────────────────────────────────────────────────────

/// A workflow state for reportes (e.g. "Pendiente", "En proceso").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstadoFields {
  pub nombre:      String,
  pub descripcion: Option<String>,
  pub color:       Option<String>,
  /// Display order in pickers; lower first.
  #[serde(default)]
  pub orden:       i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EstadoPatch {
  pub nombre:      Option<String>,
  pub descripcion: Option<String>,
  pub color:       Option<String>,
  pub orden:       Option<i32>,
}

impl Entity for EstadoFields {
  type Patch = EstadoPatch;

  const KIND: EntityKind = EntityKind::Estado;

  fn validate(&self) -> Result<()> {
    require_text("nombre", &self.nombre)?;
    check_color(self.color.as_deref())
  }

  fn apply(&mut self, patch: EstadoPatch) {
    if let Some(v) = patch.nombre {
      self.nombre = v;
    }
    if let Some(v) = patch.descripcion {
      self.descripcion = Some(v);
    }
    if let Some(v) = patch.color {
      self.color = Some(v);
    }
    if let Some(v) = patch.orden {
      self.orden = v;
    }
  }

  fn label(&self) -> &str { &self.nombre }
}

// ─── Role ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleFields {
  pub nombre:      String,
  pub descripcion: Option<String>,
  #[serde(default)]
  pub permisos:    Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RolePatch {
  pub nombre:      Option<String>,
  pub descripcion: Option<String>,
  pub permisos:    Option<Vec<String>>,
}

impl Entity for RoleFields {
  type Patch = RolePatch;

  const KIND: EntityKind = EntityKind::Role;

  fn validate(&self) -> Result<()> { require_text("nombre", &self.nombre) }

  fn apply(&mut self, patch: RolePatch) {
    if let Some(v) = patch.nombre {
      self.nombre = v;
    }
    if let Some(v) = patch.descripcion {
      self.descripcion = Some(v);
    }
    if let Some(v) = patch.permisos {
      self.permisos = v;
    }
  }

  fn label(&self) -> &str { &self.nombre }
}

// ─── User ────────────────────────────────────────────────────────────────────

/// Profile data. Password hashes live in a separate credentials table and
/// never travel with the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserFields {
  pub email:    String,
  pub nombre:   String,
  pub apellido: Option<String>,
  pub telefono: Option<String>,
  pub role_id:  Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserPatch {
  pub nombre:   Option<String>,
  pub apellido: Option<String>,
  pub telefono: Option<String>,
  #[serde(
    default,
    deserialize_with = "double_option",
    skip_serializing_if = "Option::is_none"
  )]
  pub role_id:  Option<Option<Uuid>>,
}

impl Entity for UserFields {
  type Patch = UserPatch;

  const KIND: EntityKind = EntityKind::User;

  fn validate(&self) -> Result<()> {
    require_text("nombre", &self.nombre)?;
    require_text("email", &self.email)?;
    match self.email.split_once('@') {
      Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
      _ => Err(Error::validation(format!(
        "email {:?} is not a valid address",
        self.email
      ))),
    }
  }

  fn apply(&mut self, patch: UserPatch) {
    if let Some(v) = patch.nombre {
      self.nombre = v;
    }
    if let Some(v) = patch.apellido {
      self.apellido = Some(v);
    }
    if let Some(v) = patch.telefono {
      self.telefono = Some(v);
    }
    if let Some(v) = patch.role_id {
      self.role_id = v;
    }
  }

  fn label(&self) -> &str { &self.email }

  fn references(&self) -> Vec<(EntityKind, Uuid)> {
    self
      .role_id
      .map(|id| vec![(EntityKind::Role, id)])
      .unwrap_or_default()
  }
}

// ─── Reporte ─────────────────────────────────────────────────────────────────

/// An incident report filed by a citizen or staff member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReporteFields {
  pub titulo:      String,
  pub descripcion: Option<String>,
  pub category_id: Uuid,
  pub estado_id:   Uuid,
  /// Author.
  pub user_id:     Uuid,
  /// Staff member responsible for resolving the report.
  pub assigned_to: Option<Uuid>,
  pub latitud:     Option<f64>,
  pub longitud:    Option<f64>,
  pub direccion:   Option<String>,
  /// Image URLs on the external media host.
  #[serde(default)]
  pub imagenes:    Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportePatch {
  pub titulo:      Option<String>,
  pub descripcion: Option<String>,
  pub category_id: Option<Uuid>,
  pub estado_id:   Option<Uuid>,
  /// `Some(None)` unassigns.
  #[serde(
    default,
    deserialize_with = "double_option",
    skip_serializing_if = "Option::is_none"
  )]
  pub assigned_to: Option<Option<Uuid>>,
  pub latitud:     Option<f64>,
  pub longitud:    Option<f64>,
  pub direccion:   Option<String>,
  pub imagenes:    Option<Vec<String>>,
}

impl Entity for ReporteFields {
  type Patch = ReportePatch;

  const KIND: EntityKind = EntityKind::Reporte;

  fn validate(&self) -> Result<()> {
    require_text("titulo", &self.titulo)?;
    if let Some(lat) = self.latitud
      && !(-90.0..=90.0).contains(&lat)
    {
      return Err(Error::validation(format!("latitud {lat} out of range")));
    }
    if let Some(lon) = self.longitud
      && !(-180.0..=180.0).contains(&lon)
    {
      return Err(Error::validation(format!("longitud {lon} out of range")));
    }
    Ok(())
  }

  fn apply(&mut self, patch: ReportePatch) {
    if let Some(v) = patch.titulo {
      self.titulo = v;
    }
    if let Some(v) = patch.descripcion {
      self.descripcion = Some(v);
    }
    if let Some(v) = patch.category_id {
      self.category_id = v;
    }
    if let Some(v) = patch.estado_id {
      self.estado_id = v;
    }
    if let Some(v) = patch.assigned_to {
      self.assigned_to = v;
    }
    if let Some(v) = patch.latitud {
      self.latitud = Some(v);
    }
    if let Some(v) = patch.longitud {
      self.longitud = Some(v);
    }
    if let Some(v) = patch.direccion {
      self.direccion = Some(v);
    }
    if let Some(v) = patch.imagenes {
      self.imagenes = v;
    }
  }

  fn label(&self) -> &str { &self.titulo }

  fn references(&self) -> Vec<(EntityKind, Uuid)> {
    let mut refs = vec![
      (EntityKind::Category, self.category_id),
      (EntityKind::Estado, self.estado_id),
      (EntityKind::User, self.user_id),
    ];
    if let Some(a) = self.assigned_to {
      refs.push((EntityKind::User, a));
    }
    refs
  }
}
