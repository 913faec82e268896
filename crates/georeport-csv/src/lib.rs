//! CSV codec for GeoReport exports.
//!
//! Turns domain rows into CSV text and reads CSV text back into string
//! records. Pure synchronous; no HTTP or database dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! use georeport_csv::{parse, serialize};
//! # let categories: Vec<georeport_core::entity::Category> = vec![];
//!
//! let csv = serialize(&categories);
//! let table = parse(&csv).unwrap();
//! assert_eq!(table.rows.len(), categories.len());
//! ```

pub mod error;
mod parse;
mod serialize;

use chrono::{DateTime, Utc};
pub use error::{Error, Result};
use georeport_core::{
  audit::{ActivityRecord, ChangeRecord},
  entity::{Category, Estado, Reporte, User},
};
use uuid::Uuid;

// ─── Public types ────────────────────────────────────────────────────────────

/// A row type that can be exported.
pub trait CsvRow {
  /// Column names, in output order.
  const HEADER: &'static [&'static str];

  /// One string per column, in [`Self::HEADER`] order.
  fn fields(&self) -> Vec<String>;
}

/// The datasets offered for download.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString, strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum Dataset {
  Reportes,
  Categories,
  Estados,
  Users,
  Activities,
  Changes,
}

/// A parsed CSV file: the header record and every record after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
  pub header: Vec<String>,
  pub rows:   Vec<Vec<String>>,
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Serialize `rows` with a header record. Always succeeds.
pub fn serialize<R: CsvRow>(rows: &[R]) -> String { serialize::serialize(rows) }

/// Parse RFC 4180 text into a header and rows. Every row must have as many
/// fields as the header.
pub fn parse(input: &str) -> Result<Table> {
  let mut records = parse::parse_records(input)?.into_iter();
  let header = records.next().map(|(_, h)| h).unwrap_or_default();
  let mut rows = Vec::new();
  for (line, record) in records {
    if record.len() != header.len() {
      return Err(Error::RaggedRecord {
        line,
        expected: header.len(),
        found:    record.len(),
      });
    }
    rows.push(record);
  }
  Ok(Table { header, rows })
}

// ─── Row impls ───────────────────────────────────────────────────────────────

fn opt<T: ToString>(value: &Option<T>) -> String {
  value.as_ref().map(ToString::to_string).unwrap_or_default()
}

fn dt(value: &DateTime<Utc>) -> String { value.to_rfc3339() }

fn active(activo: bool) -> String { if activo { "si" } else { "no" }.to_string() }

impl CsvRow for Category {
  const HEADER: &'static [&'static str] =
    &["id", "nombre", "descripcion", "color", "icono", "activo", "created_at"];

  fn fields(&self) -> Vec<String> {
    vec![
      self.id.to_string(),
      self.fields.nombre.clone(),
      opt(&self.fields.descripcion),
      opt(&self.fields.color),
      opt(&self.fields.icono),
      active(self.activo),
      dt(&self.created_at),
    ]
  }
}

impl CsvRow for Estado {
  const HEADER: &'static [&'static str] =
    &["id", "nombre", "descripcion", "color", "orden", "activo", "created_at"];

  fn fields(&self) -> Vec<String> {
    vec![
      self.id.to_string(),
      self.fields.nombre.clone(),
      opt(&self.fields.descripcion),
      opt(&self.fields.color),
      self.fields.orden.to_string(),
      active(self.activo),
      dt(&self.created_at),
    ]
  }
}

impl CsvRow for User {
  const HEADER: &'static [&'static str] =
    &["id", "email", "nombre", "apellido", "telefono", "activo", "created_at"];

  fn fields(&self) -> Vec<String> {
    vec![
      self.id.to_string(),
      self.fields.email.clone(),
      self.fields.nombre.clone(),
      opt(&self.fields.apellido),
      opt(&self.fields.telefono),
      active(self.activo),
      dt(&self.created_at),
    ]
  }
}

fn lookup<'n>(id: Uuid, mut names: impl Iterator<Item = (Uuid, &'n str)>) -> String {
  names
    .find(|(k, _)| *k == id)
    .map(|(_, n)| n.to_string())
    .unwrap_or_else(|| id.to_string())
}

/// A reporte with its category and estado names resolved for humans.
pub struct ReporteRow<'a> {
  pub reporte:   &'a Reporte,
  pub categoria: String,
  pub estado:    String,
}

impl<'a> ReporteRow<'a> {
  /// Pair each reporte with the names of its category and estado. Ids that
  /// do not resolve are exported as the raw id.
  pub fn resolve(
    reportes: &'a [Reporte],
    categories: &[Category],
    estados: &[Estado],
  ) -> Vec<Self> {
    reportes
      .iter()
      .map(|reporte| ReporteRow {
        reporte,
        categoria: lookup(
          reporte.fields.category_id,
          categories.iter().map(|c| (c.id, c.fields.nombre.as_str())),
        ),
        estado: lookup(
          reporte.fields.estado_id,
          estados.iter().map(|e| (e.id, e.fields.nombre.as_str())),
        ),
      })
      .collect()
  }
}

impl CsvRow for ReporteRow<'_> {
  const HEADER: &'static [&'static str] = &[
    "id",
    "titulo",
    "descripcion",
    "categoria",
    "estado",
    "latitud",
    "longitud",
    "direccion",
    "activo",
    "created_at",
  ];

  fn fields(&self) -> Vec<String> {
    let r = self.reporte;
    vec![
      r.id.to_string(),
      r.fields.titulo.clone(),
      opt(&r.fields.descripcion),
      self.categoria.clone(),
      self.estado.clone(),
      opt(&r.fields.latitud),
      opt(&r.fields.longitud),
      opt(&r.fields.direccion),
      active(r.activo),
      dt(&r.created_at),
    ]
  }
}

impl CsvRow for ActivityRecord {
  const HEADER: &'static [&'static str] = &[
    "id",
    "created_at",
    "user_email",
    "activity_type",
    "tabla_nombre",
    "registro_id",
    "descripcion",
    "ip_address",
    "metadatos",
  ];

  fn fields(&self) -> Vec<String> {
    vec![
      self.id.to_string(),
      dt(&self.created_at),
      opt(&self.user_email),
      self.activity_type.to_string(),
      opt(&self.tabla_nombre),
      opt(&self.registro_id),
      self.descripcion.clone(),
      opt(&self.ip_address),
      self.metadatos.to_string(),
    ]
  }
}

impl CsvRow for ChangeRecord {
  const HEADER: &'static [&'static str] = &[
    "id",
    "created_at",
    "user_email",
    "operation_type",
    "tabla_nombre",
    "registro_id",
    "campos_modificados",
    "valores_anteriores",
    "valores_nuevos",
  ];

  fn fields(&self) -> Vec<String> {
    vec![
      self.id.to_string(),
      dt(&self.created_at),
      opt(&self.user_email),
      self.operation_type.to_string(),
      self.tabla_nombre.clone(),
      self.registro_id.to_string(),
      self.campos_modificados.join(";"),
      opt(&self.valores_anteriores),
      opt(&self.valores_nuevos),
    ]
  }
}

// ─── Round-trip tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod roundtrip_tests {
  use chrono::TimeZone;
  use georeport_core::{
    audit::ActivityType,
    entity::{CategoryFields, EstadoFields, Record, ReporteFields},
  };

  use super::*;

  fn record<F>(fields: F) -> Record<F> {
    let at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    Record {
      id: Uuid::new_v4(),
      fields,
      activo: true,
      created_at: at,
      updated_at: at,
      deleted_at: None,
    }
  }

  #[test]
  fn quoted_text_survives_export() {
    let cat = record(CategoryFields {
      nombre:      r#"He said "hi""#.into(),
      descripcion: Some("uno, dos\r\ntres".into()),
      color:       None,
      icono:       None,
    });
    let csv = serialize(std::slice::from_ref(&cat));
    assert!(csv.contains(r#""He said ""hi""""#));
    assert!(csv.ends_with("\r\n"));

    let table = parse(&csv).unwrap();
    assert_eq!(table.header, Category::HEADER);
    assert_eq!(table.rows, vec![cat.fields()]);
    assert_eq!(table.rows[0][1], r#"He said "hi""#);
  }

  #[test]
  fn reportes_export_resolved_names() {
    let cat = record(CategoryFields {
      nombre:      "Vialidad".into(),
      descripcion: None,
      color:       None,
      icono:       None,
    });
    let estado = record(EstadoFields {
      nombre:      "Pendiente".into(),
      descripcion: None,
      color:       None,
      orden:       0,
    });
    let orphan_estado = Uuid::new_v4();
    let reportes = vec![
      record(ReporteFields {
        titulo:      "Bache".into(),
        descripcion: None,
        category_id: cat.id,
        estado_id:   estado.id,
        user_id:     Uuid::new_v4(),
        assigned_to: None,
        latitud:     Some(9.5),
        longitud:    None,
        direccion:   None,
        imagenes:    vec![],
      }),
      record(ReporteFields {
        titulo:      "Poste caído".into(),
        descripcion: None,
        category_id: cat.id,
        estado_id:   orphan_estado,
        user_id:     Uuid::new_v4(),
        assigned_to: None,
        latitud:     None,
        longitud:    None,
        direccion:   None,
        imagenes:    vec![],
      }),
    ];

    let rows = ReporteRow::resolve(&reportes, &[cat], &[estado]);
    let table = parse(&serialize(&rows)).unwrap();
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[0][3], "Vialidad");
    assert_eq!(table.rows[0][4], "Pendiente");
    assert_eq!(table.rows[0][5], "9.5");
    assert_eq!(table.rows[0][6], "");
    assert_eq!(table.rows[1][4], orphan_estado.to_string());
  }

  #[test]
  fn activities_carry_json_metadata() {
    let a = ActivityRecord {
      id:            Uuid::new_v4(),
      user_id:       None,
      user_email:    Some("ana@example.com".into()),
      activity_type: ActivityType::Export,
      tabla_nombre:  Some("reportes".into()),
      registro_id:   None,
      descripcion:   "Exportación de reportes".into(),
      metadatos:     serde_json::json!({"rows": 2, "format": "csv"}),
      ip_address:    None,
      created_at:    Utc::now(),
    };
    let table = parse(&serialize(&[a])).unwrap();
    let meta: serde_json::Value = serde_json::from_str(&table.rows[0][8]).unwrap();
    assert_eq!(meta["rows"], 2);
    assert_eq!(table.rows[0][3], "export");
  }

  #[test]
  fn ragged_input_is_rejected() {
    let err = parse("\"a\",\"b\"\r\n\"1\"\r\n").unwrap_err();
    assert_eq!(err, Error::RaggedRecord { line: 2, expected: 2, found: 1 });

    let err = parse("\"a\",\"b\"\r\n\"uno\r\ndos\",\"x\"\r\n\"1\"\r\n").unwrap_err();
    assert_eq!(err, Error::RaggedRecord { line: 4, expected: 2, found: 1 });
  }

  #[test]
  fn dataset_names_parse() {
    assert_eq!("reportes".parse::<Dataset>().unwrap(), Dataset::Reportes);
    assert_eq!(Dataset::Changes.to_string(), "changes");
    assert!("facts".parse::<Dataset>().is_err());
  }
}
