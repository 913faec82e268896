//! Error type for `georeport-store-sqlite`.

use georeport_core::{
  ClassifyError, ErrorClass,
  entity::EntityKind,
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] georeport_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A foreign key names a row that is missing or soft deleted.
  #[error("{kind} {id} does not exist or is deleted")]
  BrokenReference { kind: EntityKind, id: Uuid },

  #[error("email already in use: {0}")]
  DuplicateEmail(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl ClassifyError for Error {
  fn class(&self) -> ErrorClass {
    match self {
      Error::Core(e) => e.class(),
      Error::BrokenReference { .. } => ErrorClass::Validation,
      Error::DuplicateEmail(_) => ErrorClass::Conflict,
      Error::Database(_)
      | Error::Sqlite(_)
      | Error::Json(_)
      | Error::Uuid(_)
      | Error::DateParse(_) => ErrorClass::Internal,
    }
  }
}
