//! Error types for `georeport-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::entity::EntityKind;

#[derive(Debug, Error)]
pub enum Error {
  #[error("{kind} not found: {id}")]
  NotFound { kind: EntityKind, id: Uuid },

  #[error("{kind} {id} is deleted")]
  Deleted { kind: EntityKind, id: Uuid },

  #[error("notification not found: {0}")]
  NotificationNotFound(Uuid),

  #[error("validation failed: {0}")]
  Validation(String),

  #[error("action {action} does not apply to {kind}")]
  UnsupportedAction {
    action: &'static str,
    kind:   EntityKind,
  },

  #[error("unknown {kind} discriminant: {value:?}")]
  UnknownVariant { kind: &'static str, value: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn validation(msg: impl Into<String>) -> Self {
    Self::Validation(msg.into())
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Classification ──────────────────────────────────────────────────────────

/// Coarse error classes shared by every layer, so the API can pick a status
/// code without knowing which backend produced the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
  /// Rejected before touching storage.
  Validation,
  NotFound,
  /// The target exists but is in the wrong state (e.g. already deleted).
  Conflict,
  Internal,
}

pub trait ClassifyError {
  fn class(&self) -> ErrorClass;
}

impl ClassifyError for Error {
  fn class(&self) -> ErrorClass {
    match self {
      Error::NotFound { .. } | Error::NotificationNotFound(_) => ErrorClass::NotFound,
      Error::Deleted { .. } => ErrorClass::Conflict,
      Error::Validation(_) | Error::UnsupportedAction { .. } | Error::UnknownVariant { .. } => {
        ErrorClass::Validation
      }
      Error::Serialization(_) => ErrorClass::Internal,
    }
  }
}
