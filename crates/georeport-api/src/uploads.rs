//! Pre-upload checks for reporte images.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/uploads/validate` | `200 {"folder": "..."}` or `400` with the rejection |
//!
//! The bytes themselves go to object storage; this endpoint only decides
//! whether a file is acceptable and which folder it belongs in.

use axum::{Json, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use georeport_core::media::{new_reporte_folder, update_folder, validate_file_upload};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::session::CurrentUser;

#[derive(Debug, Deserialize)]
pub struct UploadCheck {
  pub file_name:    String,
  pub size:         u64,
  pub content_type: String,
  /// Set when adding images to a saved reporte.
  pub reporte_id:   Option<Uuid>,
  /// Used to name the folder of a reporte not saved yet.
  #[serde(default)]
  pub titulo:       String,
  #[serde(default)]
  pub latitud:      f64,
  #[serde(default)]
  pub longitud:     f64,
}

/// `POST /uploads/validate`
pub async fn validate(_user: CurrentUser, Json(body): Json<UploadCheck>) -> impl IntoResponse {
  if let Err(rejection) = validate_file_upload(&body.file_name, body.size, &body.content_type) {
    tracing::debug!(file = %body.file_name, %rejection, "upload rejected");
    return (
      StatusCode::BAD_REQUEST,
      Json(json!({ "error": rejection.to_string(), "rejection": rejection })),
    );
  }
  let folder = match body.reporte_id {
    Some(id) => update_folder(id),
    None => new_reporte_folder(&body.titulo, body.latitud, body.longitud, Utc::now().timestamp()),
  };
  (StatusCode::OK, Json(json!({ "folder": folder })))
}
