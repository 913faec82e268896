//! CSV downloads.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/export/<dataset>.csv` | `reportes`, `categories`, `estados`, `users`, `activities`, `changes` |
//!
//! Every download is recorded with `log_data_export`, including the SHA-256
//! of the bytes handed out (also sent as `x-content-sha256`). Audit datasets
//! export the most recent [`MAX_AUDIT_LIMIT`] rows.

use axum::{
  extract::{Path, State},
  http::{HeaderValue, header},
  response::{IntoResponse, Response},
};
use georeport_core::{
  audit::{AuditQuery, MAX_AUDIT_LIMIT},
  entity::{CategoryFields, EstadoFields, ReporteFields, UserFields},
  store::GeoStore,
};
use georeport_csv::{Dataset, ReporteRow, serialize};
use sha2::{Digest, Sha256};

use crate::{ApiState, error::ApiError, session::CurrentUser};

pub const CONTENT_SHA256: &str = "x-content-sha256";

/// `GET /export/:dataset.csv`
pub async fn download<S>(
  State(state): State<ApiState<S>>,
  user: CurrentUser,
  Path(file): Path<String>,
) -> Result<Response, ApiError>
where
  S: GeoStore,
{
  let dataset: Dataset = file
    .strip_suffix(".csv")
    .and_then(|name| name.parse().ok())
    .ok_or_else(|| ApiError::NotFound(format!("no export named {file}")))?;

  let (rows, body) = render(state.store.as_ref(), dataset).await?;
  let digest = hex::encode(Sha256::digest(body.as_bytes()));

  state
    .store
    .log_data_export(Some(user.id), &dataset.to_string(), rows, &digest)
    .await
    .map_err(ApiError::store)?;
  tracing::info!(%dataset, rows, user = %user.email, "csv export");

  let mut resp = body.into_response();
  let headers = resp.headers_mut();
  headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/csv; charset=utf-8"));
  if let Ok(v) = HeaderValue::from_str(&format!("attachment; filename=\"{dataset}.csv\"")) {
    headers.insert(header::CONTENT_DISPOSITION, v);
  }
  if let Ok(v) = HeaderValue::from_str(&digest) {
    headers.insert(CONTENT_SHA256, v);
  }
  Ok(resp)
}

/// Serialize one dataset; returns the row count and the CSV text.
async fn render<S: GeoStore>(store: &S, dataset: Dataset) -> Result<(usize, String), ApiError> {
  let everything = AuditQuery { limit: Some(0), ..AuditQuery::default() };
  Ok(match dataset {
    Dataset::Reportes => {
      let reportes = store.list::<ReporteFields>().await.map_err(ApiError::store)?;
      let categories = store.list::<CategoryFields>().await.map_err(ApiError::store)?;
      let estados = store.list::<EstadoFields>().await.map_err(ApiError::store)?;
      let rows = ReporteRow::resolve(&reportes, &categories, &estados);
      (rows.len(), serialize(&rows))
    }
    Dataset::Categories => {
      let rows = store.list::<CategoryFields>().await.map_err(ApiError::store)?;
      (rows.len(), serialize(&rows))
    }
    Dataset::Estados => {
      let rows = store.list::<EstadoFields>().await.map_err(ApiError::store)?;
      (rows.len(), serialize(&rows))
    }
    Dataset::Users => {
      let rows = store.list::<UserFields>().await.map_err(ApiError::store)?;
      (rows.len(), serialize(&rows))
    }
    Dataset::Activities => {
      let rows = store
        .get_user_activities(&everything)
        .await
        .map_err(ApiError::store)?;
      (rows.len(), serialize(&rows))
    }
    Dataset::Changes => {
      let rows = store
        .get_change_history(&everything)
        .await
        .map_err(ApiError::store)?;
      (rows.len(), serialize(&rows))
    }
  })
}
