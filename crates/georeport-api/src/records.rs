//! Handlers for the per-table record endpoints.
//!
//! Mounted once per table (`categories`, `estados`, `roles`, `reportes`,
//! `users`):
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/<table>` | Live rows, newest first |
//! | `POST`   | `/<table>` | Body: the row's fields; `201` |
//! | `GET`    | `/<table>/:id` | Deleted rows included; 404 if never existed |
//! | `PATCH`  | `/<table>/:id` | Body: any subset of the fields |
//! | `DELETE` | `/<table>/:id` | Soft delete; returns the deleted row |
//! | `POST`   | `/<table>/:id/toggle` | Flip `activo` |
//! | `POST`   | `/<table>/bulk` | Body: `{"action": {...}, "ids": [...]}` |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use georeport_core::{
  bulk::{BulkAction, BulkReport, run_bulk},
  entity::{Entity, Record},
  store::GeoStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{ApiState, error::ApiError, session::CurrentUser};

// ─── Reads ────────────────────────────────────────────────────────────────────

/// `GET /<table>`
pub async fn list<S, E>(
  State(state): State<ApiState<S>>,
  _user: CurrentUser,
) -> Result<Json<Vec<Record<E>>>, ApiError>
where
  S: GeoStore,
  E: Entity,
{
  let rows = state.store.list::<E>().await.map_err(ApiError::store)?;
  Ok(Json(rows))
}

/// `GET /<table>/:id`
pub async fn get_one<S, E>(
  State(state): State<ApiState<S>>,
  _user: CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<Record<E>>, ApiError>
where
  S: GeoStore,
  E: Entity,
{
  let record = state
    .store
    .get::<E>(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("{} {id} not found", E::KIND)))?;
  Ok(Json(record))
}

// ─── Writes ───────────────────────────────────────────────────────────────────

/// `POST /<table>`
pub async fn create<S, E>(
  State(state): State<ApiState<S>>,
  user: CurrentUser,
  Json(fields): Json<E>,
) -> Result<impl IntoResponse, ApiError>
where
  S: GeoStore,
  E: Entity,
{
  let record = state
    .store
    .insert(fields, Some(user.id))
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(record)))
}

/// `PATCH /<table>/:id`
pub async fn update<S, E>(
  State(state): State<ApiState<S>>,
  user: CurrentUser,
  Path(id): Path<Uuid>,
  Json(patch): Json<E::Patch>,
) -> Result<Json<Record<E>>, ApiError>
where
  S: GeoStore,
  E: Entity,
{
  let record = state
    .store
    .update::<E>(id, patch, Some(user.id))
    .await
    .map_err(ApiError::store)?;
  Ok(Json(record))
}

/// `DELETE /<table>/:id`
pub async fn remove<S, E>(
  State(state): State<ApiState<S>>,
  user: CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<Record<E>>, ApiError>
where
  S: GeoStore,
  E: Entity,
{
  let record = state
    .store
    .soft_delete::<E>(id, Some(user.id))
    .await
    .map_err(ApiError::store)?;
  Ok(Json(record))
}

/// `POST /<table>/:id/toggle`
pub async fn toggle<S, E>(
  State(state): State<ApiState<S>>,
  user: CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<Json<Record<E>>, ApiError>
where
  S: GeoStore,
  E: Entity,
{
  let record = state
    .store
    .toggle_active::<E>(id, Some(user.id))
    .await
    .map_err(ApiError::store)?;
  Ok(Json(record))
}

// ─── Bulk ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BulkBody {
  pub action:      BulkAction,
  pub ids:         Vec<Uuid>,
  /// Overrides the server's default worker pool size.
  pub concurrency: Option<usize>,
}

/// `POST /<table>/bulk`
///
/// Always `200` once the action is accepted; per-id failures are in the
/// report.
pub async fn bulk<S, E>(
  State(state): State<ApiState<S>>,
  user: CurrentUser,
  Json(body): Json<BulkBody>,
) -> Result<Json<BulkReport>, ApiError>
where
  S: GeoStore + 'static,
  E: Entity,
{
  let concurrency = body.concurrency.unwrap_or(state.bulk_concurrency);
  let report = run_bulk(
    state.store.clone(),
    E::KIND,
    body.action,
    body.ids,
    Some(user.id),
    concurrency,
  )
  .await
  .map_err(ApiError::store)?;
  tracing::info!(kind = %E::KIND, summary = %report.summary(), "bulk request finished");
  Ok(Json(report))
}
