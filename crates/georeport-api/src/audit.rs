//! Read-only audit endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/audit/activities` | `?user_id&limit&offset` plus filter params |
//! | `GET`  | `/audit/changes` | `?tabla_nombre&registro_id&user_id&limit&offset` plus filter params |
//! | `POST` | `/audit/security-events` | Body: `{"event": "...", "details": {...}}`; `201` |
//!
//! Filter params (`search`, `activity_type`, `operation_type`, `user_email`)
//! narrow the page the RPC returned; they never widen the query. `limit=0`
//! asks for everything up to the server cap.

use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use georeport_core::{
  audit::{
    ActivityRecord, ActivityType, AuditFilter, AuditQuery, ChangeRecord, OperationType,
  },
  store::GeoStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiState, error::ApiError, session::CurrentUser};

/// Query string accepted by both audit reads.
#[derive(Debug, Default, Deserialize)]
pub struct AuditParams {
  pub tabla_nombre:   Option<String>,
  pub registro_id:    Option<Uuid>,
  pub user_id:        Option<Uuid>,
  pub limit:          Option<u32>,
  pub offset:         Option<u32>,
  pub search:         Option<String>,
  pub activity_type:  Option<ActivityType>,
  pub operation_type: Option<OperationType>,
  pub user_email:     Option<String>,
}

impl AuditParams {
  fn split(self) -> (AuditQuery, AuditFilter) {
    let query = AuditQuery {
      tabla_nombre: self.tabla_nombre,
      registro_id:  self.registro_id,
      user_id:      self.user_id,
      limit:        self.limit,
      offset:       self.offset.unwrap_or(0),
    };
    let filter = AuditFilter {
      search:         self.search.filter(|s| !s.trim().is_empty()),
      activity_type:  self.activity_type,
      operation_type: self.operation_type,
      user_email:     self.user_email.filter(|s| !s.trim().is_empty()),
    };
    (query, filter)
  }
}

/// One page of audit rows after filtering.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuditPage<R> {
  pub rows:    Vec<R>,
  /// Rows the RPC returned before the filter ran. A full page
  /// (`fetched == limit`) means there may be more.
  pub fetched: usize,
  pub limit:   u32,
  pub offset:  u32,
}

/// `GET /audit/activities`
pub async fn activities<S>(
  State(state): State<ApiState<S>>,
  _user: CurrentUser,
  Query(params): Query<AuditParams>,
) -> Result<Json<AuditPage<ActivityRecord>>, ApiError>
where
  S: GeoStore,
{
  let (query, filter) = params.split();
  let page = state
    .store
    .get_user_activities(&query)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(AuditPage {
    fetched: page.len(),
    rows:    filter.apply(&page),
    limit:   query.request_limit(),
    offset:  query.offset,
  }))
}

/// `GET /audit/changes`
pub async fn changes<S>(
  State(state): State<ApiState<S>>,
  _user: CurrentUser,
  Query(params): Query<AuditParams>,
) -> Result<Json<AuditPage<ChangeRecord>>, ApiError>
where
  S: GeoStore,
{
  let (query, filter) = params.split();
  let page = state
    .store
    .get_change_history(&query)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(AuditPage {
    fetched: page.len(),
    rows:    filter.apply(&page),
    limit:   query.request_limit(),
    offset:  query.offset,
  }))
}

#[derive(Debug, Deserialize)]
pub struct SecurityEventBody {
  pub event:   String,
  #[serde(default)]
  pub details: serde_json::Value,
}

/// `POST /audit/security-events`
pub async fn security_event<S>(
  State(state): State<ApiState<S>>,
  user: CurrentUser,
  Json(body): Json<SecurityEventBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: GeoStore,
{
  if body.event.trim().is_empty() {
    return Err(ApiError::BadRequest("event must not be empty".into()));
  }
  let record = state
    .store
    .log_security_event(Some(user.id), &body.event, body.details)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(record)))
}
