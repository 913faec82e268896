//! The authenticated caller, and the login/logout audit endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/auth/login`  | Records a `login` activity; returns the caller's user row |
//! | `POST` | `/auth/logout` | Records a `logout` activity; `204` |

use axum::{
  Json,
  extract::{FromRequestParts, State},
  http::{StatusCode, request::Parts},
};
use georeport_core::{
  entity::{User, UserFields},
  store::GeoStore,
};
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

/// Who is making the request. Inserted into the request extensions by the
/// server's auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
  pub id:    Uuid,
  pub email: String,
  /// Peer address, when the transport knows it.
  pub ip:    Option<String>,
}

impl<St> FromRequestParts<St> for CurrentUser
where
  St: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
    parts
      .extensions
      .get::<CurrentUser>()
      .cloned()
      .ok_or(ApiError::Unauthorized)
  }
}

/// `POST /auth/login`
pub async fn login<S>(
  State(state): State<ApiState<S>>,
  user: CurrentUser,
) -> Result<Json<User>, ApiError>
where
  S: GeoStore,
{
  state
    .store
    .log_user_login(user.id, user.ip.clone())
    .await
    .map_err(ApiError::store)?;
  let record = state
    .store
    .get::<UserFields>(user.id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("user {} not found", user.id)))?;
  Ok(Json(record))
}

/// `POST /auth/logout`
pub async fn logout<S>(
  State(state): State<ApiState<S>>,
  user: CurrentUser,
) -> Result<StatusCode, ApiError>
where
  S: GeoStore,
{
  state
    .store
    .log_user_logout(user.id, user.ip)
    .await
    .map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}
