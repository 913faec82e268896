//! Handlers for the caller's own notifications.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/notifications` | Newest first |
//! | `POST`   | `/notifications/:id/read` | Body: `{"read": bool}` (default `true`) |
//! | `POST`   | `/notifications/read-all` | Returns `{"updated": n}` |
//! | `DELETE` | `/notifications/:id` | Hard delete; `204` |
//! | `GET`    | `/notifications/stream` | Server-sent events, one per change |

use std::convert::Infallible;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::sse::{Event, KeepAlive, Sse},
};
use georeport_core::{notification::Notification, store::GeoStore};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_stream::{
  Stream, StreamExt as _,
  wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
};
use uuid::Uuid;

use crate::{ApiState, error::ApiError, session::CurrentUser};

/// `GET /notifications`
pub async fn list<S>(
  State(state): State<ApiState<S>>,
  user: CurrentUser,
) -> Result<Json<Vec<Notification>>, ApiError>
where
  S: GeoStore,
{
  let rows = state
    .store
    .list_notifications(user.id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct ReadBody {
  #[serde(default = "default_read")]
  pub read: bool,
}

fn default_read() -> bool { true }

/// `POST /notifications/:id/read`
pub async fn set_read<S>(
  State(state): State<ApiState<S>>,
  user: CurrentUser,
  Path(id): Path<Uuid>,
  Json(body): Json<ReadBody>,
) -> Result<Json<Notification>, ApiError>
where
  S: GeoStore,
{
  let n = state
    .store
    .set_notification_read(id, user.id, body.read)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(n))
}

/// `POST /notifications/read-all`
pub async fn read_all<S>(
  State(state): State<ApiState<S>>,
  user: CurrentUser,
) -> Result<Json<Value>, ApiError>
where
  S: GeoStore,
{
  let updated = state
    .store
    .mark_all_read(user.id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(json!({ "updated": updated })))
}

/// `DELETE /notifications/:id`
pub async fn remove<S>(
  State(state): State<ApiState<S>>,
  user: CurrentUser,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: GeoStore,
{
  state
    .store
    .delete_notification(id, user.id)
    .await
    .map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}

/// `GET /notifications/stream`
///
/// Each change to one of the caller's notifications becomes an event named
/// after the change (`INSERT`, `UPDATE`, `DELETE`) whose data is the JSON
/// [`georeport_core::notification::NotificationEvent`].
pub async fn stream<S>(
  State(state): State<ApiState<S>>,
  user: CurrentUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
  S: GeoStore,
{
  let user_id = user.id;
  tracing::debug!(%user_id, "notification stream opened");
  let events = BroadcastStream::new(state.store.notification_events()).filter_map(
    move |item| match item {
      Ok(event) if event.user_id == user_id => Event::default()
        .event(event.event.to_string())
        .json_data(&event)
        .ok()
        .map(Ok),
      Ok(_) => None,
      Err(BroadcastStreamRecvError::Lagged(missed)) => {
        tracing::warn!(%user_id, missed, "notification stream lagged");
        None
      }
    },
  );
  Sse::new(events).keep_alive(KeepAlive::default())
}
