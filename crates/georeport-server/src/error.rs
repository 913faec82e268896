//! Error types and axum `IntoResponse` implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unauthorized")]
  Unauthorized,
  #[error("too many failed logins; retry in {retry_after} seconds")]
  TooManyRequests { retry_after: u64 },
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    match self {
      Error::Unauthorized => {
        let mut res = (
          StatusCode::UNAUTHORIZED,
          Json(json!({ "error": "authentication required" })),
        )
          .into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"georeport\""),
        );
        res
      }
      Error::TooManyRequests { retry_after } => {
        let message = self.to_string();
        let mut res =
          (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "error": message }))).into_response();
        res.headers_mut().insert(header::RETRY_AFTER, HeaderValue::from(retry_after));
        res
      }
      Error::Store(e) => {
        tracing::error!(error = %e, "store failure during authentication");
        (
          StatusCode::INTERNAL_SERVER_ERROR,
          Json(json!({ "error": e.to_string() })),
        )
          .into_response()
      }
    }
  }
}
