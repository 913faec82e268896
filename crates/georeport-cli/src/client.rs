//! Async HTTP client wrapping the GeoReport JSON API.

use std::time::Duration;

use anyhow::{Context, Result};
use georeport_core::{
  audit::{ActivityRecord, AuditFilter, AuditQuery},
  bulk::{BulkAction, BulkReport},
  entity::{Entity, Record, User},
  notification::Notification,
};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use uuid::Uuid;

/// Connection settings for the GeoReport API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
  pub username: String,
  pub password: String,
}

/// A non-success response, with the server's `{"error": ...}` message.
#[derive(Debug, thiserror::Error)]
#[error("{what} → {status}: {message}")]
pub struct ApiFailure {
  pub what:    String,
  pub status:  StatusCode,
  pub message: String,
}

impl ApiFailure {
  /// Whether the server refused the credentials or throttled them.
  pub fn is_auth(&self) -> bool {
    matches!(self.status, StatusCode::UNAUTHORIZED | StatusCode::TOO_MANY_REQUESTS)
  }
}

/// One filtered page from `/audit/activities`.
#[derive(Debug, Deserialize)]
pub struct AuditPage<R> {
  pub rows:    Vec<R>,
  pub fetched: usize,
  pub limit:   u32,
  pub offset:  u32,
}

/// Async HTTP client for the GeoReport JSON REST API.
///
/// Cheap to clone: both inner [`reqwest::Client`]s are `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  /// No overall timeout: the notification stream stays open indefinitely.
  stream: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .context("failed to build HTTP client")?;
    let stream = Client::builder()
      .connect_timeout(Duration::from_secs(10))
      .build()
      .context("failed to build streaming HTTP client")?;
    Ok(Self { client, stream, config })
  }

  pub fn username(&self) -> &str { &self.config.username }

  fn url(&self, path: &str) -> String {
    format!("{}/api{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    if self.config.username.is_empty() {
      req
    } else {
      req.basic_auth(&self.config.username, Some(&self.config.password))
    }
  }

  async fn check(what: &str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
      return Ok(resp);
    }
    let message = resp
      .json::<serde_json::Value>()
      .await
      .ok()
      .and_then(|v| v["error"].as_str().map(str::to_string))
      .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
    Err(ApiFailure { what: what.to_string(), status, message }.into())
  }

  async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
    let what = format!("GET {path}");
    let resp = self
      .auth(self.client.get(self.url(path)))
      .send()
      .await
      .with_context(|| format!("{what} failed"))?;
    Self::check(&what, resp)
      .await?
      .json()
      .await
      .with_context(|| format!("deserialising {path}"))
  }

  async fn post_json<T: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T> {
    let what = format!("POST {path}");
    let resp = self
      .auth(self.client.post(self.url(path)))
      .json(&body)
      .send()
      .await
      .with_context(|| format!("{what} failed"))?;
    Self::check(&what, resp)
      .await?
      .json()
      .await
      .with_context(|| format!("deserialising {path}"))
  }

  // ── Session ───────────────────────────────────────────────────────────────

  /// `POST /api/auth/login`: verifies the credentials and returns the
  /// caller's user row.
  pub async fn login(&self) -> Result<User> { self.post_json("/auth/login", json!({})).await }

  /// `POST /api/auth/logout`
  pub async fn logout(&self) -> Result<()> {
    let resp = self
      .auth(self.client.post(self.url("/auth/logout")))
      .send()
      .await
      .context("POST /auth/logout failed")?;
    Self::check("POST /auth/logout", resp).await?;
    Ok(())
  }

  // ── Records ───────────────────────────────────────────────────────────────

  /// `GET /api/<table>`
  pub async fn list<E: Entity>(&self) -> Result<Vec<Record<E>>> {
    self.get_json(&format!("/{}", E::KIND.table())).await
  }

  /// `POST /api/<table>/bulk`
  pub async fn bulk<E: Entity>(&self, action: &BulkAction, ids: &[Uuid]) -> Result<BulkReport> {
    self
      .post_json(
        &format!("/{}/bulk", E::KIND.table()),
        json!({ "action": action, "ids": ids }),
      )
      .await
  }

  // ── Notifications ─────────────────────────────────────────────────────────

  /// `GET /api/notifications`
  pub async fn notifications(&self) -> Result<Vec<Notification>> {
    self.get_json("/notifications").await
  }

  /// `POST /api/notifications/<id>/read`
  pub async fn set_read(&self, id: Uuid, read: bool) -> Result<Notification> {
    self
      .post_json(&format!("/notifications/{id}/read"), json!({ "read": read }))
      .await
  }

  /// `POST /api/notifications/read-all`
  pub async fn mark_all_read(&self) -> Result<usize> {
    let body: serde_json::Value = self.post_json("/notifications/read-all", json!({})).await?;
    Ok(body["updated"].as_u64().unwrap_or(0) as usize)
  }

  /// `DELETE /api/notifications/<id>`
  pub async fn delete_notification(&self, id: Uuid) -> Result<()> {
    let path = format!("/notifications/{id}");
    let resp = self
      .auth(self.client.delete(self.url(&path)))
      .send()
      .await
      .with_context(|| format!("DELETE {path} failed"))?;
    Self::check(&format!("DELETE {path}"), resp).await?;
    Ok(())
  }

  /// `GET /api/notifications/stream`: the open response, to be read chunk
  /// by chunk.
  pub async fn open_stream(&self) -> Result<Response> {
    let resp = self
      .auth(self.stream.get(self.url("/notifications/stream")))
      .header(reqwest::header::ACCEPT, "text/event-stream")
      .send()
      .await
      .context("GET /notifications/stream failed")?;
    Self::check("GET /notifications/stream", resp).await
  }

  // ── Audit ─────────────────────────────────────────────────────────────────

  /// `GET /api/audit/activities`
  pub async fn activities(
    &self,
    query: &AuditQuery,
    filter: &AuditFilter,
  ) -> Result<AuditPage<ActivityRecord>> {
    let mut params: Vec<(&str, String)> = vec![("offset", query.offset.to_string())];
    if let Some(limit) = query.limit {
      params.push(("limit", limit.to_string()));
    }
    if let Some(user_id) = query.user_id {
      params.push(("user_id", user_id.to_string()));
    }
    if let Some(search) = &filter.search {
      params.push(("search", search.clone()));
    }
    if let Some(t) = filter.activity_type {
      params.push(("activity_type", t.to_string()));
    }
    if let Some(email) = &filter.user_email {
      params.push(("user_email", email.clone()));
    }

    let resp = self
      .auth(self.client.get(self.url("/audit/activities")))
      .query(&params)
      .send()
      .await
      .context("GET /audit/activities failed")?;
    Self::check("GET /audit/activities", resp)
      .await?
      .json()
      .await
      .context("deserialising activities")
  }

  // ── Export ────────────────────────────────────────────────────────────────

  /// `GET /api/export/<dataset>.csv`: the CSV text.
  pub async fn export(&self, dataset: &str) -> Result<String> {
    let path = format!("/export/{dataset}.csv");
    let resp = self
      .auth(self.client.get(self.url(&path)))
      .send()
      .await
      .with_context(|| format!("GET {path} failed"))?;
    Self::check(&format!("GET {path}"), resp)
      .await?
      .text()
      .await
      .context("reading export body")
  }
}
