//! HTTP server for GeoReport.
//!
//! Wraps the [`georeport_api`] router with HTTP Basic authentication against
//! the stored user credentials, a failed-login throttle, and request tracing.

pub mod auth;
pub mod error;
pub mod throttle;

pub use error::Error;

use std::{net::IpAddr, path::PathBuf, sync::Arc, time::Duration};

use axum::{Router, middleware, routing::get};
use georeport_api::{ApiState, api_router};
use georeport_core::{bulk::DEFAULT_BULK_CONCURRENCY, store::GeoStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use throttle::LoginThrottle;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `GEOREPORT_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub store_path:         PathBuf,
  #[serde(default = "default_bulk_concurrency")]
  pub bulk_concurrency:   usize,
  #[serde(default = "default_login_max_attempts")]
  pub login_max_attempts: usize,
  #[serde(default = "default_login_window_secs")]
  pub login_window_secs:  u64,
  /// Peers whose `x-forwarded-for` header is believed.
  #[serde(default)]
  pub trusted_proxies:    Vec<IpAddr>,
}

fn default_bulk_concurrency() -> usize { DEFAULT_BULK_CONCURRENCY }
fn default_login_max_attempts() -> usize { 5 }
fn default_login_window_secs() -> u64 { 15 * 60 }

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state for the auth layer.
pub struct AppState<S> {
  pub store:    Arc<S>,
  pub config:   Arc<ServerConfig>,
  pub throttle: Arc<LoginThrottle>,
}

impl<S> AppState<S> {
  pub fn new(store: Arc<S>, config: ServerConfig) -> Self {
    let throttle = LoginThrottle::new(
      config.login_max_attempts,
      Duration::from_secs(config.login_window_secs),
    );
    Self {
      store,
      config: Arc::new(config),
      throttle: Arc::new(throttle),
    }
  }
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:    self.store.clone(),
      config:   self.config.clone(),
      throttle: self.throttle.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application: `/api/*` behind Basic auth, `/health` open.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: GeoStore + 'static,
{
  let api = api_router(
    ApiState::new(state.store.clone()).with_bulk_concurrency(state.config.bulk_concurrency),
  );
  Router::new()
    .nest("/api", api)
    .layer(middleware::from_fn_with_state(state, auth::authenticate::<S>))
    .route("/health", get(|| async { "ok" }))
    .layer(TraceLayer::new_for_http())
}
