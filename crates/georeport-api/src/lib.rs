//! JSON REST API for GeoReport.
//!
//! Exposes an axum [`Router`] backed by any [`georeport_core::store::GeoStore`].
//! Authentication, TLS, and transport concerns are the caller's
//! responsibility: the server authenticates each request and inserts a
//! [`CurrentUser`] into its extensions before it reaches these handlers.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", georeport_api::api_router(ApiState::new(store.clone())))
//! ```

pub mod audit;
pub mod error;
pub mod export;
pub mod notifications;
pub mod records;
pub mod session;
pub mod uploads;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post},
};
use georeport_core::{
  bulk::DEFAULT_BULK_CONCURRENCY,
  entity::{CategoryFields, Entity, EstadoFields, ReporteFields, RoleFields, UserFields},
  store::GeoStore,
};

pub use error::ApiError;
pub use session::CurrentUser;

/// Shared handler state.
pub struct ApiState<S> {
  pub store:            Arc<S>,
  /// Worker pool size for bulk requests that do not ask for one.
  pub bulk_concurrency: usize,
}

impl<S> ApiState<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store, bulk_concurrency: DEFAULT_BULK_CONCURRENCY }
  }

  pub fn with_bulk_concurrency(mut self, n: usize) -> Self {
    self.bulk_concurrency = n.max(1);
    self
  }
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), bulk_concurrency: self.bulk_concurrency }
  }
}

/// Build a fully-materialised API router over `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: ApiState<S>) -> Router<()>
where
  S: GeoStore + 'static,
{
  let router = Router::new();
  let router = table_routes::<S, CategoryFields>(router);
  let router = table_routes::<S, EstadoFields>(router);
  let router = table_routes::<S, RoleFields>(router);
  let router = table_routes::<S, ReporteFields>(router);
  let router = table_routes::<S, UserFields>(router);

  router
    // Session
    .route("/auth/login", post(session::login::<S>))
    .route("/auth/logout", post(session::logout::<S>))
    // Notifications
    .route("/notifications", get(notifications::list::<S>))
    .route("/notifications/read-all", post(notifications::read_all::<S>))
    .route("/notifications/stream", get(notifications::stream::<S>))
    .route("/notifications/{id}", delete(notifications::remove::<S>))
    .route("/notifications/{id}/read", post(notifications::set_read::<S>))
    // Audit
    .route("/audit/activities", get(audit::activities::<S>))
    .route("/audit/changes", get(audit::changes::<S>))
    .route("/audit/security-events", post(audit::security_event::<S>))
    // Export and uploads
    .route("/export/{file}", get(export::download::<S>))
    .route("/uploads/validate", post(uploads::validate))
    .with_state(state)
}

/// Record routes for one table, mounted at `/<table>`.
fn table_routes<S, E>(router: Router<ApiState<S>>) -> Router<ApiState<S>>
where
  S: GeoStore + 'static,
  E: Entity,
{
  let base = format!("/{}", E::KIND.table());
  router
    .route(&base, get(records::list::<S, E>).post(records::create::<S, E>))
    .route(&format!("{base}/bulk"), post(records::bulk::<S, E>))
    .route(
      &format!("{base}/{{id}}"),
      get(records::get_one::<S, E>)
        .patch(records::update::<S, E>)
        .delete(records::remove::<S, E>),
    )
    .route(&format!("{base}/{{id}}/toggle"), post(records::toggle::<S, E>))
}
