//! HTTP Basic authentication against stored argon2 hashes.
//!
//! The username is the account email. Every failed attempt counts against
//! the account in the [`LoginThrottle`](crate::throttle::LoginThrottle); the
//! attempt that reaches the limit is recorded as a security event.

use std::{
  net::{IpAddr, SocketAddr},
  time::Instant,
};

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::{ConnectInfo, Request, State},
  http::HeaderMap,
  middleware::Next,
  response::Response,
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use georeport_api::CurrentUser;
use georeport_core::store::GeoStore;
use serde_json::json;

use crate::{AppState, error::Error};

/// Split a `Basic` authorization header into `(username, password)`.
pub fn basic_credentials(headers: &HeaderMap) -> Result<(String, String), Error> {
  let header_val = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(Error::Unauthorized)?;

  let encoded = header_val.strip_prefix("Basic ").ok_or(Error::Unauthorized)?;
  let decoded = B64.decode(encoded).map_err(|_| Error::Unauthorized)?;
  let creds = String::from_utf8(decoded).map_err(|_| Error::Unauthorized)?;

  let (username, password) = creds.split_once(':').ok_or(Error::Unauthorized)?;
  Ok((username.to_string(), password.to_string()))
}

/// Check `password` against an argon2 PHC string.
pub fn password_matches(password: &str, phc: &str) -> bool {
  PasswordHash::new(phc)
    .and_then(|hash| Argon2::default().verify_password(password.as_bytes(), &hash))
    .is_ok()
}

/// The caller's address. `x-forwarded-for` is only believed when the peer is
/// one of `trusted_proxies`; then the rightmost hop that is not itself a
/// trusted proxy is the client.
fn client_ip(req: &Request, trusted_proxies: &[IpAddr]) -> Option<String> {
  let peer = req
    .extensions()
    .get::<ConnectInfo<SocketAddr>>()
    .map(|ConnectInfo(addr)| addr.ip());

  let forwarded = peer
    .filter(|p| trusted_proxies.contains(p))
    .and_then(|_| req.headers().get("x-forwarded-for"))
    .and_then(|v| v.to_str().ok())
    .and_then(|v| {
      v.rsplit(',')
        .map(str::trim)
        .filter_map(|hop| hop.parse::<IpAddr>().ok())
        .find(|hop| !trusted_proxies.contains(hop))
    });

  forwarded.or(peer).map(|ip| ip.to_string())
}

/// Middleware: authenticate, then hand the request on with a
/// [`CurrentUser`] in its extensions.
pub async fn authenticate<S>(
  State(state): State<AppState<S>>,
  mut req: Request,
  next: Next,
) -> Result<Response, Error>
where
  S: GeoStore + 'static,
{
  let (email, password) = basic_credentials(req.headers())?;
  let ip = client_ip(&req, &state.config.trusted_proxies);
  let now = Instant::now();

  if let Some(wait) = state.throttle.locked_for(&email, now) {
    tracing::warn!(%email, "login refused: account throttled");
    return Err(Error::TooManyRequests { retry_after: wait.as_secs().max(1) });
  }

  let found = state
    .store
    .find_credentials(&email)
    .await
    .map_err(|e| Error::Store(Box::new(e)))?;

  let user = match found {
    Some((user, phc)) if user.activo && password_matches(&password, &phc) => user,
    found => {
      let failures = state.throttle.record_failure(&email, now);
      tracing::debug!(%email, failures, "login failed");
      if state.throttle.is_limit(failures) {
        let actor = found.map(|(user, _)| user.id);
        let details = json!({
          "email": email,
          "attempts": failures,
          "window_secs": state.config.login_window_secs,
          "ip_address": ip,
        });
        if let Err(e) = state
          .store
          .log_security_event(actor, "Intentos de inicio de sesión fallidos", details)
          .await
        {
          tracing::warn!(error = %e, "could not record security event");
        }
      }
      return Err(Error::Unauthorized);
    }
  };

  state.throttle.clear(&email);
  req.extensions_mut().insert(CurrentUser {
    id: user.id,
    email: user.fields.email,
    ip,
  });
  Ok(next.run(req).await)
}
