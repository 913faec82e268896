//! Per-account limit on failed logins.
//!
//! After `max_attempts` failures inside a sliding `window`, further attempts
//! for that account are refused until the oldest failure ages out. A
//! successful login clears the account's history.

use std::{
  collections::HashMap,
  sync::Mutex,
  time::{Duration, Instant},
};

pub struct LoginThrottle {
  max_attempts: usize,
  window:       Duration,
  failures:     Mutex<HashMap<String, Vec<Instant>>>,
}

impl LoginThrottle {
  pub fn new(max_attempts: usize, window: Duration) -> Self {
    Self {
      max_attempts: max_attempts.max(1),
      window,
      failures: Mutex::new(HashMap::new()),
    }
  }

  fn key(account: &str) -> String { account.trim().to_lowercase() }

  /// Time until `account` may try again, or `None` if it is not locked.
  pub fn locked_for(&self, account: &str, now: Instant) -> Option<Duration> {
    let key = Self::key(account);
    let mut map = self.failures.lock().unwrap_or_else(|p| p.into_inner());
    let recent = map.get_mut(&key)?;
    recent.retain(|t| now.duration_since(*t) < self.window);
    if recent.is_empty() {
      map.remove(&key);
      return None;
    }
    if recent.len() < self.max_attempts {
      return None;
    }
    recent
      .first()
      .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
  }

  /// Record a failure; returns the number of failures inside the window.
  /// Accounts whose failures have all aged out are forgotten.
  pub fn record_failure(&self, account: &str, now: Instant) -> usize {
    let mut map = self.failures.lock().unwrap_or_else(|p| p.into_inner());
    map.retain(|_, recent| {
      recent.retain(|t| now.duration_since(*t) < self.window);
      !recent.is_empty()
    });
    let recent = map.entry(Self::key(account)).or_default();
    recent.push(now);
    recent.len()
  }

  /// Whether `count` failures just crossed the limit.
  pub fn is_limit(&self, count: usize) -> bool { count == self.max_attempts }

  pub fn clear(&self, account: &str) {
    let mut map = self.failures.lock().unwrap_or_else(|p| p.into_inner());
    map.remove(&Self::key(account));
  }

  #[cfg(test)]
  fn tracked(&self) -> usize {
    self.failures.lock().unwrap_or_else(|p| p.into_inner()).len()
  }
}
