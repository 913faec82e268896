//! SQLite backend for GeoReport.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Besides plain storage this crate plays
//! the part of the backend's row triggers: every write appends to the change
//! history and the activity log and may create notifications, all inside the
//! same transaction as the write itself.

mod encode;
mod schema;
mod store;
mod write;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
