//! Core types and trait definitions for GeoReport, a civic issue-reporting
//! system.
//!
//! This crate is free of HTTP and database dependencies. It holds the domain
//! records, the [`store::GeoStore`] backend abstraction, and the client-side
//! orchestration built on it: multi-row selection, bulk actions, the shared
//! realtime notification subscription, and the audit filter layer.

// Native `async fn` in traits; the `Send` bounds are spelled out on the trait.
#![allow(async_fn_in_trait)]

pub mod audit;
pub mod bulk;
pub mod entity;
pub mod error;
pub mod media;
pub mod notification;
pub mod realtime;
pub mod selection;
pub mod store;

#[cfg(test)]
mod testing;

pub use error::{ClassifyError, Error, ErrorClass, Result};
