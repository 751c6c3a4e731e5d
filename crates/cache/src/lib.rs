//! SQLite-backed persistent geocode cache.
//!
//! This crate provides the cross-run cache behind the
//! [`GeoCache`](snapsort_geo::GeoCache) capability. The database is not the
//! source of truth for anything — if it is deleted, the only cost is
//! re-querying the geocoding providers on the next run.
//!
//! # Architecture
//! One table, one row per quantization cell:
//! - **resolved** rows carry the normalized place (name, granularity and the
//!   address components it was derived from);
//! - **failed** rows record that every provider failed for this cell, plus a
//!   retry-after timestamp. A failed row whose embargo has elapsed reads as
//!   a cache miss.

mod db;
pub mod error;
mod model;
mod repo;

pub use crate::db::Database;
pub use crate::repo::{CacheStats, Repository};
