//! # KPI Metrics Database Crate
//!
//! This crate is the storage adapter of the KPI engine. It reads bucketed metric
//! statistics from the raw tables and their rollups.
//!
//! ## Architectural Principles
//!
//! - **Layer 3 Adapter:** All SQL lives here. Handlers see only the `MetricStore` trait,
//!   which keeps them testable without a database.
//! - **Asynchronous & Pooled:** All operations are asynchronous, and it uses a
//!   connection pool (`PgPool`) for concurrent database access.
//!
//! ## Public API
//!
//! - `connect`: The async function to establish the database connection pool.
//! - `MetricStore`: The storage trait, with `BucketQuery` and `BucketRow`.
//! - `DbRepository`: The Postgres implementation of `MetricStore`.
//! - `DbError`: The specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod connection;
pub mod error;
pub mod repository;
pub mod store;

// Re-export the key components to create a clean, public-facing API.
pub use connection::connect;
pub use error::DbError;
pub use repository::{DbRepository, build_bucket_sql};
pub use store::{BucketQuery, BucketRow, MetricStore};
