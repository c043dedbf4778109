use crate::error::DbError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::TimeRange;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// A request for per-bucket statistics of one metric from one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketQuery {
    /// Fully resolved table name, including any rollup suffix.
    pub table: String,
    /// A Postgres interval literal such as `1m` or `1 hour`.
    pub bucket: String,
    pub metric: String,
    pub range: TimeRange,
    pub filters: BTreeMap<String, String>,
}

/// The statistics of one time bucket.
///
/// Carrying sum and count separately lets callers compute an exact average across
/// buckets of any width.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketRow {
    pub bucket: DateTime<Utc>,
    pub sum: Decimal,
    pub count: i64,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
}

/// The storage seam handlers read metric data through.
///
/// `Send + Sync` are required because one store is shared by every handler task.
#[async_trait]
pub trait MetricStore: Send + Sync {
    async fn fetch_buckets(&self, query: &BucketQuery) -> Result<Vec<BucketRow>, DbError>;
}
