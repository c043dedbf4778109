use crate::DbError;
use crate::store::{BucketQuery, BucketRow, MetricStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use sqlx::postgres::PgPool;

/// The `DbRepository` reads metric buckets from the raw table and its rollups.
///
/// Every tier shares the same shape: a `ts` timestamp, a `metric` name, a numeric
/// `value` and a `dimensions` JSONB column. Rollup rows are kept in sync by an external
/// process.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricStore for DbRepository {
    async fn fetch_buckets(&self, query: &BucketQuery) -> Result<Vec<BucketRow>, DbError> {
        let sql = build_bucket_sql(&query.table, query.filters.len())?;

        let mut statement = sqlx::query(&sql)
            .bind(&query.bucket)
            .bind(&query.metric)
            .bind(query.range.start)
            .bind(query.range.end);
        for (dimension, value) in &query.filters {
            statement = statement.bind(dimension).bind(value);
        }

        let rows = statement.fetch_all(&self.pool).await?;
        tracing::debug!(table = %query.table, rows = rows.len(), "Fetched metric buckets.");

        rows.into_iter()
            .map(|row| -> Result<BucketRow, DbError> {
                Ok(BucketRow {
                    bucket: row.try_get::<DateTime<Utc>, _>("bucket")?,
                    sum: row.try_get::<Decimal, _>("sum")?,
                    count: row.try_get::<i64, _>("count")?,
                    min: row.try_get::<Option<Decimal>, _>("min")?,
                    max: row.try_get::<Option<Decimal>, _>("max")?,
                })
            })
            .collect()
    }
}

/// Builds the bucketed aggregate query for `table`.
///
/// Table names cannot be bound as parameters, so they are checked against a strict
/// identifier grammar before being interpolated. Everything else is a bind parameter:
/// `$1` bucket, `$2` metric, `$3`/`$4` range, then one `(dimension, value)` pair per filter.
pub fn build_bucket_sql(table: &str, filter_count: usize) -> Result<String, DbError> {
    if !is_identifier(table) {
        return Err(DbError::InvalidIdentifier(table.to_string()));
    }

    let mut sql = format!(
        "SELECT time_bucket($1::interval, ts) AS bucket, \
         COALESCE(SUM(value), 0) AS sum, COUNT(value) AS count, \
         MIN(value) AS min, MAX(value) AS max \
         FROM {table} \
         WHERE metric = $2 AND ts >= $3 AND ts < $4"
    );
    for i in 0..filter_count {
        let key = 5 + i * 2;
        sql.push_str(&format!(" AND dimensions ->> ${} = ${}", key, key + 1));
    }
    sql.push_str(" GROUP BY bucket ORDER BY bucket");

    Ok(sql)
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_without_filters_binds_four_parameters() {
        let sql = build_bucket_sql("sales_events_hourly_agg", 0).unwrap();
        assert!(sql.contains("FROM sales_events_hourly_agg"));
        assert!(sql.contains("ts >= $3 AND ts < $4"));
        assert!(!sql.contains("$5"));
        assert!(sql.ends_with("GROUP BY bucket ORDER BY bucket"));
    }

    #[test]
    fn each_filter_adds_a_dimension_pair() {
        let sql = build_bucket_sql("sales_events", 2).unwrap();
        assert!(sql.contains("dimensions ->> $5 = $6"));
        assert!(sql.contains("dimensions ->> $7 = $8"));
        assert!(!sql.contains("$9"));
    }

    #[test]
    fn rejects_injection_through_table_name() {
        for bad in ["", "1table", "sales; DROP TABLE x", "sales events", "sales\"", "public.sales"] {
            assert!(
                matches!(build_bucket_sql(bad, 0), Err(DbError::InvalidIdentifier(_))),
                "accepted {bad:?}"
            );
        }
    }
}
