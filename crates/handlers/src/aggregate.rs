use crate::error::HandlerError;
use crate::support::{ChainMetadata, checked_sum, overflow};
use crate::CalculationHandler;
use async_trait::async_trait;
use chrono::Utc;
use configuration::{ChainConfig, HandlerSettings, KpiDefinition};
use core_types::{Aggregation, CalculationParams, CalculationResult, KpiFormula};
use database::{BucketQuery, BucketRow, MetricStore};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Computes KPIs that fold a single metric with one aggregation.
pub struct AggregateHandler {
    chain: ChainMetadata,
}

impl AggregateHandler {
    /// Creates a new `AggregateHandler` for `chain`.
    ///
    /// Every KPI handed to it must carry an aggregate formula.
    pub fn new(
        chain: &ChainConfig,
        kpis: HashMap<String, KpiDefinition>,
        store: Arc<dyn MetricStore>,
        settings: &HandlerSettings,
    ) -> Result<Self, HandlerError> {
        let chain = ChainMetadata::new(chain, kpis, store, settings, "aggregate", |formula| {
            matches!(formula, KpiFormula::Aggregate { .. })
        })?;
        Ok(Self { chain })
    }
}

#[async_trait]
impl CalculationHandler for AggregateHandler {
    fn chain_id(&self) -> &str {
        &self.chain.chain_id
    }

    fn caching_enabled(&self) -> bool {
        self.chain.caching
    }

    fn cache_ttl(&self) -> Option<Duration> {
        self.chain.cache_ttl
    }

    fn validate_params(&self, params: &CalculationParams) -> Result<(), HandlerError> {
        self.chain.validate(params)
    }

    async fn calculate(&self, params: &CalculationParams) -> Result<CalculationResult, HandlerError> {
        let started = Instant::now();
        let definition = self.chain.definition(params)?;
        let KpiFormula::Aggregate { metric, aggregation } = &definition.formula else {
            return Err(HandlerError::Misconfigured(format!(
                "KPI '{}' lost its aggregate formula",
                definition.code
            )));
        };

        let selection = tiering::select_source(
            &definition.base_table,
            &params.time_range,
            &params.resolution_hint,
        );
        let query = BucketQuery {
            table: selection.table_name,
            bucket: selection.bucket_interval,
            metric: metric.clone(),
            range: params.time_range,
            filters: params.filters.clone(),
        };

        let rows = self.chain.fetch(&query).await?;
        let value = fold_buckets(*aggregation, &rows)?;

        tracing::debug!(
            kpi_code = %params.kpi_code,
            buckets = rows.len(),
            tier = %selection.tier,
            %value,
            "Aggregate KPI computed."
        );

        Ok(CalculationResult {
            kpi_code: params.kpi_code.clone(),
            value,
            unit: definition.unit.clone(),
            computed_at: Utc::now(),
            calculation_time_ms: started.elapsed().as_millis() as u64,
            source_tier: Some(selection.tier),
        })
    }
}

/// Folds per-bucket statistics into one value.
///
/// Averages are computed from the summed sums and counts, never by averaging bucket
/// averages, so the result does not depend on the tier that answered. Totals outside
/// the `Decimal` range are reported as a `Calculation` error.
pub fn fold_buckets(aggregation: Aggregation, rows: &[BucketRow]) -> Result<Decimal, HandlerError> {
    let no_data = || HandlerError::Calculation("no data points in the requested range".to_string());
    let total_count = || {
        rows.iter()
            .try_fold(0i64, |total, row| total.checked_add(row.count))
            .ok_or_else(|| overflow("count"))
    };

    match aggregation {
        Aggregation::Sum => checked_sum(rows),
        Aggregation::Count => Ok(Decimal::from(total_count()?)),
        Aggregation::Avg => {
            let count = total_count()?;
            if count == 0 {
                return Err(no_data());
            }
            checked_sum(rows)?
                .checked_div(Decimal::from(count))
                .ok_or_else(|| overflow("average"))
        }
        Aggregation::Min => rows.iter().filter_map(|row| row.min).min().ok_or_else(no_data),
        Aggregation::Max => rows.iter().filter_map(|row| row.max).max().ok_or_else(no_data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn row(sum: Decimal, count: i64, min: Decimal, max: Decimal) -> BucketRow {
        BucketRow {
            bucket: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            sum,
            count,
            min: Some(min),
            max: Some(max),
        }
    }

    #[test]
    fn average_is_weighted_by_bucket_counts() {
        // Bucket averages are 10 and 40; the true mean of the 4 points is 32.5.
        let rows = [row(dec!(10), 1, dec!(10), dec!(10)), row(dec!(120), 3, dec!(30), dec!(50))];
        assert_eq!(fold_buckets(Aggregation::Avg, &rows).unwrap(), dec!(32.5));
    }

    #[test]
    fn folds_sum_count_min_max() {
        let rows = [row(dec!(5), 2, dec!(1), dec!(4)), row(dec!(7), 1, dec!(7), dec!(7))];
        assert_eq!(fold_buckets(Aggregation::Sum, &rows).unwrap(), dec!(12));
        assert_eq!(fold_buckets(Aggregation::Count, &rows).unwrap(), dec!(3));
        assert_eq!(fold_buckets(Aggregation::Min, &rows).unwrap(), dec!(1));
        assert_eq!(fold_buckets(Aggregation::Max, &rows).unwrap(), dec!(7));
    }

    #[test]
    fn totals_beyond_the_decimal_range_are_calculation_errors() {
        let rows = [row(Decimal::MAX, 1, dec!(1), dec!(1)), row(Decimal::MAX, 1, dec!(1), dec!(1))];
        for aggregation in [Aggregation::Sum, Aggregation::Avg] {
            assert!(matches!(
                fold_buckets(aggregation, &rows),
                Err(HandlerError::Calculation(msg)) if msg.contains("overflowed")
            ));
        }

        let counts = [row(dec!(1), i64::MAX, dec!(1), dec!(1)), row(dec!(1), 1, dec!(1), dec!(1))];
        assert!(matches!(
            fold_buckets(Aggregation::Count, &counts),
            Err(HandlerError::Calculation(_))
        ));
    }

    #[test]
    fn empty_range_is_zero_for_sum_and_count_but_an_error_otherwise() {
        assert_eq!(fold_buckets(Aggregation::Sum, &[]).unwrap(), Decimal::ZERO);
        assert_eq!(fold_buckets(Aggregation::Count, &[]).unwrap(), Decimal::ZERO);
        for aggregation in [Aggregation::Avg, Aggregation::Min, Aggregation::Max] {
            assert!(matches!(
                fold_buckets(aggregation, &[]),
                Err(HandlerError::Calculation(_))
            ));
        }
    }
}
