use crate::error::HandlerError;
use crate::support::{ChainMetadata, checked_sum, overflow};
use crate::CalculationHandler;
use async_trait::async_trait;
use chrono::Utc;
use configuration::{ChainConfig, HandlerSettings, KpiDefinition};
use core_types::{CalculationParams, CalculationResult, KpiFormula};
use database::{BucketQuery, MetricStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Computes KPIs of the form `sum(numerator) / sum(denominator) * scale`.
pub struct RatioHandler {
    chain: ChainMetadata,
}

impl RatioHandler {
    /// Creates a new `RatioHandler` for `chain`.
    ///
    /// Every KPI handed to it must carry a ratio formula.
    pub fn new(
        chain: &ChainConfig,
        kpis: HashMap<String, KpiDefinition>,
        store: Arc<dyn MetricStore>,
        settings: &HandlerSettings,
    ) -> Result<Self, HandlerError> {
        let chain = ChainMetadata::new(chain, kpis, store, settings, "ratio", |formula| {
            matches!(formula, KpiFormula::Ratio { .. })
        })?;
        Ok(Self { chain })
    }
}

#[async_trait]
impl CalculationHandler for RatioHandler {
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
        let KpiFormula::Ratio {
            numerator,
            denominator,
            scale,
        } = &definition.formula
        else {
            return Err(HandlerError::Misconfigured(format!(
                "KPI '{}' lost its ratio formula",
                definition.code
            )));
        };

        let selection = tiering::select_source(
            &definition.base_table,
            &params.time_range,
            &params.resolution_hint,
        );
        let query_for = |metric: &str| BucketQuery {
            table: selection.table_name.clone(),
            bucket: selection.bucket_interval.clone(),
            metric: metric.to_string(),
            range: params.time_range,
            filters: params.filters.clone(),
        };
        let numerator_query = query_for(numerator);
        let denominator_query = query_for(denominator);

        // Both operands come from the same tier, so they cover the same buckets.
        let (numerator_rows, denominator_rows) = tokio::try_join!(
            self.chain.fetch(&numerator_query),
            self.chain.fetch(&denominator_query),
        )?;

        let numerator_sum = checked_sum(&numerator_rows)?;
        let denominator_sum = checked_sum(&denominator_rows)?;
        if denominator_sum.is_zero() {
            return Err(HandlerError::Calculation(format!(
                "denominator '{}' sums to zero for KPI '{}'",
                denominator, definition.code
            )));
        }

        let value = numerator_sum
            .checked_div(denominator_sum)
            .and_then(|ratio| ratio.checked_mul(*scale))
            .ok_or_else(|| overflow("ratio"))?
            .round_dp(6);
        tracing::debug!(
            kpi_code = %params.kpi_code,
            %numerator_sum,
            %denominator_sum,
            %value,
            "Ratio KPI computed."
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
