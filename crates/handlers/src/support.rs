use crate::error::HandlerError;
use configuration::{ChainConfig, HandlerSettings, KpiDefinition};
use core_types::{CalculationParams, KpiFormula};
use database::{BucketQuery, BucketRow, MetricStore};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// What every handler family knows about its chain: caching policy, storage access and
/// the definitions of the KPIs it serves.
pub(crate) struct ChainMetadata {
    pub(crate) chain_id: String,
    pub(crate) caching: bool,
    pub(crate) cache_ttl: Option<Duration>,
    query_timeout: Duration,
    kpis: HashMap<String, KpiDefinition>,
    store: Arc<dyn MetricStore>,
}

impl ChainMetadata {
    /// Captures `chain`'s metadata, refusing any KPI whose formula `accepts` rejects.
    ///
    /// `family` names the handler family in the error message.
    pub(crate) fn new(
        chain: &ChainConfig,
        kpis: HashMap<String, KpiDefinition>,
        store: Arc<dyn MetricStore>,
        settings: &HandlerSettings,
        family: &str,
        accepts: fn(&KpiFormula) -> bool,
    ) -> Result<Self, HandlerError> {
        if let Some(kpi) = kpis.values().find(|kpi| !accepts(&kpi.formula)) {
            return Err(HandlerError::Misconfigured(format!(
                "KPI '{}' has no {family} formula but is assigned to {family} chain '{}'",
                kpi.code, chain.id
            )));
        }

        Ok(Self {
            chain_id: chain.id.clone(),
            caching: chain.caching,
            cache_ttl: chain.cache_ttl(),
            query_timeout: settings.query_timeout(),
            kpis,
            store,
        })
    }

    /// Looks up the definition of the requested KPI.
    pub(crate) fn definition(&self, params: &CalculationParams) -> Result<&KpiDefinition, HandlerError> {
        self.kpis.get(&params.kpi_code).ok_or_else(|| HandlerError::KpiNotServed {
            kpi_code: params.kpi_code.clone(),
            chain_id: self.chain_id.clone(),
        })
    }

    /// The checks every family shares: the KPI belongs here, range order, a usable
    /// resolution, required filters.
    pub(crate) fn validate(&self, params: &CalculationParams) -> Result<(), HandlerError> {
        let definition = self.definition(params)?;
        params.time_range.validate()?;

        if params.resolution_hint.trim().is_empty() {
            return Err(HandlerError::InvalidParameters(
                "resolution_hint must not be empty".to_string(),
            ));
        }

        let missing: Vec<&str> = definition
            .required_filters
            .iter()
            .filter(|dimension| !params.filters.contains_key(dimension.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(HandlerError::InvalidParameters(format!(
                "KPI '{}' requires filters: {}",
                definition.code,
                missing.join(", ")
            )));
        }

        Ok(())
    }

    /// Runs one storage query under the configured timeout.
    pub(crate) async fn fetch(&self, query: &BucketQuery) -> Result<Vec<BucketRow>, HandlerError> {
        match tokio::time::timeout(self.query_timeout, self.store.fetch_buckets(query)).await {
            Ok(rows) => Ok(rows?),
            Err(_elapsed) => {
                tracing::warn!(
                    table = %query.table,
                    metric = %query.metric,
                    timeout = ?self.query_timeout,
                    "Storage query timed out."
                );
                Err(HandlerError::Timeout(self.query_timeout))
            }
        }
    }
}

pub(crate) fn overflow(what: &str) -> HandlerError {
    HandlerError::Calculation(format!("{what} overflowed the decimal range"))
}

/// Sums per-bucket sums, failing instead of panicking when the total leaves the
/// `Decimal` range.
pub(crate) fn checked_sum(rows: &[BucketRow]) -> Result<Decimal, HandlerError> {
    rows.iter()
        .try_fold(Decimal::ZERO, |total, row| total.checked_add(row.sum))
        .ok_or_else(|| overflow("sum"))
}
