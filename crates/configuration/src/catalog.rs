use core_types::KpiFormula;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// The KPI catalog: which chains exist and which KPIs each chain computes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
    #[serde(default)]
    pub kpis: Vec<KpiDefinition>,
}

/// The computation strategy shared by every KPI of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    Aggregate,
    Ratio,
}

/// A named family of KPIs served by one handler instance.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub id: String,
    pub kind: ChainKind,
    #[serde(default = "default_caching")]
    pub caching: bool,
    /// Overrides `cache.default_ttl_secs` for this chain.
    pub cache_ttl_secs: Option<u64>,
}

fn default_caching() -> bool {
    true
}

impl ChainConfig {
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }
}

/// Metadata for a single KPI.
#[derive(Debug, Clone, Deserialize)]
pub struct KpiDefinition {
    pub code: String,
    pub chain: String,
    pub unit: String,
    /// Name of the raw table; rollups live at `{base_table}_hourly_agg` and so on.
    pub base_table: String,
    pub formula: KpiFormula,
    /// Dimensions every request for this KPI must filter on.
    #[serde(default)]
    pub required_filters: Vec<String>,
}

impl KpiDefinition {
    /// Every metric name the formula reads.
    pub fn referenced_metrics(&self) -> Vec<&str> {
        match &self.formula {
            KpiFormula::Aggregate { metric, .. } => vec![metric.as_str()],
            KpiFormula::Ratio {
                numerator,
                denominator,
                ..
            } => vec![numerator.as_str(), denominator.as_str()],
        }
    }
}

impl Catalog {
    /// The `kpi_code -> chain_id` mapping consumed by the handler registry.
    pub fn kpi_to_chain(&self) -> HashMap<String, String> {
        self.kpis
            .iter()
            .map(|kpi| (kpi.code.clone(), kpi.chain.clone()))
            .collect()
    }

    /// The per-KPI metadata a chain's handler needs, keyed by KPI code.
    pub fn kpis_for_chain(&self, chain_id: &str) -> HashMap<String, KpiDefinition> {
        self.kpis
            .iter()
            .filter(|kpi| kpi.chain == chain_id)
            .map(|kpi| (kpi.code.clone(), kpi.clone()))
            .collect()
    }

    pub fn chain(&self, chain_id: &str) -> Option<&ChainConfig> {
        self.chains.iter().find(|chain| chain.id == chain_id)
    }
}
