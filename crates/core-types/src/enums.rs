use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The pre-aggregated data source a query was answered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    Raw,
    Hourly,
    Daily,
    Monthly,
}

impl SourceTier {
    /// The suffix appended to a base table name to address this tier.
    pub fn table_suffix(&self) -> &'static str {
        match self {
            SourceTier::Raw => "",
            SourceTier::Hourly => "_hourly_agg",
            SourceTier::Daily => "_daily_agg",
            SourceTier::Monthly => "_monthly_agg",
        }
    }
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceTier::Raw => "raw",
            SourceTier::Hourly => "hourly",
            SourceTier::Daily => "daily",
            SourceTier::Monthly => "monthly",
        };
        f.write_str(name)
    }
}

/// How the per-bucket rows of a metric are folded into one KPI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

/// The formula metadata the catalog attaches to a KPI.
///
/// Handlers interpret this; the orchestrator never looks at it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KpiFormula {
    /// A single metric folded with one aggregation.
    Aggregate {
        metric: String,
        aggregation: Aggregation,
    },
    /// `sum(numerator) / sum(denominator) * scale`, e.g. a conversion rate in percent.
    Ratio {
        numerator: String,
        denominator: String,
        #[serde(default = "default_scale")]
        scale: Decimal,
    },
}

fn default_scale() -> Decimal {
    Decimal::ONE
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn ratio_scale_defaults_to_one() {
        let formula: KpiFormula =
            serde_json::from_str(r#"{"kind":"ratio","numerator":"orders","denominator":"sessions"}"#).unwrap();
        assert_eq!(
            formula,
            KpiFormula::Ratio {
                numerator: "orders".to_string(),
                denominator: "sessions".to_string(),
                scale: dec!(1),
            }
        );
    }

    #[test]
    fn tier_suffixes_address_rollup_tables() {
        assert_eq!(SourceTier::Raw.table_suffix(), "");
        assert_eq!(SourceTier::Monthly.table_suffix(), "_monthly_agg");
        assert_eq!(SourceTier::Daily.to_string(), "daily");
    }
}
