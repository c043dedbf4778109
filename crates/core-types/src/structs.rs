use crate::enums::SourceTier;
use crate::error::CoreError;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The span of instants a KPI is computed over: `start` inclusive, `end` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Creates a range, rejecting one whose start lies after its end.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, CoreError> {
        let range = Self { start, end };
        range.validate()?;
        Ok(range)
    }

    /// Checks the `start <= end` invariant for ranges built field by field.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.start > self.end {
            return Err(CoreError::InvertedTimeRange {
                start: self.start.to_rfc3339(),
                end: self.end.to_rfc3339(),
            });
        }
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// An immutable request to compute one KPI.
///
/// Two requests are equivalent iff every field compares equal. `filters` is a
/// `BTreeMap` so that insertion order never makes two equal requests look different.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalculationParams {
    pub kpi_code: String,
    pub time_range: TimeRange,
    pub resolution_hint: String,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

impl CalculationParams {
    pub fn new(kpi_code: impl Into<String>, time_range: TimeRange, resolution_hint: impl Into<String>) -> Self {
        Self {
            kpi_code: kpi_code.into(),
            time_range,
            resolution_hint: resolution_hint.into(),
            filters: BTreeMap::new(),
        }
    }

    /// Adds a dimension filter, replacing any previous value for the same dimension.
    pub fn with_filter(mut self, dimension: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(dimension.into(), value.into());
        self
    }

    /// A deterministic string naming the semantic request.
    ///
    /// Every component is escaped so that separators inside filter values can never make
    /// two different requests produce the same key. Instants keep full nanosecond
    /// precision, so keys are equal exactly when the requests are.
    pub fn canonical_key(&self) -> String {
        let mut key = format!(
            "{}|{}..{}|{}|",
            escape(&self.kpi_code),
            self.time_range.start.to_rfc3339_opts(SecondsFormat::Nanos, true),
            self.time_range.end.to_rfc3339_opts(SecondsFormat::Nanos, true),
            escape(&self.resolution_hint),
        );
        let filters: Vec<String> = self
            .filters
            .iter()
            .map(|(dimension, value)| format!("{}={}", escape(dimension), escape(value)))
            .collect();
        key.push_str(&filters.join(","));
        key
    }
}

fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '|' | ',' | '=' | '.') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// The outcome of one KPI computation. Shared read-only between every coalesced caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub kpi_code: String,
    pub value: Decimal,
    pub unit: String,
    pub computed_at: DateTime<Utc>,
    pub calculation_time_ms: u64,
    pub source_tier: Option<SourceTier>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn range(days: i64) -> TimeRange {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        TimeRange::new(start, start + Duration::days(days)).unwrap()
    }

    #[test]
    fn inverted_range_is_rejected() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(
            TimeRange::new(start, end),
            Err(CoreError::InvertedTimeRange { .. })
        ));
    }

    #[test]
    fn empty_range_is_allowed() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let range = TimeRange::new(start, start).unwrap();
        assert_eq!(range.duration(), Duration::zero());
    }

    #[test]
    fn filter_order_does_not_change_equivalence() {
        let a = CalculationParams::new("SALES", range(1), "1m")
            .with_filter("region", "eu")
            .with_filter("channel", "web");
        let b = CalculationParams::new("SALES", range(1), "1m")
            .with_filter("channel", "web")
            .with_filter("region", "eu");
        assert_eq!(a, b);
        assert_eq!(a.canonical_key(), b.canonical_key());
    }

    #[test]
    fn canonical_key_distinguishes_every_field() {
        let base = CalculationParams::new("SALES", range(1), "1m");
        let keys = [
            base.canonical_key(),
            CalculationParams::new("ORDERS", range(1), "1m").canonical_key(),
            CalculationParams::new("SALES", range(2), "1m").canonical_key(),
            CalculationParams::new("SALES", range(1), "5m").canonical_key(),
            base.clone().with_filter("region", "eu").canonical_key(),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in keys.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn sub_millisecond_range_differences_get_distinct_keys() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let end = start + Duration::hours(1);
        let a = CalculationParams::new("SALES", TimeRange::new(start, end).unwrap(), "1m");
        let b = CalculationParams::new(
            "SALES",
            TimeRange::new(start, end + Duration::microseconds(500)).unwrap(),
            "1m",
        );
        let c = CalculationParams::new(
            "SALES",
            TimeRange::new(start, end + Duration::nanoseconds(1)).unwrap(),
            "1m",
        );

        assert_ne!(a, b);
        assert_ne!(a.canonical_key(), b.canonical_key());
        assert_ne!(a.canonical_key(), c.canonical_key());
    }

    #[test]
    fn separators_inside_filter_values_cannot_collide() {
        let a = CalculationParams::new("SALES", range(1), "1m").with_filter("a", "1,b=2");
        let b = CalculationParams::new("SALES", range(1), "1m")
            .with_filter("a", "1")
            .with_filter("b", "2");
        assert_ne!(a.canonical_key(), b.canonical_key());
    }

    #[test]
    fn result_serializes_tier_in_snake_case() {
        let result = CalculationResult {
            kpi_code: "SALES".to_string(),
            value: Decimal::new(1250, 2),
            unit: "EUR".to_string(),
            computed_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            calculation_time_ms: 3,
            source_tier: Some(SourceTier::Hourly),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["source_tier"], "hourly");
    }
}
