//! # Resolution Tier Selector
//!
//! Picks the cheapest data source able to answer a query over a given time span.
//! Scanning raw rows over months of data is slow and pointless when the caller only
//! needs a trend line, so longer spans are served from coarser rollups.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** This is a pure function crate. It knows the table naming
//!   convention (`{base}`, `{base}_hourly_agg`, `{base}_daily_agg`, `{base}_monthly_agg`)
//!   but never talks to storage.
//! - **Called by handlers:** The orchestrator stays agnostic to storage layout; only
//!   handlers consult the selector when they build their queries.
//!
//! ## Boundaries
//!
//! Thresholds are exclusive-lower / inclusive-upper. A span of exactly 7, 30 or 365 days
//! is served by the finer of the two neighbouring tiers.

use chrono::Duration;
use core_types::{SourceTier, TimeRange};
use serde::Serialize;

pub const RAW_MAX_SPAN_DAYS: i64 = 7;
pub const HOURLY_MAX_SPAN_DAYS: i64 = 30;
pub const DAILY_MAX_SPAN_DAYS: i64 = 365;

/// The table and bucket width a handler should query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierSelection {
    pub tier: SourceTier,
    pub table_name: String,
    pub bucket_interval: String,
}

/// Maps the span of `time_range` to the source table and bucket width to query.
///
/// Only the raw tier honours `requested_resolution`; every rollup has a fixed bucket.
pub fn select_source(base_table: &str, time_range: &TimeRange, requested_resolution: &str) -> TierSelection {
    let tier = tier_for_span(time_range.duration());

    let bucket_interval = match tier {
        SourceTier::Raw => requested_resolution.to_string(),
        SourceTier::Hourly => "1 hour".to_string(),
        SourceTier::Daily => "1 day".to_string(),
        SourceTier::Monthly => "1 month".to_string(),
    };

    let selection = TierSelection {
        tier,
        table_name: format!("{}{}", base_table, tier.table_suffix()),
        bucket_interval,
    };
    tracing::debug!(
        table = %selection.table_name,
        bucket = %selection.bucket_interval,
        span_secs = time_range.duration().num_seconds(),
        "Resolution tier selected."
    );
    selection
}

/// The tier policy on its own, for callers that only need the classification.
pub fn tier_for_span(span: Duration) -> SourceTier {
    if span <= Duration::days(RAW_MAX_SPAN_DAYS) {
        SourceTier::Raw
    } else if span <= Duration::days(HOURLY_MAX_SPAN_DAYS) {
        SourceTier::Hourly
    } else if span <= Duration::days(DAILY_MAX_SPAN_DAYS) {
        SourceTier::Daily
    } else {
        SourceTier::Monthly
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn span(duration: Duration) -> TimeRange {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        TimeRange::new(start, start + duration).unwrap()
    }

    fn select(duration: Duration) -> (String, String) {
        let selection = select_source("raw_table", &span(duration), "1m");
        (selection.table_name, selection.bucket_interval)
    }

    #[test]
    fn one_day_reads_raw_rows_at_requested_resolution() {
        assert_eq!(select(Duration::days(1)), ("raw_table".into(), "1m".into()));
    }

    #[test]
    fn ten_days_reads_hourly_rollup() {
        assert_eq!(
            select(Duration::days(10)),
            ("raw_table_hourly_agg".into(), "1 hour".into())
        );
    }

    #[test]
    fn forty_days_reads_daily_rollup() {
        assert_eq!(
            select(Duration::days(40)),
            ("raw_table_daily_agg".into(), "1 day".into())
        );
    }

    #[test]
    fn four_hundred_days_reads_monthly_rollup() {
        assert_eq!(
            select(Duration::days(400)),
            ("raw_table_monthly_agg".into(), "1 month".into())
        );
    }

    #[test]
    fn exact_boundaries_belong_to_the_finer_tier() {
        assert_eq!(tier_for_span(Duration::days(7)), SourceTier::Raw);
        assert_eq!(tier_for_span(Duration::days(30)), SourceTier::Hourly);
        assert_eq!(tier_for_span(Duration::days(365)), SourceTier::Daily);
    }

    #[test]
    fn one_second_past_a_boundary_moves_to_the_coarser_tier() {
        let past = |days| Duration::days(days) + Duration::seconds(1);
        assert_eq!(tier_for_span(past(7)), SourceTier::Hourly);
        assert_eq!(tier_for_span(past(30)), SourceTier::Daily);
        assert_eq!(tier_for_span(past(365)), SourceTier::Monthly);
    }

    #[test]
    fn zero_span_reads_raw_rows() {
        let selection = select_source("orders", &span(Duration::zero()), "5m");
        assert_eq!(selection.tier, SourceTier::Raw);
        assert_eq!(selection.table_name, "orders");
        assert_eq!(selection.bucket_interval, "5m");
    }
}
