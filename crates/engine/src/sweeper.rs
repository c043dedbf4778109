use crate::cache::ResultCache;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};

/// Background task that drops expired cache entries.
///
/// Reads already refuse expired entries; the sweep only bounds memory held by keys that
/// are never requested again.
pub struct CacheSweeper {
    cache: Arc<dyn ResultCache>,
    period: Duration,
}

impl CacheSweeper {
    pub fn new(cache: Arc<dyn ResultCache>, period: Duration) -> Self {
        Self { cache, period }
    }

    /// Runs one sweep and returns the number of evicted entries.
    pub fn sweep(&self) -> usize {
        let evicted = self.cache.purge_expired();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.cache.len(), "Expired cache entries swept.");
        }
        evicted
    }

    /// Sweeps every `period` until the returned handle is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(period = ?self.period, "Starting cache sweeper task.");
            let mut timer = interval(self.period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                // The first tick completes immediately.
                timer.tick().await;
                self.sweep();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryResultCache;
    use chrono::Utc;
    use core_types::CalculationResult;
    use rust_decimal::Decimal;

    #[tokio::test(start_paused = true)]
    async fn spawned_sweeper_evicts_expired_entries() {
        let cache = Arc::new(InMemoryResultCache::new());
        cache.put(
            "k".to_string(),
            Arc::new(CalculationResult {
                kpi_code: "SALES".to_string(),
                value: Decimal::ONE,
                unit: "EUR".to_string(),
                computed_at: Utc::now(),
                calculation_time_ms: 0,
                source_tier: None,
            }),
            Duration::from_secs(5),
        );

        let handle = CacheSweeper::new(cache.clone(), Duration::from_secs(10)).spawn();
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert_eq!(cache.len(), 0);
        handle.abort();
    }
}
