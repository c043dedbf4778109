use core_types::CalculationResult;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// A keyed store of computed results with per-entry TTL.
///
/// Implementations must never return an entry past its expiry. Every method is
/// synchronous so that a cache probe never suspends the caller.
pub trait ResultCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Arc<CalculationResult>>;

    fn put(&self, key: String, value: Arc<CalculationResult>, ttl: Duration);

    /// Drops every expired entry and returns how many were removed.
    fn purge_expired(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct CacheEntry {
    value: Arc<CalculationResult>,
    expires_at: Instant,
}

/// The process-local `ResultCache`.
///
/// Expiry is checked on every read; expired entries found by a read are evicted on the
/// spot. Time comes from `tokio::time`, so paused-clock tests can step over TTLs.
#[derive(Default)]
pub struct InMemoryResultCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryResultCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultCache for InMemoryResultCache {
    fn get(&self, key: &str) -> Option<Arc<CalculationResult>> {
        let now = Instant::now();
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            match entries.get(key) {
                Some(entry) if entry.expires_at > now => return Some(Arc::clone(&entry.value)),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired. Re-check under the write lock: a writer may have refreshed it meanwhile.
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(Arc::clone(&entry.value)),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn put(&self, key: String, value: Arc<CalculationResult>, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, CacheEntry { value, expires_at });
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn result(kpi_code: &str) -> Arc<CalculationResult> {
        Arc::new(CalculationResult {
            kpi_code: kpi_code.to_string(),
            value: dec!(42),
            unit: "EUR".to_string(),
            computed_at: Utc::now(),
            calculation_time_ms: 1,
            source_tier: None,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn entry_is_served_until_its_ttl_and_never_after() {
        let cache = InMemoryResultCache::new();
        cache.put("k".to_string(), result("SALES"), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(cache.get("k").unwrap().kpi_code, "SALES");

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("k").is_none());
        assert!(cache.is_empty(), "an expired entry found by a read is evicted");
    }

    #[tokio::test(start_paused = true)]
    async fn put_refreshes_expiry() {
        let cache = InMemoryResultCache::new();
        cache.put("k".to_string(), result("OLD"), Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(4)).await;
        cache.put("k".to_string(), result("NEW"), Duration::from_secs(5));
        tokio::time::advance(Duration::from_secs(4)).await;

        assert_eq!(cache.get("k").unwrap().kpi_code, "NEW");
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired_entries() {
        let cache = InMemoryResultCache::new();
        cache.put("short".to_string(), result("A"), Duration::from_secs(1));
        cache.put("long".to_string(), result("B"), Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("long").is_some());
    }

    #[tokio::test]
    async fn miss_on_unknown_key() {
        let cache = InMemoryResultCache::new();
        assert!(cache.get("nope").is_none());
    }
}
