use crate::cache::ResultCache;
use crate::error::CalculationError;
use crate::in_flight::{Attachment, CoalescingKey, InFlightRegistry, Settlement};
use crate::registry::HandlerRegistry;
use crate::sweeper::CacheSweeper;
use core_types::CalculationParams;
use futures::future::join_all;
use handlers::CalculationHandler;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;

/// A point-in-time copy of the orchestrator's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OrchestratorStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Requests that joined a computation another request had already started.
    pub coalesced: u64,
    /// Calls made to `CalculationHandler::calculate`.
    pub handler_invocations: u64,
}

#[derive(Default)]
struct StatsCounters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    coalesced: AtomicU64,
    handler_invocations: AtomicU64,
}

/// The entry point for KPI computation.
///
/// Routes each request to its chain's handler, serves it from the result cache when
/// possible and otherwise guarantees that equivalent concurrent requests share a
/// single handler invocation.
pub struct CalculationOrchestrator {
    registry: HandlerRegistry,
    cache: Arc<dyn ResultCache>,
    in_flight: Arc<InFlightRegistry>,
    default_ttl: Duration,
    stats: StatsCounters,
}

impl CalculationOrchestrator {
    pub fn new(registry: HandlerRegistry, cache: Arc<dyn ResultCache>, default_ttl: Duration) -> Self {
        Self {
            registry,
            cache,
            in_flight: Arc::new(InFlightRegistry::new()),
            default_ttl,
            stats: StatsCounters::default(),
        }
    }

    /// Binds a handler to a chain. Meant for boot time, before the orchestrator is shared.
    pub fn register_handler(
        &mut self,
        chain_id: impl Into<String>,
        handler: Arc<dyn CalculationHandler>,
    ) -> Result<(), CalculationError> {
        self.registry.register_handler(chain_id, handler)
    }

    /// Computes one KPI.
    ///
    /// Unknown KPIs, missing handlers and invalid parameters fail before the in-flight
    /// registry is touched. Dropping the returned future abandons only this caller's
    /// wait; a computation it started keeps running for everyone else.
    pub async fn calculate_single(&self, params: &CalculationParams) -> Settlement {
        let handler = Arc::clone(self.registry.resolve(&params.kpi_code)?);

        let cache_key = if handler.caching_enabled() {
            let key = handler.get_cache_key(params);
            if let Some(hit) = self.cache.get(&key) {
                self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(kpi_code = %params.kpi_code, "Served from result cache.");
                return Ok(hit);
            }
            self.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
            Some(key)
        } else {
            None
        };

        handler.validate_params(params)?;

        let coalescing_key = match &cache_key {
            Some(key) => CoalescingKey::Cached(key.clone()),
            None => CoalescingKey::Params(params.clone()),
        };

        let waiter = match self.in_flight.attach(coalescing_key) {
            Attachment::Joined(waiter) => {
                self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(kpi_code = %params.kpi_code, "Joined in-flight computation.");
                waiter
            }
            Attachment::Owner { handle, waiter } => {
                // A computation for this key may have settled between the probe above and
                // the attach. Its result is already cached, so serve it instead of
                // starting a second one.
                if let Some(hit) = cache_key.as_deref().and_then(|key| self.cache.get(key)) {
                    self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(kpi_code = %params.kpi_code, "Served from result cache after attach.");
                    handle.settle(Ok(Arc::clone(&hit)));
                    return Ok(hit);
                }

                self.stats.handler_invocations.fetch_add(1, Ordering::Relaxed);
                let cache = Arc::clone(&self.cache);
                let ttl = handler.cache_ttl().unwrap_or(self.default_ttl);
                let params = params.clone();

                // Detached so that no single caller's cancellation can abort the work
                // the other waiters depend on.
                tokio::spawn(async move {
                    let outcome = match handler.calculate(&params).await {
                        Ok(result) => {
                            let result = Arc::new(result);
                            if let Some(key) = cache_key {
                                cache.put(key, Arc::clone(&result), ttl);
                            }
                            tracing::info!(
                                kpi_code = %result.kpi_code,
                                value = %result.value,
                                elapsed_ms = result.calculation_time_ms,
                                "KPI calculated."
                            );
                            Ok(result)
                        }
                        Err(e) => {
                            tracing::warn!(kpi_code = %params.kpi_code, error = %e, "KPI calculation failed.");
                            Err(CalculationError::from(e))
                        }
                    };
                    handle.settle(outcome);
                });
                waiter
            }
        };

        waiter.wait().await
    }

    /// Computes a batch concurrently. Equivalent requests inside the batch coalesce.
    pub async fn calculate_many(&self, requests: &[CalculationParams]) -> Vec<Settlement> {
        join_all(requests.iter().map(|params| self.calculate_single(params))).await
    }

    /// Starts the background sweep of expired cache entries.
    pub fn spawn_cache_sweeper(&self, period: Duration) -> JoinHandle<()> {
        CacheSweeper::new(Arc::clone(&self.cache), period).spawn()
    }

    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            cache_hits: self.stats.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.stats.cache_misses.load(Ordering::Relaxed),
            coalesced: self.stats.coalesced.load(Ordering::Relaxed),
            handler_invocations: self.stats.handler_invocations.load(Ordering::Relaxed),
        }
    }

    /// Number of computations currently running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }
}
