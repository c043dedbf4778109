use crate::cache::ResultCache;
use crate::error::CalculationError;
use crate::orchestrator::CalculationOrchestrator;
use crate::registry::HandlerRegistry;
use configuration::settings::Config;
use database::MetricStore;
use handlers::create_handler;
use std::sync::Arc;

/// Builds a ready-to-share orchestrator from the catalog.
///
/// Every declared chain gets a handler from the factory. Every KPI is routed to its
/// chain as declared, so a KPI pointing at an undeclared chain surfaces as a
/// `Configuration` error per request rather than aborting the boot. A KPI code routed
/// twice does abort it.
pub fn build_orchestrator(
    config: &Config,
    store: Arc<dyn MetricStore>,
    cache: Arc<dyn ResultCache>,
) -> Result<CalculationOrchestrator, CalculationError> {
    let mut registry = HandlerRegistry::new();
    for kpi in &config.catalog.kpis {
        registry.map_kpi(kpi.code.as_str(), kpi.chain.as_str())?;
    }
    let mut orchestrator = CalculationOrchestrator::new(registry, cache, config.cache.default_ttl());

    for chain in &config.catalog.chains {
        let handler = create_handler(chain, &config.catalog, Arc::clone(&store), &config.handlers)?;
        orchestrator.register_handler(chain.id.clone(), handler)?;
    }

    tracing::info!(
        chains = orchestrator.registry().chain_count(),
        kpis = orchestrator.registry().kpi_count(),
        "Calculation orchestrator ready."
    );
    Ok(orchestrator)
}
