use crate::aggregate::AggregateHandler;
use crate::error::HandlerError;
use crate::ratio::RatioHandler;
use crate::CalculationHandler;
use configuration::{Catalog, ChainConfig, ChainKind, HandlerSettings};
use database::MetricStore;
use std::sync::Arc;

/// Creates the handler instance serving `chain`, seeded with the chain's KPI metadata.
pub fn create_handler(
    chain: &ChainConfig,
    catalog: &Catalog,
    store: Arc<dyn MetricStore>,
    settings: &HandlerSettings,
) -> Result<Arc<dyn CalculationHandler>, HandlerError> {
    let kpis = catalog.kpis_for_chain(&chain.id);
    if kpis.is_empty() {
        tracing::warn!(chain_id = %chain.id, "Chain has no KPIs assigned in the catalog.");
    }

    // The compiler will error if a new ChainKind is added but not handled here.
    match chain.kind {
        ChainKind::Aggregate => Ok(Arc::new(AggregateHandler::new(chain, kpis, store, settings)?)),
        ChainKind::Ratio => Ok(Arc::new(RatioHandler::new(chain, kpis, store, settings)?)),
    }
}
