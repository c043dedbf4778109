use crate::error::CalculationError;
use handlers::CalculationHandler;
use std::collections::HashMap;
use std::sync::Arc;

/// The boot-time routing table: `kpi_code -> chain_id -> handler`.
///
/// Mutation needs `&mut self`, so once the registry is owned by an orchestrator shared
/// behind an `Arc` it is read-only and lookups take no lock.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn CalculationHandler>>,
    kpi_to_chain: HashMap<String, String>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from a catalog mapping, with no handlers bound yet.
    pub fn with_mapping(kpi_to_chain: HashMap<String, String>) -> Self {
        Self {
            handlers: HashMap::new(),
            kpi_to_chain,
        }
    }

    /// Binds `handler` to `chain_id`. A chain can only be bound once.
    pub fn register_handler(
        &mut self,
        chain_id: impl Into<String>,
        handler: Arc<dyn CalculationHandler>,
    ) -> Result<(), CalculationError> {
        let chain_id = chain_id.into();
        if self.handlers.contains_key(&chain_id) {
            return Err(CalculationError::Configuration(format!(
                "a handler is already registered for chain '{chain_id}'"
            )));
        }
        tracing::debug!(chain_id = %chain_id, "Handler registered.");
        self.handlers.insert(chain_id, handler);
        Ok(())
    }

    /// Routes `kpi_code` to `chain_id`. A KPI can only be routed once.
    pub fn map_kpi(&mut self, kpi_code: impl Into<String>, chain_id: impl Into<String>) -> Result<(), CalculationError> {
        let kpi_code = kpi_code.into();
        if self.kpi_to_chain.contains_key(&kpi_code) {
            return Err(CalculationError::Configuration(format!(
                "KPI '{kpi_code}' is already mapped to a chain"
            )));
        }
        self.kpi_to_chain.insert(kpi_code, chain_id.into());
        Ok(())
    }

    /// Resolves the handler for a KPI.
    ///
    /// `UnknownKpi` when the code is not mapped; `Configuration` when it is mapped to a
    /// chain nobody registered a handler for.
    pub fn resolve(&self, kpi_code: &str) -> Result<&Arc<dyn CalculationHandler>, CalculationError> {
        let chain_id = self
            .kpi_to_chain
            .get(kpi_code)
            .ok_or_else(|| CalculationError::UnknownKpi(kpi_code.to_string()))?;

        self.handlers.get(chain_id).ok_or_else(|| {
            CalculationError::Configuration(format!(
                "KPI '{kpi_code}' is mapped to chain '{chain_id}', which has no registered handler"
            ))
        })
    }

    pub fn chain_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn kpi_count(&self) -> usize {
        self.kpi_to_chain.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use core_types::{CalculationParams, CalculationResult};
    use handlers::HandlerError;

    struct NoopHandler;

    #[async_trait]
    impl CalculationHandler for NoopHandler {
        fn chain_id(&self) -> &str {
            "SALES_CHAIN"
        }

        fn caching_enabled(&self) -> bool {
            true
        }

        fn validate_params(&self, _params: &CalculationParams) -> Result<(), HandlerError> {
            Ok(())
        }

        async fn calculate(&self, _params: &CalculationParams) -> Result<CalculationResult, HandlerError> {
            Err(HandlerError::Calculation("not used".to_string()))
        }
    }

    #[test]
    fn kpi_can_only_be_routed_once() {
        let mut registry = HandlerRegistry::new();
        registry.map_kpi("TOTAL_REVENUE", "SALES_CHAIN").unwrap();

        let err = registry.map_kpi("TOTAL_REVENUE", "OTHER_CHAIN").unwrap_err();

        assert!(matches!(err, CalculationError::Configuration(_)));
        assert_eq!(registry.kpi_count(), 1);
    }

    #[test]
    fn resolve_follows_kpi_then_chain() {
        let mut registry = HandlerRegistry::new();
        registry.map_kpi("TOTAL_REVENUE", "SALES_CHAIN").unwrap();
        registry.map_kpi("ORPHAN", "MISSING_CHAIN").unwrap();
        registry.register_handler("SALES_CHAIN", Arc::new(NoopHandler)).unwrap();

        assert_eq!(registry.resolve("TOTAL_REVENUE").unwrap().chain_id(), "SALES_CHAIN");
        assert!(matches!(registry.resolve("ORPHAN"), Err(CalculationError::Configuration(_))));
        assert!(matches!(registry.resolve("NOPE"), Err(CalculationError::UnknownKpi(_))));
    }
}
