use handlers::HandlerError;
use thiserror::Error;

/// Every failure a caller of the orchestrator can observe.
///
/// `Clone` because one settlement is delivered to every coalesced waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CalculationError {
    /// The KPI code is absent from the catalog mapping. A client error; not retried.
    #[error("Unknown KPI '{0}'")]
    UnknownKpi(String),

    /// The registry is inconsistent: a chain is mapped but no handler is bound, or a
    /// chain was registered twice.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The handler rejected the request parameters.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The computation itself failed. May be transient.
    #[error("Calculation error: {0}")]
    Calculation(String),
}

impl From<HandlerError> for CalculationError {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::InvalidParameters(_) => CalculationError::Validation(err.to_string()),
            HandlerError::KpiNotServed { .. } | HandlerError::Misconfigured(_) => {
                CalculationError::Configuration(err.to_string())
            }
            HandlerError::Storage(_) | HandlerError::Timeout(_) | HandlerError::Calculation(_) => {
                CalculationError::Calculation(err.to_string())
            }
        }
    }
}
