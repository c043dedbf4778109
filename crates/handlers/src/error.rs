use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Handler received invalid parameters: {0}")]
    InvalidParameters(String),

    /// The KPI is routed to this handler but the handler has no definition for it.
    #[error("KPI '{kpi_code}' is not served by chain '{chain_id}'")]
    KpiNotServed { kpi_code: String, chain_id: String },

    /// The catalog handed the handler metadata it cannot work with.
    #[error("Handler misconfigured: {0}")]
    Misconfigured(String),

    #[error("Storage error: {0}")]
    Storage(#[from] database::DbError),

    #[error("Storage query did not complete within {0:?}")]
    Timeout(Duration),

    #[error("An error occurred while computing the KPI: {0}")]
    Calculation(String),
}

impl From<core_types::CoreError> for HandlerError {
    fn from(err: core_types::CoreError) -> Self {
        HandlerError::InvalidParameters(err.to_string())
    }
}
