//! # KPI Calculation Handlers
//!
//! This crate contains the computation side of the KPI engine. It defines the universal
//! `CalculationHandler` trait and provides the built-in handler families.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** Handlers receive their catalog metadata and a `MetricStore`; they
//!   never load configuration or open connections themselves.
//! - **Handler Agnostic Orchestrator:** By using the `CalculationHandler` trait, the
//!   orchestrator can dispatch to any KPI family without knowing how it computes.
//! - **Extensibility:** Third-party families implement the trait and are registered
//!   directly; built-in families are added to `ChainKind` and the `factory`.
//!
//! ## Public API
//!
//! - `CalculationHandler`: The core trait all handlers implement.
//! - `create_handler`: The factory function building a handler for a catalog chain.
//! - `AggregateHandler`, `RatioHandler`: The built-in families.

// Declare all the modules that constitute this crate.
pub mod aggregate;
pub mod error;
pub mod factory;
pub mod ratio;
mod support;

// Re-export the key components to create a clean, public-facing API.
pub use aggregate::AggregateHandler;
pub use error::HandlerError;
pub use factory::create_handler;
pub use ratio::RatioHandler;

use async_trait::async_trait;
use core_types::{CalculationParams, CalculationResult};
use std::time::Duration;

/// The capability set every KPI family implements.
///
/// The `Send + Sync` bounds are required because one handler instance serves every
/// concurrent request for its chain, each on its own task.
#[async_trait]
pub trait CalculationHandler: Send + Sync {
    /// The chain this handler was registered for.
    fn chain_id(&self) -> &str;

    /// Whether results may be served from, and written to, the result cache.
    ///
    /// When this returns `false`, `get_cache_key` is never called.
    fn caching_enabled(&self) -> bool;

    /// TTL for cached results. `None` defers to the cache's default policy.
    fn cache_ttl(&self) -> Option<Duration> {
        None
    }

    /// Rejects malformed requests without touching storage.
    fn validate_params(&self, params: &CalculationParams) -> Result<(), HandlerError>;

    /// Computes one KPI value. This is the slow path.
    async fn calculate(&self, params: &CalculationParams) -> Result<CalculationResult, HandlerError>;

    /// A deterministic key identifying the semantic request.
    fn get_cache_key(&self, params: &CalculationParams) -> String {
        format!("{}:{}", self.chain_id(), params.canonical_key())
    }
}
