//! # KPI Calculation Engine
//!
//! The orchestration layer of the KPI engine: it routes a request to its chain's handler,
//! serves repeated requests from the result cache and collapses concurrent duplicate
//! requests into a single computation (single-flight).
//!
//! ## Architectural Principles
//!
//! - **Layer 2 Orchestration:** The engine never looks at storage layout or formulas.
//!   Handlers own those; the engine owns dispatch, caching and deduplication.
//! - **Init-only routing:** `HandlerRegistry` is populated at boot through `&mut` access
//!   and read without locks afterwards.
//! - **Detached computations:** The first caller for a key spawns the computation as its
//!   own task. Every caller, the first included, only waits on its settlement, so any of
//!   them can be cancelled without affecting the others.
//!
//! ## Public API
//!
//! - `CalculationOrchestrator`: `calculate_single`, `calculate_many`, `register_handler`.
//! - `HandlerRegistry`: the `kpi_code -> chain_id -> handler` routing table.
//! - `ResultCache` / `InMemoryResultCache`: the TTL result cache.
//! - `InFlightRegistry`: the single-flight registry.
//! - `build_orchestrator`: wiring from the configuration catalog.
//! - `CalculationError`: the error taxonomy returned to callers.

// Declare the modules that constitute this crate.
pub mod bootstrap;
pub mod cache;
pub mod error;
pub mod in_flight;
pub mod orchestrator;
pub mod registry;
pub mod sweeper;

// Re-export the key components to create a clean, public-facing API.
pub use bootstrap::build_orchestrator;
pub use cache::{InMemoryResultCache, ResultCache};
pub use error::CalculationError;
pub use in_flight::{CoalescingKey, InFlightRegistry, Settlement};
pub use orchestrator::{CalculationOrchestrator, OrchestratorStats};
pub use registry::HandlerRegistry;
pub use sweeper::CacheSweeper;
