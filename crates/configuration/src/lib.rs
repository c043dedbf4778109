use crate::error::ConfigError;
use crate::settings::Config;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod catalog;
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use catalog::{Catalog, ChainConfig, ChainKind, KpiDefinition};
pub use logging::init_tracing;
pub use settings::{CacheSettings, DatabaseSettings, HandlerSettings, LogFormat, LoggingSettings};

/// Loads the application configuration from a TOML file.
///
/// Values from the file can be overridden with environment variables prefixed `KPI__`,
/// using `__` as the section separator (e.g. `KPI__CACHE__DEFAULT_TTL_SECS=60`).
/// The result is validated before it is returned.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(config::Environment::with_prefix("KPI").separator("__"))
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}

/// Parses and validates a configuration held in memory.
pub fn load_config_from_str(toml: &str) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}
