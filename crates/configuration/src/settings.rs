use crate::catalog::Catalog;
use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub handlers: HandlerSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub catalog: Catalog,
}

/// Connection settings for the metrics database.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Falls back to the `DATABASE_URL` environment variable when absent.
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

/// Parameters for the result cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// TTL applied when a chain does not declare its own.
    pub default_ttl_secs: u64,
    /// Period of the background sweep that drops expired entries. `0` disables it;
    /// expired entries are then only evicted when they are probed.
    pub sweep_interval_secs: u64,
}

/// Settings shared by every handler family.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HandlerSettings {
    /// Upper bound for a single storage round trip.
    pub query_timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum LogFormat {
    Full,
    Compact,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter directive, overridden by `RUST_LOG` when set.
    pub level: String,
    pub format: LogFormat,
    /// When set, logs are also written to a daily rolling file in this directory.
    pub directory: Option<PathBuf>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            acquire_timeout_secs: 5,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            query_timeout_ms: 10_000,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Full,
            directory: None,
        }
    }
}

impl CacheSettings {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}

impl HandlerSettings {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl Config {
    /// Checks the invariants serde cannot express.
    ///
    /// A KPI mapped to a chain that has no `[[catalog.chains]]` entry is allowed here;
    /// it is reported once as a warning and fails per request instead.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.default_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cache.default_ttl_secs must be greater than 0".to_string(),
            ));
        }
        if self.handlers.query_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "handlers.query_timeout_ms must be greater than 0".to_string(),
            ));
        }

        let mut chain_ids = HashSet::new();
        for chain in &self.catalog.chains {
            if !chain_ids.insert(chain.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "chain '{}' is declared more than once",
                    chain.id
                )));
            }
            if chain.cache_ttl_secs == Some(0) {
                return Err(ConfigError::ValidationError(format!(
                    "chain '{}' has a cache_ttl_secs of 0",
                    chain.id
                )));
            }
        }

        let mut kpi_codes = HashSet::new();
        for kpi in &self.catalog.kpis {
            if kpi.code.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "a KPI is declared with an empty code".to_string(),
                ));
            }
            if !kpi_codes.insert(kpi.code.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "KPI '{}' is declared more than once",
                    kpi.code
                )));
            }
            if !is_table_identifier(&kpi.base_table) {
                return Err(ConfigError::ValidationError(format!(
                    "KPI '{}' has an invalid base_table '{}'",
                    kpi.code, kpi.base_table
                )));
            }
            if let Some(metric) = kpi.referenced_metrics().into_iter().find(|m| m.trim().is_empty()) {
                return Err(ConfigError::ValidationError(format!(
                    "KPI '{}' references an empty metric name '{}'",
                    kpi.code, metric
                )));
            }
            if !chain_ids.contains(kpi.chain.as_str()) {
                tracing::warn!(
                    kpi_code = %kpi.code,
                    chain_id = %kpi.chain,
                    "KPI is mapped to a chain with no handler definition; requests for it will fail."
                );
            }
        }

        Ok(())
    }
}

fn is_table_identifier(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
