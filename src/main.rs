use anyhow::{Context, bail};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Table};
use configuration::settings::Config;
use configuration::{LogFormat, init_tracing, load_config};
use core_types::{CalculationParams, TimeRange};
use database::{DbRepository, connect};
use engine::{CalculationOrchestrator, InMemoryResultCache, build_orchestrator};
use std::path::PathBuf;
use std::sync::Arc;

/// The main entry point for the KPI engine CLI.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; settings can come from config.toml or KPI__ variables.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    let _log_guard = init_tracing(&config.logging)?;

    match cli.command {
        Commands::Calculate(args) => handle_calculate(args, &config).await,
        Commands::Tiers(args) => handle_tiers(args),
        Commands::Catalog => handle_catalog(&config),
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Computes KPIs over tiered time-series storage.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Overrides the log format from the configuration.
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute a KPI, optionally firing the same request several times at once.
    Calculate(CalculateArgs),
    /// Show which storage tier would serve a time range.
    Tiers(TiersArgs),
    /// List the configured KPIs.
    Catalog,
}

#[derive(Parser)]
struct CalculateArgs {
    /// The KPI code (e.g., "TOTAL_REVENUE").
    #[arg(long)]
    kpi: String,

    /// Start of the range, inclusive (RFC 3339 or YYYY-MM-DD).
    #[arg(long, value_parser = parse_instant)]
    from: DateTime<Utc>,

    /// End of the range, exclusive (RFC 3339 or YYYY-MM-DD).
    #[arg(long, value_parser = parse_instant)]
    to: DateTime<Utc>,

    /// Bucket width used when raw data is queried.
    #[arg(long, default_value = "1 minute")]
    resolution: String,

    /// Dimension filter, repeatable (e.g., --filter region=EU).
    #[arg(long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, String)>,

    /// Number of identical concurrent requests to send.
    #[arg(long, default_value_t = 1)]
    repeat: usize,
}

#[derive(Parser)]
struct TiersArgs {
    /// The base table of the KPI (e.g., "sales_events").
    #[arg(long)]
    table: String,

    #[arg(long, value_parser = parse_instant)]
    from: DateTime<Utc>,

    #[arg(long, value_parser = parse_instant)]
    to: DateTime<Utc>,

    #[arg(long, default_value = "1 minute")]
    resolution: String,
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("'{value}' is neither an RFC 3339 timestamp nor a YYYY-MM-DD date"))
}

fn parse_filter(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((key, val)) if !key.is_empty() => Ok((key.to_string(), val.to_string())),
        _ => Err(format!("'{value}' is not a key=value filter")),
    }
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn handle_calculate(args: CalculateArgs, config: &Config) -> anyhow::Result<()> {
    if args.repeat == 0 {
        bail!("--repeat must be at least 1");
    }
    let range = TimeRange::new(args.from, args.to)?;
    let params = args
        .filters
        .into_iter()
        .fold(CalculationParams::new(args.kpi, range, args.resolution), |params, (key, val)| {
            params.with_filter(key, val)
        });

    let pool = connect(&config.database).await?;
    let store = Arc::new(DbRepository::new(pool));
    let orchestrator = Arc::new(build_orchestrator(
        config,
        store,
        Arc::new(InMemoryResultCache::new()),
    )?);
    let sweeper = config
        .cache
        .sweep_interval()
        .map(|period| orchestrator.spawn_cache_sweeper(period));

    tracing::info!(kpi_code = %params.kpi_code, repeat = args.repeat, "Submitting requests.");
    let requests = vec![params; args.repeat];
    let outcomes = orchestrator.calculate_many(&requests).await;

    let mut table = Table::new();
    table.set_header(vec!["#", "KPI", "Value", "Unit", "Tier", "Time (ms)", "Error"]);
    for (i, outcome) in outcomes.iter().enumerate() {
        match outcome {
            Ok(result) => table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(&result.kpi_code),
                Cell::new(result.value),
                Cell::new(&result.unit),
                Cell::new(result.source_tier.map(|t| t.to_string()).unwrap_or_default()),
                Cell::new(result.calculation_time_ms),
                Cell::new(""),
            ]),
            Err(e) => table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(&requests[i].kpi_code),
                Cell::new(""),
                Cell::new(""),
                Cell::new(""),
                Cell::new(""),
                Cell::new(e),
            ]),
        };
    }
    println!("{table}");
    print_stats(&orchestrator);

    if let Some(handle) = sweeper {
        handle.abort();
    }
    Ok(())
}

fn print_stats(orchestrator: &CalculationOrchestrator) {
    let stats = orchestrator.stats();
    let mut table = Table::new();
    table.set_header(vec!["Cache hits", "Cache misses", "Coalesced", "Handler invocations"]);
    table.add_row(vec![
        stats.cache_hits,
        stats.cache_misses,
        stats.coalesced,
        stats.handler_invocations,
    ]);
    println!("{table}");
}

fn handle_tiers(args: TiersArgs) -> anyhow::Result<()> {
    let range = TimeRange::new(args.from, args.to)?;
    let selection = tiering::select_source(&args.table, &range, &args.resolution);

    let mut table = Table::new();
    table.set_header(vec!["Span (days)", "Tier", "Table", "Bucket"]);
    table.add_row(vec![
        Cell::new(range.duration().num_days()),
        Cell::new(selection.tier),
        Cell::new(selection.table_name),
        Cell::new(selection.bucket_interval),
    ]);
    println!("{table}");
    Ok(())
}

fn handle_catalog(config: &Config) -> anyhow::Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["KPI", "Chain", "Unit", "Base table", "Caching"]);
    for kpi in &config.catalog.kpis {
        let caching = match config.catalog.chain(&kpi.chain) {
            Some(chain) if chain.caching => "yes",
            Some(_) => "no",
            None => "undeclared chain",
        };
        table.add_row(vec![
            kpi.code.as_str(),
            kpi.chain.as_str(),
            kpi.unit.as_str(),
            kpi.base_table.as_str(),
            caching,
        ]);
    }
    println!("{table}");
    Ok(())
}
