//! Pricehouse CLI: store lifecycle and pipeline commands.
//!
//! Commands:
//! - `setup`: create the raw table, `v_clean_data` and `v_market_analysis`
//! - `ingest`: fetch one window from the provider and append it
//! - `materialize`: refresh `mv_market_analysis` from the raw table
//! - `status`: row counts, duplicates and recent batches
//! - `show`: print the analytics series for one instrument
//! - `export`: write one instrument's analytics series to Parquet
//! - `reset`: drop every store object (requires `--confirm`)

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pricehouse_core::analytics::SeriesSummary;
use pricehouse_core::config::{ProviderKind, DEFAULT_CONFIG_FILE};
use pricehouse_core::data::Span;
use pricehouse_core::domain::AnalyticsRow;
use pricehouse_core::ingest::IngestionAdapter;
use pricehouse_core::logging::{init_logging, LogConfig};
use pricehouse_core::store::{export_parquet, materialize, StoreStatus};
use pricehouse_core::{PipelineError, PricehouseConfig, Warehouse};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pricehouse",
    about = "Pricehouse CLI: market-data ingestion and windowed analytics"
)]
struct Cli {
    /// Path to the TOML config file. Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the raw table and the dedup and analytics views.
    Setup,
    /// Fetch one window from the provider and append it to the raw table.
    Ingest {
        /// Instruments to fetch (e.g., BTC-USD AAPL). Defaults to `ingest.instruments`.
        #[arg(long, num_args = 1..)]
        instruments: Vec<String>,

        /// Look-back window (e.g., 1d, 5d). Defaults to `ingest.period`.
        #[arg(long)]
        period: Option<String>,

        /// Bar size (e.g., 1h, 15m). Defaults to `ingest.interval`.
        #[arg(long)]
        interval: Option<String>,

        /// Use the offline synthetic provider.
        #[arg(long, default_value_t = false)]
        synthetic: bool,
    },
    /// Refresh the materialized analytics table.
    Materialize,
    /// Report row counts, duplicates and recent ingestion batches.
    Status {
        /// Emit JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the analytics series for one instrument.
    Show {
        ticker: String,

        /// Only the last N rows.
        #[arg(long)]
        tail: Option<usize>,
    },
    /// Export one instrument's analytics series to a Parquet file.
    Export {
        ticker: String,

        /// Output file.
        #[arg(long)]
        out: PathBuf,
    },
    /// Drop all tables and views.
    Reset {
        /// Actually drop (without this flag, only lists what would be dropped).
        #[arg(long, default_value_t = false)]
        confirm: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LogConfig::from_env().with_default_level("warn"))?;

    let config = PricehouseConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Setup => run_setup(&config),
        Commands::Ingest {
            instruments,
            period,
            interval,
            synthetic,
        } => run_ingest(config, instruments, period, interval, synthetic),
        Commands::Materialize => run_materialize(&config),
        Commands::Status { json } => run_status(&config, json),
        Commands::Show { ticker, tail } => run_show(&config, &ticker, tail),
        Commands::Export { ticker, out } => run_export(&config, &ticker, out),
        Commands::Reset { confirm } => run_reset(&config, confirm),
    }
}

/// Open the store, creating the database file if needed. Used by commands that write.
fn open_store(config: &PricehouseConfig) -> Result<Warehouse> {
    Warehouse::from_config(&config.store).map_err(unreachable_context)
}

/// Open a store that must already exist. A wrong path is an error, not a new empty file.
fn open_existing_store(config: &PricehouseConfig) -> Result<Warehouse> {
    Warehouse::open_existing(&config.store.path).map_err(unreachable_context)
}

fn unreachable_context(e: PipelineError) -> anyhow::Error {
    match e {
        PipelineError::Connectivity(_) => anyhow::Error::new(e).context("store unreachable"),
        other => other.into(),
    }
}

fn run_setup(config: &PricehouseConfig) -> Result<()> {
    let mut store = open_store(config)?;
    store.setup()?;
    println!("Store ready: {}", store.location());
    println!("  raw_stock_data, v_clean_data, v_market_analysis");
    store.close()?;
    Ok(())
}

fn run_ingest(
    mut config: PricehouseConfig,
    instruments: Vec<String>,
    period: Option<String>,
    interval: Option<String>,
    synthetic: bool,
) -> Result<()> {
    if !instruments.is_empty() {
        config.ingest.instruments = instruments;
    }
    if let Some(period) = period {
        config.ingest.period = Span::parse(&period)?;
    }
    if let Some(interval) = interval {
        config.ingest.interval = Span::parse(&interval)?;
    }
    if synthetic {
        config.ingest.provider = ProviderKind::Synthetic;
    }
    if config.ingest.interval.duration() > config.ingest.period.duration() {
        bail!(
            "--interval {} is longer than --period {}",
            config.ingest.interval,
            config.ingest.period
        );
    }

    let adapter = IngestionAdapter::from_config(&config)?;
    let mut store = open_store(&config)?;
    let report = adapter.ingest(&mut store, &config.ingest.instrument_set())?;
    store.close()?;

    println!(
        "Batch {} from {}: {} rows appended",
        report.batch_id, report.provider, report.rows_appended
    );
    for symbol in &report.skipped {
        println!("  skipped (not found): {symbol}");
    }
    for column in &report.dropped_columns {
        println!("  dropped column: {column}");
    }
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
    Ok(())
}

fn run_materialize(config: &PricehouseConfig) -> Result<()> {
    let mut store = open_store(config)?;
    let report = materialize(&mut store)?;
    store.close()?;

    if report.instruments.is_empty() {
        println!("Nothing to materialize: the raw table is empty.");
        return Ok(());
    }
    println!("{:<12} {:<12} {:>8}", "Ticker", "Mode", "Rows");
    println!("{}", "-".repeat(34));
    for entry in &report.instruments {
        println!(
            "{:<12} {:<12} {:>8}",
            entry.instrument,
            format!("{:?}", entry.mode),
            entry.rows_written
        );
    }
    println!("Total rows written: {}", report.rows_written());
    Ok(())
}

fn run_status(config: &PricehouseConfig, json: bool) -> Result<()> {
    let store = open_existing_store(config)?;
    let status = store.status()?;
    let batches = if status.raw_table {
        store.recent_batches(5)?
    } else {
        Vec::new()
    };
    store.close()?;

    if json {
        let value = serde_json::json!({ "status": status, "recent_batches": batches });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    print_status(&status);
    if !batches.is_empty() {
        println!();
        println!("--- Recent batches ---");
        for batch in &batches {
            println!(
                "#{:<5} {}  {:<10} {:>6} rows  {}",
                batch.batch_id,
                batch.ingested_at.format("%Y-%m-%d %H:%M:%S"),
                batch.meta.provider,
                batch.rows_appended,
                batch.meta.instruments.join(",")
            );
            for warning in &batch.meta.warnings {
                println!("        warning: {warning}");
            }
        }
    }
    Ok(())
}

fn print_status(status: &StoreStatus) {
    println!("Store: {}", status.location);
    if !status.raw_table {
        println!("Not set up. Run `pricehouse setup`.");
        return;
    }
    println!(
        "Views:          {}",
        if status.views { "present" } else { "missing" }
    );
    println!("Raw rows:       {}", status.raw_rows);
    println!("Clean rows:     {}", status.clean_rows);
    println!("Duplicates:     {}", status.duplicate_rows());
    if status.materialized {
        println!("Materialized:   {}", status.materialized_rows);
    }
    println!("Batches:        {}", status.batches);
    if let Some(last) = status.last_ingest {
        println!("Last ingest:    {}", last.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if status.instruments.is_empty() {
        return;
    }
    println!();
    println!(
        "{:<12} {:>8} {:>8} {:<20} {:<20}",
        "Ticker", "Raw", "Clean", "First", "Last"
    );
    println!("{}", "-".repeat(72));
    for entry in &status.instruments {
        println!(
            "{:<12} {:>8} {:>8} {:<20} {:<20}",
            entry.instrument,
            entry.raw_rows,
            entry.clean_rows,
            format_ts(entry.first),
            format_ts(entry.last)
        );
    }
}

fn run_show(config: &PricehouseConfig, ticker: &str, tail: Option<usize>) -> Result<()> {
    let store = open_existing_store(config)?;
    let rows = store.analytics(ticker)?;
    store.close()?;

    if rows.is_empty() {
        bail!("no rows for {ticker}");
    }
    let start = tail.map_or(0, |n| rows.len().saturating_sub(n));

    println!(
        "{:<20} {:>12} {:>12} {:>12} {:>10}",
        "Datetime", "Close", "ma_7", "prev_close", "return"
    );
    println!("{}", "-".repeat(70));
    for row in &rows[start..] {
        print_row(row);
    }

    match SeriesSummary::from_rows(ticker, &rows) {
        Ok(summary) => {
            println!();
            println!("=== {} ===", summary.instrument);
            println!("Rows:           {}", summary.rows);
            println!("Latest close:   {}", format_num(summary.latest_close));
            println!("Latest change:  {}", format_pct(summary.latest_change));
            println!("ma_7:           {}", format_num(summary.latest_moving_avg));
            println!("Return std dev: {}", format_pct(summary.return_std_dev));
        }
        Err(PipelineError::EmptySeries { rows, .. }) => {
            println!();
            println!("Only {rows} row(s): not enough history for summary metrics.");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn print_row(row: &AnalyticsRow) {
    println!(
        "{:<20} {:>12} {:>12} {:>12} {:>10}",
        row.timestamp.format("%Y-%m-%d %H:%M"),
        format_num(row.close),
        format_num(row.moving_avg_7),
        format_num(row.prior_close),
        format_pct(row.fractional_change)
    );
}

fn run_export(config: &PricehouseConfig, ticker: &str, out: PathBuf) -> Result<()> {
    let store = open_existing_store(config)?;
    let report = export_parquet(&store, ticker, &out)?;
    store.close()?;
    println!(
        "Exported {} rows for {} to {}",
        report.rows,
        report.instrument,
        report.path.display()
    );
    Ok(())
}

fn run_reset(config: &PricehouseConfig, confirm: bool) -> Result<()> {
    let mut store = open_existing_store(config)?;
    let status = store.status()?;

    println!("Store: {}", status.location);
    println!(
        "Would drop: mv_market_analysis, mv_watermark, v_market_analysis, v_clean_data, raw_stock_data, ingest_log"
    );
    println!("Raw rows lost: {}", status.raw_rows);

    if !confirm {
        println!();
        println!("Dry run. Pass --confirm to actually drop.");
        store.close()?;
        return Ok(());
    }

    store.reset()?;
    store.close()?;
    tracing::warn!(location = %status.location, "store reset");
    println!("Done. Store reset.");
    Ok(())
}

fn format_ts(ts: Option<chrono::DateTime<chrono::Utc>>) -> String {
    ts.map_or_else(|| "-".into(), |t| t.format("%Y-%m-%d %H:%M").to_string())
}

fn format_num(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".into(), |v| format!("{v:.4}"))
}

fn format_pct(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".into(), |v| format!("{:+.2}%", v * 100.0))
}
