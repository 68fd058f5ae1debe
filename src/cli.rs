//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::logging::init_logging;
use crate::adapters::tracing_diagnostics::TracingDiagnostics;
use crate::domain::error::SoltradeError;
use crate::domain::replay::{self, ReplayReport};
use crate::domain::series::WindowedSeries;
use crate::domain::series_table::SeriesTable;
use crate::domain::settings::Settings;
use crate::ports::data_port::DataPort;
use crate::ports::diagnostic_port::DiagnosticPort;

#[derive(Parser, Debug)]
#[command(name = "soltrade", about = "Position lifecycle and exit-condition engine")]
pub struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a price series through one position with the configured exits
    Replay {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: PathBuf,
        #[arg(long)]
        token: String,
        #[arg(long)]
        interval: String,
        #[arg(long, default_value = "close")]
        alias: String,
    },
    /// Print rolling-window statistics for one series
    Stats {
        #[arg(short, long)]
        data: PathBuf,
        #[arg(long)]
        token: String,
        #[arg(long)]
        interval: String,
        #[arg(long, default_value = "close")]
        alias: String,
        #[arg(long, default_value_t = 14)]
        length: usize,
    },
    /// List tokens with data at an interval
    Tokens {
        #[arg(short, long)]
        data: PathBuf,
        #[arg(long)]
        interval: String,
    },
    /// Validate a strategy configuration
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    init_logging(&cli.log);

    let result = match cli.command {
        Command::Replay {
            config,
            data,
            token,
            interval,
            alias,
        } => run_replay(&config, &data, &token, &interval, &alias),
        Command::Stats {
            data,
            token,
            interval,
            alias,
            length,
        } => run_stats(&data, &token, &interval, &alias, length),
        Command::Tokens { data, interval } => run_tokens(&data, &interval),
        Command::Validate { config } => run_validate(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            (&e).into()
        }
    }
}

pub fn load_settings(path: &Path) -> Result<Settings, SoltradeError> {
    info!(path = %path.display(), "loading config");
    let adapter = FileConfigAdapter::from_file(path)?;
    Settings::from_config(&adapter)
}

pub fn load_table(
    data_port: &dyn DataPort,
    token: &str,
    interval: &str,
) -> Result<SeriesTable, SoltradeError> {
    let bars = data_port.fetch_ohlcv(token, interval)?;
    if bars.is_empty() {
        return Err(SoltradeError::Data {
            reason: format!("no bars for {token} at {interval}"),
        });
    }
    info!(token, interval, bars = bars.len(), "loaded OHLCV");
    Ok(SeriesTable::from_bars(&bars))
}

/// Loads the series, replays it and forwards every diagnostic to `diagnostics`.
pub fn run_replay_pipeline(
    data_port: &dyn DataPort,
    diagnostics: &dyn DiagnosticPort,
    settings: &Settings,
    token: &str,
    interval: &str,
    alias: &str,
) -> Result<ReplayReport, SoltradeError> {
    let table = load_table(data_port, token, interval)?;
    let report = replay::replay(token, &table, alias, settings)?;
    diagnostics.emit_all(&report.diagnostics);
    Ok(report)
}

fn run_replay(
    config_path: &Path,
    data_path: &Path,
    token: &str,
    interval: &str,
    alias: &str,
) -> Result<(), SoltradeError> {
    let settings = load_settings(config_path)?;
    let data_port = CsvAdapter::new(data_path.to_path_buf());
    let report = run_replay_pipeline(
        &data_port,
        &TracingDiagnostics,
        &settings,
        token,
        interval,
        alias,
    )?;

    println!("=== Replay: {} ({}) ===", report.token, settings.strategy_id);
    println!(
        "Entry:          {} @ {:.6} x {}",
        report.entry.timestamp, report.entry.entry_price, report.entry.entry_size
    );
    println!("Ticks:          {}", report.ticks);
    for exit in &report.exits {
        println!(
            "Exit {:<28} {:>6.2}% ({:.6} units), size now {:.4}",
            exit.kind,
            exit.pct_exited * 100.0,
            exit.quantity_exited,
            exit.resulting_position_size
        );
    }
    match report.closed_at {
        Some(ts) => println!("Closed at:      {ts}"),
        None => println!(
            "Open:           {:.4} of position, unrealized {:.6}",
            report.position.position_size(),
            report.position.unrealized_pnl()
        ),
    }
    Ok(())
}

/// Rolling-window summary of one series at lag 0.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesStats {
    pub alias: String,
    pub samples: usize,
    pub latest: Option<f64>,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub std_dev: Option<f64>,
    pub slope: Option<f64>,
    pub relative_strength: f64,
}

impl SeriesStats {
    pub fn compute(alias: &str, series: &WindowedSeries, length: usize) -> Self {
        SeriesStats {
            alias: alias.to_string(),
            samples: series.len(),
            latest: series.latest(),
            mean: series.mean(length, 0),
            min: series.min(length, 0),
            max: series.max(length, 0),
            std_dev: series.std_dev(length, 0),
            slope: series.slope(length, 0),
            relative_strength: series.relative_strength(length, 0),
        }
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.6}"))
}

fn run_stats(
    data_path: &Path,
    token: &str,
    interval: &str,
    alias: &str,
    length: usize,
) -> Result<(), SoltradeError> {
    if length == 0 {
        return Err(SoltradeError::invalid("length", "must be at least 1"));
    }
    let data_port = CsvAdapter::new(data_path.to_path_buf());
    let table = load_table(&data_port, token, interval)?;
    let stats = SeriesStats::compute(alias, table.series(alias)?, length);

    println!("=== {} {} `{}` (window {}) ===", token, interval, stats.alias, length);
    println!("Samples:   {}", stats.samples);
    println!("Latest:    {}", fmt_opt(stats.latest));
    println!("Mean:      {}", fmt_opt(stats.mean));
    println!("Min:       {}", fmt_opt(stats.min));
    println!("Max:       {}", fmt_opt(stats.max));
    println!("Std dev:   {}", fmt_opt(stats.std_dev));
    println!("Slope:     {}", fmt_opt(stats.slope));
    println!("RSI:       {:.2}", stats.relative_strength);
    Ok(())
}

fn run_tokens(data_path: &Path, interval: &str) -> Result<(), SoltradeError> {
    let data_port = CsvAdapter::new(data_path.to_path_buf());
    let tokens = data_port.list_tokens(interval)?;
    if tokens.is_empty() {
        warn!(interval, "no tokens found");
    }
    for token in tokens {
        println!("{token}");
    }
    Ok(())
}

fn run_validate(config_path: &Path) -> Result<(), SoltradeError> {
    let settings = load_settings(config_path)?;
    let exits = &settings.exits;

    println!("Strategy:     {}", settings.strategy_id);
    println!("Entry size:   {}", settings.entry_size);
    println!("Scan policy:  {:?}", exits.scan_policy);
    if exits.stop_loss_enabled() {
        println!(
            "  stop_loss                  {:.4} -> exit {:.4}",
            exits.stop_loss_pct, exits.stop_loss_exit
        );
    }
    if exits.take_profit_enabled() {
        println!(
            "  take_profit                {:.4} -> exit {:.4}",
            exits.take_profit_pct, exits.take_profit_exit
        );
    }
    if exits.trailing_stop_loss_enabled() {
        println!(
            "  trailing_stop_loss         {:.4} -> exit {:.4}",
            exits.trailing_stop_loss_pct, exits.trailing_stop_loss_exit
        );
    }
    if exits.trailing_take_profit_enabled() {
        println!(
            "  trailing_take_profit       {:.4} trail {:.4} -> exit {:.4}",
            exits.trailing_take_profit_target_pct,
            exits.trailing_take_profit_trail_pct,
            exits.trailing_take_profit_exit
        );
    }
    if exits.true_trailing_take_profit_enabled() {
        println!(
            "  true_trailing_take_profit  {:.4} -> exit {:.4}",
            exits.true_trailing_take_profit_pct, exits.true_trailing_take_profit_exit
        );
    }
    println!("Exit fractions sum to {:.4}", exits.enabled_exit_sum());
    println!("\nConfiguration is valid.");
    Ok(())
}
