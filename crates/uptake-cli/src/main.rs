//! Uptake CLI - Scheme uptake forecasting
//!
//! Usage:
//!   uptake forecast --data-dir DIR        Forecast and aggregate
//!   uptake features --data-dir DIR        Feature table and data quality
//!   uptake analytics --data-dir DIR       Chart-ready analytics views
//!   uptake config                         Effective heuristics

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Forecast {
            data_dir,
            timeframe,
            schemes,
            regions,
            store,
            json,
        } => commands::cmd_forecast(
            config_path,
            &data_dir,
            &commands::ForecastArgs {
                timeframe,
                schemes,
                regions,
                store,
            },
            json,
        ),
        Commands::Features { data_dir, json } => commands::cmd_features(&data_dir, json),
        Commands::Analytics { data_dir, json } => commands::cmd_analytics(&data_dir, json),
        Commands::Config => commands::cmd_config(config_path),
    }
}
