//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Uptake - Forecast scheme application demand
#[derive(Parser)]
#[command(name = "uptake")]
#[command(about = "Scheme uptake forecasting and aggregation", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Forecast config file (defaults to ~/.local/share/uptake/config/forecast.toml, then built-in)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Forecast demand per series and roll it up by region and period
    Forecast {
        /// Directory holding applications.csv, promotions.csv, ...
        #[arg(short, long)]
        data_dir: PathBuf,

        /// Horizon: next_quarter, next_6_months, next_year
        #[arg(short, long)]
        timeframe: Option<String>,

        /// Only forecast these schemes (repeatable)
        #[arg(long = "scheme")]
        schemes: Vec<String>,

        /// Only forecast these regions (repeatable)
        #[arg(long = "region")]
        regions: Vec<String>,

        /// Persist run artifacts to this directory
        #[arg(long)]
        store: Option<PathBuf>,

        /// Print the full run output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build the feature table and show the data-quality report
    Features {
        /// Directory holding the dataset CSV files
        #[arg(short, long)]
        data_dir: PathBuf,

        /// Print features and report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compute the analytics views
    Analytics {
        /// Directory holding the dataset CSV files
        #[arg(short, long)]
        data_dir: PathBuf,

        /// Print the analytics bundle as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective forecast heuristics
    Config,
}
