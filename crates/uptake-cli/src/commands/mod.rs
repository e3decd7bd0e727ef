//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `forecast` - Full pipeline run (forecast, aggregate, analytics)
//! - `features` - Feature table, data-quality report and analytics views
//! - `config` - Effective forecast heuristics

pub mod config;
pub mod features;
pub mod forecast;

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};
use uptake_core::{CsvDirectorySource, ForecastConfig, RawTables};

// Re-export command functions for main.rs
pub use config::*;
pub use features::*;
pub use forecast::*;

/// Load forecast config from an explicit path or the default resolution
pub fn load_config(path: Option<&Path>) -> Result<ForecastConfig> {
    match path {
        Some(path) => ForecastConfig::load_from(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => ForecastConfig::load().context("Failed to load forecast config"),
    }
}

/// Read and normalize every dataset CSV in a directory
///
/// Datasets that fail to parse are treated as empty; the failure travels in
/// `RawTables::notes` into the data-quality report.
pub fn load_tables(data_dir: &Path) -> Result<RawTables> {
    if !data_dir.is_dir() {
        anyhow::bail!("Data directory not found: {}", data_dir.display());
    }

    info!("Loading datasets from {}", data_dir.display());
    let tables = RawTables::fetch_all(&CsvDirectorySource::new(data_dir));
    if !tables.notes.is_empty() {
        warn!(failed = tables.notes.len(), "Some datasets could not be loaded");
    }
    Ok(tables)
}

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
