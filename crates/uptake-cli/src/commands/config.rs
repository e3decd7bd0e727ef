//! Config command implementation

use std::path::Path;

use anyhow::Result;
use uptake_core::config::default_config_path;

use super::load_config;

pub fn cmd_config(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;

    let source = match config_path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(path) if path.exists() => path.display().to_string(),
        _ => "built-in defaults".to_string(),
    };

    println!();
    println!("⚙️  Forecast Config");
    println!("   Source: {}", source);
    println!("   ─────────────────────────────────────────────────────────────");
    println!(
        "   Seasonal-naive from:   {} months of history (lag {} months)",
        config.seasonal_min_history, config.seasonal_lag_months
    );
    println!(
        "   Moving average from:   {} months of history (window {})",
        config.moving_average_min_history, config.moving_average_window
    );
    println!(
        "   Confidence band:       ±{:.0}% ({} decimals)",
        config.band_pct * 100.0,
        config.band_rounding_decimals
    );
    println!("   Default timeframe:     {}", config.default_timeframe);

    Ok(())
}
