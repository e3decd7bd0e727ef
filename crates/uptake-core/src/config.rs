//! Forecast heuristic configuration
//!
//! Model-selection thresholds and the confidence band width are heuristics,
//! kept configurable rather than hard-coded.
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/uptake/config/forecast.toml)
//! 2. Fall back to embedded defaults (compiled into binary)

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::Timeframe;

/// Most decimals an f64 band edge can meaningfully keep
pub const MAX_ROUNDING_DECIMALS: u32 = 15;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/forecast.toml");

/// Heuristics used by the forecast engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastConfig {
    /// Monthly history points at or above which seasonal-naive is used
    pub seasonal_min_history: usize,
    /// Monthly history points at or above which the moving average is used
    pub moving_average_min_history: usize,
    /// Months averaged by the moving average
    pub moving_average_window: usize,
    /// Seasonal-naive look-back in months
    pub seasonal_lag_months: usize,
    /// Band half-width as a fraction of the point forecast
    pub band_pct: f64,
    /// Decimal places kept on band edges
    pub band_rounding_decimals: u32,
    /// Horizon used when the caller gives none
    pub default_timeframe: Timeframe,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            seasonal_min_history: 18,
            moving_average_min_history: 3,
            moving_average_window: 3,
            seasonal_lag_months: 12,
            band_pct: 0.10,
            band_rounding_decimals: 3,
            default_timeframe: Timeframe::NextQuarter,
        }
    }
}

impl ForecastConfig {
    /// Load with default resolution (override file, then embedded defaults)
    pub fn load() -> Result<Self> {
        load_config(None)
    }

    /// Load from an explicit override path (embedded defaults if missing)
    pub fn load_from(path: &Path) -> Result<Self> {
        load_config(Some(path))
    }

    /// Parse config from TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        parse_config(content)
    }

    /// Check the heuristics are internally consistent
    pub fn validate(&self) -> Result<()> {
        if self.moving_average_window == 0 {
            return Err(Error::Config("moving_average_window must be at least 1".into()));
        }
        if self.seasonal_lag_months == 0 {
            return Err(Error::Config("seasonal_lag_months must be at least 1".into()));
        }
        if self.moving_average_min_history > self.seasonal_min_history {
            return Err(Error::Config(format!(
                "moving_average_min_history ({}) exceeds seasonal_min_history ({})",
                self.moving_average_min_history, self.seasonal_min_history
            )));
        }
        if !(0.0..1.0).contains(&self.band_pct) {
            return Err(Error::Config(format!(
                "band pct must be in [0, 1), got {}",
                self.band_pct
            )));
        }
        if self.band_rounding_decimals > MAX_ROUNDING_DECIMALS {
            return Err(Error::Config(format!(
                "band rounding_decimals must be at most {}, got {}",
                MAX_ROUNDING_DECIMALS, self.band_rounding_decimals
            )));
        }
        Ok(())
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("uptake").join("config").join("forecast.toml"))
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&Path>) -> Result<ForecastConfig> {
    let path = override_path
        .map(Path::to_path_buf)
        .or_else(default_config_path);

    let content = match path {
        Some(path) if path.exists() => fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?,
        _ => DEFAULT_CONFIG.to_string(),
    };

    parse_config(&content)
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    selection: Option<RawSelection>,
    band: Option<RawBand>,
    defaults: Option<RawDefaults>,
}

#[derive(Debug, Deserialize)]
struct RawSelection {
    seasonal_min_history: Option<usize>,
    moving_average_min_history: Option<usize>,
    moving_average_window: Option<usize>,
    seasonal_lag_months: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawBand {
    pct: Option<f64>,
    rounding_decimals: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawDefaults {
    timeframe: Option<String>,
}

fn parse_config(content: &str) -> Result<ForecastConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = ForecastConfig::default();

    if let Some(selection) = raw.selection {
        if let Some(v) = selection.seasonal_min_history {
            config.seasonal_min_history = v;
        }
        if let Some(v) = selection.moving_average_min_history {
            config.moving_average_min_history = v;
        }
        if let Some(v) = selection.moving_average_window {
            config.moving_average_window = v;
        }
        if let Some(v) = selection.seasonal_lag_months {
            config.seasonal_lag_months = v;
        }
    }

    if let Some(band) = raw.band {
        if let Some(pct) = band.pct {
            config.band_pct = pct;
        }
        if let Some(decimals) = band.rounding_decimals {
            config.band_rounding_decimals = decimals;
        }
    }

    if let Some(defaults) = raw.defaults {
        if let Some(timeframe) = defaults.timeframe {
            config.default_timeframe = timeframe.parse().map_err(Error::Config)?;
        }
    }

    config.validate()?;
    Ok(config)
}
