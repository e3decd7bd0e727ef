//! Forecast Engine
//!
//! Forecasts each (scheme, geo) series independently:
//!
//! 1. Resample observations into contiguous calendar-month buckets (gaps
//!    become zero months, nothing is interpolated).
//! 2. Pick a strategy from the number of monthly buckets:
//!    - `>= seasonal_min_history` - seasonal-naive (same month one lag ago)
//!    - `>= moving_average_min_history` - mean of the last N months
//!    - otherwise - last observed value
//! 3. Project the horizon, clamp at zero and attach a fixed-width band.
//!
//! Model names are labels for these heuristics, not fitted models.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info};

use crate::config::ForecastConfig;
use crate::features::FeatureBuilder;
use crate::models::{
    FeatureRow, ForecastRow, ModelKind, ModelPlanEntry, MonthKey, SeriesKey, Timeframe,
    MISSING_LABEL,
};
use crate::store::{save_or_symbolic, ArtifactId, ArtifactStore, TableInput};
use crate::table::Table;

/// Contiguous monthly totals for one series
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlySeries {
    start: Option<MonthKey>,
    values: Vec<f64>,
}

impl MonthlySeries {
    /// Sum observations into calendar months spanning the observed range
    pub fn resample(observations: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        let mut buckets: BTreeMap<MonthKey, f64> = BTreeMap::new();
        for (date, value) in observations {
            *buckets.entry(MonthKey::from_date(date)).or_default() += value;
        }

        let (Some(&first), Some(&last)) = (buckets.keys().next(), buckets.keys().next_back())
        else {
            return Self::default();
        };

        let span = first.months_until(last);
        let values = (0..=span)
            .map(|offset| buckets.get(&first.add_months(offset)).copied().unwrap_or(0.0))
            .collect();

        Self {
            start: Some(first),
            values,
        }
    }

    /// Number of monthly buckets (history points)
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn first_month(&self) -> Option<MonthKey> {
        self.start
    }

    pub fn last_month(&self) -> Option<MonthKey> {
        self.start
            .map(|start| start.add_months(self.values.len() as i64 - 1))
    }

    pub fn last_value(&self) -> Option<f64> {
        self.values.last().copied()
    }

    /// Value of a month inside the history range
    pub fn value_at(&self, month: MonthKey) -> Option<f64> {
        let offset = self.start?.months_until(month);
        if offset < 0 {
            return None;
        }
        self.values.get(offset as usize).copied()
    }

    /// Mean of the trailing `window` values (fewer if history is shorter)
    pub fn trailing_mean(&self, window: usize) -> Option<f64> {
        if self.values.is_empty() || window == 0 {
            return None;
        }
        let tail = &self.values[self.values.len().saturating_sub(window)..];
        Some(tail.iter().sum::<f64>() / tail.len() as f64)
    }
}

/// Forecast rows plus the per-series model plan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastRun {
    pub model_plan: Vec<ModelPlanEntry>,
    pub rows: Vec<ForecastRow>,
}

/// Forecast run with its stored handle and fallback notes
#[derive(Debug, Clone)]
pub struct ForecastOutput {
    pub run: ForecastRun,
    pub handle: ArtifactId,
    pub notes: Vec<String>,
}

/// Per-series forecasting with history-driven model selection
#[derive(Debug, Clone)]
pub struct ForecastEngine {
    config: ForecastConfig,
    /// Reference date for series without history (defaults to today)
    as_of: Option<NaiveDate>,
}

impl Default for ForecastEngine {
    fn default() -> Self {
        Self::new(ForecastConfig::default())
    }
}

impl ForecastEngine {
    pub fn new(config: ForecastConfig) -> Self {
        Self {
            config,
            as_of: None,
        }
    }

    /// Pin the reference date used for series without history
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Choose a strategy from the number of monthly history points
    pub fn select_model(&self, history_points: usize) -> ModelKind {
        if history_points >= self.config.seasonal_min_history {
            ModelKind::SeasonalNaive
        } else if history_points >= self.config.moving_average_min_history {
            ModelKind::MovingAverage(self.config.moving_average_window)
        } else {
            ModelKind::LastValue
        }
    }

    /// Resolve the feature input, forecast, and store the forecast rows
    pub fn run(
        &self,
        store: &dyn ArtifactStore,
        features: &TableInput,
        timeframe: Timeframe,
    ) -> ForecastOutput {
        let mut notes = Vec::new();
        let table = features.resolve(store, "features", &mut notes);
        let (rows, build_notes) = FeatureBuilder::new().build_rows(&table);
        notes.extend(build_notes);

        let run = self.forecast(&rows, timeframe);
        let stored = Table::from_rows_or_note(&run.rows, "forecasts_raw", &mut notes);
        let handle = save_or_symbolic(store, &stored, "forecasts_raw", &mut notes);

        ForecastOutput { run, handle, notes }
    }

    /// Forecast every series in a feature table
    ///
    /// An empty table yields `horizon` placeholder zero rows and no plan.
    pub fn forecast(&self, features: &[FeatureRow], timeframe: Timeframe) -> ForecastRun {
        let horizon = timeframe.horizon();

        if features.is_empty() {
            info!(horizon, "No feature rows; emitting zero forecast");
            return ForecastRun {
                model_plan: Vec::new(),
                rows: zero_rows(horizon),
            };
        }

        let mut series: BTreeMap<SeriesKey, Vec<(NaiveDate, f64)>> = BTreeMap::new();
        for row in features {
            series
                .entry(row.series_key())
                .or_default()
                .push((row.date, row.apps_count));
        }

        let mut run = ForecastRun::default();
        for (key, observations) in series {
            let history = MonthlySeries::resample(observations);
            let (entry, rows) = self.forecast_series(&key, &history, timeframe);
            run.model_plan.push(entry);
            run.rows.extend(rows);
        }

        info!(
            series = run.model_plan.len(),
            rows = run.rows.len(),
            timeframe = timeframe.as_str(),
            "Forecast complete"
        );
        run
    }

    /// Forecast one series from its monthly history
    pub fn forecast_series(
        &self,
        key: &SeriesKey,
        history: &MonthlySeries,
        timeframe: Timeframe,
    ) -> (ModelPlanEntry, Vec<ForecastRow>) {
        let history_points = history.len();
        let model = self.select_model(history_points);
        let series_id = key.series_id();

        debug!(series = %series_id, model = %model, history_points, "Selected model");

        // Forecast months follow the last historical month
        let last_month = history.last_month().unwrap_or_else(|| {
            MonthKey::from_date(self.as_of.unwrap_or_else(|| Utc::now().date_naive()))
        });

        let rows = (1..=timeframe.horizon())
            .map(|step| {
                let target = last_month.add_months(step as i64);
                let yhat = self.point_forecast(model, history, target).max(0.0);
                let (yhat_low, yhat_high) = self.band(yhat);
                ForecastRow {
                    series_id: series_id.clone(),
                    scheme_id: Some(key.scheme_id.clone()),
                    geo_code: key.geo_code.clone(),
                    period: format!("P{}", step),
                    forecast_month: Some(target.to_string()),
                    yhat,
                    yhat_low,
                    yhat_high,
                    model,
                    history_points,
                }
            })
            .collect();

        let entry = ModelPlanEntry {
            series_id,
            model_name: model,
            history_points,
        };
        (entry, rows)
    }

    /// Unclamped point forecast for one target month
    fn point_forecast(&self, model: ModelKind, history: &MonthlySeries, target: MonthKey) -> f64 {
        match model {
            ModelKind::SeasonalNaive => history
                .value_at(target.add_months(-(self.config.seasonal_lag_months as i64)))
                .unwrap_or_else(|| self.moving_average(history)),
            ModelKind::MovingAverage(_) => self.moving_average(history),
            ModelKind::LastValue | ModelKind::ZeroForecast => history.last_value().unwrap_or(0.0),
        }
    }

    /// Trailing mean over known history; the window never includes forecasts
    fn moving_average(&self, history: &MonthlySeries) -> f64 {
        history
            .trailing_mean(self.config.moving_average_window)
            .unwrap_or(0.0)
    }

    /// Band edges around a non-negative point forecast
    fn band(&self, yhat: f64) -> (f64, f64) {
        let decimals = self.config.band_rounding_decimals;
        let low = round_to(f64::max(0.0, yhat * (1.0 - self.config.band_pct)), decimals);
        let high = round_to(yhat * (1.0 + self.config.band_pct), decimals);
        (low, high)
    }
}

/// Placeholder rows for a run with no data
fn zero_rows(horizon: usize) -> Vec<ForecastRow> {
    (1..=horizon)
        .map(|step| ForecastRow {
            series_id: MISSING_LABEL.to_string(),
            scheme_id: None,
            geo_code: MISSING_LABEL.to_string(),
            period: format!("P{}", step),
            forecast_month: None,
            yhat: 0.0,
            yhat_low: 0.0,
            yhat_high: 0.0,
            model: ModelKind::ZeroForecast,
            history_points: 0,
        })
        .collect()
}

/// Round to a fixed number of decimal places
pub(crate) fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}
