//! Data models for Uptake

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Placeholder for a missing region, scheme or series identifier
pub const MISSING_LABEL: &str = "—";

// ========== Calendar ==========

/// A calendar month, ordered chronologically
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    /// Create a month key, returning None if month is outside 1..=12
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    fn ordinal(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    fn from_ordinal(ordinal: i64) -> Self {
        Self {
            year: ordinal.div_euclid(12) as i32,
            month: ordinal.rem_euclid(12) as u32 + 1,
        }
    }

    /// Shift by a (possibly negative) number of months
    pub fn add_months(self, months: i64) -> Self {
        Self::from_ordinal(self.ordinal() + months)
    }

    /// Number of months from `self` to `other` (negative if `other` is earlier)
    pub fn months_until(self, other: MonthKey) -> i64 {
        other.ordinal() - self.ordinal()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("Invalid month key: {}", s))?;
        let year: i32 = year
            .parse()
            .map_err(|_| format!("Invalid month key year: {}", s))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("Invalid month key month: {}", s))?;
        MonthKey::new(year, month).ok_or_else(|| format!("Invalid month key month: {}", s))
    }
}

/// Calendar quarter (1-4) for a month number
pub fn quarter_of(month: u32) -> u32 {
    (month.saturating_sub(1)) / 3 + 1
}

// ========== Timeframe ==========

/// Forecast horizon selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Timeframe {
    #[default]
    #[serde(rename = "next_quarter")]
    NextQuarter,
    #[serde(rename = "next_6_months")]
    NextSixMonths,
    #[serde(rename = "next_year")]
    NextYear,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NextQuarter => "next_quarter",
            Self::NextSixMonths => "next_6_months",
            Self::NextYear => "next_year",
        }
    }

    /// Number of monthly periods to forecast
    pub fn horizon(&self) -> usize {
        match self {
            Self::NextQuarter => 3,
            Self::NextSixMonths => 6,
            Self::NextYear => 12,
        }
    }

    /// Parse a selector, falling back to `default` for blank or unknown values
    pub fn parse_or(s: &str, default: Timeframe) -> Self {
        if s.trim().is_empty() {
            return default;
        }
        s.parse().unwrap_or_else(|_| {
            tracing::warn!(timeframe = s, fallback = default.as_str(), "Unknown timeframe");
            default
        })
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "next_quarter" => Ok(Self::NextQuarter),
            "next_6_months" => Ok(Self::NextSixMonths),
            "next_year" => Ok(Self::NextYear),
            _ => Err(format!(
                "Unknown timeframe: {} (valid: next_quarter, next_6_months, next_year)",
                s
            )),
        }
    }
}

// ========== Features ==========

/// Identity of an independently forecast time series
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey {
    pub scheme_id: String,
    pub geo_code: String,
}

impl SeriesKey {
    pub fn new(scheme_id: impl Into<String>, geo_code: impl Into<String>) -> Self {
        Self {
            scheme_id: scheme_id.into(),
            geo_code: geo_code.into(),
        }
    }

    /// `scheme|geo` identifier used in plans and forecast rows
    pub fn series_id(&self) -> String {
        format!("{}|{}", self.scheme_id, self.geo_code)
    }
}

/// One observation with derived calendar and lag columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub scheme_id: String,
    pub geo_code: String,
    pub apps_count: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promo_intensity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicant_gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applicant_age: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub income_bracket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,
    pub month: u32,
    pub quarter: u32,
    pub year: i32,
    pub lag_1: f64,
}

impl FeatureRow {
    pub fn series_key(&self) -> SeriesKey {
        SeriesKey::new(&self.scheme_id, &self.geo_code)
    }

    pub fn month_key(&self) -> MonthKey {
        MonthKey::from_date(self.date)
    }
}

/// Monthly applications joined with monthly promotion intensity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyJoinRow {
    pub scheme_id: String,
    pub geo_code: String,
    pub month: String,
    pub apps_count: f64,
    pub promo_intensity: f64,
}

/// Summed promotion intensity for one series and month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPromotion {
    pub scheme_id: String,
    pub geo_code: String,
    pub month: String,
    pub promo_intensity: f64,
}

/// Row counts, column lists and notes describing input data quality
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQualityReport {
    pub rows: BTreeMap<String, usize>,
    pub columns: BTreeMap<String, Vec<String>>,
    pub notes: Vec<String>,
}

// ========== Forecasts ==========

/// Forecasting strategy chosen for a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// Same calendar month one seasonal lag earlier
    SeasonalNaive,
    /// Mean of the last N monthly values
    MovingAverage(usize),
    /// Most recent monthly value
    LastValue,
    /// Placeholder rows emitted when there is no data at all
    ZeroForecast,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SeasonalNaive => write!(f, "Seasonal-Naive"),
            Self::MovingAverage(window) => write!(f, "Moving-Average-{}", window),
            Self::LastValue => write!(f, "Last-Value"),
            Self::ZeroForecast => write!(f, "ZeroForecast"),
        }
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Seasonal-Naive" => Ok(Self::SeasonalNaive),
            "Last-Value" => Ok(Self::LastValue),
            "ZeroForecast" => Ok(Self::ZeroForecast),
            _ => s
                .strip_prefix("Moving-Average-")
                .and_then(|w| w.parse().ok())
                .map(Self::MovingAverage)
                .ok_or_else(|| format!("Unknown model: {}", s)),
        }
    }
}

impl Serialize for ModelKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ModelKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Model selected for one series in a forecast run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPlanEntry {
    pub series_id: String,
    pub model_name: ModelKind,
    pub history_points: usize,
}

/// A single forecast step for one series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub series_id: String,
    pub scheme_id: Option<String>,
    pub geo_code: String,
    /// Ordinal step label (P1..Ph)
    pub period: String,
    /// Calendar month of the step (YYYY-MM)
    pub forecast_month: Option<String>,
    pub yhat: f64,
    pub yhat_low: f64,
    pub yhat_high: f64,
    pub model: ModelKind,
    pub history_points: usize,
}

// ========== Aggregates ==========

/// Forecast totals for one region and period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    pub region: String,
    pub period: String,
    pub expected: f64,
    pub low: f64,
    pub high: f64,
}

/// Headline numbers for a forecast run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryCards {
    pub total_forecast: f64,
    pub confidence_range: [f64; 2],
    pub series_count: usize,
}

impl SummaryCards {
    pub fn zero() -> Self {
        Self {
            total_forecast: 0.0,
            confidence_range: [0.0, 0.0],
            series_count: 0,
        }
    }
}

impl Default for SummaryCards {
    fn default() -> Self {
        Self::zero()
    }
}

// ========== Analytics ==========

/// Applications per state, sorted by geo code
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UptakeByState {
    pub labels: Vec<String>,
    pub data: Vec<i64>,
}

/// One scheme's values on the shared month axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendDataset {
    pub label: String,
    pub data: Vec<f64>,
}

/// Monthly applications per scheme on a shared month axis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTrend {
    pub labels: Vec<String>,
    pub datasets: Vec<TrendDataset>,
}

/// One (scheme, geo, month) point: promotion intensity vs applications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScatterPoint {
    pub scheme_id: String,
    pub geo_code: String,
    pub month: String,
    /// Promotion intensity
    pub x: f64,
    /// Applications
    pub y: f64,
}

/// Scatter of promotion intensity against applications with Pearson r
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromotionsVsApps {
    pub data: Vec<ScatterPoint>,
    pub r: Option<f64>,
}

/// Applications split by one demographic dimension
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemographicsPie {
    /// Column the breakdown was taken from
    pub dimension: Option<String>,
    pub labels: Vec<String>,
    pub data: Vec<f64>,
}

/// The four chart-ready analytics views
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsBundle {
    pub uptake_by_state: UptakeByState,
    pub monthly_trend_multi: MonthlyTrend,
    pub promotions_vs_apps: PromotionsVsApps,
    pub demographics_pie: DemographicsPie,
}
