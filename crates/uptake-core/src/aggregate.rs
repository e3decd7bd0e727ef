//! Aggregator
//!
//! Rolls per-series forecast rows up into (region, period) totals, derives
//! the summary cards and a few descriptive driver notes.
//!
//! Grouped sums are order-independent: each group's contributions are
//! sorted before summing, so shuffling the input rows yields bit-identical
//! output.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::models::{
    AggregateRow, FeatureRow, ForecastRow, ModelKind, MonthlyPromotion, SummaryCards,
    MISSING_LABEL,
};
use crate::store::{save_or_symbolic, ArtifactId, ArtifactStore, TableInput};
use crate::table::{get_f64, get_str, Record, Table};

/// Emitted when no driver note applies
pub const DRIVERS_UNAVAILABLE: &str = "Drivers unavailable";

pub(crate) const PROMO_DRIVER: &str =
    "Observed promotional activity in prior periods; relationship not assessed.";
const SEASONAL_DRIVER: &str = "Seasonal fields present (quarter/month); detailed analysis pending.";
const BAND_DRIVER: &str = "Forecast confidence bands vary across periods.";

/// Aggregate rows, cards and driver notes for one forecast run
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub rows: Vec<AggregateRow>,
    pub cards: SummaryCards,
    pub drivers: Vec<String>,
    /// Input problems met while aggregating typed rows
    pub notes: Vec<String>,
}

impl Default for Aggregation {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            cards: SummaryCards::zero(),
            drivers: vec![DRIVERS_UNAVAILABLE.to_string()],
            notes: Vec::new(),
        }
    }
}

/// Aggregation with its stored handle and fallback notes
#[derive(Debug, Clone)]
pub struct AggregateOutput {
    pub aggregation: Aggregation,
    pub handle: ArtifactId,
    pub notes: Vec<String>,
}

/// One forecast row after column defaults are applied
struct Contribution {
    series_id: Option<String>,
    region: String,
    period: String,
    expected: f64,
    low: f64,
    high: f64,
}

impl Contribution {
    fn from_record(record: &Record, index: usize) -> Self {
        let region = get_str(record, "region")
            .or_else(|| get_str(record, "geo_code"))
            .or_else(|| {
                get_str(record, "series_id")
                    .and_then(|id| id.split_once('|').map(|(_, geo)| geo.trim().to_string()))
                    .filter(|geo| !geo.is_empty())
            })
            .unwrap_or_else(|| MISSING_LABEL.to_string());

        Self {
            series_id: get_str(record, "series_id"),
            region,
            period: get_str(record, "period").unwrap_or_else(|| format!("P{}", index + 1)),
            expected: get_f64(record, "yhat")
                .or_else(|| get_f64(record, "expected"))
                .unwrap_or(0.0),
            low: get_f64(record, "yhat_low")
                .or_else(|| get_f64(record, "low"))
                .unwrap_or(0.0),
            high: get_f64(record, "yhat_high")
                .or_else(|| get_f64(record, "high"))
                .unwrap_or(0.0),
        }
    }
}

/// Group key: region, then periods in step order (P2 before P10)
type GroupKey = (String, u32, String);

fn period_rank(period: &str) -> u32 {
    period
        .strip_prefix('P')
        .and_then(|n| n.parse().ok())
        .unwrap_or(u32::MAX)
}

/// Order-independent sum
fn stable_sum(mut values: Vec<f64>) -> f64 {
    values.sort_by(f64::total_cmp);
    values.into_iter().sum()
}

/// Region/period rollup of forecast rows
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    promotions: Vec<MonthlyPromotion>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Promotions dataset sums, counted as promotional activity in the
    /// driver notes
    pub fn with_promotions(mut self, promotions: Vec<MonthlyPromotion>) -> Self {
        self.promotions = promotions;
        self
    }

    /// Resolve inputs, aggregate, and store the aggregate rows
    pub fn run(
        &self,
        store: &dyn ArtifactStore,
        forecasts: &TableInput,
        features: &TableInput,
    ) -> AggregateOutput {
        let mut notes = Vec::new();
        let forecast_table = forecasts.resolve(store, "forecasts_raw", &mut notes);
        let feature_table = features.resolve(store, "features", &mut notes);

        let aggregation = self.aggregate(&forecast_table, &feature_table);
        let stored = Table::from_rows_or_note(&aggregation.rows, "forecasts_agg", &mut notes);
        let handle = save_or_symbolic(store, &stored, "forecasts_agg", &mut notes);

        AggregateOutput {
            aggregation,
            handle,
            notes,
        }
    }

    /// Aggregate typed rows
    ///
    /// Rows that fail to serialize are aggregated as an empty table and
    /// reported in `notes`.
    pub fn aggregate_rows(&self, forecasts: &[ForecastRow], features: &[FeatureRow]) -> Aggregation {
        let mut notes = Vec::new();
        let forecasts = Table::from_rows_or_note(forecasts, "forecasts_raw", &mut notes);
        let features = Table::from_rows_or_note(features, "features", &mut notes);

        let mut aggregation = self.aggregate(&forecasts, &features);
        aggregation.notes = notes;
        aggregation
    }

    /// Aggregate a forecast table
    ///
    /// Missing columns default (region from geo code, period from row
    /// position, numbers to 0.0). Zero-forecast placeholder rows carry no
    /// series and are left out of the rollup.
    pub fn aggregate(&self, forecasts: &Table, features: &Table) -> Aggregation {
        let zero_label = ModelKind::ZeroForecast.to_string();
        let contributions: Vec<Contribution> = forecasts
            .iter()
            .enumerate()
            .filter(|(_, record)| get_str(record, "model").as_deref() != Some(zero_label.as_str()))
            .map(|(i, record)| Contribution::from_record(record, i))
            .collect();

        let skipped = forecasts.len() - contributions.len();
        if skipped > 0 {
            debug!(skipped, "Skipped placeholder forecast rows");
        }

        let mut groups: BTreeMap<GroupKey, (Vec<f64>, Vec<f64>, Vec<f64>)> = BTreeMap::new();
        for c in &contributions {
            let entry = groups
                .entry((c.region.clone(), period_rank(&c.period), c.period.clone()))
                .or_default();
            entry.0.push(c.expected);
            entry.1.push(c.low);
            entry.2.push(c.high);
        }

        let rows: Vec<AggregateRow> = groups
            .into_iter()
            .map(|((region, _, period), (expected, low, high))| AggregateRow {
                region,
                period,
                expected: stable_sum(expected),
                low: stable_sum(low),
                high: stable_sum(high),
            })
            .collect();

        let cards = summary_cards(&rows, &contributions);
        let drivers = driver_notes(&contributions, features, &self.promotions);

        info!(
            groups = rows.len(),
            total = cards.total_forecast,
            series = cards.series_count,
            "Aggregation complete"
        );

        Aggregation {
            rows,
            cards,
            drivers,
            notes: Vec::new(),
        }
    }
}

fn summary_cards(rows: &[AggregateRow], contributions: &[Contribution]) -> SummaryCards {
    if rows.is_empty() {
        return SummaryCards::zero();
    }

    let series: BTreeSet<&str> = contributions
        .iter()
        .filter_map(|c| c.series_id.as_deref())
        .collect();
    let series_count = if series.is_empty() {
        contributions
            .iter()
            .map(|c| c.region.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    } else {
        series.len()
    };

    SummaryCards {
        total_forecast: rows.iter().map(|r| r.expected).sum(),
        confidence_range: [
            rows.iter().map(|r| r.low).sum(),
            rows.iter().map(|r| r.high).sum(),
        ],
        series_count,
    }
}

/// Descriptive notes about the inputs; never causal
fn driver_notes(
    contributions: &[Contribution],
    features: &Table,
    promotions: &[MonthlyPromotion],
) -> Vec<String> {
    let mut drivers = Vec::new();

    let promo_total: f64 = features
        .iter()
        .filter_map(|r| get_f64(r, "promo_intensity"))
        .chain(promotions.iter().map(|p| p.promo_intensity))
        .sum();
    if promo_total > 0.0 {
        drivers.push(PROMO_DRIVER.to_string());
    }

    if !features.is_empty() && (features.has_column("month") || features.has_column("quarter")) {
        drivers.push(SEASONAL_DRIVER.to_string());
    }

    if !contributions.is_empty() {
        let width: f64 = contributions
            .iter()
            .map(|c| (c.high - c.low).abs())
            .sum::<f64>()
            / contributions.len() as f64;
        if width > 0.0 {
            drivers.push(BAND_DRIVER.to_string());
        }
    }

    if drivers.is_empty() {
        drivers.push(DRIVERS_UNAVAILABLE.to_string());
    }
    drivers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::{json, Value};

    fn table(rows: Vec<Value>) -> Table {
        rows.into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect()
    }

    fn forecast(series: &str, geo: &str, period: &str, yhat: f64) -> Value {
        json!({
            "series_id": series,
            "geo_code": geo,
            "period": period,
            "yhat": yhat,
            "yhat_low": yhat * 0.9,
            "yhat_high": yhat * 1.1,
            "model": "Last-Value",
        })
    }

    #[test]
    fn test_empty_input_is_zero_safe() {
        let agg = Aggregator::new().aggregate(&Table::new(), &Table::new());
        assert!(agg.rows.is_empty());
        assert_eq!(agg.cards, SummaryCards::zero());
        assert_eq!(agg.drivers, vec![DRIVERS_UNAVAILABLE.to_string()]);
        assert_eq!(agg, Aggregation::default());
    }

    #[test]
    fn test_groups_by_region_and_period() {
        let forecasts = table(vec![
            forecast("S1|NY", "NY", "P1", 10.0),
            forecast("S2|NY", "NY", "P1", 5.0),
            forecast("S1|NY", "NY", "P2", 10.0),
            forecast("S1|CA", "CA", "P1", 1.0),
        ]);

        let agg = Aggregator::new().aggregate(&forecasts, &Table::new());
        assert_eq!(agg.rows.len(), 3);
        assert_eq!(agg.rows[0].region, "CA");
        assert_eq!(agg.rows[1].region, "NY");
        assert_eq!(agg.rows[1].period, "P1");
        assert_eq!(agg.rows[1].expected, 15.0);
        assert_eq!(agg.cards.total_forecast, 26.0);
        assert_eq!(agg.cards.series_count, 3);
    }

    #[test]
    fn test_periods_sort_numerically() {
        let forecasts = table(vec![
            forecast("S1|NY", "NY", "P10", 1.0),
            forecast("S1|NY", "NY", "P2", 1.0),
        ]);
        let agg = Aggregator::new().aggregate(&forecasts, &Table::new());
        assert_eq!(agg.rows[0].period, "P2");
        assert_eq!(agg.rows[1].period, "P10");
    }

    #[test]
    fn test_order_independence() {
        let rows = vec![
            forecast("S1|NY", "NY", "P1", 0.1),
            forecast("S2|NY", "NY", "P1", 0.2),
            forecast("S3|NY", "NY", "P1", 0.3),
            forecast("S1|CA", "CA", "P2", 1e16),
            forecast("S2|CA", "CA", "P2", 1.0),
            forecast("S3|CA", "CA", "P2", -1e16),
        ];
        let mut reversed = rows.clone();
        reversed.reverse();

        let a = Aggregator::new().aggregate(&table(rows), &Table::new());
        let b = Aggregator::new().aggregate(&table(reversed), &Table::new());
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_columns_default() {
        let forecasts = table(vec![
            json!({"series_id": "S1|TX", "yhat": "12"}),
            json!({"yhat": "n/a", "region": "WA"}),
        ]);
        let agg = Aggregator::new().aggregate(&forecasts, &Table::new());

        assert_eq!(agg.rows.len(), 2);
        let tx = agg.rows.iter().find(|r| r.region == "TX").unwrap();
        assert_eq!(tx.period, "P1");
        assert_eq!(tx.expected, 12.0);
        assert_eq!(tx.low, 0.0);
        let wa = agg.rows.iter().find(|r| r.region == "WA").unwrap();
        assert_eq!(wa.period, "P2");
        assert_eq!(wa.expected, 0.0);
        assert_eq!(agg.drivers, vec![DRIVERS_UNAVAILABLE.to_string()]);
    }

    #[test]
    fn test_series_count_falls_back_to_regions() {
        let forecasts = table(vec![
            json!({"region": "NY", "period": "P1", "yhat": 1.0}),
            json!({"region": "NY", "period": "P2", "yhat": 1.0}),
            json!({"region": "CA", "period": "P1", "yhat": 1.0}),
        ]);
        let agg = Aggregator::new().aggregate(&forecasts, &Table::new());
        assert_eq!(agg.cards.series_count, 2);
    }

    #[test]
    fn test_zero_forecast_rows_are_skipped() {
        let forecasts = table(vec![json!({
            "series_id": MISSING_LABEL, "geo_code": MISSING_LABEL, "period": "P1",
            "yhat": 0.0, "yhat_low": 0.0, "yhat_high": 0.0, "model": "ZeroForecast",
        })]);
        let agg = Aggregator::new().aggregate(&forecasts, &Table::new());
        assert_eq!(agg, Aggregation::default());
    }

    #[test]
    fn test_driver_notes() {
        let forecasts = table(vec![forecast("S1|NY", "NY", "P1", 10.0)]);
        let features = table(vec![json!({
            "date": "2024-01-01", "scheme_id": "S1", "geo_code": "NY",
            "apps_count": 3, "promo_intensity": 0.4, "month": 1, "quarter": 1,
        })]);

        let agg = Aggregator::new().aggregate(&forecasts, &features);
        assert_eq!(
            agg.drivers,
            vec![
                PROMO_DRIVER.to_string(),
                SEASONAL_DRIVER.to_string(),
                BAND_DRIVER.to_string()
            ]
        );
    }

    #[test]
    fn test_promotions_dataset_counts_as_activity() {
        let forecasts = table(vec![forecast("S1|NY", "NY", "P1", 10.0)]);
        let promotions = vec![MonthlyPromotion {
            scheme_id: "S1".into(),
            geo_code: "NY".into(),
            month: "2024-01".into(),
            promo_intensity: 2.0,
        }];

        let without = Aggregator::new().aggregate(&forecasts, &Table::new());
        assert!(!without.drivers.contains(&PROMO_DRIVER.to_string()));

        let with = Aggregator::new()
            .with_promotions(promotions)
            .aggregate(&forecasts, &Table::new());
        assert_eq!(with.drivers[0], PROMO_DRIVER);
    }

    #[test]
    fn test_aggregate_rows_matches_table_input() {
        let rows = vec![ForecastRow {
            series_id: "S1|NY".into(),
            scheme_id: Some("S1".into()),
            geo_code: "NY".into(),
            period: "P1".into(),
            forecast_month: Some("2024-03".into()),
            yhat: 10.0,
            yhat_low: 9.0,
            yhat_high: 11.0,
            model: ModelKind::LastValue,
            history_points: 2,
        }];

        let typed = Aggregator::new().aggregate_rows(&rows, &[]);
        let untyped = Aggregator::new().aggregate(&Table::from_rows(&rows).unwrap(), &Table::new());
        assert_eq!(typed, untyped);
        assert!(typed.notes.is_empty());
        assert_eq!(typed.cards.total_forecast, 10.0);
    }

    #[test]
    fn test_run_stores_aggregate() {
        let store = MemoryStore::new();
        let forecasts = TableInput::from_rows(table(vec![forecast("S1|NY", "NY", "P1", 4.0)]));

        let output = Aggregator::new().run(&store, &forecasts, &TableInput::empty());
        assert!(output.notes.is_empty());
        let stored: Vec<AggregateRow> = store.load(&output.handle).unwrap().to_rows().unwrap();
        assert_eq!(stored, output.aggregation.rows);
    }
}
