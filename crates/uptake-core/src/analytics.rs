//! Analytics Engine
//!
//! Four chart-ready views over the feature table. Each view is computed on
//! its own and degrades to its empty shape without affecting the others.
//!
//! The promotions view also takes monthly sums of the promotions dataset,
//! which are merged with any promotion values carried on application rows.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::features::FeatureBuilder;
use crate::forecast::round_to;
use crate::models::{
    AnalyticsBundle, DemographicsPie, FeatureRow, MonthKey, MonthlyPromotion, MonthlyTrend,
    PromotionsVsApps, ScatterPoint, TrendDataset, UptakeByState,
};
use crate::store::{ArtifactStore, TableInput};

/// Label for missing or unparseable demographic values
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Demographic dimensions in the order they are tried
const DEMOGRAPHIC_DIMENSIONS: [&str; 4] = [
    "applicant_gender",
    "income_bracket",
    "occupation",
    "applicant_age",
];

/// Analytics bundle plus input fallback notes
#[derive(Debug, Clone, Default)]
pub struct AnalyticsOutput {
    pub bundle: AnalyticsBundle,
    pub notes: Vec<String>,
}

/// Computes the analytics views
#[derive(Debug, Clone, Default)]
pub struct AnalyticsEngine {
    promotions: Vec<MonthlyPromotion>,
}

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monthly promotion sums joined into the promotions view
    pub fn with_promotions(mut self, promotions: Vec<MonthlyPromotion>) -> Self {
        self.promotions = promotions;
        self
    }

    /// Resolve the feature input and compute every view
    pub fn run(&self, store: &dyn ArtifactStore, features: &TableInput) -> AnalyticsOutput {
        let mut notes = Vec::new();
        let table = features.resolve(store, "features", &mut notes);
        let (rows, build_notes) = FeatureBuilder::new().build_rows(&table);
        notes.extend(build_notes);

        AnalyticsOutput {
            bundle: self.compute(&rows),
            notes,
        }
    }

    pub fn compute(&self, features: &[FeatureRow]) -> AnalyticsBundle {
        let bundle = AnalyticsBundle {
            uptake_by_state: uptake_by_state(features),
            monthly_trend_multi: monthly_trend(features),
            promotions_vs_apps: promotions_vs_apps(features, &self.promotions),
            demographics_pie: demographics_pie(features),
        };

        info!(
            states = bundle.uptake_by_state.labels.len(),
            months = bundle.monthly_trend_multi.labels.len(),
            points = bundle.promotions_vs_apps.data.len(),
            dimension = bundle.demographics_pie.dimension.as_deref().unwrap_or("none"),
            "Analytics computed"
        );
        bundle
    }
}

/// Applications per geo code, sorted by geo code
pub fn uptake_by_state(features: &[FeatureRow]) -> UptakeByState {
    let mut totals: BTreeMap<&str, f64> = BTreeMap::new();
    for row in features {
        *totals.entry(row.geo_code.as_str()).or_default() += row.apps_count;
    }

    let (labels, data) = totals
        .into_iter()
        .map(|(geo, total)| (geo.to_string(), total.round() as i64))
        .unzip();
    UptakeByState { labels, data }
}

/// Monthly applications per scheme on the union of all months
pub fn monthly_trend(features: &[FeatureRow]) -> MonthlyTrend {
    let mut per_scheme: BTreeMap<&str, BTreeMap<MonthKey, f64>> = BTreeMap::new();
    let mut months: BTreeSet<MonthKey> = BTreeSet::new();

    for row in features {
        let month = row.month_key();
        months.insert(month);
        *per_scheme
            .entry(row.scheme_id.as_str())
            .or_default()
            .entry(month)
            .or_default() += row.apps_count;
    }

    // Every dataset is reindexed onto the shared axis
    let datasets = per_scheme
        .into_iter()
        .map(|(scheme, values)| TrendDataset {
            label: scheme.to_string(),
            data: months
                .iter()
                .map(|m| values.get(m).copied().unwrap_or(0.0))
                .collect(),
        })
        .collect();

    MonthlyTrend {
        labels: months.iter().map(MonthKey::to_string).collect(),
        datasets,
    }
}

/// Monthly promotion intensity against monthly applications
///
/// Promotion values come from the application rows and from `promotions`;
/// both are summed per (scheme, geo, month). Only keys with at least one
/// promotion value and at least one application row are joined.
pub fn promotions_vs_apps(
    features: &[FeatureRow],
    promotions: &[MonthlyPromotion],
) -> PromotionsVsApps {
    type Key<'a> = (&'a str, &'a str, MonthKey);

    let mut apps: BTreeMap<Key<'_>, f64> = BTreeMap::new();
    let mut promos: BTreeMap<Key<'_>, f64> = BTreeMap::new();

    for row in features {
        let key = (row.scheme_id.as_str(), row.geo_code.as_str(), row.month_key());
        *apps.entry(key).or_default() += row.apps_count;
        if let Some(promo) = row.promo_intensity {
            *promos.entry(key).or_default() += promo;
        }
    }

    for promo in promotions {
        let Ok(month) = promo.month.parse::<MonthKey>() else {
            debug!(month = %promo.month, "Skipping promotion with bad month");
            continue;
        };
        let key = (promo.scheme_id.as_str(), promo.geo_code.as_str(), month);
        *promos.entry(key).or_default() += promo.promo_intensity;
    }

    let data: Vec<ScatterPoint> = promos
        .into_iter()
        .filter_map(|(key, promo)| {
            let (scheme, geo, month) = key;
            apps.get(&key).map(|&total| ScatterPoint {
                scheme_id: scheme.to_string(),
                geo_code: geo.to_string(),
                month: month.to_string(),
                x: promo,
                y: total,
            })
        })
        .collect();

    let x: Vec<f64> = data.iter().map(|p| p.x).collect();
    let y: Vec<f64> = data.iter().map(|p| p.y).collect();
    let r = pearson(&x, &y);

    debug!(points = data.len(), r = ?r, "Promotion join computed");
    PromotionsVsApps { data, r }
}

/// Pearson correlation rounded to 3 decimals
///
/// None with fewer than 2 pairs or when either side has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }

    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denominator = (var_x * var_y).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return None;
    }
    Some(round_to((cov / denominator).clamp(-1.0, 1.0), 3))
}

/// Applications by the first demographic dimension that has any value
pub fn demographics_pie(features: &[FeatureRow]) -> DemographicsPie {
    let Some(dimension) = DEMOGRAPHIC_DIMENSIONS
        .into_iter()
        .find(|d| features.iter().any(|row| dimension_value(row, d).is_some()))
    else {
        return DemographicsPie::default();
    };

    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    for row in features {
        let label = match dimension_value(row, dimension) {
            Some(value) if dimension == "applicant_age" => age_bucket(value).to_string(),
            Some(value) => value.to_string(),
            None => UNKNOWN_LABEL.to_string(),
        };
        *totals.entry(label).or_default() += row.apps_count;
    }

    // Largest first; BTreeMap order breaks ties by label
    let mut slices: Vec<(String, f64)> = totals.into_iter().collect();
    slices.sort_by(|a, b| b.1.total_cmp(&a.1));

    let (labels, data) = slices.into_iter().unzip();
    DemographicsPie {
        dimension: Some(dimension.to_string()),
        labels,
        data,
    }
}

fn dimension_value<'a>(row: &'a FeatureRow, dimension: &str) -> Option<&'a str> {
    let value = match dimension {
        "applicant_gender" => row.applicant_gender.as_deref(),
        "income_bracket" => row.income_bracket.as_deref(),
        "occupation" => row.occupation.as_deref(),
        "applicant_age" => row.applicant_age.as_deref(),
        _ => None,
    };
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Bucket a raw age value
pub fn age_bucket(age: &str) -> &'static str {
    let Some(age) = age.trim().parse::<f64>().ok().filter(|a| a.is_finite()) else {
        return UNKNOWN_LABEL;
    };
    if age < 18.0 {
        "<18"
    } else if age <= 25.0 {
        "18-25"
    } else if age <= 35.0 {
        "26-35"
    } else if age <= 50.0 {
        "36-50"
    } else {
        "50+"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quarter_of;
    use chrono::{Datelike, NaiveDate};

    fn row(scheme: &str, geo: &str, date: &str, apps: f64) -> FeatureRow {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        FeatureRow {
            date,
            scheme_id: scheme.into(),
            geo_code: geo.into(),
            apps_count: apps,
            promo_intensity: None,
            applicant_gender: None,
            applicant_age: None,
            income_bracket: None,
            occupation: None,
            month: date.month(),
            quarter: quarter_of(date.month()),
            year: date.year(),
            lag_1: 0.0,
        }
    }

    fn with_promo(mut r: FeatureRow, promo: f64) -> FeatureRow {
        r.promo_intensity = Some(promo);
        r
    }

    #[test]
    fn test_empty_features() {
        let bundle = AnalyticsEngine::new().compute(&[]);
        assert_eq!(bundle, AnalyticsBundle::default());
    }

    #[test]
    fn test_uptake_by_state_sorted_and_rounded() {
        let features = vec![
            row("S1", "NY", "2024-01-01", 10.4),
            row("S2", "CA", "2024-01-01", 2.6),
            row("S1", "NY", "2024-02-01", 5.0),
        ];
        let view = uptake_by_state(&features);
        assert_eq!(view.labels, vec!["CA", "NY"]);
        assert_eq!(view.data, vec![3, 15]);
    }

    #[test]
    fn test_monthly_trend_shares_axis() {
        let features = vec![
            row("S1", "NY", "2024-01-05", 1.0),
            row("S1", "CA", "2024-01-20", 2.0),
            row("S2", "NY", "2024-03-01", 4.0),
        ];
        let trend = monthly_trend(&features);
        assert_eq!(trend.labels, vec!["2024-01", "2024-03"]);
        assert_eq!(trend.datasets.len(), 2);
        assert_eq!(trend.datasets[0].label, "S1");
        assert_eq!(trend.datasets[0].data, vec![3.0, 0.0]);
        assert_eq!(trend.datasets[1].data, vec![0.0, 4.0]);
        assert!(trend
            .datasets
            .iter()
            .all(|d| d.data.len() == trend.labels.len()));
    }

    #[test]
    fn test_promotions_inner_join_and_r() {
        let features = vec![
            with_promo(row("S1", "NY", "2024-01-01", 10.0), 1.0),
            with_promo(row("S1", "NY", "2024-02-01", 20.0), 2.0),
            with_promo(row("S1", "NY", "2024-03-01", 30.0), 3.0),
            row("S1", "NY", "2024-04-01", 99.0),
        ];
        let view = promotions_vs_apps(&features, &[]);
        assert_eq!(view.data.len(), 3);
        assert_eq!(view.data[0].month, "2024-01");
        assert_eq!(view.r, Some(1.0));
    }

    fn promotion(scheme: &str, geo: &str, month: &str, intensity: f64) -> MonthlyPromotion {
        MonthlyPromotion {
            scheme_id: scheme.into(),
            geo_code: geo.into(),
            month: month.into(),
            promo_intensity: intensity,
        }
    }

    #[test]
    fn test_promotions_dataset_joins_apps() {
        let features = vec![
            row("S1", "NY", "2024-01-01", 10.0),
            row("S1", "NY", "2024-02-01", 20.0),
            row("S1", "NY", "2024-03-01", 30.0),
        ];
        let promotions = vec![
            promotion("S1", "NY", "2024-01", 1.0),
            promotion("S1", "NY", "2024-02", 2.0),
            promotion("S1", "NY", "2024-03", 3.0),
            promotion("S1", "CA", "2024-01", 8.0),
        ];

        let bundle = AnalyticsEngine::new()
            .with_promotions(promotions)
            .compute(&features);
        let view = bundle.promotions_vs_apps;
        assert_eq!(view.data.len(), 3);
        assert_eq!(view.data[2].x, 3.0);
        assert_eq!(view.data[2].y, 30.0);
        assert_eq!(view.r, Some(1.0));
    }

    #[test]
    fn test_promotions_merge_row_and_dataset_values() {
        let features = vec![
            with_promo(row("S1", "NY", "2024-01-01", 10.0), 0.5),
            row("S1", "NY", "2024-02-01", 20.0),
        ];
        let promotions = vec![
            promotion("S1", "NY", "2024-01", 0.5),
            promotion("S1", "NY", "2024-02", 3.0),
            promotion("S1", "NY", "not-a-month", 7.0),
        ];

        let view = promotions_vs_apps(&features, &promotions);
        assert_eq!(view.data.len(), 2);
        assert_eq!(view.data[0].x, 1.0);
        assert_eq!(view.data[1].x, 3.0);
        assert_eq!(view.r, Some(1.0));
    }

    #[test]
    fn test_promotions_without_promo_column() {
        let features = vec![row("S1", "NY", "2024-01-01", 10.0)];
        let view = promotions_vs_apps(&features, &[]);
        assert!(view.data.is_empty());
        assert_eq!(view.r, None);
    }

    #[test]
    fn test_pearson() {
        assert_eq!(pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]), Some(-1.0));
        assert_eq!(pearson(&[1.0], &[1.0]), None);
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), None);
        assert_eq!(pearson(&[1.0, 2.0], &[1.0]), None);

        let r = pearson(&[1.0, 2.0, 3.0, 4.0], &[2.0, 1.0, 4.0, 3.0]).unwrap();
        assert!((-1.0..=1.0).contains(&r));
        assert_eq!(r, 0.6);
    }

    #[test]
    fn test_demographics_priority_and_order() {
        let mut a = row("S1", "NY", "2024-01-01", 5.0);
        a.income_bracket = Some("low".into());
        a.occupation = Some("farmer".into());
        let mut b = row("S1", "NY", "2024-01-01", 7.0);
        b.income_bracket = Some("high".into());
        let c = row("S1", "NY", "2024-01-01", 1.0);

        let pie = demographics_pie(&[a, b, c]);
        assert_eq!(pie.dimension.as_deref(), Some("income_bracket"));
        assert_eq!(pie.labels, vec!["high", "low", "Unknown"]);
        assert_eq!(pie.data, vec![7.0, 5.0, 1.0]);
    }

    #[test]
    fn test_demographics_age_buckets() {
        let ages = ["17", "25", "30", "50", "51", "old"];
        let features: Vec<FeatureRow> = ages
            .iter()
            .map(|age| {
                let mut r = row("S1", "NY", "2024-01-01", 1.0);
                r.applicant_age = Some(age.to_string());
                r
            })
            .collect();

        let pie = demographics_pie(&features);
        assert_eq!(pie.dimension.as_deref(), Some("applicant_age"));
        assert_eq!(
            pie.labels,
            vec!["18-25", "26-35", "36-50", "50+", "<18", "Unknown"]
        );
    }

    #[test]
    fn test_age_bucket_boundaries() {
        assert_eq!(age_bucket("17.9"), "<18");
        assert_eq!(age_bucket("18"), "18-25");
        assert_eq!(age_bucket("26"), "26-35");
        assert_eq!(age_bucket(" 36 "), "36-50");
        assert_eq!(age_bucket("80"), "50+");
        assert_eq!(age_bucket(""), UNKNOWN_LABEL);
    }
}
