//! Feature Builder
//!
//! Turns raw application rows into a per-series, time-indexed feature table:
//! calendar parts (`month`, `quarter`, `year`) and a one-step lag (`lag_1`)
//! computed within each (scheme, geo) series after sorting by date.
//!
//! The builder never fails. Rows without a usable date are dropped, a
//! non-numeric `apps_count` becomes 0.0, rows sharing a (scheme, geo, date)
//! are merged into one, and every such repair is reported as a data-quality
//! note.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use tracing::{debug, info};

use crate::ingest::{Dataset, RawTables};
use crate::models::{
    quarter_of, DataQualityReport, FeatureRow, MonthKey, MonthlyJoinRow, MonthlyPromotion,
    MISSING_LABEL,
};
use crate::table::{get_f64, get_str, parse_date, Table};

/// Output of a feature build
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    /// One row per (scheme, geo, date), sorted by that key
    pub rows: Vec<FeatureRow>,
    /// Monthly sums of the promotions dataset
    pub promotions: Vec<MonthlyPromotion>,
    /// Monthly applications left-joined with monthly promotions
    pub monthly_join: Vec<MonthlyJoinRow>,
    pub report: DataQualityReport,
}

impl FeatureSet {
    /// Feature rows as a table for storage
    pub fn to_table(&self) -> Table {
        Table::from_rows(&self.rows).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to serialize feature rows");
            Table::new()
        })
    }
}

/// Builds feature tables from raw observation rows
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureBuilder;

impl FeatureBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build features from the normalized source datasets
    pub fn build(&self, tables: &RawTables) -> FeatureSet {
        let mut report = DataQualityReport {
            notes: tables.notes.clone(),
            ..Default::default()
        };

        for &dataset in Dataset::all() {
            let table = tables.get(dataset);
            report
                .columns
                .insert(dataset.as_str().to_string(), table.columns());
            if !table.is_empty() {
                for column in dataset.essential_columns() {
                    if !table.has_column(column) {
                        report
                            .notes
                            .push(format!("{} missing column '{}'", dataset, column));
                    }
                }
            }
        }

        let (rows, notes) = self.build_rows(&tables.applications);
        report.notes.extend(notes);

        report
            .rows
            .insert(Dataset::Applications.as_str().to_string(), rows.len());
        for &dataset in &Dataset::all()[1..] {
            report
                .rows
                .insert(dataset.as_str().to_string(), tables.get(dataset).len());
        }

        let promotions = monthly_promotions(&tables.promotions);
        let monthly_join = monthly_join(&rows, &promotions);

        info!(
            features = rows.len(),
            promotions = promotions.len(),
            monthly = monthly_join.len(),
            notes = report.notes.len(),
            "Feature build complete"
        );

        FeatureSet {
            rows,
            promotions,
            monthly_join,
            report,
        }
    }

    /// Derive feature rows from an observation table
    ///
    /// The input may already carry derived columns; they are recomputed.
    /// Returns the rows plus human-readable notes about repairs made.
    pub fn build_rows(&self, table: &Table) -> (Vec<FeatureRow>, Vec<String>) {
        let mut notes = Vec::new();

        if table.is_empty() {
            return (Vec::new(), notes);
        }

        let mut dropped = 0usize;
        let mut coerced = 0usize;
        let mut merged = 0usize;
        let mut series: BTreeMap<(String, String, NaiveDate), FeatureRow> = BTreeMap::new();

        for record in table.iter() {
            let date = match record.get("date").and_then(parse_date) {
                Some(date) => date,
                None => {
                    dropped += 1;
                    continue;
                }
            };

            let apps_count = match record.get("apps_count") {
                Some(value) if !value.is_null() => get_f64(record, "apps_count").unwrap_or_else(|| {
                    coerced += 1;
                    0.0
                }),
                _ => 0.0,
            };

            let month = date.month();
            let row = FeatureRow {
                date,
                scheme_id: get_str(record, "scheme_id").unwrap_or_else(|| MISSING_LABEL.into()),
                geo_code: get_str(record, "geo_code").unwrap_or_else(|| MISSING_LABEL.into()),
                apps_count,
                promo_intensity: get_f64(record, "promo_intensity"),
                applicant_gender: get_str(record, "applicant_gender"),
                applicant_age: get_str(record, "applicant_age"),
                income_bracket: get_str(record, "income_bracket"),
                occupation: get_str(record, "occupation"),
                month,
                quarter: quarter_of(month),
                year: date.year(),
                lag_1: 0.0,
            };

            match series.entry((row.scheme_id.clone(), row.geo_code.clone(), date)) {
                Entry::Vacant(slot) => {
                    slot.insert(row);
                }
                Entry::Occupied(mut slot) => {
                    merged += 1;
                    merge_duplicate(slot.get_mut(), row);
                }
            }
        }

        // Keyed by (scheme, geo, date), so already in lag order
        let mut rows: Vec<FeatureRow> = series.into_values().collect();
        apply_lag(&mut rows);

        if dropped > 0 {
            notes.push(format!(
                "dropped {} application rows with invalid/missing date",
                dropped
            ));
        }
        if coerced > 0 {
            notes.push(format!(
                "coerced {} non-numeric apps_count values to 0",
                coerced
            ));
        }
        if merged > 0 {
            notes.push(format!(
                "merged {} duplicate application rows sharing a series and date",
                merged
            ));
        }

        debug!(rows = rows.len(), dropped, coerced, merged, "Built feature rows");
        (rows, notes)
    }
}

/// Fold a same-day duplicate into the first row seen for that key
///
/// Counts and promotion values add up; demographics keep the first
/// non-missing value.
fn merge_duplicate(row: &mut FeatureRow, duplicate: FeatureRow) {
    row.apps_count += duplicate.apps_count;
    row.promo_intensity = match (row.promo_intensity, duplicate.promo_intensity) {
        (Some(a), Some(b)) => Some(a + b),
        (a, b) => a.or(b),
    };
    row.applicant_gender = row.applicant_gender.take().or(duplicate.applicant_gender);
    row.applicant_age = row.applicant_age.take().or(duplicate.applicant_age);
    row.income_bracket = row.income_bracket.take().or(duplicate.income_bracket);
    row.occupation = row.occupation.take().or(duplicate.occupation);
}

/// Set `lag_1` to the previous row's count within each series
///
/// Rows must already be sorted by (scheme, geo, date).
fn apply_lag(rows: &mut [FeatureRow]) {
    let mut previous: Option<(String, String, f64)> = None;
    for row in rows.iter_mut() {
        row.lag_1 = match &previous {
            Some((scheme, geo, count)) if *scheme == row.scheme_id && *geo == row.geo_code => {
                *count
            }
            _ => 0.0,
        };
        previous = Some((row.scheme_id.clone(), row.geo_code.clone(), row.apps_count));
    }
}

/// Promotion intensity summed per (scheme, geo, month)
///
/// Rows without a usable date are skipped; a missing intensity counts as 0.
pub fn monthly_promotions(promotions: &Table) -> Vec<MonthlyPromotion> {
    let mut sums: BTreeMap<(String, String, MonthKey), f64> = BTreeMap::new();
    for record in promotions.iter() {
        let Some(date) = record.get("date").and_then(parse_date) else {
            continue;
        };
        let key = (
            get_str(record, "scheme_id").unwrap_or_else(|| MISSING_LABEL.into()),
            get_str(record, "geo_code").unwrap_or_else(|| MISSING_LABEL.into()),
            MonthKey::from_date(date),
        );
        *sums.entry(key).or_default() += get_f64(record, "promo_intensity").unwrap_or(0.0);
    }

    sums.into_iter()
        .map(|((scheme_id, geo_code, month), promo_intensity)| MonthlyPromotion {
            scheme_id,
            geo_code,
            month: month.to_string(),
            promo_intensity,
        })
        .collect()
}

/// Monthly applications per series, left-joined with monthly promotions
fn monthly_join(rows: &[FeatureRow], promotions: &[MonthlyPromotion]) -> Vec<MonthlyJoinRow> {
    let mut apps: BTreeMap<(String, String, String), f64> = BTreeMap::new();
    for row in rows {
        *apps
            .entry((
                row.scheme_id.clone(),
                row.geo_code.clone(),
                row.month_key().to_string(),
            ))
            .or_default() += row.apps_count;
    }

    let promos: BTreeMap<(&str, &str, &str), f64> = promotions
        .iter()
        .map(|p| {
            (
                (p.scheme_id.as_str(), p.geo_code.as_str(), p.month.as_str()),
                p.promo_intensity,
            )
        })
        .collect();

    apps.into_iter()
        .map(|((scheme_id, geo_code, month), apps_count)| {
            let promo_intensity = promos
                .get(&(scheme_id.as_str(), geo_code.as_str(), month.as_str()))
                .copied()
                .unwrap_or(0.0);
            MonthlyJoinRow {
                scheme_id,
                geo_code,
                month,
                apps_count,
                promo_intensity,
            }
        })
        .collect()
}
