//! Feature and analytics command implementations

use std::path::Path;

use anyhow::Result;
use serde_json::json;
use uptake_core::{AnalyticsBundle, AnalyticsEngine, FeatureBuilder, FeatureSet};

use super::{load_tables, truncate};

/// Build features for a data directory
pub fn build_features(data_dir: &Path) -> Result<FeatureSet> {
    let tables = load_tables(data_dir)?;
    Ok(FeatureBuilder::new().build(&tables))
}

pub fn cmd_features(data_dir: &Path, json: bool) -> Result<()> {
    let set = build_features(data_dir)?;

    if json {
        let body = json!({
            "features": set.rows,
            "promotions": set.promotions,
            "monthly_join": set.monthly_join,
            "data_quality": set.report,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!();
    println!("🧮 Features");
    println!("   ─────────────────────────────────────────────────────────────");
    for (dataset, rows) in &set.report.rows {
        let columns = set
            .report
            .columns
            .get(dataset)
            .map(|c| c.join(", "))
            .unwrap_or_default();
        println!(
            "   {:14} {:>6} rows  {}",
            dataset,
            rows,
            truncate(&columns, 60)
        );
    }

    if !set.report.notes.is_empty() {
        println!();
        println!("   Data quality:");
        for note in &set.report.notes {
            println!("   ⚠️  {}", note);
        }
    }

    if set.monthly_join.is_empty() {
        println!();
        println!("   No application rows with a usable date.");
        return Ok(());
    }

    println!();
    println!(
        "   {:10} │ {:8} │ {:7} │ {:>10} │ {:>8}",
        "Scheme", "Region", "Month", "Apps", "Promo"
    );
    println!("   ───────────┼──────────┼─────────┼────────────┼──────────");
    for row in &set.monthly_join {
        println!(
            "   {:10} │ {:8} │ {:7} │ {:>10.1} │ {:>8.2}",
            truncate(&row.scheme_id, 10),
            truncate(&row.geo_code, 8),
            row.month,
            row.apps_count,
            row.promo_intensity
        );
    }

    Ok(())
}

/// Compute analytics views for a data directory
pub fn compute_analytics(data_dir: &Path) -> Result<AnalyticsBundle> {
    let set = build_features(data_dir)?;
    Ok(AnalyticsEngine::new()
        .with_promotions(set.promotions)
        .compute(&set.rows))
}

pub fn cmd_analytics(data_dir: &Path, json: bool) -> Result<()> {
    let bundle = compute_analytics(data_dir)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&bundle)?);
        return Ok(());
    }

    println!();
    println!("📊 Uptake by State");
    println!("   ─────────────────────────────────────────────────────────────");
    if bundle.uptake_by_state.labels.is_empty() {
        println!("   No data.");
    }
    for (label, total) in bundle
        .uptake_by_state
        .labels
        .iter()
        .zip(&bundle.uptake_by_state.data)
    {
        println!("   {:12} │ {:>10}", truncate(label, 12), total);
    }

    println!();
    println!("📈 Monthly Trend");
    println!("   ─────────────────────────────────────────────────────────────");
    let trend = &bundle.monthly_trend_multi;
    if let (Some(first), Some(last)) = (trend.labels.first(), trend.labels.last()) {
        println!("   {} months ({} to {})", trend.labels.len(), first, last);
        for dataset in &trend.datasets {
            let total: f64 = dataset.data.iter().sum();
            println!("   {:12} │ {:>10.1}", truncate(&dataset.label, 12), total);
        }
    } else {
        println!("   No data.");
    }

    println!();
    println!("📣 Promotions vs Applications");
    println!("   ─────────────────────────────────────────────────────────────");
    let promos = &bundle.promotions_vs_apps;
    println!("   Joined points: {}", promos.data.len());
    match promos.r {
        Some(r) => println!("   Pearson r:     {:.3}", r),
        None => println!("   Pearson r:     n/a"),
    }

    println!();
    println!("🥧 Demographics");
    println!("   ─────────────────────────────────────────────────────────────");
    let pie = &bundle.demographics_pie;
    match &pie.dimension {
        Some(dimension) => {
            println!("   Dimension: {}", dimension);
            for (label, value) in pie.labels.iter().zip(&pie.data) {
                println!("   {:16} │ {:>10.1}", truncate(label, 16), value);
            }
        }
        None => println!("   No demographic columns."),
    }

    Ok(())
}
