//! CLI command tests
//!
//! This module contains all tests for the CLI commands.

use std::fs;

use tempfile::TempDir;
use uptake_core::{ModelKind, Timeframe};

use crate::commands::{self, truncate, ForecastArgs};

fn setup_data_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("applications.csv"),
        "date,scheme_id,state,apps_count,gender\n\
         2024-01-01,S1,NY,10,F\n\
         2024-02-01,S1,NY,20,M\n\
         2024-01-01,S2,CA,4,F\n",
    )
    .unwrap();
    dir
}

// ========== Forecast Command Tests ==========

#[test]
fn test_run_forecast_defaults() {
    let data = setup_data_dir();
    let output = commands::run_forecast(None, data.path(), &ForecastArgs::default()).unwrap();

    assert_eq!(output.timeframe, Timeframe::NextQuarter);
    assert_eq!(output.model_plan.len(), 2);
    assert!(output
        .model_plan
        .iter()
        .all(|p| p.model_name == ModelKind::LastValue));
    assert_eq!(output.cards.total_forecast, 72.0);
    assert!(output.artifacts.features.is_symbolic());
}

#[test]
fn test_run_forecast_with_filters_and_timeframe() {
    let data = setup_data_dir();
    let args = ForecastArgs {
        timeframe: Some("next_year".into()),
        regions: vec!["NY".into()],
        ..Default::default()
    };
    let output = commands::run_forecast(None, data.path(), &args).unwrap();

    assert_eq!(output.forecasts.len(), 12);
    assert_eq!(output.cards.total_forecast, 240.0);
    assert_eq!(output.cards.series_count, 1);
}

#[test]
fn test_run_forecast_invalid_timeframe() {
    let data = setup_data_dir();
    let args = ForecastArgs {
        timeframe: Some("next_week".into()),
        ..Default::default()
    };
    let result = commands::run_forecast(None, data.path(), &args);
    assert!(result.is_err());
}

#[test]
fn test_run_forecast_missing_data_dir() {
    let dir = TempDir::new().unwrap();
    let result = commands::run_forecast(None, &dir.path().join("absent"), &ForecastArgs::default());
    assert!(result.is_err());
}

#[test]
fn test_run_forecast_persists_artifacts() {
    let data = setup_data_dir();
    let store_dir = TempDir::new().unwrap();
    let args = ForecastArgs {
        store: Some(store_dir.path().join("artifacts")),
        ..Default::default()
    };
    let output = commands::run_forecast(None, data.path(), &args).unwrap();

    assert!(!output.artifacts.forecasts_agg.is_symbolic());
    let files = fs::read_dir(store_dir.path().join("artifacts")).unwrap().count();
    assert_eq!(files, 3);
}

#[test]
fn test_run_forecast_uses_config_file() {
    let data = setup_data_dir();
    let config = data.path().join("forecast.toml");
    fs::write(&config, "[band]\npct = 0.5\n\n[defaults]\ntimeframe = \"next_6_months\"\n").unwrap();

    let output = commands::run_forecast(Some(config.as_path()), data.path(), &ForecastArgs::default()).unwrap();
    assert_eq!(output.timeframe, Timeframe::NextSixMonths);
    let first = &output.forecasts[0];
    assert_eq!(first.yhat_high, first.yhat * 1.5);
}

#[test]
fn test_cmd_forecast_empty_dir() {
    let data = TempDir::new().unwrap();
    let result = commands::cmd_forecast(None, data.path(), &ForecastArgs::default(), false);
    assert!(result.is_ok());
}

#[test]
fn test_cmd_forecast_json() {
    let data = setup_data_dir();
    let result = commands::cmd_forecast(None, data.path(), &ForecastArgs::default(), true);
    assert!(result.is_ok());
}

// ========== Features / Analytics Command Tests ==========

#[test]
fn test_build_features() {
    let data = setup_data_dir();
    let set = commands::build_features(data.path()).unwrap();
    assert_eq!(set.rows.len(), 3);
    assert_eq!(set.report.rows["applications"], 3);
    assert_eq!(set.monthly_join.len(), 3);
}

#[test]
fn test_build_features_reports_unreadable_dataset() {
    let data = setup_data_dir();
    // Non-UTF-8 bytes make the CSV reader fail on this dataset only
    fs::write(data.path().join("promotions.csv"), b"date,scheme_id\n\xff\xfe,S1\n").unwrap();

    let set = commands::build_features(data.path()).unwrap();
    assert_eq!(set.rows.len(), 3);
    assert!(set
        .report
        .notes
        .iter()
        .any(|n| n.starts_with("promotions: fetch failed")));
}

#[test]
fn test_cmd_features() {
    let data = setup_data_dir();
    assert!(commands::cmd_features(data.path(), false).is_ok());
    assert!(commands::cmd_features(data.path(), true).is_ok());
}

#[test]
fn test_compute_analytics() {
    let data = setup_data_dir();
    let bundle = commands::compute_analytics(data.path()).unwrap();
    assert_eq!(bundle.uptake_by_state.labels, vec!["CA", "NY"]);
    assert_eq!(
        bundle.demographics_pie.dimension.as_deref(),
        Some("applicant_gender")
    );
    assert_eq!(bundle.demographics_pie.labels, vec!["M", "F"]);
    assert_eq!(bundle.promotions_vs_apps.r, None);
}

#[test]
fn test_compute_analytics_joins_promotions_file() {
    let data = setup_data_dir();
    fs::write(
        data.path().join("promotions.csv"),
        "date,scheme_id,state,promo\n2024-01-10,S1,NY,1\n2024-02-10,S1,NY,2\n",
    )
    .unwrap();

    let bundle = commands::compute_analytics(data.path()).unwrap();
    assert_eq!(bundle.promotions_vs_apps.data.len(), 2);
    assert_eq!(bundle.promotions_vs_apps.r, Some(1.0));
}

#[test]
fn test_cmd_analytics() {
    let data = setup_data_dir();
    assert!(commands::cmd_analytics(data.path(), false).is_ok());
    assert!(commands::cmd_analytics(data.path(), true).is_ok());
}

// ========== Config Command Tests ==========

#[test]
fn test_cmd_config_with_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("forecast.toml");
    fs::write(&path, "[selection]\nseasonal_min_history = 24\n").unwrap();
    assert!(commands::cmd_config(Some(path.as_path())).is_ok());
}

#[test]
fn test_cmd_config_invalid_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("forecast.toml");
    fs::write(&path, "[band]\npct = 2.0\n").unwrap();
    assert!(commands::cmd_config(Some(path.as_path())).is_err());
}

// ========== Helper Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("a much longer label", 10), "a much ...");
    assert_eq!(truncate("—————", 4), "—...");
}
