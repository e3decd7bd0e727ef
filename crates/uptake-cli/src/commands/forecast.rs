//! Forecast command implementation

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use uptake_core::{
    ArtifactStore, LocalStore, NullStore, Pipeline, PipelineOutput, RunParams, Timeframe,
};

use super::{load_config, load_tables, truncate};

/// Forecast options beyond the data directory
#[derive(Debug, Default)]
pub struct ForecastArgs {
    pub timeframe: Option<String>,
    pub schemes: Vec<String>,
    pub regions: Vec<String>,
    pub store: Option<PathBuf>,
}

/// Run the pipeline for a data directory
pub fn run_forecast(
    config_path: Option<&Path>,
    data_dir: &Path,
    args: &ForecastArgs,
) -> Result<PipelineOutput> {
    let config = load_config(config_path)?;
    let tables = load_tables(data_dir)?;

    let timeframe = match args.timeframe.as_deref() {
        Some(t) => Some(
            t.parse::<Timeframe>()
                .map_err(|e: String| anyhow::anyhow!(e))?,
        ),
        None => None,
    };

    let params = RunParams {
        timeframe,
        schemes: args.schemes.clone(),
        regions: args.regions.clone(),
    };

    let local;
    let store: &dyn ArtifactStore = match &args.store {
        Some(dir) => {
            local = LocalStore::new(dir)
                .with_context(|| format!("Failed to open artifact store {}", dir.display()))?;
            &local
        }
        None => &NullStore,
    };

    Ok(Pipeline::new(store).with_config(config).run(&params, &tables))
}

pub fn cmd_forecast(
    config_path: Option<&Path>,
    data_dir: &Path,
    args: &ForecastArgs,
    json: bool,
) -> Result<()> {
    let output = run_forecast(config_path, data_dir, args)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_forecast(&output);
    Ok(())
}

fn print_forecast(output: &PipelineOutput) {
    println!();
    println!("📈 Forecast ({})", output.timeframe);
    println!("   Run: {}", output.run_id);
    println!("   ─────────────────────────────────────────────────────────────");

    let cards = &output.cards;
    println!("   Total forecast:   {:>12.1}", cards.total_forecast);
    println!(
        "   Confidence range: {:>12.1} – {:.1}",
        cards.confidence_range[0], cards.confidence_range[1]
    );
    println!("   Series:           {:>12}", cards.series_count);

    if !output.model_plan.is_empty() {
        println!();
        println!("   {:24} │ {:>18} │ {:>7}", "Series", "Model", "History");
        println!("   ─────────────────────────┼────────────────────┼─────────");
        for entry in &output.model_plan {
            println!(
                "   {:24} │ {:>18} │ {:>7}",
                truncate(&entry.series_id, 24),
                entry.model_name.to_string(),
                entry.history_points
            );
        }
    }

    println!();
    if output.aggregate.is_empty() {
        println!("   No forecast data to aggregate.");
    } else {
        println!(
            "   {:12} │ {:6} │ {:>10} │ {:>10} │ {:>10}",
            "Region", "Period", "Expected", "Low", "High"
        );
        println!("   ─────────────┼────────┼────────────┼────────────┼────────────");
        for row in &output.aggregate {
            println!(
                "   {:12} │ {:6} │ {:>10.1} │ {:>10.1} │ {:>10.1}",
                truncate(&row.region, 12),
                row.period,
                row.expected,
                row.low,
                row.high
            );
        }
    }

    println!();
    println!("   Drivers:");
    for driver in &output.drivers {
        println!("   • {}", driver);
    }

    let notes: Vec<&String> = output
        .data_quality
        .notes
        .iter()
        .chain(output.notes.iter())
        .collect();
    if !notes.is_empty() {
        println!();
        println!("   Notes:");
        for note in notes {
            println!("   ⚠️  {}", note);
        }
    }

    if !output.artifacts.forecasts_raw.is_symbolic() {
        println!();
        println!("   Artifacts:");
        println!("     features:      {}", output.artifacts.features);
        println!("     forecasts_raw: {}", output.artifacts.forecasts_raw);
        println!("     forecasts_agg: {}", output.artifacts.forecasts_agg);
    }
}
