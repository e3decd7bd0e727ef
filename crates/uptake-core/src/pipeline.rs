//! Run pipeline
//!
//! Executes the stages in order for one request:
//! features -> forecast -> aggregate + analytics.
//!
//! Every stage hands its output to the next through the artifact store and
//! keeps the in-memory rows as a fallback, so a store that loses data (or
//! keeps nothing at all) never breaks a run. The pipeline itself never
//! returns an error; degraded stages show up in `notes`.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use crate::aggregate::Aggregator;
use crate::analytics::AnalyticsEngine;
use crate::config::ForecastConfig;
use crate::features::FeatureBuilder;
use crate::forecast::ForecastEngine;
use crate::ingest::RawTables;
use crate::models::{
    AggregateRow, AnalyticsBundle, DataQualityReport, FeatureRow, ForecastRow, ModelPlanEntry,
    MonthlyPromotion, SummaryCards, Timeframe,
};
use crate::store::{save_or_symbolic, ArtifactId, ArtifactStore, TableInput};
use crate::table::Table;

/// Request parameters for one run
#[derive(Debug, Clone, Default)]
pub struct RunParams {
    /// Horizon; the configured default when unset
    pub timeframe: Option<Timeframe>,
    /// Scheme ids to keep (empty keeps all)
    pub schemes: Vec<String>,
    /// Geo codes to keep (empty keeps all)
    pub regions: Vec<String>,
}

impl RunParams {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe: Some(timeframe),
            ..Default::default()
        }
    }

    fn keeps(&self, scheme_id: &str, geo_code: &str) -> bool {
        (self.schemes.is_empty() || self.schemes.iter().any(|s| s == scheme_id))
            && (self.regions.is_empty() || self.regions.iter().any(|r| r == geo_code))
    }
}

/// Handles of the tables a run persisted
#[derive(Debug, Clone, Serialize)]
pub struct RunArtifacts {
    pub features: ArtifactId,
    pub forecasts_raw: ArtifactId,
    pub forecasts_agg: ArtifactId,
}

/// Everything a run produces
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutput {
    pub run_id: String,
    pub timeframe: Timeframe,
    pub artifacts: RunArtifacts,
    pub aggregate: Vec<AggregateRow>,
    pub cards: SummaryCards,
    pub drivers: Vec<String>,
    pub analytics: AnalyticsBundle,
    pub model_plan: Vec<ModelPlanEntry>,
    pub forecasts: Vec<ForecastRow>,
    pub data_quality: DataQualityReport,
    pub notes: Vec<String>,
}

/// Stage runner bound to one artifact store
pub struct Pipeline<'a> {
    store: &'a dyn ArtifactStore,
    config: ForecastConfig,
    as_of: Option<NaiveDate>,
}

impl<'a> Pipeline<'a> {
    pub fn new(store: &'a dyn ArtifactStore) -> Self {
        Self {
            store,
            config: ForecastConfig::default(),
            as_of: None,
        }
    }

    pub fn with_config(mut self, config: ForecastConfig) -> Self {
        self.config = config;
        self
    }

    /// Pin the reference date for series without history
    pub fn with_as_of(mut self, as_of: NaiveDate) -> Self {
        self.as_of = Some(as_of);
        self
    }

    /// Run every stage starting from the source datasets
    pub fn run(&self, params: &RunParams, tables: &RawTables) -> PipelineOutput {
        let set = FeatureBuilder::new().build(tables);
        self.execute(params, set.rows, set.promotions, set.report)
    }

    /// Run from an already-built feature table
    ///
    /// Only promotion values carried on the feature rows are available.
    pub fn run_from_features(&self, params: &RunParams, features: &TableInput) -> PipelineOutput {
        let mut report = DataQualityReport::default();
        let table = features.resolve(self.store, "features", &mut report.notes);
        let (rows, notes) = FeatureBuilder::new().build_rows(&table);
        report.notes.extend(notes);
        report.rows.insert("features".to_string(), rows.len());
        self.execute(params, rows, Vec::new(), report)
    }

    fn execute(
        &self,
        params: &RunParams,
        rows: Vec<FeatureRow>,
        promotions: Vec<MonthlyPromotion>,
        data_quality: DataQualityReport,
    ) -> PipelineOutput {
        let run_id = format!("M1-{}", Utc::now().timestamp());
        let timeframe = params.timeframe.unwrap_or(self.config.default_timeframe);
        let mut notes = Vec::new();

        info!(run_id = %run_id, timeframe = timeframe.as_str(), "Starting run");

        let total = rows.len();
        let rows: Vec<FeatureRow> = rows
            .into_iter()
            .filter(|r| params.keeps(&r.scheme_id, &r.geo_code))
            .collect();
        if rows.len() != total {
            info!(kept = rows.len(), total, "Applied scheme/region filters");
            notes.push(format!("filters kept {} of {} feature rows", rows.len(), total));
        }
        let promotions: Vec<MonthlyPromotion> = promotions
            .into_iter()
            .filter(|p| params.keeps(&p.scheme_id, &p.geo_code))
            .collect();

        let feature_table = Table::from_rows_or_note(&rows, "features", &mut notes);
        let features_id = save_or_symbolic(self.store, &feature_table, "features", &mut notes);
        let features_input = TableInput::from_handle(features_id.clone()).with_rows(feature_table);

        let mut engine = ForecastEngine::new(self.config.clone());
        if let Some(as_of) = self.as_of {
            engine = engine.with_as_of(as_of);
        }
        let forecast = engine.run(self.store, &features_input, timeframe);
        notes.extend(forecast.notes);

        let forecast_table =
            Table::from_rows_or_note(&forecast.run.rows, "forecasts_raw", &mut notes);
        let forecasts_input =
            TableInput::from_handle(forecast.handle.clone()).with_rows(forecast_table);
        let aggregate = Aggregator::new()
            .with_promotions(promotions.clone())
            .run(self.store, &forecasts_input, &features_input);
        notes.extend(aggregate.notes);

        let analytics = AnalyticsEngine::new()
            .with_promotions(promotions)
            .run(self.store, &features_input);
        notes.extend(analytics.notes);

        info!(
            run_id = %run_id,
            series = forecast.run.model_plan.len(),
            total = aggregate.aggregation.cards.total_forecast,
            notes = notes.len(),
            "Run complete"
        );

        PipelineOutput {
            run_id,
            timeframe,
            artifacts: RunArtifacts {
                features: features_id,
                forecasts_raw: forecast.handle,
                forecasts_agg: aggregate.handle,
            },
            aggregate: aggregate.aggregation.rows,
            cards: aggregate.aggregation.cards,
            drivers: aggregate.aggregation.drivers,
            analytics: analytics.bundle,
            model_plan: forecast.run.model_plan,
            forecasts: forecast.run.rows,
            data_quality,
            notes,
        }
    }
}
