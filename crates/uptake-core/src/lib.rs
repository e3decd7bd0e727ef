//! Uptake Core Library
//!
//! Forecasting and aggregation engine for scheme uptake demand:
//! - Ingestion of the source datasets (CSV directory or any row source)
//! - Feature builder (calendar parts, per-series lag, data-quality notes)
//! - Per-series forecasting with history-driven model selection
//! - Region/period aggregation, summary cards and driver notes
//! - Chart-ready analytics (state uptake, trend, promotions, demographics)
//! - Artifact stores with pluggable backends
//! - Pipeline runner tying the stages together

pub mod aggregate;
pub mod analytics;
pub mod config;
pub mod error;
pub mod features;
pub mod forecast;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod table;

pub use aggregate::{AggregateOutput, Aggregation, Aggregator};
pub use analytics::{AnalyticsEngine, AnalyticsOutput};
pub use config::ForecastConfig;
pub use error::{Error, Result};
pub use features::{FeatureBuilder, FeatureSet};
pub use forecast::{ForecastEngine, ForecastOutput, ForecastRun, MonthlySeries};
pub use ingest::{CsvDirectorySource, Dataset, RawTables, RowSource};
pub use models::{
    AggregateRow, AnalyticsBundle, DataQualityReport, FeatureRow, ForecastRow, ModelKind,
    ModelPlanEntry, MonthKey, MonthlyJoinRow, MonthlyPromotion, SeriesKey, SummaryCards,
    Timeframe,
};
pub use pipeline::{Pipeline, PipelineOutput, RunArtifacts, RunParams};
pub use store::{ArtifactId, ArtifactStore, LocalStore, MemoryStore, NullStore, TableInput};
pub use table::{Record, Table};
