//! Tabular ingestion for the source datasets
//!
//! Sources hand back raw tables; every table is then normalized to the
//! canonical column names (`geo_code`, `apps_count`, `promo_intensity`, ...)
//! with dimension values trimmed.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use csv::ReaderBuilder;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::table::{Record, Table};

/// Named source datasets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dataset {
    Applications,
    Promotions,
    Demographics,
    SocioEcon,
}

impl Dataset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applications => "applications",
            Self::Promotions => "promotions",
            Self::Demographics => "demographics",
            Self::SocioEcon => "socio_econ",
        }
    }

    pub fn all() -> &'static [Dataset] {
        &[
            Self::Applications,
            Self::Promotions,
            Self::Demographics,
            Self::SocioEcon,
        ]
    }

    /// Columns the dataset must carry to be useful
    pub fn essential_columns(&self) -> &'static [&'static str] {
        match self {
            Self::Applications => &["date", "scheme_id", "geo_code", "apps_count"],
            Self::Promotions => &["date", "scheme_id", "geo_code", "promo_intensity"],
            Self::Demographics | Self::SocioEcon => &[],
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Dataset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "applications" => Ok(Self::Applications),
            "promotions" => Ok(Self::Promotions),
            "demographics" => Ok(Self::Demographics),
            "socio_econ" => Ok(Self::SocioEcon),
            _ => Err(format!("Unknown dataset: {}", s)),
        }
    }
}

/// Supplier of raw dataset rows
pub trait RowSource {
    /// Human-readable name for this source
    fn name(&self) -> &str;

    /// Fetch one dataset; an absent dataset is an empty table
    fn fetch(&self, dataset: Dataset) -> Result<Table>;
}

/// Reads `<dir>/<dataset>.csv` files
pub struct CsvDirectorySource {
    dir: PathBuf,
}

impl CsvDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn dataset_path(&self, dataset: Dataset) -> PathBuf {
        self.dir.join(format!("{}.csv", dataset.as_str()))
    }
}

impl RowSource for CsvDirectorySource {
    fn name(&self) -> &str {
        "csv-directory"
    }

    fn fetch(&self, dataset: Dataset) -> Result<Table> {
        let path = self.dataset_path(dataset);
        if !path.exists() {
            debug!(dataset = dataset.as_str(), "No CSV file at {}", path.display());
            return Ok(Table::new());
        }
        let file = File::open(&path)
            .map_err(|e| Error::Ingest(format!("Failed to open {}: {}", path.display(), e)))?;
        parse_csv(file)
    }
}

/// Parse CSV data into a table, keeping headers as column names
///
/// Empty cells become nulls.
pub fn parse_csv<R: Read>(reader: R) -> Result<Table> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let mut table = Table::new();

    for result in rdr.records() {
        let record = result?;
        let mut row = Record::new();
        for (i, header) in headers.iter().enumerate() {
            let value = match record.get(i) {
                Some(v) if !v.trim().is_empty() => Value::String(v.to_string()),
                _ => Value::Null,
            };
            row.insert(header.to_string(), value);
        }
        table.push(row);
    }

    debug!("Parsed {} CSV rows", table.len());
    Ok(table)
}

/// Map a source column name onto the canonical schema
pub fn canonical_column(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let canonical = match lowered.as_str() {
        "state" | "state_code" | "region" | "region_code" | "geoid" => "geo_code",
        "applications" | "application_count" | "apps" | "count" | "app_count" => "apps_count",
        "promotion_intensity" | "promo" => "promo_intensity",
        "gender" => "applicant_gender",
        "age" => "applicant_age",
        "income" => "income_bracket",
        other => other,
    };
    canonical.to_string()
}

const DIMENSION_COLUMNS: [&str; 5] = [
    "scheme_id",
    "geo_code",
    "applicant_gender",
    "income_bracket",
    "occupation",
];

/// Rename columns to the canonical schema and trim dimension values
///
/// When two source columns map to the same canonical name, the first
/// non-null value wins.
pub fn normalize_table(table: &Table) -> Table {
    table
        .iter()
        .map(|record| {
            let mut row = Record::new();
            for (key, value) in record {
                let column = canonical_column(key);
                let value = if DIMENSION_COLUMNS.contains(&column.as_str()) {
                    match value {
                        Value::String(s) if s.trim().is_empty() => Value::Null,
                        Value::String(s) => Value::String(s.trim().to_string()),
                        other => other.clone(),
                    }
                } else {
                    value.clone()
                };
                match row.get(&column) {
                    Some(existing) if !existing.is_null() => {}
                    _ => {
                        row.insert(column, value);
                    }
                }
            }
            row
        })
        .collect()
}

/// The four source datasets after normalization
#[derive(Debug, Clone, Default)]
pub struct RawTables {
    pub applications: Table,
    pub promotions: Table,
    pub demographics: Table,
    pub socio_econ: Table,
    /// Problems met while fetching; carried into the data-quality report
    pub notes: Vec<String>,
}

impl RawTables {
    /// Applications only; the other datasets are empty
    pub fn applications_only(applications: Table) -> Self {
        Self {
            applications: normalize_table(&applications),
            ..Default::default()
        }
    }

    pub fn get(&self, dataset: Dataset) -> &Table {
        match dataset {
            Dataset::Applications => &self.applications,
            Dataset::Promotions => &self.promotions,
            Dataset::Demographics => &self.demographics,
            Dataset::SocioEcon => &self.socio_econ,
        }
    }

    fn get_mut(&mut self, dataset: Dataset) -> &mut Table {
        match dataset {
            Dataset::Applications => &mut self.applications,
            Dataset::Promotions => &mut self.promotions,
            Dataset::Demographics => &mut self.demographics,
            Dataset::SocioEcon => &mut self.socio_econ,
        }
    }

    /// Fetch and normalize every dataset
    ///
    /// A failing dataset degrades to an empty table and a note in `notes`.
    pub fn fetch_all(source: &dyn RowSource) -> Self {
        let mut tables = Self::default();

        for &dataset in Dataset::all() {
            match source.fetch(dataset) {
                Ok(table) => *tables.get_mut(dataset) = normalize_table(&table),
                Err(e) => {
                    warn!(
                        dataset = dataset.as_str(),
                        source = source.name(),
                        error = %e,
                        "Dataset fetch failed"
                    );
                    tables
                        .notes
                        .push(format!("{}: fetch failed: {}", dataset, e));
                }
            }
        }

        tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{get_f64, get_str};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_canonical_column_aliases() {
        assert_eq!(canonical_column("State"), "geo_code");
        assert_eq!(canonical_column(" apps "), "apps_count");
        assert_eq!(canonical_column("promo"), "promo_intensity");
        assert_eq!(canonical_column("gender"), "applicant_gender");
        assert_eq!(canonical_column("age"), "applicant_age");
        assert_eq!(canonical_column("income"), "income_bracket");
        assert_eq!(canonical_column("scheme_id"), "scheme_id");
    }

    #[test]
    fn test_parse_csv_nulls_empty_cells() {
        let csv = "date,scheme_id,apps\n2024-01-01,S1,10\n2024-02-01,S1,\n";
        let table = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.records()[1]["apps"].is_null());
    }

    #[test]
    fn test_normalize_table() {
        let csv = "Date,Scheme_ID,State,Applications,Gender\n2024-01-01, S1 , NY ,10,  \n";
        let table = normalize_table(&parse_csv(csv.as_bytes()).unwrap());
        let row = &table.records()[0];
        assert_eq!(get_str(row, "scheme_id").as_deref(), Some("S1"));
        assert_eq!(get_str(row, "geo_code").as_deref(), Some("NY"));
        assert_eq!(get_f64(row, "apps_count"), Some(10.0));
        assert!(row["applicant_gender"].is_null());
    }

    #[test]
    fn test_normalize_keeps_first_non_null_alias() {
        let csv = "state,region,apps_count\nNY,,5\n,CA,6\n";
        let table = normalize_table(&parse_csv(csv.as_bytes()).unwrap());
        assert_eq!(get_str(&table.records()[0], "geo_code").as_deref(), Some("NY"));
        assert_eq!(get_str(&table.records()[1], "geo_code").as_deref(), Some("CA"));
    }

    #[test]
    fn test_csv_directory_source() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("applications.csv"),
            "date,scheme_id,geo_code,apps_count\n2024-01-01,S1,NY,10\n",
        )
        .unwrap();

        let source = CsvDirectorySource::new(dir.path());
        let tables = RawTables::fetch_all(&source);
        assert!(tables.notes.is_empty());
        assert_eq!(tables.applications.len(), 1);
        assert!(tables.promotions.is_empty());
        assert!(tables.get(Dataset::SocioEcon).is_empty());
    }

    /// Serves applications and fails on promotions
    struct PartialSource;

    impl RowSource for PartialSource {
        fn name(&self) -> &str {
            "partial"
        }

        fn fetch(&self, dataset: Dataset) -> Result<Table> {
            match dataset {
                Dataset::Applications => {
                    parse_csv("date,scheme_id,state,apps\n2024-01-01,S1,NY,4\n".as_bytes())
                }
                Dataset::Promotions => Err(Error::Ingest("promotions.csv: bad row 3".into())),
                _ => Ok(Table::new()),
            }
        }
    }

    #[test]
    fn test_fetch_failure_degrades_with_note() {
        let tables = RawTables::fetch_all(&PartialSource);
        assert_eq!(tables.applications.len(), 1);
        assert!(tables.promotions.is_empty());
        assert_eq!(tables.notes.len(), 1);
        assert!(tables.notes[0].starts_with("promotions: fetch failed"));
        assert!(tables.notes[0].contains("bad row 3"));
    }

    #[test]
    fn test_dataset_round_trip() {
        for dataset in Dataset::all() {
            assert_eq!(dataset.as_str().parse::<Dataset>().unwrap(), *dataset);
        }
    }
}
