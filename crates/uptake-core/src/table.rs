//! In-memory tables exchanged with collaborators
//!
//! A [`Table`] is an ordered list of JSON objects. Collaborators (artifact
//! stores, ingestion sources) hand tables to the stages, which coerce cell
//! values tolerantly: a malformed cell becomes "missing", never an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Error, Result};

/// One row of a table
pub type Record = Map<String, Value>;

/// Ordered list of records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table {
    rows: Vec<Record>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(rows: Vec<Record>) -> Self {
        Self { rows }
    }

    /// Serialize typed rows into a table
    pub fn from_rows<T: Serialize>(rows: &[T]) -> Result<Self> {
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::to_value(row)? {
                Value::Object(map) => records.push(map),
                other => {
                    return Err(Error::InvalidData(format!(
                        "Expected an object row, got {}",
                        other
                    )))
                }
            }
        }
        Ok(Self { rows: records })
    }

    /// Serialize typed rows, or an empty table plus a note on failure
    pub fn from_rows_or_note<T: Serialize>(rows: &[T], name: &str, notes: &mut Vec<String>) -> Self {
        Self::from_rows(rows).unwrap_or_else(|e| {
            warn!(table = name, error = %e, "Failed to serialize rows");
            notes.push(format!("{}: serialization failed: {}", name, e));
            Self::new()
        })
    }

    /// Deserialize every record into a typed row
    pub fn to_rows<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.rows
            .iter()
            .map(|r| serde_json::from_value(Value::Object(r.clone())).map_err(Error::from))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.rows.iter()
    }

    pub fn push(&mut self, record: Record) {
        self.rows.push(record);
    }

    /// True if any record carries the column
    pub fn has_column(&self, name: &str) -> bool {
        self.rows.iter().any(|r| r.contains_key(name))
    }

    /// Union of column names in first-seen order
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        for row in &self.rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        columns
    }
}

impl FromIterator<Record> for Table {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Table {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

/// Coerce a cell to a finite number
///
/// Accepts JSON numbers and numeric strings (thousands separators and
/// surrounding whitespace allowed). Everything else is missing.
pub fn coerce_f64(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<f64>().ok()?
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Coerce a cell to a trimmed, non-empty string
pub fn coerce_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse a cell into a calendar date
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    let s = match value {
        Value::String(s) => s.trim(),
        _ => return None,
    };
    if s.is_empty() {
        return None;
    }

    let formats = [
        "%Y-%m-%d", // 2024-01-15
        "%Y/%m/%d", // 2024/01/15
        "%m/%d/%Y", // 01/15/2024
        "%d-%m-%Y", // 15-01-2024
    ];
    for fmt in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Some(date);
        }
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }

    // Month-only values land on the first of the month
    NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d").ok()
}

/// Fetch a column from a record as a number
pub fn get_f64(record: &Record, column: &str) -> Option<f64> {
    record.get(column).and_then(coerce_f64)
}

/// Fetch a column from a record as a string
pub fn get_str(record: &Record, column: &str) -> Option<String> {
    record.get(column).and_then(coerce_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_coerce_f64() {
        assert_eq!(coerce_f64(&json!(12)), Some(12.0));
        assert_eq!(coerce_f64(&json!(" 1,234.5 ")), Some(1234.5));
        assert_eq!(coerce_f64(&json!("abc")), None);
        assert_eq!(coerce_f64(&json!("")), None);
        assert_eq!(coerce_f64(&json!("NaN")), None);
        assert_eq!(coerce_f64(&Value::Null), None);
        assert_eq!(coerce_f64(&json!(true)), None);
    }

    #[test]
    fn test_coerce_str() {
        assert_eq!(coerce_str(&json!("  NY ")), Some("NY".to_string()));
        assert_eq!(coerce_str(&json!("   ")), None);
        assert_eq!(coerce_str(&json!(34)), Some("34".to_string()));
        assert_eq!(coerce_str(&Value::Null), None);
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(parse_date(&json!("2024-01-15")), Some(expected));
        assert_eq!(parse_date(&json!("2024/01/15")), Some(expected));
        assert_eq!(parse_date(&json!("01/15/2024")), Some(expected));
        assert_eq!(parse_date(&json!("2024-01-15T08:30:00")), Some(expected));
        assert_eq!(parse_date(&json!("2024-01-15T08:30:00Z")), Some(expected));
        assert_eq!(
            parse_date(&json!("2024-03")),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(parse_date(&json!("not a date")), None);
        assert_eq!(parse_date(&json!(20240115)), None);
    }

    #[test]
    fn test_columns_union() {
        let table = Table::from_records(vec![
            record(json!({"a": 1, "b": 2})),
            record(json!({"b": 3, "c": 4})),
        ]);
        assert_eq!(table.columns(), vec!["a", "b", "c"]);
        assert!(table.has_column("c"));
        assert!(!table.has_column("d"));
    }

    #[test]
    fn test_typed_round_trip() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Row {
            name: String,
            value: f64,
        }

        let rows = vec![Row {
            name: "x".into(),
            value: 1.5,
        }];
        let table = Table::from_rows(&rows).unwrap();
        assert_eq!(get_f64(&table.records()[0], "value"), Some(1.5));
        let back: Vec<Row> = table.to_rows().unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn test_from_rows_rejects_non_objects() {
        assert!(Table::from_rows(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_from_rows_or_note_degrades_to_empty() {
        let mut notes = Vec::new();
        let table = Table::from_rows_or_note(&[1, 2, 3], "forecasts_raw", &mut notes);
        assert!(table.is_empty());
        assert_eq!(notes.len(), 1);
        assert!(notes[0].starts_with("forecasts_raw: serialization failed"));
    }
}
