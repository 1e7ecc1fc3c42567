//! Date-keyed numeric tables shared by the feature stages.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("row for {date} has {found} values, expected {expected}")]
    RowWidth {
        date: NaiveDate,
        expected: usize,
        found: usize,
    },
    #[error("duplicate column: {0}")]
    DuplicateColumn(String),
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    SchemaFingerprintMismatch { expected: String, actual: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateFrame {
    columns: Vec<String>,
    rows: BTreeMap<NaiveDate, Vec<f64>>,
}

impl DateFrame {
    pub fn new(columns: Vec<String>) -> Result<Self, FrameError> {
        let mut seen = std::collections::HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(FrameError::DuplicateColumn(column.clone()));
            }
        }
        Ok(Self {
            columns,
            rows: BTreeMap::new(),
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.rows.keys().copied()
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.rows.contains_key(&date)
    }

    pub fn row(&self, date: NaiveDate) -> Option<&[f64]> {
        self.rows.get(&date).map(Vec::as_slice)
    }

    pub fn value(&self, date: NaiveDate, column: &str) -> Option<f64> {
        let idx = self.column_index(column)?;
        self.rows.get(&date).map(|row| row[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &[f64])> + '_ {
        self.rows.iter().map(|(date, row)| (*date, row.as_slice()))
    }

    // Inserts a row unless the date is already present. Returns whether the
    // row was stored; the first occurrence always wins.
    pub fn insert_row(&mut self, date: NaiveDate, values: Vec<f64>) -> Result<bool, FrameError> {
        if values.len() != self.columns.len() {
            return Err(FrameError::RowWidth {
                date,
                expected: self.columns.len(),
                found: values.len(),
            });
        }
        if self.rows.contains_key(&date) {
            return Ok(false);
        }
        self.rows.insert(date, values);
        Ok(true)
    }

    pub fn column_values(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.values().map(|row| row[idx]).collect())
    }

    pub fn to_array_for(&self, dates: &[NaiveDate]) -> Array2<f64> {
        let present: Vec<&Vec<f64>> = dates.iter().filter_map(|d| self.rows.get(d)).collect();
        let mut out = Array2::<f64>::zeros((present.len(), self.columns.len()));
        for (i, row) in present.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                out[[i, j]] = *value;
            }
        }
        out
    }

    pub fn to_array(&self) -> Array2<f64> {
        let dates: Vec<NaiveDate> = self.dates().collect();
        self.to_array_for(&dates)
    }

    // Reorders columns to match `schema`, zero-filling columns this frame
    // never observed and dropping columns the schema does not know.
    pub fn align_to(&self, schema: &FeatureSchema) -> DateFrame {
        let mapping: Vec<Option<usize>> = schema
            .columns
            .iter()
            .map(|name| self.column_index(name))
            .collect();

        let rows = self
            .rows
            .iter()
            .map(|(date, row)| {
                let aligned = mapping
                    .iter()
                    .map(|idx| idx.map(|i| row[i]).unwrap_or(0.0))
                    .collect();
                (*date, aligned)
            })
            .collect();

        DateFrame {
            columns: schema.columns.clone(),
            rows,
        }
    }

    pub fn schema(&self) -> FeatureSchema {
        build_feature_schema(&self.columns)
    }

    pub(crate) fn from_parts(columns: Vec<String>, rows: BTreeMap<NaiveDate, Vec<f64>>) -> Self {
        Self { columns, rows }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodMatrix {
    pub dates: Vec<NaiveDate>,
    pub neighborhoods: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl NeighborhoodMatrix {
    pub fn neighborhood_index(&self, neighborhood: &str) -> Option<usize> {
        self.neighborhoods.iter().position(|n| n == neighborhood)
    }

    pub fn date_index(&self, date: NaiveDate) -> Option<usize> {
        self.dates.binary_search(&date).ok()
    }

    pub fn get(&self, date: NaiveDate, neighborhood: &str) -> Option<f64> {
        let row = self.date_index(date)?;
        let col = self.neighborhood_index(neighborhood)?;
        Some(self.values[row][col])
    }

    pub fn row_sums(&self) -> Vec<f64> {
        self.values.iter().map(|row| row.iter().sum()).collect()
    }

    pub fn column(&self, idx: usize) -> Vec<f64> {
        self.values.iter().map(|row| row[idx]).collect()
    }

    pub fn to_array(&self) -> Array2<f64> {
        let mut out = Array2::<f64>::zeros((self.dates.len(), self.neighborhoods.len()));
        for (i, row) in self.values.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                out[[i, j]] = *value;
            }
        }
        out
    }
}

pub fn build_feature_schema(columns: &[String]) -> FeatureSchema {
    let fingerprint = schema_fingerprint(FEATURE_SCHEMA_VERSION, columns);

    info!(
        component = "frame",
        event = "frame.schema.built",
        version = FEATURE_SCHEMA_VERSION,
        column_count = columns.len(),
        fingerprint = fingerprint
    );

    FeatureSchema {
        version: FEATURE_SCHEMA_VERSION,
        fingerprint,
        columns: columns.to_vec(),
    }
}

pub fn assert_schema_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &FeatureSchema,
) -> Result<(), FrameError> {
    if expected_version != actual.version {
        return Err(FrameError::SchemaVersionMismatch {
            expected: expected_version,
            actual: actual.version,
        });
    }

    if expected_fingerprint != actual.fingerprint {
        return Err(FrameError::SchemaFingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }

    Ok(())
}

fn schema_fingerprint(version: u32, columns: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{version};"));
    hasher.update("columns:");
    for column in columns {
        hasher.update(column.as_bytes());
        hasher.update(":f64;");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn first_row_for_a_date_wins() {
        let mut frame = DateFrame::new(vec!["a".to_string()]).expect("frame");
        assert!(frame.insert_row(date(2019, 1, 1), vec![1.0]).expect("insert"));
        assert!(!frame.insert_row(date(2019, 1, 1), vec![2.0]).expect("insert"));
        assert_eq!(frame.value(date(2019, 1, 1), "a"), Some(1.0));
        assert_eq!(frame.len(), 1);
    }

    #[test]
    fn rejects_duplicate_columns_and_bad_widths() {
        assert!(matches!(
            DateFrame::new(vec!["a".to_string(), "a".to_string()]),
            Err(FrameError::DuplicateColumn(_))
        ));
        let mut frame = DateFrame::new(vec!["a".to_string()]).expect("frame");
        assert!(matches!(
            frame.insert_row(date(2019, 1, 1), vec![1.0, 2.0]),
            Err(FrameError::RowWidth { expected: 1, found: 2, .. })
        ));
    }

    #[test]
    fn align_zero_fills_unknown_and_drops_extra_columns() {
        let mut frame = DateFrame::new(vec!["b".to_string(), "extra".to_string()]).expect("frame");
        frame.insert_row(date(2019, 1, 1), vec![3.0, 9.0]).expect("insert");
        let schema = build_feature_schema(&["a".to_string(), "b".to_string()]);

        let aligned = frame.align_to(&schema);
        assert_eq!(aligned.columns(), &["a".to_string(), "b".to_string()]);
        assert_eq!(aligned.row(date(2019, 1, 1)), Some(&[0.0, 3.0][..]));
        assert_eq!(aligned.schema(), schema);
    }

    #[test]
    fn fingerprint_depends_on_column_order() {
        let ab = build_feature_schema(&["a".to_string(), "b".to_string()]);
        let ba = build_feature_schema(&["b".to_string(), "a".to_string()]);
        assert_ne!(ab.fingerprint, ba.fingerprint);
        assert!(assert_schema_compatible(FEATURE_SCHEMA_VERSION, &ab.fingerprint, &ba).is_err());
        assert!(assert_schema_compatible(FEATURE_SCHEMA_VERSION, &ab.fingerprint, &ab).is_ok());
    }
}
