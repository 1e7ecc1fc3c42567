//! One-hot encoding of calendar attributes and signal tables.
//!
//! Each signal table is encoded on its own so that a date present in several
//! tables (a holiday and a home game, say) keeps one indicator per table.
//! Column names are `<category>_<value>`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::calendar::DateFeatures;
use crate::frame::DateFrame;
use crate::signals::SignalTable;

pub const SPECIAL_DAYS_VERSION: u32 = 1;

pub const SPECIAL_DAYS: [&str; 49] = [
    "01/06", "01/14", "02/02", "02/07", "03/01", "03/10", "03/20", "03/26", "04/01", "04/08",
    "04/17", "04/18", "05/06", "05/09", "05/10", "05/21", "05/31", "06/04", "06/05", "06/13",
    "06/28", "06/30", "07/09", "07/16", "07/20", "07/23", "07/29", "08/01", "08/20", "08/24",
    "08/28", "09/08", "09/11", "09/14", "09/30", "10/02", "10/17", "10/26", "11/01", "11/15",
    "11/16", "11/23", "11/27", "12/04", "12/12", "12/19", "12/21", "12/23", "12/29",
];

pub const DAY_SEQ_COLUMN: &str = "day_seq";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingConfig {
    pub special_days: Vec<String>,
    pub include_day_of_month: bool,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            special_days: SPECIAL_DAYS.iter().map(|d| (*d).to_string()).collect(),
            include_day_of_month: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingReport {
    pub source: String,
    pub input_rows: u64,
    pub output_rows: u64,
    pub duplicate_dates: Vec<NaiveDate>,
    pub column_count: usize,
}

pub fn encode_calendar(
    features: &[DateFeatures],
    cfg: &EncodingConfig,
) -> (DateFrame, EncodingReport) {
    let special: BTreeSet<&str> = cfg.special_days.iter().map(String::as_str).collect();

    let rows: Vec<(NaiveDate, f64, Vec<(&'static str, String)>)> = features
        .iter()
        .map(|f| {
            let mut active = vec![("day_of_week", f.day_of_week.to_string())];
            if cfg.include_day_of_month {
                active.push(("day", f.day.to_string()));
            }
            active.push(("month_weekday", f.month_weekday.clone()));
            if special.contains(f.month_day.as_str()) {
                active.push(("spec_day", f.month_day.clone()));
            }
            (f.date, f.day_seq as f64, active)
        })
        .collect();

    let categories = ["day_of_week", "day", "month_weekday", "spec_day"];
    let dummy_columns = ordered_columns(
        &categories,
        rows.iter().flat_map(|(_, _, active)| active.iter()),
    );

    let mut columns = Vec::with_capacity(dummy_columns.len() + 1);
    columns.push(DAY_SEQ_COLUMN.to_string());
    columns.extend(dummy_columns.iter().cloned());
    let index = column_lookup(&columns);

    let mut out: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    let mut duplicate_dates = Vec::new();
    for (date, day_seq, active) in &rows {
        if out.contains_key(date) {
            duplicate_dates.push(*date);
            continue;
        }
        let mut values = vec![0.0; columns.len()];
        values[0] = *day_seq;
        for (category, value) in active {
            if let Some(idx) = index.get(&column_name(category, value)) {
                values[*idx] = 1.0;
            }
        }
        out.insert(*date, values);
    }

    finish("calendar", features.len(), columns, out, duplicate_dates)
}

pub fn encode_signal(table: &SignalTable) -> (DateFrame, EncodingReport) {
    let category = table.category.as_str();
    let columns = ordered_columns(
        &[category],
        table
            .entries
            .iter()
            .map(|entry| (category, entry.label.clone()))
            .collect::<Vec<_>>()
            .iter(),
    );
    let index = column_lookup(&columns);

    let mut out: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    let mut duplicate_dates = Vec::new();
    for entry in &table.entries {
        if out.contains_key(&entry.date) {
            duplicate_dates.push(entry.date);
            continue;
        }
        let mut values = vec![0.0; columns.len()];
        if let Some(idx) = index.get(&column_name(category, &entry.label)) {
            values[*idx] = 1.0;
        }
        out.insert(entry.date, values);
    }

    finish(category, table.entries.len(), columns, out, duplicate_dates)
}

fn finish(
    source: &str,
    input_rows: usize,
    columns: Vec<String>,
    rows: BTreeMap<NaiveDate, Vec<f64>>,
    duplicate_dates: Vec<NaiveDate>,
) -> (DateFrame, EncodingReport) {
    if !duplicate_dates.is_empty() {
        warn!(
            component = "encoding",
            event = "encoding.duplicate_dates",
            source,
            duplicate_rows = duplicate_dates.len(),
            first_duplicate = %duplicate_dates[0]
        );
    }

    let report = EncodingReport {
        source: source.to_string(),
        input_rows: input_rows as u64,
        output_rows: rows.len() as u64,
        duplicate_dates,
        column_count: columns.len(),
    };

    info!(
        component = "encoding",
        event = "encoding.finish",
        source,
        input_rows = report.input_rows,
        output_rows = report.output_rows,
        column_count = report.column_count
    );

    (DateFrame::from_parts(columns, rows), report)
}

fn column_name(category: &str, value: &str) -> String {
    format!("{category}_{value}")
}

fn ordered_columns<'a, C, I>(categories: &[&str], active: I) -> Vec<String>
where
    C: AsRef<str> + 'a,
    I: Iterator<Item = &'a (C, String)>,
{
    let mut by_category: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
    for (category, value) in active {
        let category = category.as_ref();
        if let Some(known) = categories.iter().find(|c| **c == category) {
            by_category
                .entry(*known)
                .or_default()
                .insert(column_name(category, value));
        }
    }

    categories
        .iter()
        .flat_map(|category| by_category.remove(category).unwrap_or_default())
        .collect()
}

fn column_lookup(columns: &[String]) -> BTreeMap<String, usize> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.clone(), idx))
        .collect()
}
