//! CSV loaders for the raw tables: call events, weather and calendar signals.
//!
//! Columns are located by header name so extra columns are ignored.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::counts::CallEvent;
use crate::signals::{pro_football_label, SignalTable, Venue};
use crate::weather::{WeatherForecastDay, WeatherObservation};

pub const EVENT_TIMESTAMP_FORMATS: [&str; 3] = [
    "%m/%d/%Y %I:%M:%S %p",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("{path} has no {column} column")]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("line {line}: failed to parse field {field} value '{value}'")]
    ParseField {
        line: u64,
        field: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub path: PathBuf,
    pub records: u64,
    pub loaded: u64,
    pub duplicates_dropped: u64,
    pub rows_skipped: u64,
}

impl SourceReport {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            records: 0,
            loaded: 0,
            duplicates_dropped: 0,
            rows_skipped: 0,
        }
    }

    fn log(&self, source: &'static str) {
        info!(
            component = "sources",
            event = "sources.load.finish",
            source,
            path = %self.path.display(),
            records = self.records,
            loaded = self.loaded,
            duplicates_dropped = self.duplicates_dropped,
            rows_skipped = self.rows_skipped
        );
    }
}

pub fn parse_event_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    EVENT_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

struct Columns {
    path: PathBuf,
    headers: StringRecord,
}

impl Columns {
    fn read<R: std::io::Read>(
        path: &Path,
        reader: &mut csv::Reader<R>,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            path: path.to_path_buf(),
            headers: reader.headers()?.clone(),
        })
    }

    fn index(&self, column: &'static str) -> Result<usize, SourceError> {
        self.optional(column)
            .ok_or_else(|| SourceError::MissingColumn {
                path: self.path.clone(),
                column,
            })
    }

    fn optional(&self, column: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(column))
    }
}

fn field<'r>(record: &'r StringRecord, idx: usize) -> &'r str {
    record.get(idx).unwrap_or_default().trim()
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or_default()
}

fn parse_date_field(
    record: &StringRecord,
    idx: usize,
    name: &'static str,
) -> Result<NaiveDate, SourceError> {
    let raw = field(record, idx);
    parse_date(raw).ok_or_else(|| SourceError::ParseField {
        line: line_of(record),
        field: name,
        value: raw.to_string(),
    })
}

fn parse_reading(
    record: &StringRecord,
    idx: usize,
    name: &'static str,
) -> Result<f64, SourceError> {
    let raw = field(record, idx);
    if raw.is_empty() {
        return Ok(f64::NAN);
    }
    raw.parse::<f64>().map_err(|_| SourceError::ParseField {
        line: line_of(record),
        field: name,
        value: raw.to_string(),
    })
}

pub fn load_events_csv(
    path: &Path,
    delimiter: u8,
) -> Result<(Vec<CallEvent>, SourceReport), SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)?;
    let columns = Columns::read(path, &mut reader)?;
    let ts_idx = columns.index("ORIG_TIME_QUEUED")?;
    let hood_idx = columns.index("NEIGHBORHOOD")?;
    let event_idx = columns.index("EVENT")?;

    let mut report = SourceReport::new(path);
    let mut seen = HashSet::new();
    let mut events = Vec::new();
    for record in reader.records() {
        let record = record?;
        report.records += 1;
        let raw_ts = field(&record, ts_idx);
        let timestamp =
            parse_event_timestamp(raw_ts).ok_or_else(|| SourceError::ParseField {
                line: line_of(&record),
                field: "ORIG_TIME_QUEUED",
                value: raw_ts.to_string(),
            })?;
        let event = CallEvent {
            timestamp,
            neighborhood: field(&record, hood_idx).to_string(),
            event_type: field(&record, event_idx).to_string(),
        };
        if seen.insert(event.clone()) {
            events.push(event);
        } else {
            report.duplicates_dropped += 1;
        }
    }
    report.loaded = events.len() as u64;

    if report.duplicates_dropped > 0 {
        warn!(
            component = "sources",
            event = "sources.events.duplicates_dropped",
            duplicates = report.duplicates_dropped
        );
    }
    report.log("events");
    Ok((events, report))
}

pub fn load_weather_csv(
    path: &Path,
) -> Result<(Vec<WeatherObservation>, SourceReport), SourceError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let columns = Columns::read(path, &mut reader)?;
    let date_idx = columns.index("DATE")?;
    let tmax_idx = columns.index("TMAX")?;
    let prcp_idx = columns.index("PRCP")?;
    let snow_idx = columns.index("SNOW")?;

    let mut report = SourceReport::new(path);
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        report.records += 1;
        rows.push(WeatherObservation {
            date: parse_date_field(&record, date_idx, "DATE")?,
            temp_max: parse_reading(&record, tmax_idx, "TMAX")?,
            precip: parse_reading(&record, prcp_idx, "PRCP")?,
            snow: parse_reading(&record, snow_idx, "SNOW")?,
        });
    }
    report.loaded = rows.len() as u64;
    report.log("weather_history");
    Ok((rows, report))
}

pub fn load_weather_forecast_csv(
    path: &Path,
) -> Result<(Vec<WeatherForecastDay>, SourceReport), SourceError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let columns = Columns::read(path, &mut reader)?;
    let date_idx = columns.index("DATE")?;
    let temp_idx = columns.index("TEMP_MAX")?;
    let chance_idx = columns.index("PRECIP_CHANCE")?;

    let mut report = SourceReport::new(path);
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        report.records += 1;
        let date = parse_date_field(&record, date_idx, "DATE")?;
        let temp = parse_reading(&record, temp_idx, "TEMP_MAX")?;
        let chance = parse_reading(&record, chance_idx, "PRECIP_CHANCE")?;

        let mut day = WeatherForecastDay::from_precip_chance(date, temp, chance);
        if !temp.is_finite() {
            day.temp_max = None;
        }
        if !chance.is_finite() {
            day.precip = None;
        }
        rows.push(day);
    }
    report.loaded = rows.len() as u64;
    report.log("weather_forecast");
    Ok((rows, report))
}

pub fn load_signal_csv(
    path: &Path,
    category: &str,
) -> Result<(SignalTable, SourceReport), SourceError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let columns = Columns::read(path, &mut reader)?;
    let date_idx = columns.index("date")?;
    let label_idx = columns.index("label")?;

    let mut report = SourceReport::new(path);
    let mut table = SignalTable::new(category);
    for record in reader.records() {
        let record = record?;
        report.records += 1;
        let label = field(&record, label_idx);
        if label.is_empty() {
            report.rows_skipped += 1;
            continue;
        }
        table.push(parse_date_field(&record, date_idx, "date")?, label);
    }
    report.loaded = table.entries.len() as u64;
    report.log("signal");
    Ok((table, report))
}

pub fn load_pro_football_schedule(
    path: &Path,
    category: &str,
) -> Result<(SignalTable, SourceReport), SourceError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let columns = Columns::read(path, &mut reader)?;
    let date_idx = columns.index("date")?;
    let week_idx = columns.index("week")?;
    let opponent_idx = columns.index("opponent")?;
    let venue_idx = columns.optional("venue");

    let mut report = SourceReport::new(path);
    let mut table = SignalTable::new(category);
    for record in reader.records() {
        let record = record?;
        report.records += 1;
        let opponent = field(&record, opponent_idx);
        if opponent.is_empty() || opponent.eq_ignore_ascii_case("Bye Week") {
            report.rows_skipped += 1;
            continue;
        }
        let venue = Venue::from_marker(venue_idx.map(|i| field(&record, i)).unwrap_or(""));
        let label = pro_football_label(field(&record, week_idx), venue);
        table.push(parse_date_field(&record, date_idx, "date")?, label);
    }
    report.loaded = table.entries.len() as u64;
    report.log("pro_football_schedule");
    Ok((table, report))
}

pub fn load_team_schedule(
    path: &Path,
    category: &str,
) -> Result<(SignalTable, SourceReport), SourceError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let columns = Columns::read(path, &mut reader)?;
    let date_idx = columns.index("date")?;
    let venue_idx = columns.optional("venue");

    let mut report = SourceReport::new(path);
    let mut table = SignalTable::new(category);
    for record in reader.records() {
        let record = record?;
        report.records += 1;
        let venue = Venue::from_marker(venue_idx.map(|i| field(&record, i)).unwrap_or(""));
        table.push(
            parse_date_field(&record, date_idx, "date")?,
            venue.as_str(),
        );
    }
    report.loaded = table.entries.len() as u64;
    report.log("team_schedule");
    Ok((table, report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_supported_timestamp_format() {
        let expected = NaiveDate::from_ymd_opt(2019, 1, 2)
            .and_then(|d| d.and_hms_opt(13, 5, 9))
            .expect("valid");
        assert_eq!(parse_event_timestamp("01/02/2019 01:05:09 PM"), Some(expected));
        assert_eq!(parse_event_timestamp("2019-01-02 13:05:09"), Some(expected));
        assert_eq!(parse_event_timestamp(" 2019-01-02T13:05:09 "), Some(expected));
        assert_eq!(parse_event_timestamp("Jan 2 2019"), None);
    }

    #[test]
    fn parses_iso_and_us_dates() {
        let expected = NaiveDate::from_ymd_opt(2019, 9, 8).expect("valid");
        assert_eq!(parse_date("2019-09-08"), Some(expected));
        assert_eq!(parse_date("09/08/2019"), Some(expected));
        assert_eq!(parse_date("8 Sep"), None);
    }
}
