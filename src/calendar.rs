//! Per-date calendar attributes and the `day_seq` trend index.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::counts::DailyCountSeries;

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("invalid date range: end {end} is before start {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, CalendarError> {
        if end < start {
            return Err(CalendarError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn day_count(&self) -> usize {
        ((self.end - self.start).num_days() + 1) as usize
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn offset_of(&self, date: NaiveDate) -> Option<usize> {
        if self.contains(date) {
            Some((date - self.start).num_days() as usize)
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = NaiveDate> {
        self.start.iter_days().take(self.day_count())
    }
}

// The last training date and its `day_seq`. Forecast numbering continues
// from here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayAnchor {
    pub date: NaiveDate,
    pub day_seq: i64,
}

impl DayAnchor {
    pub fn day_seq_for(&self, date: NaiveDate) -> i64 {
        self.day_seq + (date - self.date).num_days()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateFeatures {
    pub date: NaiveDate,
    pub day_seq: i64,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub day_of_week: u32,
    pub month_day: String,
    pub month_weekday: String,
}

pub fn date_features(date: NaiveDate, day_seq: i64) -> DateFeatures {
    DateFeatures {
        date,
        day_seq,
        year: date.year(),
        month: date.month(),
        day: date.day(),
        day_of_week: date.weekday().num_days_from_monday(),
        month_day: date.format("%m/%d").to_string(),
        month_weekday: date.format("%b_%a").to_string(),
    }
}

pub fn synthesize_range(range: DateRange, anchor: DayAnchor) -> Vec<DateFeatures> {
    let features: Vec<DateFeatures> = range
        .iter()
        .map(|date| date_features(date, anchor.day_seq_for(date)))
        .collect();

    info!(
        component = "calendar",
        event = "calendar.synthesize.finish",
        start = %range.start,
        end = %range.end,
        anchor_date = %anchor.date,
        anchor_day_seq = anchor.day_seq,
        rows = features.len()
    );

    features
}

pub fn synthesize_from_counts(series: &DailyCountSeries) -> Vec<DateFeatures> {
    match series.range {
        Some(range) => synthesize_range(
            range,
            DayAnchor {
                date: range.start,
                day_seq: 0,
            },
        ),
        None => Vec::new(),
    }
}

pub fn model_end_anchor(features: &[DateFeatures]) -> Option<DayAnchor> {
    features.iter().max_by_key(|f| f.date).map(|last| DayAnchor {
        date: last.date,
        day_seq: last.day_seq,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn labels_match_calendar_position() {
        let f = date_features(date(2019, 1, 1), 0);
        assert_eq!(f.day_of_week, 1);
        assert_eq!(f.month_day, "01/01");
        assert_eq!(f.month_weekday, "Jan_Tue");
        assert_eq!((f.year, f.month, f.day), (2019, 1, 1));
    }

    #[test]
    fn day_seq_continues_across_year_boundary() {
        let range = DateRange::new(date(2018, 12, 30), date(2019, 1, 2)).expect("range");
        let anchor = DayAnchor {
            date: date(2018, 12, 29),
            day_seq: 363,
        };
        let seqs: Vec<i64> = synthesize_range(range, anchor)
            .iter()
            .map(|f| f.day_seq)
            .collect();
        assert_eq!(seqs, vec![364, 365, 366, 367]);
    }

    #[test]
    fn rejects_reversed_range() {
        assert!(DateRange::new(date(2019, 1, 2), date(2019, 1, 1)).is_err());
        let single = DateRange::new(date(2019, 1, 1), date(2019, 1, 1)).expect("range");
        assert_eq!(single.day_count(), 1);
        assert_eq!(single.offset_of(date(2019, 1, 2)), None);
    }
}
