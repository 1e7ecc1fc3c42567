//! Raw call events to dense daily counts.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::calendar::DateRange;

pub const CITY_GROUP: &str = "city";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallEvent {
    pub timestamp: NaiveDateTime,
    pub neighborhood: String,
    pub event_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountGrouping {
    City,
    Neighborhood,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub group: String,
    pub num_calls: u64,
}

// Rows are ordered by group, then date. Every group covers every date of
// `range` exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCountSeries {
    pub grouping: CountGrouping,
    pub range: Option<DateRange>,
    pub groups: Vec<String>,
    pub rows: Vec<DailyCount>,
}

impl DailyCountSeries {
    pub fn empty(grouping: CountGrouping) -> Self {
        Self {
            grouping,
            range: None,
            groups: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn group_rows(&self, group: &str) -> impl Iterator<Item = &DailyCount> + '_ {
        let group = group.to_string();
        self.rows.iter().filter(move |row| row.group == group)
    }

    pub fn get(&self, date: NaiveDate, group: &str) -> Option<u64> {
        let range = self.range?;
        let group_idx = self.groups.iter().position(|g| g == group)?;
        let day_idx = range.offset_of(date)?;
        self.rows
            .get(group_idx * range.day_count() + day_idx)
            .filter(|row| row.date == date && row.group == group)
            .map(|row| row.num_calls)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountReport {
    pub input_events: u64,
    pub skipped_events: u64,
    pub observed_rows: u64,
    pub zero_filled_rows: u64,
    pub output_rows: u64,
}

pub fn count_calls(
    events: &[CallEvent],
    grouping: CountGrouping,
) -> (DailyCountSeries, CountReport) {
    let mut observed: BTreeMap<(String, NaiveDate), u64> = BTreeMap::new();
    let mut skipped_events = 0u64;

    for event in events {
        let group = match grouping {
            CountGrouping::City => CITY_GROUP.to_string(),
            CountGrouping::Neighborhood => {
                let trimmed = event.neighborhood.trim();
                if trimmed.is_empty() {
                    skipped_events += 1;
                    continue;
                }
                trimmed.to_string()
            }
        };
        *observed
            .entry((group, event.timestamp.date()))
            .or_insert(0) += 1;
    }

    if skipped_events > 0 {
        warn!(
            component = "counts",
            event = "counts.aggregate.skipped_events",
            skipped_events,
            reason = "missing_neighborhood"
        );
    }

    let mut report = CountReport {
        input_events: events.len() as u64,
        skipped_events,
        observed_rows: observed.len() as u64,
        zero_filled_rows: 0,
        output_rows: 0,
    };

    let Some(range) = observed_range(&observed) else {
        warn!(
            component = "counts",
            event = "counts.aggregate.empty",
            input_events = report.input_events,
            grouping = ?grouping
        );
        return (DailyCountSeries::empty(grouping), report);
    };

    let groups: Vec<String> = observed
        .keys()
        .map(|(group, _)| group.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut rows = Vec::with_capacity(groups.len() * range.day_count());
    for group in &groups {
        for date in range.iter() {
            let num_calls = match observed.get(&(group.clone(), date)) {
                Some(count) => *count,
                None => {
                    report.zero_filled_rows += 1;
                    0
                }
            };
            rows.push(DailyCount {
                date,
                group: group.clone(),
                num_calls,
            });
        }
    }
    report.output_rows = rows.len() as u64;

    info!(
        component = "counts",
        event = "counts.aggregate.finish",
        grouping = ?grouping,
        start = %range.start,
        end = %range.end,
        groups = groups.len(),
        input_events = report.input_events,
        zero_filled_rows = report.zero_filled_rows,
        output_rows = report.output_rows
    );

    (
        DailyCountSeries {
            grouping,
            range: Some(range),
            groups,
            rows,
        },
        report,
    )
}

fn observed_range(observed: &BTreeMap<(String, NaiveDate), u64>) -> Option<DateRange> {
    let min = observed.keys().map(|(_, date)| *date).min()?;
    let max = observed.keys().map(|(_, date)| *date).max()?;
    DateRange::new(min, max).ok()
}
