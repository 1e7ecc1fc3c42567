//! Calendar signal tables: holidays, local events and game schedules.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calendar::DateRange;

pub const LOCAL_EVENT_CATEGORY: &str = "local_event";

pub const DEFAULT_LOCAL_EVENTS: &[(&str, &[(i32, u32, u32)])] = &[
    (
        "Pride Parade",
        &[
            (2019, 6, 30),
            (2018, 6, 24),
            (2017, 6, 25),
            (2016, 6, 26),
            (2015, 6, 28),
            (2014, 6, 29),
            (2013, 6, 30),
            (2012, 6, 24),
            (2011, 6, 26),
            (2010, 6, 27),
        ],
    ),
    (
        "Seafair",
        &[
            (2019, 8, 2),
            (2019, 8, 3),
            (2019, 8, 4),
            (2018, 8, 3),
            (2018, 8, 4),
            (2018, 8, 5),
            (2017, 8, 4),
            (2017, 8, 5),
            (2017, 8, 6),
            (2016, 8, 5),
            (2016, 8, 6),
            (2016, 8, 7),
            (2015, 7, 31),
            (2015, 8, 1),
            (2015, 8, 2),
            (2014, 8, 1),
            (2014, 8, 2),
            (2014, 8, 3),
            (2013, 8, 2),
            (2013, 8, 3),
            (2013, 8, 4),
            (2012, 8, 3),
            (2012, 8, 4),
            (2012, 8, 5),
            (2011, 8, 5),
            (2011, 8, 6),
            (2011, 8, 7),
            (2010, 8, 6),
            (2010, 8, 7),
            (2010, 8, 8),
        ],
    ),
    (
        "Solstice Parade",
        &[
            (2019, 6, 30),
            (2018, 6, 16),
            (2017, 6, 17),
            (2016, 6, 18),
            (2015, 6, 20),
            (2014, 6, 21),
            (2013, 6, 22),
            (2012, 6, 16),
            (2011, 6, 18),
            (2010, 6, 19),
        ],
    ),
    ("Womens March", &[(2019, 1, 19), (2018, 1, 20), (2017, 1, 21)]),
];

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("invalid date {year}-{month}-{day} for event {event}")]
    InvalidEventDate {
        event: String,
        year: i32,
        month: u32,
        day: u32,
    },
    #[error("signal source {source_name} failed: {message}")]
    Fetch { source_name: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalEntry {
    pub date: NaiveDate,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalTable {
    pub category: String,
    pub entries: Vec<SignalEntry>,
}

impl SignalTable {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, date: NaiveDate, label: impl Into<String>) {
        self.entries.push(SignalEntry {
            date,
            label: label.into(),
        });
    }

    pub fn with_entry(mut self, date: NaiveDate, label: impl Into<String>) -> Self {
        self.push(date, label);
        self
    }

    pub fn restricted_to(&self, range: DateRange) -> SignalTable {
        SignalTable {
            category: self.category.clone(),
            entries: self
                .entries
                .iter()
                .filter(|entry| range.contains(entry.date))
                .cloned()
                .collect(),
        }
    }
}

pub fn local_event_table(
    events: &[(&str, &[(i32, u32, u32)])],
) -> Result<SignalTable, SignalError> {
    let mut table = SignalTable::new(LOCAL_EVENT_CATEGORY);
    for (name, dates) in events {
        for (year, month, day) in *dates {
            let date = NaiveDate::from_ymd_opt(*year, *month, *day).ok_or_else(|| {
                SignalError::InvalidEventDate {
                    event: (*name).to_string(),
                    year: *year,
                    month: *month,
                    day: *day,
                }
            })?;
            table.push(date, *name);
        }
    }
    Ok(table)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Venue {
    Home,
    Away,
}

impl Venue {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Away => "away",
        }
    }

    // Schedules leave the venue blank for home games; any other marker
    // (`@`, `N` for neutral sites, `away`) is a road game.
    pub fn from_marker(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("home") {
            Self::Home
        } else {
            Self::Away
        }
    }
}

const PLAYOFF_WEEKS: [&str; 3] = ["Wild Card", "Division", "Conf. Champ."];

pub fn pro_football_label(week: &str, venue: Venue) -> String {
    let week = week.trim();
    if week == "SuperBowl" {
        "SuperBowl".to_string()
    } else if PLAYOFF_WEEKS.contains(&week) {
        format!("{}_Playoffs", venue.as_str())
    } else {
        format!("{}_Regular", venue.as_str())
    }
}

pub trait SignalSource {
    fn category(&self) -> &str;
    fn fetch(&self, range: DateRange) -> Result<SignalTable, SignalError>;
}

#[derive(Debug, Clone)]
pub struct StaticSignalSource {
    table: SignalTable,
}

impl StaticSignalSource {
    pub fn new(table: SignalTable) -> Self {
        Self { table }
    }
}

impl SignalSource for StaticSignalSource {
    fn category(&self) -> &str {
        &self.table.category
    }

    fn fetch(&self, range: DateRange) -> Result<SignalTable, SignalError> {
        Ok(self.table.restricted_to(range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_local_events_are_valid_dates() {
        let table = local_event_table(DEFAULT_LOCAL_EVENTS).expect("defaults parse");
        assert_eq!(table.category, LOCAL_EVENT_CATEGORY);
        assert_eq!(table.entries.len(), 53);
        let pride_and_solstice = table
            .entries
            .iter()
            .filter(|e| e.date == NaiveDate::from_ymd_opt(2019, 6, 30).expect("date"))
            .count();
        assert_eq!(pride_and_solstice, 2);
    }

    #[test]
    fn invalid_event_date_is_reported() {
        let err = local_event_table(&[("Leap", &[(2019, 2, 29)])]).expect_err("invalid");
        assert!(matches!(err, SignalError::InvalidEventDate { day: 29, .. }));
    }

    #[test]
    fn game_labels_follow_week_and_venue() {
        assert_eq!(pro_football_label("SuperBowl", Venue::Away), "SuperBowl");
        assert_eq!(pro_football_label("Wild Card", Venue::Home), "home_Playoffs");
        assert_eq!(pro_football_label("Conf. Champ.", Venue::Away), "away_Playoffs");
        assert_eq!(pro_football_label("7", Venue::from_marker("@")), "away_Regular");
        assert_eq!(pro_football_label("7", Venue::from_marker("")), "home_Regular");
    }

    #[test]
    fn any_venue_marker_other_than_home_is_away() {
        assert_eq!(Venue::from_marker(""), Venue::Home);
        assert_eq!(Venue::from_marker(" Home "), Venue::Home);
        assert_eq!(Venue::from_marker("@"), Venue::Away);
        assert_eq!(Venue::from_marker("N"), Venue::Away);
        assert_eq!(Venue::from_marker("away"), Venue::Away);
    }
}
