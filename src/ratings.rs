//! Per-neighborhood ratings: how a predicted count compares with the
//! neighborhood's usual volume.
//!
//! `rating = 0.5 + (mean - predicted) / (2 * std)`. Calmer than usual rates
//! above 0.5, busier below. A neighborhood without usable spread rates 0.5.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::frame::NeighborhoodMatrix;

pub const NEUTRAL_RATING: f64 = 0.5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RatingError {
    #[error("no reference statistics for neighborhood {neighborhood}")]
    MissingStats { neighborhood: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborhoodStats {
    pub neighborhood: String,
    pub mean: f64,
    // Sample standard deviation; 0 when fewer than two observations.
    pub std: f64,
    pub count: usize,
}

pub fn neighborhood_stats(matrix: &NeighborhoodMatrix) -> Vec<NeighborhoodStats> {
    matrix
        .neighborhoods
        .iter()
        .enumerate()
        .map(|(idx, neighborhood)| {
            let column = matrix.column(idx);
            let count = column.len();
            let mean = if count == 0 {
                0.0
            } else {
                column.iter().sum::<f64>() / count as f64
            };
            let std = if count < 2 {
                0.0
            } else {
                let ss: f64 = column.iter().map(|v| (v - mean).powi(2)).sum();
                (ss / (count - 1) as f64).sqrt()
            };
            NeighborhoodStats {
                neighborhood: neighborhood.clone(),
                mean,
                std,
                count,
            }
        })
        .collect()
}

pub fn is_degenerate(std: f64) -> bool {
    !std.is_finite() || std == 0.0
}

pub fn rating(mean: f64, std: f64, predicted: f64) -> f64 {
    if is_degenerate(std) {
        return NEUTRAL_RATING;
    }
    NEUTRAL_RATING + (mean - predicted) / (2.0 * std)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingConfig {
    pub clamp_to_unit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingEntry {
    pub date: NaiveDate,
    pub neighborhood: String,
    pub rating: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingTable {
    entries: Vec<RatingEntry>,
}

impl RatingTable {
    pub fn from_entries(mut entries: Vec<RatingEntry>) -> Self {
        entries.sort_by(|a, b| {
            a.date
                .cmp(&b.date)
                .then_with(|| a.neighborhood.cmp(&b.neighborhood))
        });
        entries.dedup_by(|b, a| a.date == b.date && a.neighborhood == b.neighborhood);
        Self { entries }
    }

    pub fn entries(&self) -> &[RatingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, date: NaiveDate, neighborhood: &str) -> Option<f64> {
        self.entries
            .binary_search_by(|entry| {
                entry
                    .date
                    .cmp(&date)
                    .then_with(|| entry.neighborhood.as_str().cmp(neighborhood))
            })
            .ok()
            .map(|idx| self.entries[idx].rating)
    }

    pub fn lookup(&self, date: NaiveDate, neighborhood: &str) -> f64 {
        match self.get(date, neighborhood) {
            Some(value) if value.is_finite() => value,
            _ => {
                debug!(
                    component = "ratings",
                    event = "ratings.lookup.default",
                    date = %date,
                    neighborhood
                );
                NEUTRAL_RATING
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingReport {
    pub entries: usize,
    pub degenerate_neighborhoods: Vec<String>,
    pub clamped: usize,
}

pub fn rate_neighborhoods(
    predicted: &NeighborhoodMatrix,
    stats: &[NeighborhoodStats],
    cfg: &RatingConfig,
) -> Result<(RatingTable, RatingReport), RatingError> {
    let mut per_column = Vec::with_capacity(predicted.neighborhoods.len());
    for neighborhood in &predicted.neighborhoods {
        let found = stats
            .iter()
            .find(|s| &s.neighborhood == neighborhood)
            .ok_or_else(|| RatingError::MissingStats {
                neighborhood: neighborhood.clone(),
            })?;
        per_column.push(found);
    }

    let degenerate_neighborhoods: Vec<String> = per_column
        .iter()
        .filter(|s| is_degenerate(s.std))
        .map(|s| s.neighborhood.clone())
        .collect();
    for neighborhood in &degenerate_neighborhoods {
        warn!(
            component = "ratings",
            event = "ratings.degenerate_variance",
            neighborhood = neighborhood.as_str()
        );
    }

    let mut clamped = 0usize;
    let mut entries = Vec::with_capacity(predicted.dates.len() * per_column.len());
    for (row, date) in predicted.dates.iter().enumerate() {
        for (col, s) in per_column.iter().enumerate() {
            let mut value = rating(s.mean, s.std, predicted.values[row][col]);
            if cfg.clamp_to_unit && !(0.0..=1.0).contains(&value) {
                value = value.clamp(0.0, 1.0);
                clamped += 1;
            }
            entries.push(RatingEntry {
                date: *date,
                neighborhood: s.neighborhood.clone(),
                rating: value,
            });
        }
    }

    let table = RatingTable::from_entries(entries);
    let report = RatingReport {
        entries: table.len(),
        degenerate_neighborhoods,
        clamped,
    };

    info!(
        component = "ratings",
        event = "ratings.finish",
        entries = report.entries,
        degenerate = report.degenerate_neighborhoods.len(),
        clamped = report.clamped,
        clamp_to_unit = cfg.clamp_to_unit
    );

    Ok((table, report))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedVsAverage {
    pub neighborhood: String,
    pub predicted: f64,
    pub average: f64,
}

pub fn predicted_vs_average(
    predicted: &NeighborhoodMatrix,
    stats: &[NeighborhoodStats],
    date: NaiveDate,
) -> Vec<PredictedVsAverage> {
    let Some(row) = predicted.date_index(date) else {
        return Vec::new();
    };
    predicted
        .neighborhoods
        .iter()
        .enumerate()
        .filter_map(|(col, neighborhood)| {
            let s = stats.iter().find(|s| &s.neighborhood == neighborhood)?;
            Some(PredictedVsAverage {
                neighborhood: neighborhood.clone(),
                predicted: round2(predicted.values[row][col]),
                average: round2(s.mean),
            })
        })
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
