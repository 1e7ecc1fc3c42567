//! Weather history, climatological normals and short-range forecasts.

use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::calendar::DateRange;
use crate::frame::{DateFrame, FrameError};

pub const WEATHER_COLUMNS: [&str; 5] = ["temp_max", "precip", "snow", "precip^2", "snow^2"];

pub const WET_DAY_CHANCE_PCT: f64 = 30.0;

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("weather source failed: {0}")]
    Fetch(String),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub date: NaiveDate,
    pub temp_max: f64,
    pub precip: f64,
    pub snow: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherForecastDay {
    pub date: NaiveDate,
    pub temp_max: Option<f64>,
    pub precip: Option<f64>,
    pub snow: Option<f64>,
}

impl WeatherForecastDay {
    pub fn from_precip_chance(date: NaiveDate, temp_max: f64, chance_pct: f64) -> Self {
        Self {
            date,
            temp_max: Some(temp_max),
            precip: Some(if chance_pct >= WET_DAY_CHANCE_PCT { 1.0 } else { 0.0 }),
            snow: None,
        }
    }
}

pub trait WeatherSource {
    fn history(&self, range: DateRange) -> Result<Vec<WeatherObservation>, WeatherError>;
    // Every observation the source holds, regardless of the call-log window.
    // Normals for forecast dates come from here.
    fn climatology_history(&self) -> Result<Vec<WeatherObservation>, WeatherError>;
    fn forecast(&self, range: DateRange) -> Result<Vec<WeatherForecastDay>, WeatherError>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticWeatherSource {
    pub history: Vec<WeatherObservation>,
    pub forecast: Vec<WeatherForecastDay>,
}

impl WeatherSource for StaticWeatherSource {
    fn history(&self, range: DateRange) -> Result<Vec<WeatherObservation>, WeatherError> {
        Ok(self
            .history
            .iter()
            .filter(|row| range.contains(row.date))
            .copied()
            .collect())
    }

    fn climatology_history(&self) -> Result<Vec<WeatherObservation>, WeatherError> {
        Ok(self.history.clone())
    }

    fn forecast(&self, range: DateRange) -> Result<Vec<WeatherForecastDay>, WeatherError> {
        Ok(self
            .forecast
            .iter()
            .filter(|row| range.contains(row.date))
            .copied()
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherNormals {
    pub temp_max: f64,
    pub precip: f64,
    pub snow: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Climatology {
    by_month_day: BTreeMap<String, WeatherNormals>,
}

impl Climatology {
    // Missing (non-finite) readings are left out of their field's average; a
    // field never observed on a day averages to 0.
    pub fn from_history(rows: &[WeatherObservation]) -> Self {
        let mut sums: BTreeMap<String, [(f64, f64); 3]> = BTreeMap::new();
        for row in rows {
            let entry = sums
                .entry(row.date.format("%m/%d").to_string())
                .or_insert([(0.0, 0.0); 3]);
            for (slot, value) in entry.iter_mut().zip([row.temp_max, row.precip, row.snow]) {
                if value.is_finite() {
                    slot.0 += value;
                    slot.1 += 1.0;
                }
            }
        }

        let mean = |(sum, n): (f64, f64)| if n > 0.0 { sum / n } else { 0.0 };
        let by_month_day = sums
            .into_iter()
            .map(|(key, [temp_max, precip, snow])| {
                (
                    key,
                    WeatherNormals {
                        temp_max: mean(temp_max),
                        precip: mean(precip),
                        snow: mean(snow),
                    },
                )
            })
            .collect();

        Self { by_month_day }
    }

    pub fn is_empty(&self) -> bool {
        self.by_month_day.is_empty()
    }

    // Leap days borrow Feb 28 when the history has no Feb 29.
    pub fn normals_for(&self, date: NaiveDate) -> Option<WeatherNormals> {
        let key = date.format("%m/%d").to_string();
        self.by_month_day
            .get(&key)
            .or_else(|| {
                if key == "02/29" {
                    self.by_month_day.get("02/28")
                } else {
                    None
                }
            })
            .copied()
    }
}

fn weather_columns() -> Vec<String> {
    WEATHER_COLUMNS.iter().map(|c| (*c).to_string()).collect()
}

fn weather_values(temp_max: f64, precip: f64, snow: f64) -> Vec<f64> {
    vec![temp_max, precip, snow, precip * precip, snow * snow]
}

pub fn weather_frame(rows: &[WeatherObservation]) -> Result<DateFrame, WeatherError> {
    let mut frame = empty_weather_frame();
    let mut duplicates = 0usize;
    for row in rows {
        let inserted =
            frame.insert_row(row.date, weather_values(row.temp_max, row.precip, row.snow))?;
        if !inserted {
            duplicates += 1;
        }
    }

    if duplicates > 0 {
        warn!(
            component = "weather",
            event = "weather.history.duplicate_dates",
            duplicates
        );
    }

    Ok(frame)
}

// Weather for a forecast horizon: climatological normals everywhere, replaced
// by the short-range forecast for dates in
// `[issued_on, issued_on + forecast_days)`. Dates with neither are left out
// and zero-filled by the joiner.
pub fn forecast_weather_frame(
    range: DateRange,
    climatology: &Climatology,
    forecast: &[WeatherForecastDay],
    issued_on: NaiveDate,
    forecast_days: u32,
) -> Result<DateFrame, WeatherError> {
    let horizon_end = issued_on
        .checked_add_days(Days::new(u64::from(forecast_days)))
        .unwrap_or(NaiveDate::MAX);
    let by_date: BTreeMap<NaiveDate, &WeatherForecastDay> =
        forecast.iter().rev().map(|day| (day.date, day)).collect();

    let mut frame = empty_weather_frame();
    let mut forecast_rows = 0usize;
    let mut missing_rows = 0usize;

    for date in range.iter() {
        let normals = climatology.normals_for(date);
        let near_term = if date >= issued_on && date < horizon_end {
            by_date.get(&date).copied()
        } else {
            None
        };

        let values = match (normals, near_term) {
            (normals, Some(day)) => {
                forecast_rows += 1;
                let base = normals.unwrap_or(WeatherNormals {
                    temp_max: 0.0,
                    precip: 0.0,
                    snow: 0.0,
                });
                weather_values(
                    day.temp_max.unwrap_or(base.temp_max),
                    day.precip.unwrap_or(base.precip),
                    day.snow.unwrap_or(base.snow),
                )
            }
            (Some(base), None) => weather_values(base.temp_max, base.precip, base.snow),
            (None, None) => {
                missing_rows += 1;
                continue;
            }
        };
        frame.insert_row(date, values)?;
    }

    if missing_rows > 0 {
        warn!(
            component = "weather",
            event = "weather.forecast.missing_normals",
            missing_rows
        );
    }

    info!(
        component = "weather",
        event = "weather.forecast.built",
        start = %range.start,
        end = %range.end,
        issued_on = %issued_on,
        forecast_rows,
        climatology_rows = frame.len() - forecast_rows
    );

    Ok(frame)
}

fn empty_weather_frame() -> DateFrame {
    DateFrame::from_parts(weather_columns(), BTreeMap::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn obs(date: NaiveDate, temp_max: f64, precip: f64, snow: f64) -> WeatherObservation {
        WeatherObservation {
            date,
            temp_max,
            precip,
            snow,
        }
    }

    #[test]
    fn history_frame_derives_squares_and_keeps_first_duplicate() {
        let frame = weather_frame(&[
            obs(date(2019, 1, 1), 50.0, 0.5, 2.0),
            obs(date(2019, 1, 1), 99.0, 9.0, 9.0),
        ])
        .expect("frame");
        assert_eq!(frame.len(), 1);
        assert_eq!(
            frame.row(date(2019, 1, 1)),
            Some(&[50.0, 0.5, 2.0, 0.25, 4.0][..])
        );
    }

    #[test]
    fn near_term_forecast_overrides_climatology() {
        let climatology = Climatology::from_history(&[
            obs(date(2017, 3, 1), 50.0, 0.2, 0.0),
            obs(date(2018, 3, 1), 54.0, 0.4, 0.0),
            obs(date(2018, 3, 2), 60.0, 0.0, 0.0),
        ]);
        let range = DateRange::new(date(2019, 3, 1), date(2019, 3, 2)).expect("range");
        let forecast = [
            WeatherForecastDay::from_precip_chance(date(2019, 3, 1), 41.0, 80.0),
            WeatherForecastDay::from_precip_chance(date(2019, 3, 2), 70.0, 10.0),
        ];

        let frame = forecast_weather_frame(range, &climatology, &forecast, date(2019, 3, 1), 1)
            .expect("frame");

        assert_eq!(frame.value(date(2019, 3, 1), "temp_max"), Some(41.0));
        assert_eq!(frame.value(date(2019, 3, 1), "precip"), Some(1.0));
        // outside the one-day horizon: climatology only
        assert_eq!(frame.value(date(2019, 3, 2), "temp_max"), Some(60.0));
        let normals = climatology.normals_for(date(2020, 3, 1)).expect("normals");
        assert!((normals.temp_max - 52.0).abs() < 1e-12);
        assert!((normals.precip - 0.3).abs() < 1e-12);
    }

    #[test]
    fn leap_day_falls_back_to_feb_28() {
        let climatology = Climatology::from_history(&[obs(date(2019, 2, 28), 45.0, 0.0, 1.0)]);
        let normals = climatology.normals_for(date(2020, 2, 29)).expect("fallback");
        assert_eq!(normals.snow, 1.0);
    }
}
