//! Pipeline configuration, read from `CALLCAST_*` environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Days, NaiveDate, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::calendar::{CalendarError, DateRange};
use crate::model_input::ModelInputConfig;
use crate::models::{KnnRegressor, RidgeRegressor};
use crate::observability::parse_bool;
use crate::ratings::RatingConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}={value}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingReference {
    History,
    ForecastWindow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub store_path: PathBuf,
    pub forecast_days: u32,
    pub timezone: Tz,
    pub model_input: ModelInputConfig,
    pub ridge: RidgeRegressor,
    pub knn: KnnRegressor,
    pub rating: RatingConfig,
    pub rating_reference: RatingReference,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            store_path: PathBuf::from("data/callcast.sqlite"),
            forecast_days: 7,
            timezone: chrono_tz::America::Los_Angeles,
            model_input: ModelInputConfig::default(),
            ridge: RidgeRegressor::default(),
            knn: KnnRegressor::default(),
            rating: RatingConfig::default(),
            rating_reference: RatingReference::History,
        }
    }
}

impl PipelineConfig {
    pub fn issue_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.timezone).date_naive()
    }

    pub fn forecast_range(&self, issued_on: NaiveDate) -> Result<DateRange, CalendarError> {
        let span = u64::from(self.forecast_days.saturating_sub(1));
        let end = issued_on
            .checked_add_days(Days::new(span))
            .unwrap_or(NaiveDate::MAX);
        DateRange::new(issued_on, end)
    }
}

pub fn pipeline_config_from_env() -> Result<PipelineConfig, ConfigError> {
    pipeline_config_from_lookup(&|name| env::var(name).ok())
}

type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

pub fn pipeline_config_from_lookup(lookup: Lookup<'_>) -> Result<PipelineConfig, ConfigError> {
    let mut config = PipelineConfig::default();

    if let Some(dir) = non_empty_var(lookup, "CALLCAST_DATA_DIR") {
        config.store_path = PathBuf::from(&dir).join("callcast.sqlite");
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(path) = non_empty_var(lookup, "CALLCAST_STORE_PATH") {
        config.store_path = PathBuf::from(path);
    }

    if let Some(days) = parse_var::<u32>(lookup, "CALLCAST_FORECAST_DAYS")? {
        if days == 0 {
            return Err(invalid("CALLCAST_FORECAST_DAYS", "0", "must be at least 1"));
        }
        config.forecast_days = days;
    }

    if let Some(raw) = non_empty_var(lookup, "CALLCAST_TIMEZONE") {
        config.timezone = raw
            .parse::<Tz>()
            .map_err(|_| invalid("CALLCAST_TIMEZONE", &raw, "unknown IANA timezone"))?;
    }

    if let Some(days) = parse_var::<u32>(lookup, "CALLCAST_WEATHER_FORECAST_DAYS")? {
        config.model_input.weather_forecast_days = days;
    }

    if let Some(alpha) = parse_var::<f64>(lookup, "CALLCAST_RIDGE_ALPHA")? {
        if !alpha.is_finite() || alpha <= 0.0 {
            return Err(invalid(
                "CALLCAST_RIDGE_ALPHA",
                &alpha.to_string(),
                "must be finite and positive",
            ));
        }
        config.ridge.alpha = alpha;
    }

    if let Some(k) = parse_var::<usize>(lookup, "CALLCAST_KNN_K")? {
        if k == 0 {
            return Err(invalid("CALLCAST_KNN_K", "0", "must be at least 1"));
        }
        config.knn.k = k;
    }

    if let Some(raw) = non_empty_var(lookup, "CALLCAST_CLAMP_RATINGS") {
        config.rating.clamp_to_unit = parse_bool(&raw)
            .ok_or_else(|| invalid("CALLCAST_CLAMP_RATINGS", &raw, "expected a boolean"))?;
    }

    if let Some(raw) = non_empty_var(lookup, "CALLCAST_RATING_REFERENCE") {
        config.rating_reference = match raw.trim().to_ascii_lowercase().as_str() {
            "history" => RatingReference::History,
            "forecast" => RatingReference::ForecastWindow,
            _ => {
                return Err(invalid(
                    "CALLCAST_RATING_REFERENCE",
                    &raw,
                    "expected history or forecast",
                ))
            }
        };
    }

    Ok(config)
}

fn non_empty_var(lookup: Lookup<'_>, name: &str) -> Option<String> {
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(
    lookup: Lookup<'_>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match non_empty_var(lookup, name) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| invalid(name, &raw, "not a valid number")),
        None => Ok(None),
    }
}

fn invalid(var: &'static str, value: &str, reason: &'static str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason,
    }
}
