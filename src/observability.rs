//! Logging setup plus the lifecycle events a forecast run emits.

use std::env;
use std::path::Path;
use std::time::Instant;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub const LOG_LEVEL_VAR: &str = "CALLCAST_LOG_LEVEL";
pub const LOG_FORMAT_VAR: &str = "CALLCAST_LOG_FORMAT";
pub const LOG_TARGET_VAR: &str = "CALLCAST_LOG_TARGET";

impl LoggingConfig {
    // Unparseable format or target values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(level) = lookup(LOG_LEVEL_VAR).filter(|v| !v.trim().is_empty()) {
            config.level = level.trim().to_string();
        }
        if let Some(format) = lookup(LOG_FORMAT_VAR).and_then(|v| parse_log_format(&v)) {
            config.format = format;
        }
        if let Some(target) = lookup(LOG_TARGET_VAR).and_then(|v| parse_bool(&v)) {
            config.include_target = target;
        }
        config
    }
}

pub fn logging_config_from_env() -> LoggingConfig {
    LoggingConfig::from_lookup(|name| env::var(name).ok())
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(config.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_ansi(matches!(config.format, LogFormat::Pretty));

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_app_start(config: &LoggingConfig) {
    info!(
        component = "forecast_run",
        event = "app.start",
        log_level = %config.level,
        log_format = ?config.format,
        include_target = config.include_target
    );
}

pub fn log_forecast_window(start: NaiveDate, end: NaiveDate, issued_on: NaiveDate, timezone: &str) {
    info!(
        component = "forecast_run",
        event = "app.forecast_window",
        start = %start,
        end = %end,
        issued_on = %issued_on,
        timezone
    );
}

pub fn log_input_skipped(source: &str, path: &Path) {
    info!(
        component = "forecast_run",
        event = "app.input.skipped",
        source,
        path = %path.display(),
        reason = "file not found"
    );
}

pub fn log_app_finish(store_path: &Path, ratings: usize, forecast_cells: usize) {
    info!(
        component = "forecast_run",
        event = "app.finish",
        store_path = %store_path.display(),
        ratings,
        forecast_cells
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Counts,
    Training,
    Fit,
    Forecast,
    Ratings,
    Persist,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Counts => "counts",
            Self::Training => "training",
            Self::Fit => "fit",
            Self::Forecast => "forecast",
            Self::Ratings => "ratings",
            Self::Persist => "persist",
        }
    }
}

#[derive(Debug)]
pub struct StageTimer {
    stage: Stage,
    started: Instant,
}

impl StageTimer {
    pub fn start(stage: Stage) -> Self {
        info!(
            component = "pipeline",
            event = "pipeline.stage.start",
            stage = stage.as_str()
        );
        Self {
            stage,
            started: Instant::now(),
        }
    }

    pub fn finish(self, rows: usize) {
        info!(
            component = "pipeline",
            event = "pipeline.stage.finish",
            stage = self.stage.as_str(),
            rows,
            elapsed_ms = self.started.elapsed().as_millis() as u64
        );
    }
}

pub(crate) fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        _ => None,
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
