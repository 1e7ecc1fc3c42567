//! Builds feature and target matrices for training and for forecasting.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::calendar::{
    model_end_anchor, synthesize_from_counts, synthesize_range, CalendarError, DateRange,
    DayAnchor,
};
use crate::counts::DailyCountSeries;
use crate::encoding::{encode_calendar, encode_signal, EncodingConfig, EncodingReport};
use crate::frame::{DateFrame, FeatureSchema, FrameError, NeighborhoodMatrix};
use crate::join::{join_sources, JoinError, JoinReport};
use crate::signals::{SignalError, SignalSource};
use crate::weather::{
    forecast_weather_frame, weather_frame, Climatology, WeatherError, WeatherSource,
};

pub type TargetMatrix = NeighborhoodMatrix;

#[derive(Debug, Error)]
pub enum ModelInputError {
    #[error("daily count series is empty; nothing to train on")]
    EmptySeries,
    #[error("no count for {neighborhood} on {date} after densification")]
    DataGap {
        date: NaiveDate,
        neighborhood: String,
    },
    #[error("no feature row for {date}")]
    FeatureGap { date: NaiveDate },
    #[error(transparent)]
    Calendar(#[from] CalendarError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Join(#[from] JoinError),
    #[error(transparent)]
    Signal(#[from] SignalError),
    #[error(transparent)]
    Weather(#[from] WeatherError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInputConfig {
    pub encoding: EncodingConfig,
    pub weather_forecast_days: u32,
}

impl Default for ModelInputConfig {
    fn default() -> Self {
        Self {
            encoding: EncodingConfig::default(),
            weather_forecast_days: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInputReport {
    pub range: DateRange,
    pub encodings: Vec<EncodingReport>,
    pub join: JoinReport,
    pub alignment: ColumnAlignment,
}

// Forecast columns the training schema does not know are dropped; schema
// columns the forecast range never produced are zero-filled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnAlignment {
    pub dropped: Vec<String>,
    pub zero_filled: Vec<String>,
}

impl ColumnAlignment {
    pub fn between(produced: &[String], schema: &FeatureSchema) -> Self {
        Self {
            dropped: produced
                .iter()
                .filter(|c| !schema.columns.contains(c))
                .cloned()
                .collect(),
            zero_filled: schema
                .columns
                .iter()
                .filter(|c| !produced.contains(c))
                .cloned()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInput {
    pub features: DateFrame,
    pub schema: FeatureSchema,
    pub report: ModelInputReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSet {
    pub input: ModelInput,
    pub targets: TargetMatrix,
    pub anchor: DayAnchor,
    pub climatology: Climatology,
}

pub fn pivot_targets(series: &DailyCountSeries) -> Result<TargetMatrix, ModelInputError> {
    let range = series.range.ok_or(ModelInputError::EmptySeries)?;
    let dates: Vec<NaiveDate> = range.iter().collect();
    let mut values = vec![vec![0.0; series.groups.len()]; dates.len()];

    for (col, group) in series.groups.iter().enumerate() {
        for (row, date) in dates.iter().enumerate() {
            let count = series
                .get(*date, group)
                .ok_or_else(|| ModelInputError::DataGap {
                    date: *date,
                    neighborhood: group.clone(),
                })?;
            values[row][col] = count as f64;
        }
    }

    Ok(TargetMatrix {
        dates,
        neighborhoods: series.groups.clone(),
        values,
    })
}

pub struct ModelInputBuilder<'a> {
    weather: &'a dyn WeatherSource,
    signals: Vec<&'a dyn SignalSource>,
    cfg: ModelInputConfig,
}

impl<'a> ModelInputBuilder<'a> {
    pub fn new(weather: &'a dyn WeatherSource, cfg: ModelInputConfig) -> Self {
        Self {
            weather,
            signals: Vec::new(),
            cfg,
        }
    }

    pub fn with_signal(mut self, source: &'a dyn SignalSource) -> Self {
        self.signals.push(source);
        self
    }

    pub fn with_signals(mut self, sources: impl IntoIterator<Item = &'a dyn SignalSource>) -> Self {
        self.signals.extend(sources);
        self
    }

    pub fn build_training(
        &self,
        series: &DailyCountSeries,
    ) -> Result<TrainingSet, ModelInputError> {
        let range = series.range.ok_or(ModelInputError::EmptySeries)?;
        info!(
            component = "model_input",
            event = "model_input.training.start",
            start = %range.start,
            end = %range.end,
            groups = series.groups.len(),
            signal_sources = self.signals.len()
        );

        let features = synthesize_from_counts(series);
        let anchor = model_end_anchor(&features).ok_or(ModelInputError::EmptySeries)?;

        let history = self.weather.history(range)?;
        let weather = weather_frame(&history)?;
        let normals_source = self.weather.climatology_history()?;
        let climatology = Climatology::from_history(&normals_source);
        info!(
            component = "model_input",
            event = "model_input.climatology.built",
            observations = normals_source.len(),
            training_observations = history.len()
        );

        let (frame, report) = self.assemble(range, &features, weather)?;
        let targets = pivot_targets(series)?;
        for date in &targets.dates {
            if !frame.contains_date(*date) {
                return Err(ModelInputError::FeatureGap { date: *date });
            }
        }

        let schema = frame.schema();
        info!(
            component = "model_input",
            event = "model_input.training.finish",
            rows = frame.len(),
            columns = schema.columns.len(),
            fingerprint = %schema.fingerprint,
            anchor_date = %anchor.date,
            anchor_day_seq = anchor.day_seq
        );

        Ok(TrainingSet {
            input: ModelInput {
                features: frame,
                schema,
                report,
            },
            targets,
            anchor,
            climatology,
        })
    }

    pub fn build_forecast(
        &self,
        range: DateRange,
        anchor: DayAnchor,
        issued_on: NaiveDate,
        climatology: &Climatology,
        schema: &FeatureSchema,
    ) -> Result<ModelInput, ModelInputError> {
        info!(
            component = "model_input",
            event = "model_input.forecast.start",
            start = %range.start,
            end = %range.end,
            anchor_date = %anchor.date,
            anchor_day_seq = anchor.day_seq,
            issued_on = %issued_on
        );

        if climatology.is_empty() {
            warn!(
                component = "model_input",
                event = "model_input.forecast.empty_climatology"
            );
        }

        let features = synthesize_range(range, anchor);
        let forecast = self.weather.forecast(range)?;
        let weather = forecast_weather_frame(
            range,
            climatology,
            &forecast,
            issued_on,
            self.cfg.weather_forecast_days,
        )?;

        let (frame, mut report) = self.assemble(range, &features, weather)?;
        report.alignment = ColumnAlignment::between(frame.columns(), schema);
        if !report.alignment.dropped.is_empty() {
            warn!(
                component = "model_input",
                event = "model_input.forecast.columns_dropped",
                columns = ?report.alignment.dropped
            );
        }
        let aligned = frame.align_to(schema);

        info!(
            component = "model_input",
            event = "model_input.forecast.finish",
            rows = aligned.len(),
            dropped_columns = report.alignment.dropped.len(),
            zero_filled_columns = report.alignment.zero_filled.len()
        );

        Ok(ModelInput {
            schema: aligned.schema(),
            features: aligned,
            report,
        })
    }

    fn assemble(
        &self,
        range: DateRange,
        features: &[crate::calendar::DateFeatures],
        weather: DateFrame,
    ) -> Result<(DateFrame, ModelInputReport), ModelInputError> {
        let (calendar, calendar_report) = encode_calendar(features, &self.cfg.encoding);
        let mut encodings = vec![calendar_report];

        let mut encoded = Vec::with_capacity(self.signals.len());
        for source in &self.signals {
            let table = source.fetch(range)?;
            let (frame, report) = encode_signal(&table);
            encodings.push(report);
            encoded.push(frame);
        }

        let mut auxiliaries: Vec<&DateFrame> = Vec::with_capacity(encoded.len() + 1);
        auxiliaries.push(&weather);
        auxiliaries.extend(encoded.iter());

        let (joined, join) = join_sources(&calendar, &auxiliaries)?;
        Ok((
            joined,
            ModelInputReport {
                range,
                encodings,
                join,
                alignment: ColumnAlignment::default(),
            },
        ))
    }
}
