//! End-to-end batch run: counts, model inputs, ensemble forecast, ratings.
//!
//! Errors abort the run. Localized degenerate cases are recovered in place
//! and surfaced as [`DataQualityNote`]s on the output.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::calendar::{CalendarError, DateRange, DayAnchor};
use crate::config::{ConfigError, PipelineConfig, RatingReference};
use crate::counts::{count_calls, CallEvent, CountGrouping, CountReport};
use crate::ensemble::{
    score_forecast, BaselineForecaster, EnsembleFitReport, EnsembleForecast, EnsembleForecaster,
    ForecastError, ForecastScore,
};
use crate::frame::FeatureSchema;
use crate::model_input::{ModelInputBuilder, ModelInputError, TrainingSet};
use crate::observability::{Stage, StageTimer};
use crate::ratings::{
    neighborhood_stats, rate_neighborhoods, NeighborhoodStats, RatingError, RatingTable,
};
use crate::signals::SignalSource;
use crate::sources::SourceError;
use crate::store::{ForecastStore, StoreError};
use crate::weather::WeatherSource;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("event log has no usable events")]
    EmptyEventLog,
    #[error(transparent)]
    Calendar(#[from] CalendarError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    ModelInput(#[from] ModelInputError),
    #[error(transparent)]
    Forecast(#[from] ForecastError),
    #[error(transparent)]
    Rating(#[from] RatingError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    // True when the input data itself is defective (gaps, unreadable or
    // empty sources) rather than the run's configuration or environment.
    pub fn is_upstream_defect(&self) -> bool {
        match self {
            Self::EmptyEventLog | Self::Source(_) => true,
            Self::ModelInput(err) => matches!(
                err,
                ModelInputError::EmptySeries
                    | ModelInputError::DataGap { .. }
                    | ModelInputError::FeatureGap { .. }
                    | ModelInputError::Signal(_)
                    | ModelInputError::Weather(_)
            ),
            Self::Forecast(err) => matches!(
                err,
                ForecastError::NoNeighborhoods
                    | ForecastError::NoShareTrainingRows
                    | ForecastError::FeatureRows { .. }
            ),
            Self::Rating(_) => true,
            Self::Calendar(_) | Self::Config(_) | Self::Store(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataQualityNote {
    SkippedEvents { count: u64 },
    DuplicateSignalRows { source: String, dates: Vec<NaiveDate> },
    DegenerateVariance { neighborhoods: Vec<String> },
    ShareNormalizationFailure {
        excluded_training_dates: Vec<NaiveDate>,
        uniform_forecast_dates: Vec<NaiveDate>,
    },
    UnknownCategoryLookup { date: NaiveDate, neighborhood: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub range: DateRange,
    pub issued_on: NaiveDate,
}

impl ForecastRequest {
    pub fn from_config(cfg: &PipelineConfig, issued_on: NaiveDate) -> Result<Self, PipelineError> {
        Ok(Self {
            range: cfg.forecast_range(issued_on)?,
            issued_on,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub training_range: DateRange,
    pub anchor: DayAnchor,
    pub schema: FeatureSchema,
    pub count_report: CountReport,
    pub fit_report: EnsembleFitReport,
    pub forecast: EnsembleForecast,
    pub stats: Vec<NeighborhoodStats>,
    pub ratings: RatingTable,
    pub notes: Vec<DataQualityNote>,
}

impl PipelineOutput {
    pub fn ratings_for_map(
        &self,
        date: NaiveDate,
        neighborhoods: &[String],
    ) -> (Vec<(String, f64)>, Vec<DataQualityNote>) {
        let mut notes = Vec::new();
        let values = neighborhoods
            .iter()
            .map(|name| {
                let value = self.ratings.get(date, name).filter(|v| v.is_finite());
                if value.is_none() {
                    notes.push(DataQualityNote::UnknownCategoryLookup {
                        date,
                        neighborhood: name.clone(),
                    });
                }
                (name.clone(), self.ratings.lookup(date, name))
            })
            .collect();
        (values, notes)
    }
}

pub struct PipelineInputs<'a> {
    pub events: &'a [CallEvent],
    pub weather: &'a dyn WeatherSource,
    pub signals: Vec<&'a dyn SignalSource>,
}

pub fn run_pipeline(
    inputs: &PipelineInputs<'_>,
    request: &ForecastRequest,
    cfg: &PipelineConfig,
) -> Result<PipelineOutput, PipelineError> {
    info!(
        component = "pipeline",
        event = "pipeline.run.start",
        events = inputs.events.len(),
        signal_sources = inputs.signals.len(),
        forecast_start = %request.range.start,
        forecast_end = %request.range.end
    );

    let mut notes = Vec::new();
    let timer = StageTimer::start(Stage::Counts);
    let (series, count_report) = count_calls(inputs.events, CountGrouping::Neighborhood);
    timer.finish(series.rows.len());
    if count_report.skipped_events > 0 {
        notes.push(DataQualityNote::SkippedEvents {
            count: count_report.skipped_events,
        });
    }
    let Some(training_range) = series.range else {
        warn!(
            component = "pipeline",
            event = "pipeline.run.empty_event_log",
            events = inputs.events.len()
        );
        return Err(PipelineError::EmptyEventLog);
    };

    let builder = ModelInputBuilder::new(inputs.weather, cfg.model_input.clone())
        .with_signals(inputs.signals.iter().copied());
    let timer = StageTimer::start(Stage::Training);
    let training = builder.build_training(&series)?;
    timer.finish(training.input.features.len());
    collect_duplicate_notes(&training, &mut notes);

    let timer = StageTimer::start(Stage::Fit);
    let forecaster = EnsembleForecaster::new(cfg.ridge, cfg.knn);
    let trained = forecaster.fit(&training)?;
    timer.finish(trained.report().training_rows);

    let timer = StageTimer::start(Stage::Forecast);
    let forecast_input = builder.build_forecast(
        request.range,
        training.anchor,
        request.issued_on,
        &training.climatology,
        &training.input.schema,
    )?;
    let forecast = trained.predict(&forecast_input)?;
    timer.finish(forecast.dates.len());

    let fit_report = trained.report().clone();
    if !fit_report.excluded_dates.is_empty() || !forecast.uniform_share_dates.is_empty() {
        notes.push(DataQualityNote::ShareNormalizationFailure {
            excluded_training_dates: fit_report.excluded_dates.clone(),
            uniform_forecast_dates: forecast.uniform_share_dates.clone(),
        });
    }

    let timer = StageTimer::start(Stage::Ratings);
    let stats = match cfg.rating_reference {
        RatingReference::History => neighborhood_stats(&training.targets),
        RatingReference::ForecastWindow => neighborhood_stats(&forecast.counts),
    };
    let (ratings, rating_report) = rate_neighborhoods(&forecast.counts, &stats, &cfg.rating)?;
    timer.finish(ratings.len());
    if !rating_report.degenerate_neighborhoods.is_empty() {
        notes.push(DataQualityNote::DegenerateVariance {
            neighborhoods: rating_report.degenerate_neighborhoods,
        });
    }

    info!(
        component = "pipeline",
        event = "pipeline.run.finish",
        training_start = %training_range.start,
        training_end = %training_range.end,
        forecast_rows = forecast.dates.len(),
        neighborhoods = forecast.neighborhoods.len(),
        ratings = ratings.len(),
        notes = notes.len()
    );

    Ok(PipelineOutput {
        training_range,
        anchor: training.anchor,
        schema: training.input.schema,
        count_report,
        fit_report,
        forecast,
        stats,
        ratings,
        notes,
    })
}

fn collect_duplicate_notes(training: &TrainingSet, notes: &mut Vec<DataQualityNote>) {
    for report in &training.input.report.encodings {
        if !report.duplicate_dates.is_empty() {
            notes.push(DataQualityNote::DuplicateSignalRows {
                source: report.source.clone(),
                dates: report.duplicate_dates.clone(),
            });
        }
    }
}

pub fn persist_output(
    store: &mut ForecastStore,
    output: &PipelineOutput,
) -> Result<usize, PipelineError> {
    let timer = StageTimer::start(Stage::Persist);
    store.upsert_city_forecast(&output.forecast.dates, &output.forecast.aggregate)?;
    let cells = store.upsert_neighborhood_forecast(&output.forecast.counts)?;
    store.upsert_ratings(&output.ratings)?;
    store.save_schema(&output.schema)?;
    timer.finish(cells);
    Ok(cells)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelComparison {
    pub ensemble: ForecastScore,
    pub baseline: ForecastScore,
}

pub fn compare_models(
    training: &TrainingSet,
    cfg: &PipelineConfig,
) -> Result<ModelComparison, PipelineError> {
    let ensemble = EnsembleForecaster::new(cfg.ridge, cfg.knn)
        .fit(training)?
        .predict(&training.input)?;
    let baseline = BaselineForecaster::new(cfg.ridge)
        .fit(training)?
        .predict(&training.input)?;

    let comparison = ModelComparison {
        ensemble: score_forecast(&ensemble.counts, &training.targets)?,
        baseline: score_forecast(&baseline, &training.targets)?,
    };

    info!(
        component = "pipeline",
        event = "pipeline.compare",
        ensemble_rmse = comparison.ensemble.rmse,
        baseline_rmse = comparison.baseline.rmse
    );
    Ok(comparison)
}
