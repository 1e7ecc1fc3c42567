//! Two-stage forecaster: city-wide volume times per-neighborhood share.
//!
//! The aggregate role regresses the row sum of the target matrix. The
//! distribution role regresses each date's share vector; dates whose total is
//! zero have no defined share and are left out of its training set. A
//! single-stage baseline and a scorer are kept for comparison runs.

use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::frame::{assert_schema_compatible, FeatureSchema, FrameError, NeighborhoodMatrix};
use crate::model_input::{ModelInput, TrainingSet};
use crate::models::{ModelError, Regressor, TrainedModel};

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("training set has no neighborhoods")]
    NoNeighborhoods,
    #[error("feature matrix has {features} rows for {dates} target dates")]
    FeatureRows { features: usize, dates: usize },
    #[error("every training date has a zero total; the distribution model has nothing to learn")]
    NoShareTrainingRows,
    #[error("{aggregate} aggregate values for {shares} share rows")]
    LengthMismatch { aggregate: usize, shares: usize },
    #[error("forecast and actuals share no date/neighborhood cells")]
    NoOverlap,
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Schema(#[from] FrameError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleFitReport {
    pub training_rows: usize,
    pub share_rows: usize,
    pub excluded_dates: Vec<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct EnsembleForecaster<A, D> {
    pub aggregate: A,
    pub distribution: D,
}

#[derive(Debug, Clone)]
pub struct TrainedEnsemble<AM, DM> {
    aggregate: AM,
    distribution: DM,
    schema: FeatureSchema,
    neighborhoods: Vec<String>,
    report: EnsembleFitReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleForecast {
    pub dates: Vec<NaiveDate>,
    pub neighborhoods: Vec<String>,
    pub aggregate: Vec<f64>,
    pub shares: NeighborhoodMatrix,
    pub counts: NeighborhoodMatrix,
    pub uniform_share_dates: Vec<NaiveDate>,
}

impl<A, D> EnsembleForecaster<A, D>
where
    A: Regressor,
    D: Regressor,
{
    pub fn new(aggregate: A, distribution: D) -> Self {
        Self {
            aggregate,
            distribution,
        }
    }

    pub fn fit(
        &self,
        training: &TrainingSet,
    ) -> Result<TrainedEnsemble<A::Model, D::Model>, ForecastError> {
        let targets = &training.targets;
        if targets.neighborhoods.is_empty() {
            return Err(ForecastError::NoNeighborhoods);
        }
        let x = training_features(training)?;

        let totals = targets.row_sums();
        let aggregate_y = Array2::from_shape_fn((totals.len(), 1), |(i, _)| totals[i]);
        let aggregate = self.aggregate.fit(&x, &aggregate_y)?;

        let share_rows: Vec<usize> = (0..totals.len()).filter(|i| totals[*i] > 0.0).collect();
        let excluded_dates: Vec<NaiveDate> = (0..totals.len())
            .filter(|i| totals[*i] <= 0.0)
            .map(|i| targets.dates[i])
            .collect();
        if share_rows.is_empty() {
            return Err(ForecastError::NoShareTrainingRows);
        }
        if !excluded_dates.is_empty() {
            warn!(
                component = "ensemble",
                event = "ensemble.share_rows_excluded",
                excluded = excluded_dates.len(),
                first_excluded = %excluded_dates[0]
            );
        }

        let width = targets.neighborhoods.len();
        let share_x = Array2::from_shape_fn((share_rows.len(), x.ncols()), |(i, j)| {
            x[[share_rows[i], j]]
        });
        let share_y = Array2::from_shape_fn((share_rows.len(), width), |(i, j)| {
            let row = share_rows[i];
            targets.values[row][j] / totals[row]
        });
        let distribution = self.distribution.fit(&share_x, &share_y)?;

        let report = EnsembleFitReport {
            training_rows: x.nrows(),
            share_rows: share_rows.len(),
            excluded_dates,
        };

        info!(
            component = "ensemble",
            event = "ensemble.fit",
            aggregate_model = self.aggregate.name(),
            distribution_model = self.distribution.name(),
            training_rows = report.training_rows,
            share_rows = report.share_rows,
            neighborhoods = width
        );

        Ok(TrainedEnsemble {
            aggregate,
            distribution,
            schema: training.input.schema.clone(),
            neighborhoods: targets.neighborhoods.clone(),
            report,
        })
    }
}

impl<AM, DM> TrainedEnsemble<AM, DM>
where
    AM: TrainedModel,
    DM: TrainedModel,
{
    pub fn report(&self) -> &EnsembleFitReport {
        &self.report
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn neighborhoods(&self) -> &[String] {
        &self.neighborhoods
    }

    pub fn predict(&self, input: &ModelInput) -> Result<EnsembleForecast, ForecastError> {
        assert_schema_compatible(self.schema.version, &self.schema.fingerprint, &input.schema)?;
        let dates: Vec<NaiveDate> = input.features.dates().collect();
        let x = input.features.to_array();

        let raw_aggregate = self.aggregate.predict(&x)?;
        let mut floored = 0usize;
        let aggregate: Vec<f64> = raw_aggregate
            .column(0)
            .iter()
            .map(|v| {
                if *v < 0.0 || !v.is_finite() {
                    floored += 1;
                    0.0
                } else {
                    *v
                }
            })
            .collect();
        if floored > 0 {
            warn!(
                component = "ensemble",
                event = "ensemble.aggregate_floored",
                rows = floored
            );
        }

        let raw_shares = self.distribution.predict(&x)?;
        let mut uniform_share_dates = Vec::new();
        let mut share_values = Vec::with_capacity(dates.len());
        for (i, row) in raw_shares.rows().into_iter().enumerate() {
            let raw: Vec<f64> = row.to_vec();
            let (normalized, uniform) = normalize_shares(&raw);
            if uniform {
                uniform_share_dates.push(dates[i]);
            }
            share_values.push(normalized);
        }
        if !uniform_share_dates.is_empty() {
            warn!(
                component = "ensemble",
                event = "ensemble.share_normalization_failure",
                rows = uniform_share_dates.len(),
                first_date = %uniform_share_dates[0]
            );
        }

        let shares = NeighborhoodMatrix {
            dates: dates.clone(),
            neighborhoods: self.neighborhoods.clone(),
            values: share_values,
        };
        let counts = compose_forecast(&aggregate, &shares)?;

        info!(
            component = "ensemble",
            event = "ensemble.predict",
            rows = dates.len(),
            neighborhoods = self.neighborhoods.len(),
            total_forecast = aggregate.iter().sum::<f64>()
        );

        Ok(EnsembleForecast {
            dates,
            neighborhoods: self.neighborhoods.clone(),
            aggregate,
            shares,
            counts,
            uniform_share_dates,
        })
    }
}

// Clips negative and non-finite entries to zero and rescales to sum to 1.
// With no positive mass left the split is uniform and the flag is set.
pub fn normalize_shares(raw: &[f64]) -> (Vec<f64>, bool) {
    if raw.is_empty() {
        return (Vec::new(), false);
    }
    let clipped: Vec<f64> = raw
        .iter()
        .map(|v| if v.is_finite() && *v > 0.0 { *v } else { 0.0 })
        .collect();
    let total: f64 = clipped.iter().sum();
    if total > 0.0 {
        (clipped.iter().map(|v| v / total).collect(), false)
    } else {
        let uniform = 1.0 / raw.len() as f64;
        (vec![uniform; raw.len()], true)
    }
}

pub fn compose_forecast(
    aggregate: &[f64],
    shares: &NeighborhoodMatrix,
) -> Result<NeighborhoodMatrix, ForecastError> {
    if aggregate.len() != shares.values.len() {
        return Err(ForecastError::LengthMismatch {
            aggregate: aggregate.len(),
            shares: shares.values.len(),
        });
    }
    let values = shares
        .values
        .iter()
        .zip(aggregate)
        .map(|(row, total)| row.iter().map(|share| total * share).collect())
        .collect();
    Ok(NeighborhoodMatrix {
        dates: shares.dates.clone(),
        neighborhoods: shares.neighborhoods.clone(),
        values,
    })
}

fn training_features(training: &TrainingSet) -> Result<Array2<f64>, ForecastError> {
    let x = training
        .input
        .features
        .to_array_for(&training.targets.dates);
    if x.nrows() != training.targets.dates.len() {
        return Err(ForecastError::FeatureRows {
            features: x.nrows(),
            dates: training.targets.dates.len(),
        });
    }
    Ok(x)
}

#[derive(Debug, Clone)]
pub struct BaselineForecaster<R> {
    pub regressor: R,
}

#[derive(Debug, Clone)]
pub struct TrainedBaseline<M> {
    model: M,
    schema: FeatureSchema,
    neighborhoods: Vec<String>,
}

impl<R: Regressor> BaselineForecaster<R> {
    pub fn new(regressor: R) -> Self {
        Self { regressor }
    }

    pub fn fit(&self, training: &TrainingSet) -> Result<TrainedBaseline<R::Model>, ForecastError> {
        if training.targets.neighborhoods.is_empty() {
            return Err(ForecastError::NoNeighborhoods);
        }
        let x = training_features(training)?;
        let y = training.targets.to_array();
        let model = self.regressor.fit(&x, &y)?;

        info!(
            component = "ensemble",
            event = "ensemble.baseline.fit",
            model = self.regressor.name(),
            training_rows = x.nrows(),
            neighborhoods = y.ncols()
        );

        Ok(TrainedBaseline {
            model,
            schema: training.input.schema.clone(),
            neighborhoods: training.targets.neighborhoods.clone(),
        })
    }
}

impl<M: TrainedModel> TrainedBaseline<M> {
    pub fn predict(&self, input: &ModelInput) -> Result<NeighborhoodMatrix, ForecastError> {
        assert_schema_compatible(self.schema.version, &self.schema.fingerprint, &input.schema)?;
        let dates: Vec<NaiveDate> = input.features.dates().collect();
        let predicted = self.model.predict(&input.features.to_array())?;
        Ok(NeighborhoodMatrix {
            dates,
            neighborhoods: self.neighborhoods.clone(),
            values: predicted.rows().into_iter().map(|r| r.to_vec()).collect(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastScore {
    pub rmse: f64,
    pub mae: f64,
    pub points: usize,
}

pub fn score_forecast(
    forecast: &NeighborhoodMatrix,
    actual: &NeighborhoodMatrix,
) -> Result<ForecastScore, ForecastError> {
    let mut squared = 0.0;
    let mut absolute = 0.0;
    let mut points = 0usize;

    for (row, date) in forecast.dates.iter().enumerate() {
        let Some(actual_row) = actual.date_index(*date) else {
            continue;
        };
        for (col, neighborhood) in forecast.neighborhoods.iter().enumerate() {
            let Some(actual_col) = actual.neighborhood_index(neighborhood) else {
                continue;
            };
            let err = forecast.values[row][col] - actual.values[actual_row][actual_col];
            squared += err * err;
            absolute += err.abs();
            points += 1;
        }
    }

    if points == 0 {
        return Err(ForecastError::NoOverlap);
    }

    let score = ForecastScore {
        rmse: (squared / points as f64).sqrt(),
        mae: absolute / points as f64,
        points,
    };
    info!(
        component = "ensemble",
        event = "ensemble.score",
        rmse = score.rmse,
        mae = score.mae,
        points = score.points
    );
    Ok(score)
}
