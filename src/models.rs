//! Regression capability used by the forecasters, with two model families.
//!
//! `Regressor::fit` produces an explicit trained value; `TrainedModel::predict`
//! consumes it. Targets are always 2-D (`rows x outputs`) so the same models
//! serve single-output aggregate counts and multi-output shares.

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

const MIN_SCALE: f64 = 1e-10;

#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    #[error("training set is empty")]
    EmptyTrainingSet,
    #[error("features have {features} rows but targets have {targets}")]
    RowMismatch { features: usize, targets: usize },
    #[error("model expects {expected} feature columns, got {found}")]
    FeatureCountMismatch { expected: usize, found: usize },
    #[error("ridge alpha must be finite and positive, got {0}")]
    InvalidAlpha(f64),
    #[error("k-NN needs at least one neighbour")]
    InvalidNeighbors,
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
    #[error("normal equations are not positive definite")]
    NotPositiveDefinite,
}

pub trait Regressor {
    type Model: TrainedModel;

    fn name(&self) -> &'static str;

    fn fit(&self, features: &Array2<f64>, targets: &Array2<f64>) -> Result<Self::Model, ModelError>;
}

pub trait TrainedModel {
    fn feature_count(&self) -> usize;

    fn output_count(&self) -> usize;

    fn predict(&self, features: &Array2<f64>) -> Result<Array2<f64>, ModelError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl Standardizer {
    pub fn fit(x: &Array2<f64>) -> Result<Self, ModelError> {
        if x.nrows() == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        let mean = x
            .mean_axis(Axis(0))
            .ok_or(ModelError::EmptyTrainingSet)?;
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s < MIN_SCALE { 1.0 } else { s });
        Ok(Self { mean, scale })
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        if x.ncols() != self.mean.len() {
            return Err(ModelError::FeatureCountMismatch {
                expected: self.mean.len(),
                found: x.ncols(),
            });
        }
        Ok((x - &self.mean) / &self.scale)
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }
}

fn check_training(x: &Array2<f64>, y: &Array2<f64>) -> Result<(), ModelError> {
    if x.nrows() == 0 {
        return Err(ModelError::EmptyTrainingSet);
    }
    if x.nrows() != y.nrows() {
        return Err(ModelError::RowMismatch {
            features: x.nrows(),
            targets: y.nrows(),
        });
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::NonFinite("features"));
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::NonFinite("targets"));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RidgeRegressor {
    pub alpha: f64,
}

impl Default for RidgeRegressor {
    fn default() -> Self {
        Self { alpha: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RidgeModel {
    standardizer: Standardizer,
    coefficients: Array2<f64>,
    intercept: Array1<f64>,
}

impl RidgeModel {
    pub fn coefficients(&self) -> &Array2<f64> {
        &self.coefficients
    }

    pub fn intercept(&self) -> &Array1<f64> {
        &self.intercept
    }
}

impl Regressor for RidgeRegressor {
    type Model = RidgeModel;

    fn name(&self) -> &'static str {
        "ridge"
    }

    fn fit(&self, features: &Array2<f64>, targets: &Array2<f64>) -> Result<RidgeModel, ModelError> {
        if !self.alpha.is_finite() || self.alpha <= 0.0 {
            return Err(ModelError::InvalidAlpha(self.alpha));
        }
        check_training(features, targets)?;

        let standardizer = Standardizer::fit(features)?;
        let xs = standardizer.transform(features)?;
        let y_mean = targets
            .mean_axis(Axis(0))
            .ok_or(ModelError::EmptyTrainingSet)?;
        let yc = targets - &y_mean;

        let mut gram = xs.t().dot(&xs);
        for i in 0..gram.nrows() {
            gram[[i, i]] += self.alpha;
        }
        let factor = cholesky(&gram)?;
        let xty = xs.t().dot(&yc);

        let mut coefficients = Array2::<f64>::zeros((xs.ncols(), targets.ncols()));
        for (j, rhs) in xty.columns().into_iter().enumerate() {
            let solved = cholesky_solve(&factor, &rhs.to_owned());
            coefficients.column_mut(j).assign(&solved);
        }

        info!(
            component = "models",
            event = "models.ridge.fit",
            rows = features.nrows(),
            features = features.ncols(),
            outputs = targets.ncols(),
            alpha = self.alpha
        );

        Ok(RidgeModel {
            standardizer,
            coefficients,
            intercept: y_mean,
        })
    }
}

impl TrainedModel for RidgeModel {
    fn feature_count(&self) -> usize {
        self.standardizer.width()
    }

    fn output_count(&self) -> usize {
        self.intercept.len()
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        let xs = self.standardizer.transform(features)?;
        Ok(xs.dot(&self.coefficients) + &self.intercept)
    }
}

fn cholesky(a: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return Err(ModelError::NotPositiveDefinite);
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    Ok(l)
}

fn cholesky_solve(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * z[j];
        }
        z[i] = (b[i] - sum) / l[[i, i]];
    }

    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (z[i] - sum) / l[[i, i]];
    }
    x
}

// Uniform average of the `k` nearest training targets under Euclidean
// distance on standardized features. Ties keep training order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnnRegressor {
    pub k: usize,
}

impl Default for KnnRegressor {
    fn default() -> Self {
        Self { k: 7 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnModel {
    k: usize,
    standardizer: Standardizer,
    features: Array2<f64>,
    targets: Array2<f64>,
}

impl KnnModel {
    fn neighbours(&self, query: ndarray::ArrayView1<f64>) -> Vec<usize> {
        let mut distances: Vec<(f64, usize)> = self
            .features
            .rows()
            .into_iter()
            .enumerate()
            .map(|(idx, row)| {
                let d: f64 = row
                    .iter()
                    .zip(query.iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum();
                (d, idx)
            })
            .collect();
        distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        distances
            .into_iter()
            .take(self.k.min(self.features.nrows()))
            .map(|(_, idx)| idx)
            .collect()
    }
}

impl Regressor for KnnRegressor {
    type Model = KnnModel;

    fn name(&self) -> &'static str {
        "knn"
    }

    fn fit(&self, features: &Array2<f64>, targets: &Array2<f64>) -> Result<KnnModel, ModelError> {
        if self.k == 0 {
            return Err(ModelError::InvalidNeighbors);
        }
        check_training(features, targets)?;
        let standardizer = Standardizer::fit(features)?;
        let scaled = standardizer.transform(features)?;

        info!(
            component = "models",
            event = "models.knn.fit",
            rows = features.nrows(),
            features = features.ncols(),
            outputs = targets.ncols(),
            k = self.k
        );

        Ok(KnnModel {
            k: self.k,
            standardizer,
            features: scaled,
            targets: targets.clone(),
        })
    }
}

impl TrainedModel for KnnModel {
    fn feature_count(&self) -> usize {
        self.standardizer.width()
    }

    fn output_count(&self) -> usize {
        self.targets.ncols()
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        let scaled = self.standardizer.transform(features)?;
        let mut out = Array2::<f64>::zeros((scaled.nrows(), self.targets.ncols()));
        for (i, query) in scaled.rows().into_iter().enumerate() {
            let neighbours = self.neighbours(query);
            let weight = 1.0 / neighbours.len() as f64;
            let mut row = out.row_mut(i);
            for idx in neighbours {
                row.scaled_add(weight, &self.targets.row(idx));
            }
        }
        Ok(out)
    }
}
