//! Per-axis regression pipelines and the artifact that carries them.
//!
//! Each screen axis gets its own [`AxisPipeline`]: a standard scaler followed by ridge
//! regression. [`ModelPair`] bundles the two behind a single "predict a 2D point" call and
//! stores them as one MessagePack map keyed by axis name.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::{
    Point2D,
    error::{GazeError, Result},
    systems::features::FeatureVector,
};

pub const FEATURE_COUNT: usize = 4;
pub const MODEL_X_KEY: &str = "model_x";
pub const MODEL_Y_KEY: &str = "model_y";

/// Zero mean, unit (population) variance per column. Columns with no spread are only
/// centred.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StandardScaler {
    pub mean: [f64; FEATURE_COUNT],
    pub scale: [f64; FEATURE_COUNT],
}

impl StandardScaler {
    pub fn fit(x: ArrayView2<f64>) -> Self {
        let mut mean = [0.; FEATURE_COUNT];
        let mut scale = [1.; FEATURE_COUNT];
        for (j, column) in x.axis_iter(Axis(1)).enumerate().take(FEATURE_COUNT) {
            let m = column.mean().unwrap_or(0.);
            let std = column.std(0.);
            mean[j] = m;
            scale[j] = if std > f64::EPSILON { std } else { 1. };
        }
        StandardScaler { mean, scale }
    }

    pub fn transform(&self, x: ArrayView2<f64>) -> Array2<f64> {
        let mut out = x.to_owned();
        for mut row in out.axis_iter_mut(Axis(0)) {
            for (j, v) in row.iter_mut().enumerate() {
                *v = (*v - self.mean[j]) / self.scale[j];
            }
        }
        out
    }

    pub fn transform_one(&self, features: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        let mut out = [0.; FEATURE_COUNT];
        for j in 0..FEATURE_COUNT {
            out[j] = (features[j] - self.mean[j]) / self.scale[j];
        }
        out
    }
}

/// L2-regularised least squares with an unpenalised intercept.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RidgeRegression {
    pub coefficients: [f64; FEATURE_COUNT],
    pub intercept: f64,
    pub alpha: f64,
}

impl RidgeRegression {
    /// Solve `(XcᵀXc + αI) w = Xcᵀ yc` on centred data, then recover the intercept.
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>, alpha: f64) -> Result<Self> {
        let (rows, cols) = x.dim();
        if cols != FEATURE_COUNT || y.len() != rows {
            return Err(GazeError::DimensionMismatch {
                rows,
                cols,
                expected: FEATURE_COUNT,
                targets: y.len(),
            });
        }
        if rows == 0 {
            return Err(GazeError::InsufficientData {
                rows,
                train: rows,
                test: 0,
            });
        }

        let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(cols));
        let y_mean = y.mean().unwrap_or(0.);

        let xc = DMatrix::from_fn(rows, cols, |i, j| x[[i, j]] - x_mean[j]);
        let yc = DVector::from_fn(rows, |i, _| y[i] - y_mean);

        let gram = xc.transpose() * &xc + DMatrix::identity(cols, cols) * alpha;
        let rhs = xc.transpose() * yc;

        let w = match gram.clone().cholesky() {
            Some(cholesky) => cholesky.solve(&rhs),
            None => {
                // Singular only when alpha is 0 and columns are collinear
                warn!("Normal equations not positive definite; falling back to SVD");
                gram.svd(true, true)
                    .solve(&rhs, 1e-12)
                    .map_err(|e| GazeError::InvalidConfig(format!("ridge solve failed: {}", e)))?
            }
        };

        let mut coefficients = [0.; FEATURE_COUNT];
        for (j, c) in coefficients.iter_mut().enumerate() {
            *c = w[j];
        }
        let intercept = y_mean
            - coefficients
                .iter()
                .zip(x_mean.iter())
                .map(|(c, m)| c * m)
                .sum::<f64>();

        Ok(RidgeRegression {
            coefficients,
            intercept,
            alpha,
        })
    }

    pub fn predict_one(&self, x: &[f64; FEATURE_COUNT]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(x.iter())
                .map(|(c, v)| c * v)
                .sum::<f64>()
    }
}

/// Scaler + ridge for one screen axis.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AxisPipeline {
    pub scaler: StandardScaler,
    pub ridge: RidgeRegression,
}

impl AxisPipeline {
    /// The scaler is fit on `x` only, so pass training rows, never evaluation rows.
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>, alpha: f64) -> Result<Self> {
        let scaler = StandardScaler::fit(x);
        let standardised = scaler.transform(x);
        let ridge = RidgeRegression::fit(standardised.view(), y, alpha)?;
        Ok(AxisPipeline { scaler, ridge })
    }

    pub fn predict_one(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        self.ridge.predict_one(&self.scaler.transform_one(features))
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.axis_iter(Axis(0))
            .map(|row| {
                let mut features = [0.; FEATURE_COUNT];
                for (j, v) in row.iter().enumerate().take(FEATURE_COUNT) {
                    features[j] = *v;
                }
                self.predict_one(&features)
            })
            .collect()
    }
}

/// The two independent axis models. Output is in normalised screen units and is not
/// clamped to `[0;1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelPair {
    pub model_x: AxisPipeline,
    pub model_y: AxisPipeline,
}

impl ModelPair {
    pub fn predict(&self, features: &FeatureVector) -> Point2D {
        let f = features.to_f64();
        (
            self.model_x.predict_one(&f) as f32,
            self.model_y.predict_one(&f) as f32,
        )
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut artifact: IndexMap<String, &AxisPipeline> = IndexMap::new();
        artifact.insert(String::from(MODEL_X_KEY), &self.model_x);
        artifact.insert(String::from(MODEL_Y_KEY), &self.model_y);
        Ok(rmp_serde::to_vec_named(&artifact)?)
    }

    pub fn from_bytes(bytes: &[u8], source: &Path) -> Result<Self> {
        let mut artifact = rmp_serde::from_slice::<IndexMap<String, AxisPipeline>>(bytes)?;
        let mut take = |axis: &str| {
            artifact
                .swap_remove(axis)
                .ok_or_else(|| GazeError::MissingModelAxis {
                    path: source.to_path_buf(),
                    axis: String::from(axis),
                })
        };
        let model_x = take(MODEL_X_KEY)?;
        let model_y = take(MODEL_Y_KEY)?;
        Ok(ModelPair { model_x, model_y })
    }

    /// Write the artifact, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_bytes()?)?;
        info!("Saved model to {:?}", path);
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let pair = Self::from_bytes(&bytes, path)?;
        debug!("Loaded model pair from {:?}: {:?}", path, pair);
        Ok(pair)
    }
}
