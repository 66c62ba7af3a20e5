use std::path::Path;

use log::{info, warn};
use ndarray::{Array1, Array2, ArrayView1};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use crate::{
    dataset::{CalibrationSample, load_dataset},
    error::{GazeError, Result},
    gaze_config::GazeConfig,
    model::{AxisPipeline, FEATURE_COUNT, ModelPair},
};

pub struct TrainingSettings {
    pub test_fraction: f64,
    pub seed: u64,
    pub ridge_alpha: f64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        TrainingSettings {
            test_fraction: 0.2,
            seed: 42,
            ridge_alpha: 1.0,
        }
    }
}

impl From<&GazeConfig> for TrainingSettings {
    fn from(config: &GazeConfig) -> Self {
        TrainingSettings {
            test_fraction: config.test_fraction,
            seed: config.seed,
            ridge_alpha: config.ridge_alpha,
        }
    }
}

/// Quality report of one training run; informational only.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Metrics {
    pub r2_x: f64,
    pub r2_y: f64,
    pub train_rows: usize,
    pub test_rows: usize,
    /// False when the test fraction was 0 and R² was computed on the training rows
    pub holdout: bool,
}

/// Row indices for training and evaluation, shuffled with a seeded RNG so that the same
/// seed and row count always give the same partition.
pub fn train_test_split(
    rows: usize,
    test_fraction: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(0. ..1.).contains(&test_fraction) {
        return Err(GazeError::InvalidConfig(format!(
            "testFraction must be in [0, 1), got {}",
            test_fraction
        )));
    }

    let test = (test_fraction * rows as f64).ceil() as usize;
    let train = rows.saturating_sub(test);
    if train == 0 || (test_fraction > 0. && test == 0) {
        return Err(GazeError::InsufficientData { rows, train, test });
    }

    let mut indices: Vec<usize> = (0..rows).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train_indices = indices.split_off(test);
    Ok((train_indices, indices))
}

/// Coefficient of determination. Constant targets score 1.0 on a perfect fit, else 0.0.
pub fn r2_score(y_true: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> f64 {
    let mean = y_true.mean().unwrap_or(0.);
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();

    if ss_tot == 0. {
        if ss_res == 0. { 1. } else { 0. }
    } else {
        1. - ss_res / ss_tot
    }
}

fn to_arrays(samples: &[CalibrationSample], rows: &[usize]) -> (Array2<f64>, Array2<f64>) {
    let mut x = Array2::zeros((rows.len(), FEATURE_COUNT));
    let mut y = Array2::zeros((rows.len(), 2));
    for (r, i) in rows.iter().enumerate() {
        let s = &samples[*i];
        for (j, v) in s.features.to_f64().iter().enumerate() {
            x[[r, j]] = *v;
        }
        y[[r, 0]] = s.target.0 as f64;
        y[[r, 1]] = s.target.1 as f64;
    }
    (x, y)
}

/// Fit both axis pipelines on an in-memory dataset and score them.
pub fn fit_model_pair(
    samples: &[CalibrationSample],
    settings: &TrainingSettings,
) -> Result<(ModelPair, Metrics)> {
    let (train_rows, test_rows) =
        train_test_split(samples.len(), settings.test_fraction, settings.seed)?;
    let holdout = !test_rows.is_empty();

    let (x_train, y_train) = to_arrays(samples, &train_rows);
    let model_x = AxisPipeline::fit(x_train.view(), y_train.column(0), settings.ridge_alpha)?;
    let model_y = AxisPipeline::fit(x_train.view(), y_train.column(1), settings.ridge_alpha)?;

    let (x_eval, y_eval) = if holdout {
        to_arrays(samples, &test_rows)
    } else {
        warn!("No holdout split; R² is measured on the training rows");
        (x_train, y_train)
    };
    let pred_x: Array1<f64> = model_x.predict(x_eval.view());
    let pred_y: Array1<f64> = model_y.predict(x_eval.view());

    let metrics = Metrics {
        r2_x: r2_score(y_eval.column(0), pred_x.view()),
        r2_y: r2_score(y_eval.column(1), pred_y.view()),
        train_rows: train_rows.len(),
        test_rows: test_rows.len(),
        holdout,
    };

    Ok((ModelPair { model_x, model_y }, metrics))
}

/// Load the dataset, fit, report R² and write the model artifact.
pub fn train_model(
    dataset_path: &Path,
    output_path: &Path,
    settings: &TrainingSettings,
) -> Result<Metrics> {
    let samples = load_dataset(dataset_path)?;
    info!(
        "Training on {} samples from {:?} (test fraction {}, seed {})",
        samples.len(),
        dataset_path,
        settings.test_fraction,
        settings.seed
    );

    let (pair, metrics) = fit_model_pair(&samples, settings)?;
    info!(
        "Eval R^2 - x: {:.3}, y: {:.3} ({} train / {} test rows)",
        metrics.r2_x, metrics.r2_y, metrics.train_rows, metrics.test_rows
    );

    pair.save(output_path)?;
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use ndarray::array;

    use super::*;
    use crate::{
        dataset::write_dataset, systems::calibration::grid_points,
        systems::features::FeatureVector,
    };

    /// Noise-free features that move linearly with the target
    fn synthetic(targets: &[(f32, f32)], repeats: usize) -> Vec<CalibrationSample> {
        targets
            .iter()
            .flat_map(|(tx, ty)| {
                (0..repeats).map(move |r| {
                    let jitter = r as f32 * 0.001;
                    let (dx, dy) = ((tx - 0.5) * 0.2, (ty - 0.5) * 0.1);
                    CalibrationSample::new(
                        FeatureVector([-0.5 + dx + jitter, dy, 0.5 + dx * 0.8, -dy + jitter]),
                        (*tx, *ty),
                    )
                })
            })
            .collect()
    }

    #[test]
    fn test_split_is_deterministic_and_disjoint() {
        let (train_a, test_a) = train_test_split(50, 0.2, 42).unwrap();
        let (train_b, test_b) = train_test_split(50, 0.2, 42).unwrap();
        assert_eq!((&train_a, &test_a), (&train_b, &test_b));
        assert_eq!(test_a.len(), 10);
        assert_eq!(train_a.len(), 40);

        let mut all: Vec<usize> = train_a.iter().chain(test_a.iter()).copied().collect();
        all.sort();
        assert_eq!(all, (0..50).collect::<Vec<usize>>());

        let (_, test_c) = train_test_split(50, 0.2, 7).unwrap();
        assert_ne!(test_a, test_c);
    }

    #[test]
    fn test_split_rounds_test_size_up() {
        let (train, test) = train_test_split(9, 0.2, 42).unwrap();
        assert_eq!((train.len(), test.len()), (7, 2));
        let (train, test) = train_test_split(9, 0., 42).unwrap();
        assert_eq!((train.len(), test.len()), (9, 0));
    }

    #[test]
    fn test_split_insufficient_rows() {
        assert!(matches!(
            train_test_split(1, 0.2, 42),
            Err(GazeError::InsufficientData {
                rows: 1,
                train: 0,
                test: 1
            })
        ));
        assert!(matches!(
            train_test_split(0, 0., 42),
            Err(GazeError::InsufficientData { rows: 0, .. })
        ));
        assert!(matches!(
            train_test_split(10, 1.0, 42),
            Err(GazeError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_r2_score() {
        let t = array![1., 2., 3., 4.];
        assert_eq!(r2_score(t.view(), t.view()), 1.);
        let mean = array![2.5, 2.5, 2.5, 2.5];
        assert!(r2_score(t.view(), mean.view()).abs() < 1e-12);
        let c = array![0.5, 0.5];
        assert_eq!(r2_score(c.view(), c.view()), 1.);
        assert_eq!(r2_score(c.view(), array![0.4, 0.6].view()), 0.);
    }

    #[test]
    fn test_nine_point_grid_fits_near_perfectly() {
        let samples = synthetic(&grid_points(3, 0.15), 1);
        assert_eq!(samples.len(), 9);
        let settings = TrainingSettings {
            test_fraction: 0.,
            ridge_alpha: 1e-6,
            ..Default::default()
        };

        let (pair, metrics) = fit_model_pair(&samples, &settings).unwrap();

        assert!(!metrics.holdout);
        assert_eq!(metrics.train_rows, 9);
        assert!(metrics.r2_x > 0.999, "r2_x {}", metrics.r2_x);
        assert!(metrics.r2_y > 0.999, "r2_y {}", metrics.r2_y);
        for s in samples.iter() {
            let (px, py) = pair.predict(&s.features);
            assert!((px - s.target.0).abs() < 0.01 && (py - s.target.1).abs() < 0.01);
        }
    }

    #[test]
    fn test_default_alpha_still_reports_high_r2() {
        let samples = synthetic(&grid_points(3, 0.15), 10);
        let (_, metrics) = fit_model_pair(&samples, &TrainingSettings::default()).unwrap();
        assert!(metrics.holdout);
        assert_eq!(metrics.test_rows, 18);
        assert!(metrics.r2_x > 0.9 && metrics.r2_y > 0.9, "{:?}", metrics);
    }

    #[test]
    fn test_train_model_round_trips_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("samples.csv");
        let model_path = dir.path().join("models").join("gaze.msgpack");
        let samples = synthetic(&grid_points(3, 0.15), 5);
        write_dataset(&csv, &samples).unwrap();

        let metrics = train_model(&csv, &model_path, &TrainingSettings::default()).unwrap();
        assert_eq!(metrics.train_rows + metrics.test_rows, 45);

        let loaded = ModelPair::load(&model_path).unwrap();
        let (fresh, _) = fit_model_pair(
            &crate::dataset::load_dataset(&csv).unwrap(),
            &TrainingSettings::default(),
        )
        .unwrap();
        for s in samples.iter() {
            let (ax, ay) = loaded.predict(&s.features);
            let (bx, by) = fresh.predict(&s.features);
            assert!((ax - bx).abs() < 1e-6 && (ay - by).abs() < 1e-6);
        }
    }

    #[test]
    fn test_poor_fit_still_produces_a_model() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("samples.csv");
        let model_path = dir.path().join("gaze.msgpack");
        // Targets unrelated to the (constant) features
        let samples: Vec<CalibrationSample> = grid_points(3, 0.15)
            .into_iter()
            .map(|t| CalibrationSample::new(FeatureVector([-0.5, 0., 0.5, 0.]), t))
            .collect();
        write_dataset(&csv, &samples).unwrap();

        let metrics = train_model(&csv, &model_path, &TrainingSettings::default()).unwrap();
        assert!(metrics.r2_x.is_finite() && metrics.r2_x <= 1.);
        let loaded = ModelPair::load(&model_path).unwrap();
        let a = loaded.predict(&FeatureVector([-0.5, 0., 0.5, 0.]));
        let b = loaded.predict(&FeatureVector([-0.4, 0.1, 0.4, -0.1]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_too_few_rows_is_distinct_from_io() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("samples.csv");
        let model_path = dir.path().join("gaze.msgpack");
        fs::write(&csv, "f1,f2,f3,f4,tx,ty\n0,0,0,0,0.5,0.5\n").unwrap();

        let result = train_model(&csv, &model_path, &TrainingSettings::default());
        assert!(matches!(result, Err(GazeError::InsufficientData { .. })));
        assert!(!model_path.exists());

        let missing = train_model(
            &dir.path().join("missing.csv"),
            &model_path,
            &TrainingSettings::default(),
        );
        assert!(matches!(missing, Err(GazeError::Io(_))));
    }
}
