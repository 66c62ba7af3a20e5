use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{GazeError, Result};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl WindowSize {
    pub fn new(width: u32, height: u32) -> Self {
        WindowSize { width, height }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GazeConfig {
    /// Requested capture resolution; also the pixel space used for targets and predictions
    pub window_size: WindowSize,

    // -------- CALIBRATION SETTINGS
    /// Grid density; calibration shows pointsPerAxis x pointsPerAxis targets
    pub points_per_axis: usize,

    /// Distance of the outermost targets from the screen edges, in normalised units
    pub grid_margin: f32,

    /// Frames shown per target before sampling starts
    pub warmup_frames: usize,

    /// Valid samples to collect per target
    pub dwell_frames: usize,

    /// Give up on a target after this many capture polls during the dwell phase;
    /// null means never give up
    pub max_dwell_polls: Option<usize>,

    /// How long (ms) to flash the acknowledgement after each target
    pub ack_flash_ms: u64,

    /// Where calibration writes, and training reads, the samples CSV
    pub dataset_path: String,

    // -------- TRAINING SETTINGS
    /// Where training writes, and realtime reads, the model artifact
    pub model_path: String,

    /// Share of the rows held out for evaluation; 0 disables the holdout
    pub test_fraction: f64,

    /// Seed for the train/test shuffle
    pub seed: u64,

    /// L2 regularisation strength for both axes
    pub ridge_alpha: f64,

    // -------- REALTIME SETTINGS
    /// Loop rate cap
    pub fps_target: u32,

    /// Weight of the newest raw prediction in the exponential moving average
    /// (1.0 is no smoothing, 0 is invalid)
    pub smoothing_factor: f32,
}

impl Default for GazeConfig {
    fn default() -> Self {
        GazeConfig {
            window_size: WindowSize::new(1280, 720),
            points_per_axis: 3,
            grid_margin: 0.15,
            warmup_frames: 8,
            dwell_frames: 18,
            max_dwell_polls: Some(900),
            ack_flash_ms: 250,
            dataset_path: String::from("data/calibration_samples.csv"),
            model_path: String::from("models/gaze_ridge_xy.msgpack"),
            test_fraction: 0.2,
            seed: 42,
            ridge_alpha: 1.0,
            fps_target: 30,
            smoothing_factor: 0.25,
        }
    }
}

impl GazeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.points_per_axis == 0 {
            return Err(GazeError::InvalidConfig(
                "pointsPerAxis must be at least 1".into(),
            ));
        }
        if !(0. ..0.5).contains(&self.grid_margin) {
            return Err(GazeError::InvalidConfig(format!(
                "gridMargin must be in [0, 0.5), got {}",
                self.grid_margin
            )));
        }
        if let Some(max) = self.max_dwell_polls {
            if max == 0 || max < self.dwell_frames {
                return Err(GazeError::InvalidConfig(format!(
                    "maxDwellPolls ({}) must be at least 1 and no less than dwellFrames ({})",
                    max, self.dwell_frames
                )));
            }
        }
        if self.window_size.width == 0 || self.window_size.height == 0 {
            return Err(GazeError::InvalidConfig(
                "windowSize must be non-zero on both axes".into(),
            ));
        }
        if self.fps_target == 0 {
            return Err(GazeError::InvalidConfig("fpsTarget must be above 0".into()));
        }
        if !(self.smoothing_factor > 0. && self.smoothing_factor <= 1.) {
            return Err(GazeError::InvalidConfig(format!(
                "smoothingFactor must be in (0, 1], got {}",
                self.smoothing_factor
            )));
        }
        if !(0. ..1.).contains(&self.test_fraction) {
            return Err(GazeError::InvalidConfig(format!(
                "testFraction must be in [0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.ridge_alpha < 0. {
            return Err(GazeError::InvalidConfig(format!(
                "ridgeAlpha must not be negative, got {}",
                self.ridge_alpha
            )));
        }
        Ok(())
    }

    pub fn write_config_to_file(&self, config_file_path: &str) -> Result<()> {
        debug!("Current state of config: {:?}", self);
        let text = serde_json::to_string_pretty(self)?;
        if let Some(parent) = Path::new(config_file_path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(config_file_path, text)?;
        info!("Wrote config to file: {:?}", config_file_path);
        Ok(())
    }
}

pub fn load_config_from_file(config_file_path: &str) -> Result<GazeConfig> {
    match fs::read_to_string(config_file_path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(
                "Gaze config file not found at {}; using defaults",
                &config_file_path
            );
            Ok(GazeConfig::default())
        }
        Err(e) => Err(e.into()),
        Ok(s) => {
            info!("Loaded gaze config OK from \"{}\"", config_file_path);
            let loaded_config = serde_json::from_str::<GazeConfig>(&s)?;
            debug!("Config parsed data from file: {:?}", &loaded_config);
            Ok(loaded_config)
        }
    }
}
