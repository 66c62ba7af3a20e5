use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, command};
use webcam_gaze::gaze_config::GazeConfig;

const CONFIG_FILE_PATH: &str = "./gaze.json";

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Where to load (and optionally save) the gaze config
    #[arg(long = "config", global = true, default_value_t = String::from(CONFIG_FILE_PATH))]
    pub config_path: String,

    /// Write the config, with any overrides applied, back to the config file
    #[arg(long = "saveConfig", global = true)]
    pub save_config: bool,

    #[arg(long = "loglevel", global = true, default_value_t = String::from("info"))]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the target grid and record labelled feature samples
    Calibrate(CalibrateArgs),
    /// Fit the per-axis ridge models on a calibration dataset
    Train(TrainArgs),
    /// Estimate gaze on a live (or replayed) feed
    Run(RunArgs),
}

#[derive(Args, Debug)]
pub struct CalibrateArgs {
    /// Recorded frames (MessagePack) to replay in place of a camera
    #[arg(long = "recording")]
    pub recording: PathBuf,

    /// Frame rate the recording is replayed at
    #[arg(long = "replayFps", default_value_t = 30)]
    pub replay_fps: u32,

    #[arg(long = "datasetPath")]
    pub dataset_path: Option<String>,

    #[arg(long = "pointsPerAxis")]
    pub points_per_axis: Option<usize>,

    #[arg(long = "warmupFrames")]
    pub warmup_frames: Option<usize>,

    #[arg(long = "dwellFrames")]
    pub dwell_frames: Option<usize>,

    #[arg(long = "width")]
    pub width: Option<u32>,

    #[arg(long = "height")]
    pub height: Option<u32>,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[arg(long = "datasetPath")]
    pub dataset_path: Option<String>,

    #[arg(long = "modelPath")]
    pub model_path: Option<String>,

    /// Share of rows held out for R²; 0 scores on the training rows
    #[arg(long = "testFraction")]
    pub test_fraction: Option<f64>,

    #[arg(long = "seed")]
    pub seed: Option<u64>,

    #[arg(long = "ridgeAlpha")]
    pub ridge_alpha: Option<f64>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Recorded frames (MessagePack) to replay in place of a camera
    #[arg(long = "recording")]
    pub recording: PathBuf,

    /// Start the recording again when it runs out
    #[arg(long = "loop")]
    pub looping: bool,

    /// Stop after this many presented frames
    #[arg(long = "frameLimit")]
    pub frame_limit: Option<usize>,

    #[arg(long = "modelPath")]
    pub model_path: Option<String>,

    #[arg(long = "fps")]
    pub fps_target: Option<u32>,

    #[arg(long = "smoothing")]
    pub smoothing_factor: Option<f32>,

    #[arg(long = "width")]
    pub width: Option<u32>,

    #[arg(long = "height")]
    pub height: Option<u32>,
}

fn set<T>(target: &mut T, value: &Option<T>)
where
    T: Clone,
{
    if let Some(v) = value {
        *target = v.clone();
    }
}

impl Command {
    /// Fold command-line overrides into the loaded config
    pub fn apply_overrides(&self, config: &mut GazeConfig) {
        match self {
            Command::Calibrate(args) => {
                set(&mut config.dataset_path, &args.dataset_path);
                set(&mut config.points_per_axis, &args.points_per_axis);
                set(&mut config.warmup_frames, &args.warmup_frames);
                set(&mut config.dwell_frames, &args.dwell_frames);
                set(&mut config.window_size.width, &args.width);
                set(&mut config.window_size.height, &args.height);
            }
            Command::Train(args) => {
                set(&mut config.dataset_path, &args.dataset_path);
                set(&mut config.model_path, &args.model_path);
                set(&mut config.test_fraction, &args.test_fraction);
                set(&mut config.seed, &args.seed);
                set(&mut config.ridge_alpha, &args.ridge_alpha);
            }
            Command::Run(args) => {
                set(&mut config.model_path, &args.model_path);
                set(&mut config.fps_target, &args.fps_target);
                set(&mut config.smoothing_factor, &args.smoothing_factor);
                set(&mut config.window_size.width, &args.width);
                set(&mut config.window_size.height, &args.height);
            }
        }
    }
}
