use std::path::Path;

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::{debug, error, info, warn};

use webcam_gaze::devices::{Session, StopSignal};
use webcam_gaze::gaze_config::{GazeConfig, load_config_from_file};
use webcam_gaze::replay::{LogDisplay, RecordedLandmarks, ReplayCapture};
use webcam_gaze::systems::calibration::{CalibrationOutcome, CalibrationSettings, run_calibration};
use webcam_gaze::systems::realtime::{RealtimeSettings, load_model_and_run};
use webcam_gaze::systems::training::{TrainingSettings, train_model};

use cli::{CalibrateArgs, Cli, Command, RunArgs};

mod cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize the logger from the environment

    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    debug!("Started; args: {:?}", cli);

    let mut config = load_config_from_file(&cli.config_path)
        .with_context(|| format!("failed to load config from {}", cli.config_path))?;
    cli.command.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;

    if cli.save_config {
        config
            .write_config_to_file(&cli.config_path)
            .context("failed to save config")?;
    }

    let result = match &cli.command {
        Command::Calibrate(args) => calibrate(&config, args),
        Command::Train(_) => train(&config),
        Command::Run(args) => run(&config, args),
    };
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

fn calibrate(config: &GazeConfig, args: &CalibrateArgs) -> anyhow::Result<()> {
    let stop = StopSignal::new();
    let capture = ReplayCapture::open(&args.recording)
        .with_context(|| format!("failed to open recording {:?}", args.recording))?
        .requested_size(config.window_size)
        .paced(args.replay_fps)
        .stop_when_exhausted(&stop);
    let session = Session::new(capture, RecordedLandmarks::new(), LogDisplay::new(&stop, None));

    let outcome = run_calibration(
        session,
        &CalibrationSettings::from(config),
        Path::new(&config.dataset_path),
    )
    .context("calibration failed")?;

    match outcome {
        CalibrationOutcome::Completed { samples, path } => {
            info!("Calibration complete: {} samples in {:?}", samples, path)
        }
        CalibrationOutcome::Aborted => warn!("Calibration aborted; nothing was saved"),
    }
    Ok(())
}

fn train(config: &GazeConfig) -> anyhow::Result<()> {
    let metrics = train_model(
        Path::new(&config.dataset_path),
        Path::new(&config.model_path),
        &TrainingSettings::from(config),
    )
    .context("training failed")?;

    if !metrics.holdout {
        warn!("R² above was measured on the training rows");
    }
    debug!("Training metrics: {:?}", metrics);
    Ok(())
}

fn run(config: &GazeConfig, args: &RunArgs) -> anyhow::Result<()> {
    let stop = StopSignal::new();
    let capture = ReplayCapture::open(&args.recording)
        .with_context(|| format!("failed to open recording {:?}", args.recording))?
        .requested_size(config.window_size)
        .looping(args.looping)
        .stop_when_exhausted(&stop);
    let session = Session::new(
        capture,
        RecordedLandmarks::new(),
        LogDisplay::new(&stop, args.frame_limit),
    );

    let summary = load_model_and_run(
        session,
        Path::new(&config.model_path),
        &RealtimeSettings::from(config),
        &stop,
    )
    .with_context(|| format!("realtime estimation with model {:?} failed", config.model_path))?;

    info!(
        "Presented {} frames, {} predictions; last estimate {:?}",
        summary.frames_presented, summary.predictions, summary.last_estimate
    );
    Ok(())
}
