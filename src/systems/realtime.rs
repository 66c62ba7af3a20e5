use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::{
    Point2D,
    devices::{Display, FrameSource, LandmarkDetector, Overlay, Session, StopSignal},
    error::{GazeError, Result},
    gaze_config::{GazeConfig, WindowSize},
    geometry_utils::denormalise,
    model::ModelPair,
};

use super::smoothing::GazeSmoother;

pub struct RealtimeSettings {
    pub window_size: WindowSize,
    pub fps_target: u32,
    pub smoothing_factor: f32,
}

impl From<&GazeConfig> for RealtimeSettings {
    fn from(config: &GazeConfig) -> Self {
        RealtimeSettings {
            window_size: config.window_size,
            fps_target: config.fps_target,
            smoothing_factor: config.smoothing_factor,
        }
    }
}

/// Soft frame-rate cap: sleeps away whatever is left of the frame budget, never drops frames.
#[derive(Debug, Clone, Copy)]
pub struct FramePacer {
    frame_budget: Duration,
}

impl FramePacer {
    pub fn new(fps_target: u32) -> Result<Self> {
        if fps_target == 0 {
            return Err(GazeError::InvalidConfig("fpsTarget must be above 0".into()));
        }
        Ok(FramePacer {
            frame_budget: Duration::from_secs_f64(1. / fps_target as f64),
        })
    }

    pub fn frame_budget(&self) -> Duration {
        self.frame_budget
    }

    /// Time left to sleep after an iteration that took `elapsed`, if any.
    pub fn remaining(&self, elapsed: Duration) -> Option<Duration> {
        self.frame_budget
            .checked_sub(elapsed)
            .filter(|d| !d.is_zero())
    }

    pub fn pace(&self, iteration_started: Instant) {
        if let Some(d) = self.remaining(iteration_started.elapsed()) {
            thread::sleep(d);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RealtimeSummary {
    pub frames_presented: usize,
    pub predictions: usize,
    /// Smoothed estimate in normalised units when the loop ended
    pub last_estimate: Option<Point2D>,
}

/// Predict, smooth and draw the gaze point for every frame until the display or `stop`
/// asks to finish. Capture misses are retried straight away without pacing; frames with
/// no usable face are shown raw and leave the smoothed estimate untouched.
pub fn run_realtime<S, D, V>(
    mut session: Session<S, D, V>,
    model: &ModelPair,
    settings: &RealtimeSettings,
    stop: &StopSignal,
) -> Result<RealtimeSummary>
where
    S: FrameSource,
    D: LandmarkDetector<S::Frame>,
    V: Display<S::Frame>,
{
    let pacer = FramePacer::new(settings.fps_target)?;
    let mut smoother = GazeSmoother::new(settings.smoothing_factor);
    let WindowSize { width, height } = settings.window_size;
    let mut summary = RealtimeSummary::default();

    info!(
        "Realtime estimation at up to {} fps, smoothing {}",
        settings.fps_target, settings.smoothing_factor
    );

    loop {
        let started = Instant::now();
        let Some(frame) = session.capture.next_frame() else {
            if stop.is_set() {
                break;
            }
            continue;
        };

        let overlay = match session.extractor.extract(&frame) {
            None => Overlay::None,
            Some((features, eyes)) => {
                let estimate = smoother.update(model.predict(&features));
                summary.predictions += 1;
                let (px, py) = denormalise(estimate, width, height);
                Overlay::Gaze {
                    prediction: (px.trunc(), py.trunc()),
                    left_eye: eyes.left_center,
                    right_eye: eyes.right_center,
                }
            }
        };
        session.display.present(&frame, &overlay);
        summary.frames_presented += 1;

        if session.display.abort_requested() || stop.is_set() {
            break;
        }
        pacer.pace(started);
    }

    summary.last_estimate = smoother.current();
    info!(
        "Realtime estimation stopped after {} frames ({} predictions)",
        summary.frames_presented, summary.predictions
    );
    Ok(summary)
}

/// Load the model once, then run the estimator. A missing or incomplete artifact fails
/// before the loop starts; the session is released either way.
pub fn load_model_and_run<S, D, V>(
    session: Session<S, D, V>,
    model_path: &Path,
    settings: &RealtimeSettings,
    stop: &StopSignal,
) -> Result<RealtimeSummary>
where
    S: FrameSource,
    D: LandmarkDetector<S::Frame>,
    V: Display<S::Frame>,
{
    let model = ModelPair::load(model_path)?;
    debug!("Model loaded from {:?}", model_path);
    run_realtime(session, &model, settings, stop)
}
