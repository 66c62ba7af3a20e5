use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::{
    Point2D,
    dataset::{CalibrationSample, write_dataset},
    devices::{Display, FrameSource, LandmarkDetector, Overlay, Session},
    error::{GazeError, Result},
    gaze_config::{GazeConfig, WindowSize},
    geometry_utils::{denormalise, linspace},
    systems::features::FeatureVector,
};

/// Row-major grid of normalised targets: every point of the top row left to right,
/// then the next row down, and so on.
pub fn grid_points(points_per_axis: usize, margin: f32) -> Vec<Point2D> {
    let xs = linspace(margin, 1.0 - margin, points_per_axis);
    let ys = linspace(margin, 1.0 - margin, points_per_axis);
    ys.iter()
        .flat_map(|y| xs.iter().map(move |x| (*x, *y)))
        .collect()
}

pub struct CalibrationSettings {
    pub window_size: WindowSize,
    pub points_per_axis: usize,
    pub margin: f32,
    pub warmup_frames: usize,
    pub dwell_frames: usize,
    pub max_dwell_polls: Option<usize>,
    pub ack_flash: Duration,
}

impl From<&GazeConfig> for CalibrationSettings {
    fn from(config: &GazeConfig) -> Self {
        CalibrationSettings {
            window_size: config.window_size,
            points_per_axis: config.points_per_axis,
            margin: config.grid_margin,
            warmup_frames: config.warmup_frames,
            dwell_frames: config.dwell_frames,
            max_dwell_polls: config.max_dwell_polls,
            ack_flash: Duration::from_millis(config.ack_flash_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationOutcome {
    Completed { samples: usize, path: PathBuf },
    /// The user aborted; nothing was written
    Aborted,
}

/// Collects labelled samples for one target until its quota is met.
/// Frames without usable features do not count towards the quota.
pub struct DwellSampler {
    target_index: usize,
    target: Point2D,
    samples: Vec<CalibrationSample>,
    samples_remaining: usize,
    polls: usize,
    max_polls: Option<usize>,
}

impl DwellSampler {
    pub fn new(
        target_index: usize,
        target: Point2D,
        required_samples: usize,
        max_polls: Option<usize>,
    ) -> DwellSampler {
        DwellSampler {
            target_index,
            target,
            samples: Vec::with_capacity(required_samples),
            samples_remaining: required_samples,
            polls: 0,
            max_polls,
        }
    }

    /** Record the outcome of one capture poll; returns true once the quota is met.
     * Fails if the quota was not met within the allowed number of polls.
     */
    pub fn add_poll(&mut self, features: Option<FeatureVector>) -> Result<bool> {
        if self.is_complete() {
            return Ok(true);
        }
        self.polls += 1;

        if let Some(features) = features {
            self.samples
                .push(CalibrationSample::new(features, self.target));
            self.samples_remaining -= 1;
        }

        if self.is_complete() {
            debug!(
                "Target {} complete after {} polls",
                self.target_index + 1,
                self.polls
            );
            return Ok(true);
        }

        match self.max_polls {
            Some(max) if self.polls >= max => Err(GazeError::DwellTimeout {
                target: self.target_index + 1,
                polls: self.polls,
            }),
            _ => Ok(false),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.samples_remaining == 0
    }

    pub fn polls(&self) -> usize {
        self.polls
    }

    pub fn into_samples(self) -> Vec<CalibrationSample> {
        self.samples
    }
}

/// Drive the whole calibration session and write the dataset on success.
///
/// The session is consumed: capture, detector and display are released however this
/// returns. An abort discards everything collected so far and leaves `output_path`
/// untouched.
pub fn run_calibration<S, D, V>(
    mut session: Session<S, D, V>,
    settings: &CalibrationSettings,
    output_path: &Path,
) -> Result<CalibrationOutcome>
where
    S: FrameSource,
    D: LandmarkDetector<S::Frame>,
    V: Display<S::Frame>,
{
    if settings.points_per_axis == 0 {
        return Err(GazeError::InvalidConfig(
            "pointsPerAxis must be at least 1".into(),
        ));
    }
    if let Some(max) = settings.max_dwell_polls {
        if max == 0 || max < settings.dwell_frames {
            return Err(GazeError::InvalidConfig(format!(
                "maxDwellPolls ({}) cannot fit {} dwell samples",
                max, settings.dwell_frames
            )));
        }
    }

    let targets = grid_points(settings.points_per_axis, settings.margin);
    let WindowSize { width, height } = settings.window_size;
    let mut samples: Vec<CalibrationSample> =
        Vec::with_capacity(targets.len() * settings.dwell_frames);

    info!(
        "Calibration starting: {} targets, warmup {} frames, dwell {} samples",
        targets.len(),
        settings.warmup_frames,
        settings.dwell_frames
    );

    for (i, target) in targets.iter().enumerate() {
        let center = denormalise(*target, width, height);
        let progress = format!("Point {}/{}", i + 1, targets.len());
        debug!("{} at {:?} (pixels {:?})", progress, target, center);

        // Let the gaze settle on the new target before trusting any features
        let get_ready = Overlay::Target {
            center,
            label: format!("{} - get ready", progress),
        };
        for _ in 0..settings.warmup_frames {
            if let Some(frame) = session.capture.next_frame() {
                session.display.present(&frame, &get_ready);
            }
            if session.display.abort_requested() {
                info!("Calibration aborted during warmup of {}", progress);
                return Ok(CalibrationOutcome::Aborted);
            }
        }

        let hold_gaze = Overlay::Target {
            center,
            label: format!("{} - hold gaze", progress),
        };
        let mut sampler = DwellSampler::new(
            i,
            *target,
            settings.dwell_frames,
            settings.max_dwell_polls,
        );
        let mut complete = sampler.is_complete();
        while !complete {
            let features = match session.capture.next_frame() {
                Some(frame) => {
                    let features = session.extractor.extract(&frame);
                    session.display.present(&frame, &hold_gaze);
                    features.map(|(f, _debug)| f)
                }
                None => None,
            };
            complete = sampler.add_poll(features)?;
            if session.display.abort_requested() {
                info!("Calibration aborted during dwell of {}", progress);
                return Ok(CalibrationOutcome::Aborted);
            }
        }
        if sampler.polls() > settings.dwell_frames {
            warn!(
                "{} needed {} polls for {} samples",
                progress,
                sampler.polls(),
                settings.dwell_frames
            );
        }
        samples.extend(sampler.into_samples());

        flash_acknowledgement(&mut session, center, settings.ack_flash);
    }

    write_dataset(output_path, &samples)?;

    Ok(CalibrationOutcome::Completed {
        samples: samples.len(),
        path: output_path.to_path_buf(),
    })
}

fn flash_acknowledgement<S, D, V>(
    session: &mut Session<S, D, V>,
    center: Point2D,
    duration: Duration,
) where
    S: FrameSource,
    D: LandmarkDetector<S::Frame>,
    V: Display<S::Frame>,
{
    let overlay = Overlay::Acknowledge { center };
    let started = Instant::now();
    while started.elapsed() < duration {
        if let Some(frame) = session.capture.next_frame() {
            session.display.present(&frame, &overlay);
        }
    }
}
