//! Headless collaborators: recorded frames stand in for the camera and the landmark
//! detector, and a display that only logs what it would have drawn.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

use crate::{
    Point2D,
    devices::{Display, FrameSource, LandmarkDetector, LandmarkSet, Overlay, StopSignal, VideoFrame},
    error::Result,
    gaze_config::WindowSize,
};

/// One captured frame: its size and the face landmarks found in it (normalised units).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    pub width: u32,
    pub height: u32,
    pub landmarks: Option<Vec<Point2D>>,
}

impl VideoFrame for RecordedFrame {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

pub fn load_recording(path: &Path) -> Result<Vec<RecordedFrame>> {
    let bytes = fs::read(path)?;
    let frames: Vec<RecordedFrame> = rmp_serde::from_slice(&bytes)?;
    info!("Loaded recording of {} frames from {:?}", frames.len(), path);
    Ok(frames)
}

pub fn write_recording(path: &Path, frames: &[RecordedFrame]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, rmp_serde::to_vec_named(&frames)?)?;
    debug!("Wrote {} frames to {:?}", frames.len(), path);
    Ok(())
}

/// Plays back a recording in order. Once the frames run out every poll is a miss,
/// unless looping is enabled.
pub struct ReplayCapture {
    frames: Vec<RecordedFrame>,
    position: usize,
    looping: bool,
    requested_size: Option<WindowSize>,
    size_warned: bool,
    on_exhausted: Option<StopSignal>,
    frame_interval: Option<Duration>,
    last_delivered: Option<Instant>,
}

impl ReplayCapture {
    pub fn new(frames: Vec<RecordedFrame>) -> Self {
        ReplayCapture {
            frames,
            position: 0,
            looping: false,
            requested_size: None,
            size_warned: false,
            on_exhausted: None,
            frame_interval: None,
            last_delivered: None,
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(load_recording(path)?))
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// The size a camera would have been asked for; mismatches are logged once.
    pub fn requested_size(mut self, size: WindowSize) -> Self {
        self.requested_size = Some(size);
        self
    }

    /// Raise `signal` when a non-looping recording has no frames left.
    pub fn stop_when_exhausted(mut self, signal: &StopSignal) -> Self {
        self.on_exhausted = Some(signal.clone());
        self
    }

    /// Deliver frames no faster than `fps`, as a camera would.
    pub fn paced(mut self, fps: u32) -> Self {
        self.frame_interval = (fps > 0).then(|| Duration::from_secs_f64(1. / fps as f64));
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.len().saturating_sub(self.position)
    }
}

impl FrameSource for ReplayCapture {
    type Frame = RecordedFrame;

    fn next_frame(&mut self) -> Option<RecordedFrame> {
        if self.position >= self.frames.len() {
            if self.looping && !self.frames.is_empty() {
                trace!("Recording looped");
                self.position = 0;
            } else {
                if let Some(signal) = &self.on_exhausted {
                    if !signal.is_set() {
                        info!("Recording exhausted");
                        signal.request_stop();
                    }
                }
                return None;
            }
        }

        if let (Some(interval), Some(last)) = (self.frame_interval, self.last_delivered) {
            if let Some(wait) = interval.checked_sub(last.elapsed()) {
                thread::sleep(wait);
            }
        }
        self.last_delivered = Some(Instant::now());

        let frame = self.frames[self.position].clone();
        self.position += 1;

        if let Some(size) = self.requested_size {
            if !self.size_warned && (frame.width != size.width || frame.height != size.height) {
                warn!(
                    "Requested {}x{} but frames are {}x{}",
                    size.width, size.height, frame.width, frame.height
                );
                self.size_warned = true;
            }
        }
        Some(frame)
    }

    fn release(&mut self) {
        debug!("Replay released at frame {}/{}", self.position, self.frames.len());
    }
}

/// Detector that hands back the landmarks stored with each recorded frame.
#[derive(Debug, Default)]
pub struct RecordedLandmarks {
    detections: usize,
}

impl RecordedLandmarks {
    pub fn new() -> Self {
        RecordedLandmarks::default()
    }
}

impl LandmarkDetector<RecordedFrame> for RecordedLandmarks {
    fn detect(&mut self, frame: &RecordedFrame) -> Option<LandmarkSet> {
        let points = frame.landmarks.clone()?;
        self.detections += 1;
        Some(LandmarkSet::new(points))
    }

    fn close(&mut self) {
        debug!("Recorded landmarks closed after {} detections", self.detections);
    }
}

/// Display without a window: overlays go to the log. Aborts when `stop` is raised or
/// after `frame_limit` frames.
pub struct LogDisplay {
    stop: StopSignal,
    frame_limit: Option<usize>,
    presented: usize,
}

impl LogDisplay {
    pub fn new(stop: &StopSignal, frame_limit: Option<usize>) -> Self {
        LogDisplay {
            stop: stop.clone(),
            frame_limit,
            presented: 0,
        }
    }

    pub fn presented(&self) -> usize {
        self.presented
    }
}

impl<F: VideoFrame> Display<F> for LogDisplay {
    fn present(&mut self, frame: &F, overlay: &Overlay) {
        self.presented += 1;
        match overlay {
            Overlay::None => trace!("Frame {}: raw", self.presented),
            Overlay::Target { center, label } => {
                trace!("Frame {}: {} at {:?}", self.presented, label, center)
            }
            Overlay::Acknowledge { center } => {
                trace!("Frame {}: captured {:?}", self.presented, center)
            }
            Overlay::Gaze {
                prediction,
                left_eye,
                right_eye,
            } => debug!(
                "Frame {} ({}x{}): gaze {:?}, eyes {:?} {:?}",
                self.presented,
                frame.width(),
                frame.height(),
                prediction,
                left_eye,
                right_eye
            ),
        }
    }

    fn abort_requested(&mut self) -> bool {
        self.stop.is_set() || self.frame_limit.is_some_and(|limit| self.presented >= limit)
    }

    fn close(&mut self) {
        info!("Display closed after {} frames", self.presented);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(face: bool) -> RecordedFrame {
        RecordedFrame {
            width: 640,
            height: 480,
            landmarks: face.then(|| vec![(0.5, 0.5); 4]),
        }
    }

    #[test]
    fn test_replay_in_order_then_misses() {
        let mut capture = ReplayCapture::new(vec![frame(true), frame(false)]);
        assert_eq!(capture.next_frame(), Some(frame(true)));
        assert_eq!(capture.remaining(), 1);
        assert_eq!(capture.next_frame(), Some(frame(false)));
        assert_eq!(capture.next_frame(), None);
        assert_eq!(capture.next_frame(), None);
    }

    #[test]
    fn test_replay_loops() {
        let mut capture = ReplayCapture::new(vec![frame(true), frame(false)]).looping(true);
        for _ in 0..5 {
            assert!(capture.next_frame().is_some());
        }
        assert!(ReplayCapture::new(Vec::new()).looping(true).next_frame().is_none());
    }

    #[test]
    fn test_paced_replay_waits_between_frames() {
        let mut capture = ReplayCapture::new(vec![frame(true); 3]).paced(100);
        let started = Instant::now();
        for _ in 0..3 {
            capture.next_frame();
        }
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_exhaustion_raises_stop() {
        let stop = StopSignal::new();
        let mut capture = ReplayCapture::new(vec![frame(true)]).stop_when_exhausted(&stop);
        capture.next_frame();
        assert!(!stop.is_set());
        capture.next_frame();
        assert!(stop.is_set());
    }

    #[test]
    fn test_recorded_landmarks_follow_frames() {
        let mut detector = RecordedLandmarks::new();
        assert_eq!(
            detector.detect(&frame(true)),
            Some(LandmarkSet::new(vec![(0.5, 0.5); 4]))
        );
        assert_eq!(detector.detect(&frame(false)), None);
    }

    #[test]
    fn test_log_display_aborts_on_limit_or_stop() {
        let stop = StopSignal::new();
        let mut display = LogDisplay::new(&stop, Some(2));
        display.present(&frame(true), &Overlay::None);
        assert!(!Display::<RecordedFrame>::abort_requested(&mut display));
        display.present(&frame(true), &Overlay::None);
        assert_eq!(display.presented(), 2);
        assert!(Display::<RecordedFrame>::abort_requested(&mut display));

        let mut unlimited = LogDisplay::new(&stop, None);
        assert!(!Display::<RecordedFrame>::abort_requested(&mut unlimited));
        stop.request_stop();
        assert!(Display::<RecordedFrame>::abort_requested(&mut unlimited));
    }

    #[test]
    fn test_recording_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rec").join("session.msgpack");
        let frames = vec![frame(true), frame(false), frame(true)];
        write_recording(&path, &frames).unwrap();

        let mut capture = ReplayCapture::open(&path).unwrap();
        assert_eq!(capture.remaining(), 3);
        assert_eq!(capture.next_frame(), Some(frames[0].clone()));
    }
}
