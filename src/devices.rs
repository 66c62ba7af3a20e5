//! Seams to the outside world: capture device, landmark detector and display window.
//!
//! None of these are implemented by the pipeline itself. Backends (or the replay
//! implementations in [`crate::replay`], or test fakes) plug in here, and a [`Session`]
//! owns them for the lifetime of one calibration or realtime loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{Point2D, systems::features::FeatureExtractor};

/// Anything a capture device delivers; the pipeline only needs its dimensions.
pub trait VideoFrame {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

pub trait FrameSource {
    type Frame: VideoFrame;

    /// Poll for the next frame. `None` is a transient miss, not the end of the stream.
    fn next_frame(&mut self) -> Option<Self::Frame>;

    fn release(&mut self) {}
}

/// Face landmarks for one frame, in normalised `[0;1]` image units.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct LandmarkSet {
    pub points: Vec<Point2D>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point2D>) -> Self {
        LandmarkSet { points }
    }

    pub fn to_pixels(&self, width: u32, height: u32) -> Vec<Point2D> {
        let (w, h) = (width as f32, height as f32);
        self.points.iter().map(|(x, y)| (x * w, y * h)).collect()
    }
}

pub trait LandmarkDetector<F> {
    /// At most one face; `None` when no face was found.
    fn detect(&mut self, frame: &F) -> Option<LandmarkSet>;

    fn close(&mut self) {}
}

/// What to draw on top of a frame. Pixel coordinates are in window space.
#[derive(Debug, Clone, PartialEq)]
pub enum Overlay {
    /// Raw frame, nothing drawn
    None,
    Target {
        center: Point2D,
        label: String,
    },
    Acknowledge {
        center: Point2D,
    },
    Gaze {
        prediction: Point2D,
        left_eye: Point2D,
        right_eye: Point2D,
    },
}

pub trait Display<F> {
    fn present(&mut self, frame: &F, overlay: &Overlay);

    /// Polled once per loop iteration, after presenting.
    fn abort_requested(&mut self) -> bool;

    fn close(&mut self) {}
}

/// Stop request that a launcher can raise from another thread.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        StopSignal::default()
    }

    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Exclusive ownership of the collaborators for one loop. Dropping the session releases
/// the capture device, closes the detector and closes the display, whichever way the
/// loop ended.
pub struct Session<S, D, V>
where
    S: FrameSource,
    D: LandmarkDetector<S::Frame>,
    V: Display<S::Frame>,
{
    pub capture: S,
    pub extractor: FeatureExtractor<D>,
    pub display: V,
}

impl<S, D, V> Session<S, D, V>
where
    S: FrameSource,
    D: LandmarkDetector<S::Frame>,
    V: Display<S::Frame>,
{
    pub fn new(capture: S, detector: D, display: V) -> Self {
        Session {
            capture,
            extractor: FeatureExtractor::new(detector),
            display,
        }
    }
}

impl<S, D, V> Drop for Session<S, D, V>
where
    S: FrameSource,
    D: LandmarkDetector<S::Frame>,
    V: Display<S::Frame>,
{
    fn drop(&mut self) {
        debug!("Releasing capture, detector and display");
        self.capture.release();
        LandmarkDetector::<S::Frame>::close(self.extractor.detector_mut());
        self.display.close();
    }
}
