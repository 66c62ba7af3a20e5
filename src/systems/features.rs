use serde::{Deserialize, Serialize};

use crate::{
    Point2D,
    devices::{LandmarkDetector, VideoFrame},
    geometry_utils::{centroid, distance_points, midpoint},
};

/// Face-mesh indices around each eye (corners, upper and lower lid)
pub const LEFT_EYE_INDICES: [usize; 4] = [33, 133, 159, 145];
pub const RIGHT_EYE_INDICES: [usize; 4] = [362, 263, 386, 374];

/// Keeps the inter-ocular divisor above zero
pub const INTEROCULAR_EPSILON: f32 = 1e-6;

/// `[leftX, leftY, rightX, rightY]`: each eye centre relative to the midpoint between the
/// eyes, in units of inter-ocular distance.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct FeatureVector(pub [f32; 4]);

impl FeatureVector {
    pub fn values(&self) -> &[f32; 4] {
        &self.0
    }

    pub fn to_f64(&self) -> [f64; 4] {
        self.0.map(f64::from)
    }
}

/// Pixel-space eye geometry, only for drawing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeDebug {
    pub left_center: Point2D,
    pub right_center: Point2D,
    pub midpoint: Point2D,
    pub interocular: f32,
}

fn eye_center(points: &[Point2D], indices: &[usize]) -> Option<Point2D> {
    let selected = indices
        .iter()
        .map(|i| points.get(*i).copied())
        .collect::<Option<Vec<Point2D>>>()?;
    centroid(&selected)
}

/// Normalise pixel-space face landmarks into a [`FeatureVector`]. Returns `None` when the
/// set is too short to contain both eye clusters.
pub fn features_from_points(points: &[Point2D]) -> Option<(FeatureVector, EyeDebug)> {
    let left = eye_center(points, &LEFT_EYE_INDICES)?;
    let right = eye_center(points, &RIGHT_EYE_INDICES)?;

    let interocular = distance_points(&left, &right) + INTEROCULAR_EPSILON;
    let mid = midpoint(&left, &right);

    let features = FeatureVector([
        (left.0 - mid.0) / interocular,
        (left.1 - mid.1) / interocular,
        (right.0 - mid.0) / interocular,
        (right.1 - mid.1) / interocular,
    ]);

    Some((
        features,
        EyeDebug {
            left_center: left,
            right_center: right,
            midpoint: mid,
            interocular,
        },
    ))
}

/// Runs the landmark detector on a frame and normalises the result.
pub struct FeatureExtractor<D> {
    detector: D,
}

impl<D> FeatureExtractor<D> {
    pub fn new(detector: D) -> Self {
        FeatureExtractor { detector }
    }

    /// `None` means "no usable face in this frame": skip it, it is not an error.
    pub fn extract<F>(&mut self, frame: &F) -> Option<(FeatureVector, EyeDebug)>
    where
        D: LandmarkDetector<F>,
        F: VideoFrame,
    {
        let landmarks = self.detector.detect(frame)?;
        let points = landmarks.to_pixels(frame.width(), frame.height());
        features_from_points(&points)
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 468 points with the eye clusters placed around the given centres
    pub fn face_points(left: Point2D, right: Point2D) -> Vec<Point2D> {
        let mut points = vec![(0.5, 0.5); 468];
        let offsets = [(-0.02, 0.), (0.02, 0.), (0., -0.01), (0., 0.01)];
        for (i, (dx, dy)) in LEFT_EYE_INDICES.iter().zip(offsets.iter()) {
            points[*i] = (left.0 + dx, left.1 + dy);
        }
        for (i, (dx, dy)) in RIGHT_EYE_INDICES.iter().zip(offsets.iter()) {
            points[*i] = (right.0 + dx, right.1 + dy);
        }
        points
    }

    fn assert_close(a: &FeatureVector, b: &FeatureVector) {
        for (x, y) in a.values().iter().zip(b.values().iter()) {
            assert!((x - y).abs() < 1e-4, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn test_level_eyes() {
        let points = face_points((100., 200.), (200., 200.));
        let (features, debug) = features_from_points(&points).unwrap();
        assert_close(&features, &FeatureVector([-0.5, 0., 0.5, 0.]));
        assert!((debug.left_center.0 - 100.).abs() < 1e-4);
        assert!((debug.midpoint.0 - 150.).abs() < 1e-4);
        assert!((debug.interocular - 100.).abs() < 1e-3);
    }

    #[test]
    fn test_scale_invariance() {
        let points = face_points((310., 240.), (372., 251.));
        let (base, _) = features_from_points(&points).unwrap();
        for k in [0.5_f32, 2.0, 3.7] {
            let scaled: Vec<Point2D> = points.iter().map(|(x, y)| (x * k, y * k)).collect();
            let (features, _) = features_from_points(&scaled).unwrap();
            assert_close(&features, &base);
        }
    }

    #[test]
    fn test_translation_invariance() {
        let points = face_points((310., 240.), (372., 251.));
        let (base, _) = features_from_points(&points).unwrap();
        let shifted: Vec<Point2D> = points.iter().map(|(x, y)| (x + 57., y - 31.)).collect();
        let (features, _) = features_from_points(&shifted).unwrap();
        assert_close(&features, &base);
    }

    #[test]
    fn test_coincident_eyes_stay_finite() {
        let points = face_points((50., 50.), (50., 50.));
        let (features, _) = features_from_points(&points).unwrap();
        assert!(features.values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_short_landmark_set_is_no_face() {
        let points = vec![(0., 0.); 100];
        assert!(features_from_points(&points).is_none());
    }
}
