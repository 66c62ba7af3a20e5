use log::trace;

use crate::{Point2D, geometry_utils::lerp};

/// Exponential moving average over predicted gaze points, in normalised units.
/// The first value after construction is taken as-is.
#[derive(Debug, Clone)]
pub struct GazeSmoother {
    factor: f32,
    current: Option<Point2D>,
}

impl GazeSmoother {
    pub fn new(factor: f32) -> Self {
        GazeSmoother {
            factor: factor.clamp(f32::EPSILON, 1.),
            current: None,
        }
    }

    pub fn update(&mut self, raw: Point2D) -> Point2D {
        let next = match self.current {
            None => raw,
            Some((x, y)) => (lerp(x, raw.0, self.factor), lerp(y, raw.1, self.factor)),
        };
        trace!("Smoothed {:?} -> {:?}", raw, next);
        self.current = Some(next);
        next
    }

    pub fn current(&self) -> Option<Point2D> {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_is_identity() {
        let mut smoother = GazeSmoother::new(0.25);
        assert_eq!(smoother.current(), None);
        assert_eq!(smoother.update((0.7, 0.2)), (0.7, 0.2));
        assert_eq!(smoother.current(), Some((0.7, 0.2)));
    }

    #[test]
    fn test_moves_a_quarter_of_the_way() {
        let mut smoother = GazeSmoother::new(0.25);
        smoother.update((0., 0.));
        let (x, y) = smoother.update((1., -1.));
        assert!((x - 0.25).abs() < 1e-6);
        assert!((y + 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_converges_on_constant_input() {
        let mut smoother = GazeSmoother::new(0.25);
        smoother.update((0.1, 0.9));
        let mut last = (0.1, 0.9);
        for _ in 0..60 {
            last = smoother.update((0.5, 0.5));
        }
        assert!((last.0 - 0.5).abs() < 1e-6 && (last.1 - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_factor_one_follows_input() {
        let mut smoother = GazeSmoother::new(1.);
        smoother.update((0.1, 0.1));
        assert_eq!(smoother.update((0.6, 0.4)), (0.6, 0.4));
    }
}
