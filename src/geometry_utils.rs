use map_range::MapRange;

use crate::Point2D;

pub fn distance_points(a: &Point2D, b: &Point2D) -> f32 {
    let (x1, y1) = *a;
    let (x2, y2) = *b;

    f32::sqrt(f32::powi(x1 - x2, 2) + f32::powi(y1 - y2, 2))
}

pub fn centroid(points: &[Point2D]) -> Option<Point2D> {
    let count = points.len();
    points
        .iter()
        .cloned()
        .reduce(|acc, el| (acc.0 + el.0, acc.1 + el.1))
        .map(|(x, y)| (x / count as f32, y / count as f32))
}

pub fn midpoint(a: &Point2D, b: &Point2D) -> Point2D {
    ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0)
}

pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a * (1. - t) + (b * t)
}

/// Evenly spaced values over `[start, end]`, both ends included.
/// A single value yields just `start`, as with numpy's `linspace`.
pub fn linspace(start: f32, end: f32, count: usize) -> Vec<f32> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / (count - 1) as f32;
            (0..count)
                .map(|i| {
                    if i == count - 1 {
                        end
                    } else {
                        start + step * i as f32
                    }
                })
                .collect()
        }
    }
}

/// Scale a point in normalised `[0;1]` units into a `width` x `height` pixel space.
/// Values outside the unit range are extrapolated, not clamped.
pub fn denormalise(p: Point2D, width: u32, height: u32) -> Point2D {
    let (x, y) = p;
    (
        x.map_range(0. ..1., 0. ..width as f32),
        y.map_range(0. ..1., 0. ..height as f32),
    )
}
