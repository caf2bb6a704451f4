use float_ord::FloatOrd;
use geo::{Area, Coord, LineString, MinimumRotatedRect, Polygon};
use imageproc::{geometric_transformations::Projection, point::Point};
use nalgebra::Matrix3;

use crate::RotatedRect;

pub(crate) fn to_geo_poly(points: &[Point<i32>]) -> Polygon<f32> {
    let points = points
        .iter()
        .map(|point| Coord {
            x: point.x as f32,
            y: point.y as f32,
        })
        .collect();
    Polygon::new(LineString::new(points), vec![])
}

/// Shoelace area of the closed polygon through `points`.
pub fn contour_area(points: &[Point<i32>]) -> f32 {
    if points.len() < 3 {
        return 0.0;
    }
    to_geo_poly(points).unsigned_area()
}

/// Drops every point sitting in the middle of a straight horizontal, vertical
/// or diagonal run, keeping only the run endpoints.
pub fn simplify_chain(points: &[Point<i32>]) -> Vec<Point<i32>> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }
    let step = |a: Point<i32>, b: Point<i32>| ((b.x - a.x).signum(), (b.y - a.y).signum());
    let simplified = (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let next = points[(i + 1) % n];
            step(prev, points[i]) != step(points[i], next)
        })
        .map(|i| points[i])
        .collect::<Vec<_>>();
    if simplified.is_empty() {
        points.to_vec()
    } else {
        simplified
    }
}

/// Smallest enclosing rectangle of the contour, in canonical form.
pub fn min_area_rect(points: &[Point<i32>]) -> Option<RotatedRect> {
    if points.len() < 3 {
        return None;
    }
    let rect = to_geo_poly(points).minimum_rotated_rect()?;
    canonical_rect(&rect)
}

pub(crate) fn canonical_rect(rect: &Polygon<f32>) -> Option<RotatedRect> {
    let coords = &rect.exterior().0;
    if coords.len() < 4 {
        return None;
    }
    let (p0, p1, p2) = (coords[0], coords[1], coords[2]);
    let mut width = (p1.x - p0.x).hypot(p1.y - p0.y);
    let mut height = (p2.x - p1.x).hypot(p2.y - p1.y);
    let mut angle = (p1.y - p0.y).atan2(p1.x - p0.x).to_degrees().rem_euclid(180.0);
    if angle >= 180.0 {
        angle = 0.0;
    }
    if angle >= 90.0 {
        angle -= 90.0;
        std::mem::swap(&mut width, &mut height);
    }
    let center = ((p0.x + p2.x) / 2.0, (p0.y + p2.y) / 2.0);
    if !(center.0.is_finite() && center.1.is_finite() && width.is_finite() && height.is_finite())
    {
        return None;
    }
    Some(RotatedRect {
        center,
        width,
        height,
        angle,
    })
}

/// Rounded corners of `rect`, starting at the bottom-most one (leftmost on ties)
/// and continuing in drawing order.
pub fn box_points(rect: &RotatedRect) -> [Point<i32>; 4] {
    let corners = rect.corners();
    let start = (0..4)
        .max_by_key(|&i| (FloatOrd(corners[i].1), FloatOrd(-corners[i].0)))
        .unwrap_or(0);
    std::array::from_fn(|i| {
        let (x, y) = corners[(start + i) % 4];
        Point::new(x.round() as i32, y.round() as i32)
    })
}

/// Affine rotation by `angle` degrees about `center` at unit scale, laid out
/// like OpenCV's `getRotationMatrix2D`: a positive angle turns the picture
/// counter-clockwise on screen, so an edge pointing along `angle` ends up
/// horizontal.
pub fn rotation_matrix(center: (f32, f32), angle: f32) -> Matrix3<f32> {
    let (beta, alpha) = angle.to_radians().sin_cos();
    let (cx, cy) = center;
    Matrix3::new(
        alpha,
        beta,
        (1.0 - alpha) * cx - beta * cy,
        -beta,
        alpha,
        beta * cx + (1.0 - alpha) * cy,
        0.0,
        0.0,
        1.0,
    )
}

pub(crate) fn translation_matrix(dx: f32, dy: f32) -> Matrix3<f32> {
    Matrix3::new(1.0, 0.0, dx, 0.0, 1.0, dy, 0.0, 0.0, 1.0)
}

pub(crate) fn to_projection(matrix: &Matrix3<f32>) -> Option<Projection> {
    Projection::from_matrix([
        matrix[(0, 0)],
        matrix[(0, 1)],
        matrix[(0, 2)],
        matrix[(1, 0)],
        matrix[(1, 1)],
        matrix[(1, 2)],
        matrix[(2, 0)],
        matrix[(2, 1)],
        matrix[(2, 2)],
    ])
}

/// Normalised 1D Gaussian taps for an odd `size`, with sigma derived from the
/// size as `0.3 * ((size - 1) * 0.5 - 1) + 0.8`.
pub fn gaussian_kernel(size: usize) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size / 2) as f32;
    let taps = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect::<Vec<_>>();
    let sum = taps.iter().sum::<f32>();
    taps.into_iter().map(|t| t / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn square(side: i32) -> Vec<Point<i32>> {
        vec![
            Point::new(0, 0),
            Point::new(side, 0),
            Point::new(side, side),
            Point::new(0, side),
        ]
    }

    #[test]
    fn square_area() {
        assert_eq!(contour_area(&square(10)), 100.0);
        assert_eq!(contour_area(&[Point::new(0, 0), Point::new(5, 5)]), 0.0);
    }

    #[test]
    fn chain_keeps_only_corners() {
        let mut points = Vec::new();
        for x in 0..4 {
            points.push(Point::new(x, 0));
        }
        for y in 0..4 {
            points.push(Point::new(4, y));
        }
        for x in (1..=4).rev() {
            points.push(Point::new(x, 4));
        }
        for y in (1..=4).rev() {
            points.push(Point::new(0, y));
        }
        let simplified = simplify_chain(&points);
        assert_eq!(
            simplified,
            vec![
                Point::new(0, 0),
                Point::new(4, 0),
                Point::new(4, 4),
                Point::new(0, 4)
            ]
        );
        assert_eq!(contour_area(&simplified), contour_area(&points));
    }

    #[test]
    fn axis_aligned_rect_is_canonical() {
        let points = vec![
            Point::new(10, 20),
            Point::new(50, 20),
            Point::new(50, 30),
            Point::new(10, 30),
        ];
        let rect = min_area_rect(&points).unwrap();
        assert!((rect.center.0 - 30.0).abs() < 1e-3);
        assert!((rect.center.1 - 25.0).abs() < 1e-3);
        let mut sides = [rect.width, rect.height];
        sides.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((sides[0] - 10.0).abs() < 1e-3);
        assert!((sides[1] - 40.0).abs() < 1e-3);
        assert!(rect.angle.abs() < 1e-3 || (rect.angle - 90.0).abs() < 1e-3);
        assert!((0.0..90.0).contains(&rect.angle));
    }

    #[test]
    fn tilted_rect_recovers_geometry() {
        let rect = RotatedRect {
            center: (100.0, 100.0),
            width: 60.0,
            height: 20.0,
            angle: 30.0,
        };
        let points = rect
            .corners()
            .iter()
            .map(|&(x, y)| Point::new(x.round() as i32, y.round() as i32))
            .collect::<Vec<_>>();
        let found = min_area_rect(&points).unwrap();
        assert!((0.0..90.0).contains(&found.angle));
        assert!((found.center.0 - 100.0).abs() < 1.0);
        assert!((found.center.1 - 100.0).abs() < 1.0);
        let (long, short) = if found.width >= found.height {
            (found.width, found.height)
        } else {
            (found.height, found.width)
        };
        assert!((long - 60.0).abs() < 2.0, "long side {long}");
        assert!((short - 20.0).abs() < 2.0, "short side {short}");
    }

    #[test]
    fn box_starts_at_bottom_corner() {
        let rect = RotatedRect {
            center: (50.0, 50.0),
            width: 20.0,
            height: 10.0,
            angle: 0.0,
        };
        let points = box_points(&rect);
        assert_eq!(points[0], Point::new(40, 55));
        assert!(points.iter().all(|p| p.y <= points[0].y));
    }

    #[test]
    fn rotation_levels_the_width_edge() {
        let center = (40.0, 60.0);
        let angle = 35.0_f32;
        let m = rotation_matrix(center, angle);
        let (sin, cos) = angle.to_radians().sin_cos();
        let tip = m * Vector3::new(center.0 + 10.0 * cos, center.1 + 10.0 * sin, 1.0);
        assert!((tip.x - (center.0 + 10.0)).abs() < 1e-3);
        assert!((tip.y - center.1).abs() < 1e-3);
        let fixed = m * Vector3::new(center.0, center.1, 1.0);
        assert!((fixed.x - center.0).abs() < 1e-3 && (fixed.y - center.1).abs() < 1e-3);
    }

    #[test]
    fn gaussian_taps_are_normalised() {
        let taps = gaussian_kernel(5);
        assert_eq!(taps.len(), 5);
        assert!((taps.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(taps[2] > taps[1] && taps[1] > taps[0]);
        assert!((taps[0] - taps[4]).abs() < 1e-6);
    }
}
