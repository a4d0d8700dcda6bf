use itertools::Itertools;
use nalgebra::{Matrix3, Point2};

/// Shifts points to zero mean and scales them to unit mean absolute
/// deviation per axis. Returns the normalized points and the transform that
/// produced them.
pub fn normalize(points: &[Point2<f64>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    let num_points = points.len().max(1) as f64;

    let (sum_x, sum_y) = sum_tuple2(points.iter().map(|p| (p.x, p.y)));
    let (mean_x, mean_y) = (sum_x / num_points, sum_y / num_points);

    let mut normalized = points
        .iter()
        .map(|p| Point2::new(p.x - mean_x, p.y - mean_y))
        .collect_vec();

    let (dev_x, dev_y) = sum_tuple2(normalized.iter().map(|p| (p.x.abs(), p.y.abs())));
    let mean_l1_dev_x_inv = inverse_or_one(dev_x / num_points);
    let mean_l1_dev_y_inv = inverse_or_one(dev_y / num_points);

    for point in normalized.iter_mut() {
        point.x *= mean_l1_dev_x_inv;
        point.y *= mean_l1_dev_y_inv;
    }

    let transform = Matrix3::new(
        mean_l1_dev_x_inv,
        0.0,
        -mean_x * mean_l1_dev_x_inv,
        0.0,
        mean_l1_dev_y_inv,
        -mean_y * mean_l1_dev_y_inv,
        0.0,
        0.0,
        1.0,
    );

    (normalized, transform)
}

#[inline]
fn inverse_or_one(dev: f64) -> f64 {
    if dev > f64::EPSILON {
        1.0 / dev
    } else {
        1.0
    }
}

#[inline]
fn sum_tuple2<I>(iter: I) -> (f64, f64)
where
    I: Iterator<Item = (f64, f64)>,
{
    iter.fold((0.0, 0.0), |(x1, y1), (x2, y2)| (x1 + x2, y1 + y2))
}

#[test]
fn test_normalize() {
    let points = [
        Point2::new(10.0, 20.0),
        Point2::new(30.0, 20.0),
        Point2::new(10.0, 60.0),
        Point2::new(30.0, 60.0),
    ];
    let (normalized, transform) = normalize(&points);
    for (p, n) in points.iter().zip(&normalized) {
        let mapped = transform * p.to_homogeneous();
        assert!((mapped.x - n.x).abs() < 1e-12 && (mapped.y - n.y).abs() < 1e-12);
        assert!((n.x.abs() - 1.0).abs() < 1e-12 && (n.y.abs() - 1.0).abs() < 1e-12);
    }
}
