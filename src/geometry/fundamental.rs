//! Fundamental matrix RANSAC.
//!
//! Convention: `p2^T F p1 = 0` for a match `(p1, p2)` in pixel coordinates.

use itertools::Itertools;
use nalgebra::{DMatrix, Matrix3, Point2, Vector3};
use rand::{rngs::StdRng, seq::index, SeedableRng};

use super::common::normalize;
use crate::config::{
    RANSAC_CONFIDENCE, RANSAC_MAX_ERROR_PX, RANSAC_MAX_ITERATIONS, RANSAC_MIN_ITERATIONS,
};

mod consts {
    pub const MIN_SET_SIZE: usize = 8;
}

/// Result of a successful estimation.
#[derive(Debug, Clone)]
pub struct TwoViewGeometry {
    pub fundamental: Matrix3<f64>,
    pub inlier_mask: Vec<bool>,
    pub inlier_num: usize,
}

#[derive(Debug, Clone)]
pub struct FundamentalEstimator {
    /// Maximum point-to-epipolar-line distance (pixel) in both images.
    pub max_error: f64,
    pub confidence: f64,
    pub min_iterations: usize,
    pub max_iterations: usize,
    pub seed: u64,
}

impl Default for FundamentalEstimator {
    fn default() -> Self {
        Self {
            max_error: RANSAC_MAX_ERROR_PX,
            confidence: RANSAC_CONFIDENCE,
            min_iterations: RANSAC_MIN_ITERATIONS,
            max_iterations: RANSAC_MAX_ITERATIONS,
            seed: 0,
        }
    }
}

impl FundamentalEstimator {
    /// `points1[k]` and `points2[k]` form the k-th match. Returns `None` for
    /// too few matches or when no hypothesis gathers a minimal set of inliers.
    pub fn estimate(&self, points1: &[Point2<f64>], points2: &[Point2<f64>]) -> Option<TwoViewGeometry> {
        let num_matches = points1.len();
        if num_matches != points2.len() || num_matches < consts::MIN_SET_SIZE {
            return None;
        }

        // 0. Normalize keypoint coordinates
        let (normalized1, transform1) = normalize(points1);
        let (normalized2, transform2) = normalize(points2);
        let transform2_t = transform2.transpose();

        // 1. RANSAC loop
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut sample1 = vec![Point2::origin(); consts::MIN_SET_SIZE];
        let mut sample2 = vec![Point2::origin(); consts::MIN_SET_SIZE];
        let mut mask_in_sac = vec![false; num_matches];

        let mut best: Option<(usize, Matrix3<f64>, Vec<bool>)> = None;
        let mut required = self.max_iterations;
        let mut iteration = 0;
        while iteration < required.max(self.min_iterations).min(self.max_iterations) {
            iteration += 1;

            for (k, idx) in index::sample(&mut rng, num_matches, consts::MIN_SET_SIZE)
                .iter()
                .enumerate()
            {
                sample1[k] = normalized1[idx];
                sample2[k] = normalized2[idx];
            }
            let Some(normalized_f) = compute_fundamental(&sample1, &sample2) else {
                continue;
            };
            let fundamental = transform2_t * normalized_f * transform1;

            let inlier_num = self.update_inliers(&fundamental, points1, points2, &mut mask_in_sac);
            if inlier_num > best.as_ref().map_or(0, |(n, _, _)| *n) {
                required = self.required_iterations(inlier_num, num_matches);
                best = Some((inlier_num, fundamental, mask_in_sac.clone()));
            }
        }

        let (best_num, best_fundamental, best_mask) = best?;
        if best_num < consts::MIN_SET_SIZE {
            return None;
        }

        // 2. Recompute with all inliers, keep it if it does not lose support
        let (inliers1, inliers2): (Vec<_>, Vec<_>) = best_mask
            .iter()
            .enumerate()
            .filter(|(_, is_inlier)| **is_inlier)
            .map(|(i, _)| (normalized1[i], normalized2[i]))
            .unzip();
        if let Some(normalized_f) = compute_fundamental(&inliers1, &inliers2) {
            let fundamental = transform2_t * normalized_f * transform1;
            let inlier_num = self.update_inliers(&fundamental, points1, points2, &mut mask_in_sac);
            if inlier_num >= best_num {
                return Some(TwoViewGeometry {
                    fundamental,
                    inlier_mask: mask_in_sac,
                    inlier_num,
                });
            }
        }

        Some(TwoViewGeometry {
            fundamental: best_fundamental,
            inlier_mask: best_mask,
            inlier_num: best_num,
        })
    }

    fn update_inliers(
        &self,
        fundamental: &Matrix3<f64>,
        points1: &[Point2<f64>],
        points2: &[Point2<f64>],
        mask: &mut [bool],
    ) -> usize {
        let mut inlier_num = 0;
        for (k, (p1, p2)) in points1.iter().zip(points2).enumerate() {
            let (d1, d2) = symmetric_epipolar_distance(fundamental, p1, p2);
            mask[k] = d1 < self.max_error && d2 < self.max_error;
            if mask[k] {
                inlier_num += 1;
            }
        }
        inlier_num
    }

    /// Trials needed to draw one all-inlier sample with `confidence`.
    fn required_iterations(&self, inlier_num: usize, num_matches: usize) -> usize {
        let inlier_ratio = inlier_num as f64 / num_matches as f64;
        let p_no_outlier = 1.0 - inlier_ratio.powi(consts::MIN_SET_SIZE as i32);
        if p_no_outlier <= f64::EPSILON {
            return 0;
        }
        if p_no_outlier >= 1.0 - f64::EPSILON {
            return self.max_iterations;
        }
        let num = (1.0 - self.confidence).ln() / p_no_outlier.ln();
        if num.is_finite() && num >= 0.0 {
            (num.ceil() as usize).min(self.max_iterations)
        } else {
            self.max_iterations
        }
    }
}

/// Distances of `p1` to the epipolar line of `p2` in image 1 and of `p2` to
/// the epipolar line of `p1` in image 2.
pub fn symmetric_epipolar_distance(
    fundamental: &Matrix3<f64>,
    p1: &Point2<f64>,
    p2: &Point2<f64>,
) -> (f64, f64) {
    let p1 = p1.to_homogeneous();
    let p2 = p2.to_homogeneous();
    let line_in_2: Vector3<f64> = fundamental * p1;
    let line_in_1: Vector3<f64> = fundamental.transpose() * p2;
    let residual = p2.dot(&line_in_2);
    (
        line_distance(residual, &line_in_1),
        line_distance(residual, &line_in_2),
    )
}

#[inline]
fn line_distance(residual: f64, line: &Vector3<f64>) -> f64 {
    let norm = line.x.hypot(line.y);
    if norm > f64::EPSILON {
        residual.abs() / norm
    } else {
        f64::INFINITY
    }
}

/// Linear eight-point solution followed by the rank-2 projection.
fn compute_fundamental(points1: &[Point2<f64>], points2: &[Point2<f64>]) -> Option<Matrix3<f64>> {
    let num_points = points1.len();
    if num_points < consts::MIN_SET_SIZE {
        return None;
    }

    // zero rows keep V square when there are fewer than nine equations
    let mut matrix_a = DMatrix::<f64>::zeros(num_points.max(9), 9);
    for (i, (p1, p2)) in points1.iter().zip(points2).enumerate() {
        let p1 = p1.to_homogeneous().transpose();
        matrix_a.view_mut((i, 0), (1, 3)).copy_from(&(p2.x * p1));
        matrix_a.view_mut((i, 3), (1, 3)).copy_from(&(p2.y * p1));
        matrix_a.view_mut((i, 6), (1, 3)).copy_from(&p1);
    }

    let svd = matrix_a.svd(false, true);
    let v_t = svd.v_t?;
    let null_index = svd.singular_values.imin();
    let entries = v_t.row(null_index).iter().copied().collect_vec();
    let init_fundamental = Matrix3::from_row_slice(&entries);

    let mut svd = init_fundamental.svd(true, true);
    let smallest = svd.singular_values.imin();
    svd.singular_values[smallest] = 0.0;
    let fundamental = svd.recompose().ok()?;
    fundamental.iter().all(|v| v.is_finite()).then_some(fundamental)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utility::Utility;
    use nalgebra::Vector2;
    use rand::Rng;

    fn project(point: &Vector3<f64>) -> Point2<f64> {
        Point2::new(500.0 * point.x / point.z + 320.0, 500.0 * point.y / point.z + 240.0)
    }

    #[test]
    fn test_estimate_rejects_outliers() {
        let pose2 = Utility::pose_from_params(&Vector3::new(0.0, 0.08, 0.0), &Vector3::new(-1.0, 0.0, 0.2));
        let mut rng = StdRng::seed_from_u64(7);
        let mut points1 = Vec::new();
        let mut points2 = Vec::new();
        let mut is_outlier = Vec::new();
        for k in 0..80 {
            let point = Vector3::new(
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-1.5..1.5),
                rng.gen_range(4.0..8.0),
            );
            let p2 = pose2.transform_point(&point.into()).coords;
            let outlier = k % 5 == 0;
            let shift = if outlier { Vector2::new(0.0, 40.0) } else { Vector2::zeros() };
            points1.push(project(&point));
            points2.push(project(&p2) + shift);
            is_outlier.push(outlier);
        }

        let geometry = FundamentalEstimator::default()
            .estimate(&points1, &points2)
            .unwrap();
        assert_eq!(geometry.inlier_num, 64);
        for (k, outlier) in is_outlier.iter().enumerate() {
            assert_eq!(geometry.inlier_mask[k], !outlier, "match {}", k);
        }
        for k in 1..5 {
            let (d1, d2) = symmetric_epipolar_distance(&geometry.fundamental, &points1[k], &points2[k]);
            assert!(d1 < 1e-6 && d2 < 1e-6);
        }
    }

    #[test]
    fn test_estimate_too_few_matches() {
        let points = vec![Point2::new(1.0, 2.0); 7];
        assert!(FundamentalEstimator::default().estimate(&points, &points).is_none());
    }

    #[test]
    fn test_required_iterations() {
        let estimator = FundamentalEstimator::default();
        assert_eq!(estimator.required_iterations(100, 100), 0);
        let half = estimator.required_iterations(50, 100);
        assert!(half > 1000 && half < RANSAC_MAX_ITERATIONS);
        assert!(estimator.required_iterations(90, 100) < half);
    }
}
