//! 全局BA
//!
//! Jointly refines registered poses, track positions and optionally the
//! pinhole intrinsics by minimizing the reprojection error.

mod minimizer;
mod problem;

pub use minimizer::{LevenbergMarquardtMinimizer, Minimizer, MinimizerReport};
pub use problem::ReprojectionProblem;

use crate::config::TriangulationOptions;
use crate::error::{Result, SfmError};
use crate::map::Map;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BundleAdjustmentSummary {
    pub num_residuals: usize,
    pub num_parameters: usize,
    pub num_free_poses: usize,
    pub num_free_points: usize,
    pub num_free_cameras: usize,
    /// RMS reprojection error (pixel) before and after.
    pub initial_rms: f64,
    pub final_rms: f64,
    pub evaluations: usize,
}

/// Builds the reprojection problem from the map, minimizes it and writes the
/// refined values back. The map is left untouched on error.
pub fn global_bundle_adjustment<M: Minimizer>(
    map: &mut Map,
    options: &TriangulationOptions,
    minimizer: &M,
) -> Result<BundleAdjustmentSummary> {
    let problem = ReprojectionProblem::from_map(map, options);
    let mut summary = BundleAdjustmentSummary {
        num_residuals: problem.num_residuals(),
        num_parameters: problem.num_parameters(),
        num_free_poses: problem.num_free_poses(),
        num_free_points: problem.num_free_points(),
        num_free_cameras: problem.num_free_cameras(),
        initial_rms: problem.rms_error(),
        ..Default::default()
    };
    if summary.num_residuals == 0 || summary.num_parameters == 0 {
        log::info!("skip bundle adjustment: nothing to refine");
        summary.final_rms = summary.initial_rms;
        return Ok(summary);
    }
    if summary.num_residuals < summary.num_parameters {
        log::warn!(
            "bundle adjustment has {} residuals for {} parameters",
            summary.num_residuals,
            summary.num_parameters
        );
    }

    log::info!(
        "bundle adjustment: {} poses, {} points, {} cameras, {} residuals, initial rms {:.4}",
        summary.num_free_poses,
        summary.num_free_points,
        summary.num_free_cameras,
        summary.num_residuals,
        summary.initial_rms
    );
    let (problem, report) = minimizer.minimize(problem);
    if !report.converged {
        return Err(SfmError::OptimizationDivergence(report.termination));
    }
    if !problem.params_are_finite() {
        return Err(SfmError::OptimizationDivergence(
            "non-finite parameters".to_string(),
        ));
    }

    problem.write_back(map);
    summary.final_rms = problem.rms_error();
    summary.evaluations = report.evaluations;
    log::info!(
        "bundle adjustment done: rms {:.4} -> {:.4}",
        summary.initial_rms,
        summary.final_rms
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global_types::Observation;
    use crate::test_scene::TestScene;
    use crate::utility::Utility;
    use nalgebra::Vector3;

    /// Tracks over every frame at slightly wrong positions.
    fn perturbed_map(scene: &TestScene) -> Map {
        let mut map = scene.map_with_full_matches();
        let num_frames = scene.poses.len();
        for (k, point) in scene.points.iter().enumerate() {
            let offset = Vector3::new(0.03, -0.02, 0.08) * if k % 2 == 0 { 1.0 } else { -1.0 };
            let observations: Vec<_> = (0..num_frames).map(|i| Observation::new(i, k)).collect();
            map.create_track(point + offset, &observations).unwrap();
        }
        map
    }

    struct GivingUp;

    impl Minimizer for GivingUp {
        fn minimize(&self, problem: ReprojectionProblem) -> (ReprojectionProblem, MinimizerReport) {
            let report = MinimizerReport {
                converged: false,
                evaluations: 1,
                objective: f64::NAN,
                termination: "Numerical(\"jacobian\")".to_string(),
            };
            (problem, report)
        }
    }

    #[test]
    fn test_points_only_recovers_truth() {
        let scene = TestScene::line_of_frames(3, 10);
        let mut map = perturbed_map(&scene);
        let options = TriangulationOptions {
            ba_refine_poses: false,
            ..Default::default()
        };
        let summary = global_bundle_adjustment(&mut map, &options, &LevenbergMarquardtMinimizer::default())
            .unwrap();
        assert_eq!(summary.num_free_poses, 0);
        assert_eq!(summary.num_free_points, 10);
        assert!(summary.final_rms < 1e-3);
        for (k, truth) in scene.points.iter().enumerate() {
            let track = map.track(k).unwrap();
            assert!((track.position - truth).norm() < 1e-4, "point {}", k);
        }
    }

    #[test]
    fn test_joint_refinement_reduces_error() {
        let scene = TestScene::line_of_frames(4, 15);
        let mut map = perturbed_map(&scene);
        let mut tcw = map.frame(2).unwrap().tcw;
        tcw.translation.vector += Vector3::new(0.02, 0.01, -0.02);
        map.set_frame_pose(2, tcw);
        let anchor = map.frame(0).unwrap().tcw;

        let options = TriangulationOptions::default();
        let summary = global_bundle_adjustment(&mut map, &options, &LevenbergMarquardtMinimizer::default())
            .unwrap();
        assert_eq!(summary.num_free_poses, 3);
        assert!(summary.final_rms < 0.1 * summary.initial_rms);
        assert!(summary.final_rms < 0.1);
        assert_eq!(map.frame(0).unwrap().tcw, anchor);
        map.check_consistency().unwrap();
    }

    #[test]
    fn test_divergence_leaves_map_untouched() {
        let scene = TestScene::line_of_frames(3, 10);
        let mut map = perturbed_map(&scene);
        let before: Vec<_> = map.tracks().iter().map(|track| track.position).collect();

        let result = global_bundle_adjustment(&mut map, &TriangulationOptions::default(), &GivingUp);
        assert!(matches!(result, Err(SfmError::OptimizationDivergence(_))));
        let after: Vec<_> = map.tracks().iter().map(|track| track.position).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_empty_problem_is_noop() {
        let scene = TestScene::line_of_frames(3, 4);
        let mut map = scene.map_with_full_matches();
        let summary = global_bundle_adjustment(&mut map, &TriangulationOptions::default(), &GivingUp).unwrap();
        assert_eq!(summary, BundleAdjustmentSummary::default());
    }

    #[test]
    fn test_unregistered_frames_stay_out() {
        let scene = TestScene::line_of_frames(3, 10);
        let mut map = perturbed_map(&scene);
        map.set_registered(2, false);
        let frozen = map.frame(2).unwrap().tcw;
        let options = TriangulationOptions::default();
        let problem = ReprojectionProblem::from_map(&map, &options);
        assert_eq!(problem.num_residuals(), 2 * 2 * 10);
        assert_eq!(problem.num_free_poses(), 1);

        global_bundle_adjustment(&mut map, &options, &LevenbergMarquardtMinimizer::default()).unwrap();
        assert_eq!(map.frame(2).unwrap().tcw, frozen);
        assert!(Utility::camera_center(&frozen).x > 1.9);
    }
}
