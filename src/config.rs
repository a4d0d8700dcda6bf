use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// 少于该数量原始匹配的帧对直接丢弃
pub const PAIR_MIN_RAW_MATCHES: usize = 30;
/// 基础矩阵估计后内点少于该数量的帧对丢弃
pub const PAIR_MIN_INLIER_MATCHES: usize = 30;
/// 重投影误差阈值 (pixel)
pub const REPROJECTION_THRESHOLD_PX: f64 = 8.0;

pub const RANSAC_MAX_ERROR_PX: f64 = 4.0;
pub const RANSAC_CONFIDENCE: f64 = 0.999;
pub const RANSAC_MIN_ITERATIONS: usize = 100;
pub const RANSAC_MAX_ITERATIONS: usize = 10000;

/// chi-squared value (p=0.05, n=2)
pub const BA_HUBER_THRESHOLD_PX: f64 = 2.447_651_936_039_436_4;

pub const DEFAULT_CONFIG_PATH: &str = "./config_tri.json";

/// Tunables of the whole run. Every field falls back to its default when
/// missing from the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangulationOptions {
    pub pair_min_raw_matches: usize,
    pub pair_min_inlier_matches: usize,

    pub ransac_max_error_px: f64,
    pub ransac_confidence: f64,
    pub ransac_min_iterations: usize,
    pub ransac_max_iterations: usize,
    pub ransac_seed: u64,

    pub reprojection_threshold_px: f64,
    /// 0 disables the check.
    pub min_triangulation_angle_deg: f64,

    pub ba_refine_poses: bool,
    pub ba_refine_points: bool,
    pub ba_refine_intrinsics: bool,
    /// `None` means plain least squares.
    pub ba_huber_threshold_px: Option<f64>,
    /// Evaluation budget factor of the minimizer, 0 keeps the engine default.
    pub ba_patience: usize,

    /// Rounds of triangulate → continue → merge → prune → BA.
    pub outer_iterations: usize,
}

impl Default for TriangulationOptions {
    fn default() -> Self {
        Self {
            pair_min_raw_matches: PAIR_MIN_RAW_MATCHES,
            pair_min_inlier_matches: PAIR_MIN_INLIER_MATCHES,
            ransac_max_error_px: RANSAC_MAX_ERROR_PX,
            ransac_confidence: RANSAC_CONFIDENCE,
            ransac_min_iterations: RANSAC_MIN_ITERATIONS,
            ransac_max_iterations: RANSAC_MAX_ITERATIONS,
            ransac_seed: 0,
            reprojection_threshold_px: REPROJECTION_THRESHOLD_PX,
            min_triangulation_angle_deg: 0.0,
            ba_refine_poses: true,
            ba_refine_points: true,
            ba_refine_intrinsics: false,
            ba_huber_threshold_px: Some(BA_HUBER_THRESHOLD_PX),
            ba_patience: 0,
            outer_iterations: 1,
        }
    }
}

/// Input/output locations plus options, read from `config_tri.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub reconstruction_path: PathBuf,
    pub feature_path: PathBuf,
    pub matches_path: PathBuf,
    pub output_path: PathBuf,
    #[serde(default)]
    pub options: TriangulationOptions,
}

impl RunConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let config = serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(config)
    }

    pub fn from_paths(
        reconstruction_path: impl Into<PathBuf>,
        feature_path: impl Into<PathBuf>,
        matches_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            reconstruction_path: reconstruction_path.into(),
            feature_path: feature_path.into(),
            matches_path: matches_path.into(),
            output_path: output_path.into(),
            options: TriangulationOptions::default(),
        }
    }
}
