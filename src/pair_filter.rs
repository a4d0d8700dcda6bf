//! 帧对过滤
//!
//! Drops frame pairs with too few raw matches or too few fundamental-matrix
//! inliers and compacts the survivors to their inlier matches.

use nalgebra::Point2;

use crate::config::TriangulationOptions;
use crate::geometry::FundamentalEstimator;
use crate::map::{Frame, FramePair};

const PROGRESS_STEP: usize = 100;

#[derive(Debug, Clone)]
pub struct PairFilter {
    pub min_raw_matches: usize,
    pub min_inlier_matches: usize,
    pub estimator: FundamentalEstimator,
}

impl Default for PairFilter {
    fn default() -> Self {
        Self::from_options(&TriangulationOptions::default())
    }
}

impl PairFilter {
    pub fn from_options(options: &TriangulationOptions) -> Self {
        Self {
            min_raw_matches: options.pair_min_raw_matches,
            min_inlier_matches: options.pair_min_inlier_matches,
            estimator: FundamentalEstimator {
                max_error: options.ransac_max_error_px,
                confidence: options.ransac_confidence,
                min_iterations: options.ransac_min_iterations,
                max_iterations: options.ransac_max_iterations,
                seed: options.ransac_seed,
            },
        }
    }

    /// Estimates the pair's geometry and keeps only its inliers. Returns
    /// `false` when the pair should be dropped. Match indices are expected to
    /// be valid for `frame1` and `frame2`.
    pub fn filter_pair(&self, pair: &mut FramePair, frame1: &Frame, frame2: &Frame) -> bool {
        if pair.matches.len() < self.min_raw_matches {
            log::debug!(
                "drop pair ({}, {}): {} raw matches",
                pair.id1,
                pair.id2,
                pair.matches.len()
            );
            return false;
        }

        let (points1, points2): (Vec<Point2<f64>>, Vec<Point2<f64>>) = pair
            .matches
            .iter()
            .map(|m| (frame1.points[m.idx1], frame2.points[m.idx2]))
            .unzip();
        let Some(geometry) = self.estimator.estimate(&points1, &points2) else {
            log::debug!("drop pair ({}, {}): degenerate geometry", pair.id1, pair.id2);
            return false;
        };
        if geometry.inlier_num < self.min_inlier_matches {
            log::debug!(
                "drop pair ({}, {}): {} inliers",
                pair.id1,
                pair.id2,
                geometry.inlier_num
            );
            return false;
        }

        pair.set_geometry(geometry);
        pair.retain_inliers();
        true
    }

    /// Filters every pair against `frames` (indexed by frame id) and returns
    /// the survivors in input order.
    pub fn filter_all(&self, pairs: Vec<FramePair>, frames: &[Frame]) -> Vec<FramePair> {
        let num_pairs = pairs.len();
        let mut kept = Vec::with_capacity(num_pairs);
        for (processed, mut pair) in pairs.into_iter().enumerate() {
            if processed % PROGRESS_STEP == 0 {
                log::info!("filter pairs: {}/{}", processed, num_pairs);
            }
            let (Some(frame1), Some(frame2)) = (frames.get(pair.id1), frames.get(pair.id2)) else {
                log::warn!("drop pair ({}, {}): unknown frame", pair.id1, pair.id2);
                continue;
            };
            if self.filter_pair(&mut pair, frame1, frame2) {
                kept.push(pair);
            }
        }
        log::info!("filter pairs done: {} of {} kept", kept.len(), num_pairs);
        kept
    }
}
