use nalgebra::Matrix3;

use crate::geometry::TwoViewGeometry;
use crate::global_types::{FrameId, Match};

/// Correspondences between two frames plus their two-view geometry.
#[derive(Debug, Clone)]
pub struct FramePair {
    pub id1: FrameId,
    pub id2: FrameId,
    pub matches: Vec<Match>,
    /// 与 `matches` 等长
    pub inlier_mask: Vec<bool>,
    pub inlier_num: usize,
    /// `p2^T F p1 = 0`, zero until estimated.
    pub fundamental: Matrix3<f64>,
}

impl FramePair {
    /// Raw pair: every match is provisionally an inlier.
    pub fn new(id1: FrameId, id2: FrameId, matches: Vec<Match>) -> Self {
        let num_matches = matches.len();
        Self {
            id1,
            id2,
            matches,
            inlier_mask: vec![true; num_matches],
            inlier_num: num_matches,
            fundamental: Matrix3::zeros(),
        }
    }

    pub fn set_geometry(&mut self, geometry: TwoViewGeometry) {
        debug_assert_eq!(geometry.inlier_mask.len(), self.matches.len());
        self.inlier_mask = geometry.inlier_mask;
        self.inlier_num = geometry.inlier_num;
        self.fundamental = geometry.fundamental;
    }

    /// Drops outlier matches; the mask becomes all-true.
    pub fn retain_inliers(&mut self) {
        let matches = std::mem::take(&mut self.matches);
        self.matches = matches
            .into_iter()
            .zip(&self.inlier_mask)
            .filter_map(|(m, is_inlier)| is_inlier.then_some(m))
            .collect();
        self.inlier_num = self.matches.len();
        self.inlier_mask = vec![true; self.inlier_num];
    }

    pub fn inlier_matches(&self) -> impl Iterator<Item = &Match> + '_ {
        self.matches
            .iter()
            .zip(&self.inlier_mask)
            .filter_map(|(m, is_inlier)| is_inlier.then_some(m))
    }
}
