//! 匹配图
//!
//! `(frame, keypoint) → [(pair, sibling frame, sibling keypoint)]`, built once
//! from the inlier matches of the surviving frame pairs.

use super::{Frame, FramePair};
use crate::global_types::{FrameId, KeypointIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correspondence {
    /// Index into the map's frame pairs.
    pub pair_index: usize,
    pub frame_id: FrameId,
    pub keypoint: KeypointIndex,
}

#[derive(Debug, Clone, Default)]
pub struct CorrespondenceGraph {
    /// frame id → keypoint index → siblings
    correspondences: Vec<Vec<Vec<Correspondence>>>,
}

impl CorrespondenceGraph {
    /// Matches with out-of-range frames or keypoints are expected to be
    /// rejected before this point and are ignored here.
    pub fn build(frames: &[Frame], frame_pairs: &[FramePair]) -> Self {
        let mut correspondences: Vec<Vec<Vec<Correspondence>>> = frames
            .iter()
            .map(|frame| vec![Vec::new(); frame.num_keypoints()])
            .collect();

        for (pair_index, pair) in frame_pairs.iter().enumerate() {
            for m in pair.inlier_matches() {
                let valid = correspondences
                    .get(pair.id1)
                    .map_or(false, |kps| m.idx1 < kps.len())
                    && correspondences
                        .get(pair.id2)
                        .map_or(false, |kps| m.idx2 < kps.len());
                if !valid {
                    continue;
                }
                correspondences[pair.id1][m.idx1].push(Correspondence {
                    pair_index,
                    frame_id: pair.id2,
                    keypoint: m.idx2,
                });
                correspondences[pair.id2][m.idx2].push(Correspondence {
                    pair_index,
                    frame_id: pair.id1,
                    keypoint: m.idx1,
                });
            }
        }

        Self { correspondences }
    }

    /// Keypoints in other frames matched to `(frame_id, keypoint)`.
    pub fn siblings(&self, frame_id: FrameId, keypoint: KeypointIndex) -> &[Correspondence] {
        self.correspondences
            .get(frame_id)
            .and_then(|kps| kps.get(keypoint))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn num_correspondences(&self, frame_id: FrameId) -> usize {
        self.correspondences
            .get(frame_id)
            .map_or(0, |kps| kps.iter().map(Vec::len).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global_types::{Match, Pose};
    use nalgebra::Point2;

    fn frame(id: FrameId, num_points: usize) -> Frame {
        Frame::new(id, format!("{id}.png"), 0, Pose::identity(), vec![Point2::origin(); num_points])
    }

    #[test]
    fn test_build_and_lookup() {
        let frames = vec![frame(0, 3), frame(1, 3), frame(2, 3)];
        let mut pair01 = FramePair::new(0, 1, vec![Match::new(0, 2), Match::new(1, 1)]);
        pair01.inlier_mask[1] = false;
        let pair12 = FramePair::new(1, 2, vec![Match::new(2, 0)]);
        let graph = CorrespondenceGraph::build(&frames, &[pair01, pair12]);

        assert_eq!(
            graph.siblings(0, 0),
            &[Correspondence { pair_index: 0, frame_id: 1, keypoint: 2 }]
        );
        // (1, 2) is matched into both neighbours
        let siblings: Vec<_> = graph.siblings(1, 2).iter().map(|c| c.frame_id).collect();
        assert_eq!(siblings, vec![0, 2]);
        // outlier match is not indexed
        assert!(graph.siblings(0, 1).is_empty());
        assert!(graph.siblings(7, 0).is_empty());
        assert_eq!(graph.num_correspondences(1), 2);
    }
}
