use std::collections::BTreeMap;

use nalgebra::Vector3;

use crate::global_types::{FrameId, KeypointIndex, Observation, TrackId};

/// An estimated 3D point and the keypoints believed to depict it.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: TrackId,
    pub position: Vector3<f64>,
    pub outlier: bool,
    /// frame id → keypoint index, one entry per frame. Only [`super::Map`] writes it.
    pub(super) observations: BTreeMap<FrameId, KeypointIndex>,
}

impl Track {
    pub(super) fn new(id: TrackId, position: Vector3<f64>) -> Self {
        Self {
            id,
            position,
            outlier: false,
            observations: BTreeMap::new(),
        }
    }

    /// Observations in ascending frame id order.
    pub fn observations(&self) -> impl Iterator<Item = Observation> + '_ {
        self.observations
            .iter()
            .map(|(frame_id, keypoint)| Observation::new(*frame_id, *keypoint))
    }

    #[inline]
    pub fn num_observations(&self) -> usize {
        self.observations.len()
    }

    #[inline]
    pub fn keypoint_in(&self, frame_id: FrameId) -> Option<KeypointIndex> {
        self.observations.get(&frame_id).copied()
    }

    #[inline]
    pub fn contains_frame(&self, frame_id: FrameId) -> bool {
        self.observations.contains_key(&frame_id)
    }

    /// True when some frame observes both tracks, so a union would break the
    /// one-observation-per-frame rule.
    pub fn shares_frame_with(&self, other: &Track) -> bool {
        let (small, large) = if self.observations.len() <= other.observations.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.observations.keys().any(|frame_id| large.contains_frame(*frame_id))
    }
}
