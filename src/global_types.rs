use serde::{Deserialize, Serialize};

/// Dense frame index, stable for the whole run.
pub type FrameId = usize;
/// Dense track index. Retired tracks keep their id.
pub type TrackId = usize;
pub type CameraId = u32;
pub type KeypointIndex = usize;

/// World to camera rigid transform (Tcw).
pub type Pose = nalgebra::Isometry3<f64>;

/// One image measurement of a track: keypoint `keypoint` of frame `frame_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Observation {
    pub frame_id: FrameId,
    pub keypoint: KeypointIndex,
}

impl Observation {
    #[inline]
    pub fn new(frame_id: FrameId, keypoint: KeypointIndex) -> Self {
        Self { frame_id, keypoint }
    }
}

/// Keypoint index correspondence inside a frame pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub idx1: KeypointIndex,
    pub idx2: KeypointIndex,
}

impl Match {
    #[inline]
    pub fn new(idx1: KeypointIndex, idx2: KeypointIndex) -> Self {
        Self { idx1, idx2 }
    }
}

#[test]
fn test_observation_order() {
    let mut observations = vec![
        Observation::new(2, 0),
        Observation::new(0, 7),
        Observation::new(0, 3),
    ];
    observations.sort();
    assert_eq!(observations[0], Observation::new(0, 3));
    assert_eq!(observations[2], Observation::new(2, 0));
}
