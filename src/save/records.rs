use serde::{Deserialize, Serialize};

use crate::global_types::{CameraId, FrameId, KeypointIndex, TrackId};
use crate::map::Map;

/// One non-outlier track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRow {
    pub id: TrackId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub num_observations: usize,
    /// pixel
    pub mean_reprojection_error: f64,
}

/// One registered frame, pose as world→camera `qvec = [w, x, y, z]` and `tvec`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRow {
    pub id: FrameId,
    pub name: String,
    pub camera_id: CameraId,
    pub qw: f64,
    pub qx: f64,
    pub qy: f64,
    pub qz: f64,
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRow {
    pub track_id: TrackId,
    pub frame_id: FrameId,
    pub keypoint: KeypointIndex,
}

impl PointRow {
    pub fn collect(map: &Map) -> Vec<Self> {
        map.inlier_tracks()
            .map(|track| {
                let errors: Vec<f64> = track
                    .observations()
                    .filter_map(|observation| map.reprojection_error(&track.position, observation))
                    .collect();
                let mean_reprojection_error = if errors.is_empty() {
                    0.0
                } else {
                    errors.iter().sum::<f64>() / errors.len() as f64
                };
                Self {
                    id: track.id,
                    x: track.position.x,
                    y: track.position.y,
                    z: track.position.z,
                    num_observations: track.num_observations(),
                    mean_reprojection_error,
                }
            })
            .collect()
    }
}

impl ImageRow {
    pub fn collect(map: &Map) -> Vec<Self> {
        map.registered_frames()
            .map(|frame| {
                let q = frame.tcw.rotation.quaternion();
                let t = frame.tcw.translation.vector;
                Self {
                    id: frame.id,
                    name: frame.name.clone(),
                    camera_id: frame.camera_id,
                    qw: q.w,
                    qx: q.i,
                    qy: q.j,
                    qz: q.k,
                    tx: t.x,
                    ty: t.y,
                    tz: t.z,
                }
            })
            .collect()
    }
}

impl TrackRow {
    pub fn collect(map: &Map) -> Vec<Self> {
        map.inlier_tracks()
            .flat_map(|track| {
                track.observations().map(move |observation| Self {
                    track_id: track.id,
                    frame_id: observation.frame_id,
                    keypoint: observation.keypoint,
                })
            })
            .collect()
    }
}
