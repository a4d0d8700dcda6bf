use nalgebra::Point2;

use crate::global_types::{CameraId, FrameId, KeypointIndex, Pose, TrackId};

/// A posed image with its keypoints.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: FrameId,
    pub name: String,
    pub camera_id: CameraId,
    /// 世界坐标系到相机坐标系的变换
    pub tcw: Pose,
    pub registered: bool,
    /// 关键点像素坐标
    pub points: Vec<Point2<f64>>,
    /// Parallel to `points`. Only [`super::Map`] writes it.
    pub(super) track_ids: Vec<Option<TrackId>>,
}

impl Frame {
    /// A registered frame with no keypoint assigned to a track yet.
    pub fn new(
        id: FrameId,
        name: impl Into<String>,
        camera_id: CameraId,
        tcw: Pose,
        points: Vec<Point2<f64>>,
    ) -> Self {
        let track_ids = vec![None; points.len()];
        Self {
            id,
            name: name.into(),
            camera_id,
            tcw,
            registered: true,
            points,
            track_ids,
        }
    }

    /// Fills an id missing from the feature input so frame ids stay dense.
    pub fn placeholder(id: FrameId) -> Self {
        Self {
            id,
            name: String::new(),
            camera_id: 0,
            tcw: Pose::identity(),
            registered: false,
            points: Vec::new(),
            track_ids: Vec::new(),
        }
    }

    #[inline]
    pub fn track_ids(&self) -> &[Option<TrackId>] {
        &self.track_ids
    }

    #[inline]
    pub fn track_id(&self, keypoint: KeypointIndex) -> Option<TrackId> {
        self.track_ids.get(keypoint).copied().flatten()
    }

    #[inline]
    pub fn num_keypoints(&self) -> usize {
        self.points.len()
    }

    /// 有效观测数量
    pub fn num_measurements(&self) -> usize {
        self.track_ids.iter().filter(|id| id.is_some()).count()
    }
}
