//! 重投影误差最小二乘问题
//!
//! Parameter layout: `[poses (rotation vector, translation) | points | fx fy cx cy]`.
//! Blocks held constant have no offset and keep their map values.

use std::collections::HashMap;

use itertools::Itertools;
use levenberg_marquardt::LeastSquaresProblem;
use nalgebra::{DMatrix, DVector, Dyn, Owned, Point2, Point3, Vector2, Vector3};

use crate::camera::{CameraTrait, PinholeCamera};
use crate::config::TriangulationOptions;
use crate::global_types::{CameraId, FrameId, Pose, TrackId};
use crate::map::Map;
use crate::utility::Utility;

const MIN_DEPTH: f64 = 1e-6;
/// Constant residual of a point that fell behind its camera.
const BEHIND_CAMERA_RESIDUAL: f64 = 100.0;

#[derive(Debug, Clone, Copy)]
struct ResidualBlock {
    pose: usize,
    point: usize,
    camera: usize,
    observed: Point2<f64>,
}

#[derive(Debug, Clone)]
pub struct ReprojectionProblem {
    blocks: Vec<ResidualBlock>,

    frame_ids: Vec<FrameId>,
    poses: Vec<Pose>,
    pose_offsets: Vec<Option<usize>>,

    track_ids: Vec<TrackId>,
    points: Vec<Vector3<f64>>,
    point_offsets: Vec<Option<usize>>,

    camera_ids: Vec<CameraId>,
    cameras: Vec<PinholeCamera>,
    camera_offsets: Vec<Option<usize>>,

    num_params: usize,
    huber_threshold: Option<f64>,
}

impl ReprojectionProblem {
    /// One residual block per observation of a non-outlier track in a
    /// registered frame. The lowest-id frame keeps its pose.
    pub fn from_map(map: &Map, options: &TriangulationOptions) -> Self {
        let mut raw_blocks = Vec::new();
        for track in map.inlier_tracks() {
            for observation in track.observations() {
                let Some(frame) = map.frame(observation.frame_id) else {
                    continue;
                };
                if !frame.registered || map.camera(frame.camera_id).is_none() {
                    continue;
                }
                let Some(observed) = frame.points.get(observation.keypoint) else {
                    continue;
                };
                raw_blocks.push((frame.id, track.id, frame.camera_id, *observed));
            }
        }

        let frame_ids = raw_blocks.iter().map(|b| b.0).sorted().dedup().collect_vec();
        let track_ids = raw_blocks.iter().map(|b| b.1).sorted().dedup().collect_vec();
        let camera_ids = raw_blocks.iter().map(|b| b.2).sorted().dedup().collect_vec();
        let slots = |ids: &[usize]| -> HashMap<usize, usize> {
            ids.iter().enumerate().map(|(slot, id)| (*id, slot)).collect()
        };
        let frame_slots = slots(frame_ids.as_slice());
        let track_slots = slots(track_ids.as_slice());
        let camera_slots: HashMap<CameraId, usize> = camera_ids
            .iter()
            .enumerate()
            .map(|(slot, id)| (*id, slot))
            .collect();

        let blocks = raw_blocks
            .iter()
            .map(|(frame_id, track_id, camera_id, observed)| ResidualBlock {
                pose: frame_slots[frame_id],
                point: track_slots[track_id],
                camera: camera_slots[camera_id],
                observed: *observed,
            })
            .collect();

        let mut num_params = 0;
        let pose_offsets = (0..frame_ids.len())
            .map(|slot| allocate(&mut num_params, options.ba_refine_poses && slot > 0, 6))
            .collect();
        let point_offsets = (0..track_ids.len())
            .map(|_| allocate(&mut num_params, options.ba_refine_points, 3))
            .collect();
        let camera_offsets = (0..camera_ids.len())
            .map(|_| allocate(&mut num_params, options.ba_refine_intrinsics, 4))
            .collect();

        Self {
            blocks,
            poses: frame_ids
                .iter()
                .filter_map(|id| map.frame(*id).map(|frame| frame.tcw))
                .collect(),
            frame_ids,
            pose_offsets,
            points: track_ids
                .iter()
                .filter_map(|id| map.track(*id).map(|track| track.position))
                .collect(),
            track_ids,
            point_offsets,
            cameras: camera_ids
                .iter()
                .filter_map(|id| map.camera(*id).cloned())
                .collect(),
            camera_ids,
            camera_offsets,
            num_params,
            huber_threshold: options.ba_huber_threshold_px,
        }
    }

    #[inline]
    pub fn num_residuals(&self) -> usize {
        2 * self.blocks.len()
    }

    #[inline]
    pub fn num_parameters(&self) -> usize {
        self.num_params
    }

    pub fn num_free_poses(&self) -> usize {
        self.pose_offsets.iter().flatten().count()
    }

    pub fn num_free_points(&self) -> usize {
        self.point_offsets.iter().flatten().count()
    }

    pub fn num_free_cameras(&self) -> usize {
        self.camera_offsets.iter().flatten().count()
    }

    /// Unweighted RMS reprojection error (pixel) over the blocks in front of
    /// their camera.
    pub fn rms_error(&self) -> f64 {
        let (sum, count) = self
            .blocks
            .iter()
            .filter_map(|block| self.raw_residual(block))
            .fold((0.0, 0usize), |(sum, count), r| (sum + r.norm_squared(), count + 1));
        if count == 0 {
            0.0
        } else {
            (sum / count as f64).sqrt()
        }
    }

    /// Copies the refined blocks into the map.
    pub fn write_back(&self, map: &mut Map) {
        for (slot, frame_id) in self.frame_ids.iter().enumerate() {
            if self.pose_offsets[slot].is_some() {
                map.set_frame_pose(*frame_id, self.poses[slot]);
            }
        }
        for (slot, track_id) in self.track_ids.iter().enumerate() {
            if self.point_offsets[slot].is_some() {
                map.set_track_position(*track_id, self.points[slot]);
            }
        }
        for (slot, camera_id) in self.camera_ids.iter().enumerate() {
            if self.camera_offsets[slot].is_some() {
                map.set_camera_intrinsics(*camera_id, self.cameras[slot].intrinsics());
            }
        }
    }

    pub fn params_are_finite(&self) -> bool {
        self.params().iter().all(|v| v.is_finite())
    }

    #[inline]
    fn camera_point(&self, block: &ResidualBlock) -> Vector3<f64> {
        self.poses[block.pose]
            .transform_point(&Point3::from(self.points[block.point]))
            .coords
    }

    /// `projection - observed`, `None` behind the camera.
    fn raw_residual(&self, block: &ResidualBlock) -> Option<Vector2<f64>> {
        let p_c = self.camera_point(block);
        if p_c.z < MIN_DEPTH {
            return None;
        }
        Some(self.cameras[block.camera].space_to_plane(&p_c) - block.observed)
    }

    /// Huber as iteratively reweighted least squares.
    #[inline]
    fn sqrt_weight(&self, error: f64) -> f64 {
        match self.huber_threshold {
            Some(delta) if error > delta => (delta / error).sqrt(),
            _ => 1.0,
        }
    }
}

#[inline]
fn allocate(num_params: &mut usize, free: bool, size: usize) -> Option<usize> {
    if !free {
        return None;
    }
    let offset = *num_params;
    *num_params += size;
    Some(offset)
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for ReprojectionProblem {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        for (slot, offset) in self.pose_offsets.iter().enumerate() {
            if let Some(o) = offset {
                let rot = Vector3::new(x[*o], x[o + 1], x[o + 2]);
                let trans = Vector3::new(x[o + 3], x[o + 4], x[o + 5]);
                self.poses[slot] = Utility::pose_from_params(&rot, &trans);
            }
        }
        for (slot, offset) in self.point_offsets.iter().enumerate() {
            if let Some(o) = offset {
                self.points[slot] = Vector3::new(x[*o], x[o + 1], x[o + 2]);
            }
        }
        for (slot, offset) in self.camera_offsets.iter().enumerate() {
            if let Some(o) = offset {
                self.cameras[slot].set_intrinsics(x[*o], x[o + 1], x[o + 2], x[o + 3]);
            }
        }
    }

    fn params(&self) -> DVector<f64> {
        let mut x = DVector::zeros(self.num_params);
        for (slot, offset) in self.pose_offsets.iter().enumerate() {
            if let Some(o) = offset {
                let (rot, trans) = Utility::pose_to_params(&self.poses[slot]);
                x.fixed_rows_mut::<3>(*o).copy_from(&rot);
                x.fixed_rows_mut::<3>(o + 3).copy_from(&trans);
            }
        }
        for (slot, offset) in self.point_offsets.iter().enumerate() {
            if let Some(o) = offset {
                x.fixed_rows_mut::<3>(*o).copy_from(&self.points[slot]);
            }
        }
        for (slot, offset) in self.camera_offsets.iter().enumerate() {
            if let Some(o) = offset {
                for (k, value) in self.cameras[slot].intrinsics().into_iter().enumerate() {
                    x[o + k] = value;
                }
            }
        }
        x
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        let mut residuals = DVector::zeros(self.num_residuals());
        for (i, block) in self.blocks.iter().enumerate() {
            let r = match self.raw_residual(block) {
                Some(r) => r * self.sqrt_weight(r.norm()),
                None => Vector2::repeat(BEHIND_CAMERA_RESIDUAL),
            };
            residuals.fixed_rows_mut::<2>(2 * i).copy_from(&r);
        }
        Some(residuals)
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let mut jacobian = DMatrix::zeros(self.num_residuals(), self.num_params);
        for (i, block) in self.blocks.iter().enumerate() {
            let Some(r) = self.raw_residual(block) else {
                continue;
            };
            let row = 2 * i;
            let weight = self.sqrt_weight(r.norm());
            let camera = &self.cameras[block.camera];
            let pose = &self.poses[block.pose];
            let p_c = self.camera_point(block);
            let d_uv_d_pc = camera.space_to_plane_jacobian(&p_c) * weight;

            if let Some(o) = self.pose_offsets[block.pose] {
                let (rot, _) = Utility::pose_to_params(pose);
                let rotated = pose.rotation * self.points[block.point];
                let d_pc_d_rot = -Utility::skew(&rotated) * Utility::so3_left_jacobian(&rot);
                jacobian
                    .fixed_view_mut::<2, 3>(row, o)
                    .copy_from(&(d_uv_d_pc * d_pc_d_rot));
                jacobian.fixed_view_mut::<2, 3>(row, o + 3).copy_from(&d_uv_d_pc);
            }
            if let Some(o) = self.point_offsets[block.point] {
                let r_cw = pose.rotation.to_rotation_matrix().into_inner();
                jacobian
                    .fixed_view_mut::<2, 3>(row, o)
                    .copy_from(&(d_uv_d_pc * r_cw));
            }
            if let Some(o) = self.camera_offsets[block.camera] {
                jacobian
                    .fixed_view_mut::<2, 4>(row, o)
                    .copy_from(&(camera.intrinsics_jacobian(&p_c) * weight));
            }
        }
        Some(jacobian)
    }
}
