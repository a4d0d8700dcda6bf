//! Synthetic scenes shared by the unit tests.

use nalgebra::{Point2, Point3, UnitQuaternion, Vector3};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::camera::{CameraTrait, PinholeCamera, PinholeParameters};
use crate::global_types::{FrameId, Match, Pose};
use crate::map::{Frame, FramePair, Map};
use crate::utility::Utility;

pub(crate) struct TestScene {
    pub camera: PinholeCamera,
    pub poses: Vec<Pose>,
    pub points: Vec<Vector3<f64>>,
}

impl TestScene {
    pub fn camera() -> PinholeCamera {
        PinholeCamera::new(0, PinholeParameters::new(500.0, 500.0, 320.0, 240.0))
    }

    /// Cameras one unit apart along +X, all looking down +Z, and a grid of
    /// points about five units in front of them.
    pub fn line_of_frames(num_frames: usize, num_points: usize) -> Self {
        let poses = (0..num_frames)
            .map(|i| Utility::pose_from_params(&Vector3::zeros(), &Vector3::new(-(i as f64), 0.0, 0.0)))
            .collect();
        let mid_x = (num_frames as f64 - 1.0) / 2.0;
        let points = (0..num_points)
            .map(|k| {
                Vector3::new(
                    mid_x - 1.0 + 0.5 * (k % 5) as f64,
                    -0.6 + 0.3 * (k / 5) as f64,
                    5.0 + 0.25 * (k % 3) as f64,
                )
            })
            .collect();
        Self {
            camera: Self::camera(),
            poses,
            points,
        }
    }

    /// Cameras half a unit apart along +X with a slight yaw each, and random
    /// points in a box in front of them. General enough for the eight-point
    /// solver.
    pub fn scattered(num_frames: usize, num_points: usize, seed: u64) -> Self {
        let poses = (0..num_frames)
            .map(|i| {
                let rotation = Vector3::new(0.0, -0.02 * i as f64, 0.0);
                let center = Vector3::new(0.5 * i as f64, 0.05 * i as f64, 0.0);
                let translation = -(UnitQuaternion::from_scaled_axis(rotation) * center);
                Utility::pose_from_params(&rotation, &translation)
            })
            .collect();
        let mid_x = 0.25 * (num_frames as f64 - 1.0);
        let mut rng = StdRng::seed_from_u64(seed);
        let points = (0..num_points)
            .map(|_| {
                Vector3::new(
                    mid_x + rng.gen_range(-2.0..2.0),
                    rng.gen_range(-1.5..1.5),
                    rng.gen_range(5.0..8.0),
                )
            })
            .collect();
        Self {
            camera: Self::camera(),
            poses,
            points,
        }
    }

    /// Explicit poses and points.
    pub fn with(poses: Vec<Pose>, points: Vec<Vector3<f64>>) -> Self {
        Self {
            camera: Self::camera(),
            poses,
            points,
        }
    }

    pub fn project(&self, frame_id: FrameId, point: &Vector3<f64>) -> Point2<f64> {
        let p_c = self.poses[frame_id].transform_point(&Point3::from(*point)).coords;
        self.camera.space_to_plane(&p_c)
    }

    /// Keypoint k of every frame is the exact projection of point k.
    pub fn frames(&self) -> Vec<Frame> {
        (0..self.poses.len())
            .map(|i| {
                let points = self.points.iter().map(|p| self.project(i, p)).collect();
                Frame::new(i, format!("{:06}.png", i), self.camera.id, self.poses[i], points)
            })
            .collect()
    }

    /// Same as [`Self::frames`] with uniform pixel noise in `[-noise, noise]`.
    pub fn noisy_frames(&self, noise: f64, seed: u64) -> Vec<Frame> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut frames = self.frames();
        for frame in frames.iter_mut() {
            for p in frame.points.iter_mut() {
                p.x += rng.gen_range(-noise..=noise);
                p.y += rng.gen_range(-noise..=noise);
            }
        }
        frames
    }

    /// Every frame pair with the identity match k ↔ k.
    pub fn full_matches(&self) -> Vec<FramePair> {
        let num_frames = self.poses.len();
        let mut pairs = Vec::new();
        for i in 0..num_frames {
            for j in i + 1..num_frames {
                let matches = (0..self.points.len()).map(|k| Match::new(k, k)).collect();
                pairs.push(FramePair::new(i, j, matches));
            }
        }
        pairs
    }

    pub fn map_with_full_matches(&self) -> Map {
        self.map_with(self.frames(), self.full_matches())
    }

    pub fn map_with(&self, frames: Vec<Frame>, pairs: Vec<FramePair>) -> Map {
        Map::new(frames, vec![self.camera.clone()], pairs).unwrap()
    }
}
