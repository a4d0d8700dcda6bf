use std::ops::AddAssign;

use nalgebra::Vector3;

use super::TrackProcessor;
use crate::error::Result;
use crate::geometry::{max_triangulation_angle, triangulate_multiview};
use crate::global_types::{FrameId, Observation, Pose};
use crate::map::{Frame, Map};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TriangulationStats {
    pub created: usize,
    pub rejected: usize,
    pub skipped_frames: usize,
}

impl AddAssign for TriangulationStats {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.rejected += other.rejected;
        self.skipped_frames += other.skipped_frames;
    }
}

impl TrackProcessor {
    /// Triangulation pass over every frame in ascending id order.
    pub fn triangulate_all(&self, map: &mut Map) -> Result<TriangulationStats> {
        let mut stats = TriangulationStats::default();
        for frame_id in 0..map.frames().len() {
            log::debug!("current frame: {}", frame_id);
            stats += self.triangulate_frame_points(map, frame_id)?;
        }
        log::info!(
            "triangulate done: {} tracks created, {} candidates rejected, {} frames skipped",
            stats.created,
            stats.rejected,
            stats.skipped_frames
        );
        Ok(stats)
    }

    /// Creates a track for every unassigned keypoint of `frame_id` whose
    /// unassigned partners in other registered frames triangulate cleanly.
    pub fn triangulate_frame_points(&self, map: &mut Map, frame_id: FrameId) -> Result<TriangulationStats> {
        let mut stats = TriangulationStats::default();
        if !map.is_registered(frame_id) {
            log::warn!("skip frame {}: not registered", frame_id);
            stats.skipped_frames += 1;
            return Ok(stats);
        }

        let num_keypoints = map.frame(frame_id).map_or(0, Frame::num_keypoints);
        for keypoint in 0..num_keypoints {
            let reference = Observation::new(frame_id, keypoint);
            if map
                .frame(frame_id)
                .and_then(|frame| frame.track_id(keypoint))
                .is_some()
            {
                continue;
            }
            let observations = collect_partners(map, reference);
            if observations.len() < 2 {
                continue;
            }
            match self.triangulate_observations(map, &observations) {
                Some(position) => {
                    map.create_track(position, &observations)?;
                    stats.created += 1;
                }
                None => {
                    log::debug!(
                        "reject triangulation of {:?} with {} views",
                        reference,
                        observations.len()
                    );
                    stats.rejected += 1;
                }
            }
        }
        Ok(stats)
    }

    /// DLT over all observations, accepted only when every view sees the
    /// point in front of the camera within the reprojection threshold.
    fn triangulate_observations(&self, map: &Map, observations: &[Observation]) -> Option<Vector3<f64>> {
        let (position, poses) = triangulate_rays(map, observations)?;
        if self.min_triangulation_angle > 0.0
            && max_triangulation_angle(&poses, &position) < self.min_triangulation_angle
        {
            return None;
        }
        self.fits_all(map, &position, observations.iter().copied())
            .then_some(position)
    }
}

/// The reference observation followed by one unassigned partner per other
/// registered frame (first match wins).
fn collect_partners(map: &Map, reference: Observation) -> Vec<Observation> {
    let mut observations = vec![reference];
    for sibling in map
        .correspondences()
        .siblings(reference.frame_id, reference.keypoint)
    {
        if !map.is_registered(sibling.frame_id)
            || observations
                .iter()
                .any(|observation| observation.frame_id == sibling.frame_id)
        {
            continue;
        }
        let assigned = map
            .frame(sibling.frame_id)
            .and_then(|frame| frame.track_id(sibling.keypoint))
            .is_some();
        if !assigned {
            observations.push(Observation::new(sibling.frame_id, sibling.keypoint));
        }
    }
    observations
}

/// Unchecked DLT position plus the poses used for it.
pub(super) fn triangulate_rays(
    map: &Map,
    observations: &[Observation],
) -> Option<(Vector3<f64>, Vec<Pose>)> {
    let mut rays = Vec::with_capacity(observations.len());
    let mut poses = Vec::with_capacity(observations.len());
    for observation in observations {
        rays.push(map.observation_ray(*observation)?);
        poses.push(map.frame(observation.frame_id)?.tcw);
    }
    let position = triangulate_multiview(&rays, &poses)?;
    Some((position, poses))
}
