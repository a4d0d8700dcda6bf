//! 地图
//!
//! Owns frames, cameras, frame pairs and tracks. Every write to
//! `Frame::track_ids` and `Track::observations` goes through [`Map`], which
//! keeps the two sides consistent.

mod correspondence;
mod frame;
mod frame_pair;
mod track;

pub use correspondence::{Correspondence, CorrespondenceGraph};
pub use frame::Frame;
pub use frame_pair::FramePair;
pub use track::Track;

use std::collections::BTreeMap;

use nalgebra::{Point3, Vector3};

use crate::camera::{CameraTrait, PinholeCamera};
use crate::error::{Result, SfmError};
use crate::global_types::{CameraId, FrameId, Observation, Pose, TrackId};

#[derive(Debug, Default)]
pub struct Map {
    frames: Vec<Frame>,
    cameras: BTreeMap<CameraId, PinholeCamera>,
    frame_pairs: Vec<FramePair>,
    tracks: Vec<Track>,
    correspondences: CorrespondenceGraph,
}

impl Map {
    /// Validates the inputs and builds the correspondence index.
    ///
    /// `frames[i].id` must equal `i`. Registered frames must reference a known
    /// camera, and every inlier match must address existing keypoints.
    pub fn new(
        frames: Vec<Frame>,
        cameras: impl IntoIterator<Item = PinholeCamera>,
        frame_pairs: Vec<FramePair>,
    ) -> Result<Self> {
        let cameras: BTreeMap<CameraId, PinholeCamera> =
            cameras.into_iter().map(|camera| (camera.id, camera)).collect();

        for (index, frame) in frames.iter().enumerate() {
            if frame.id != index {
                return Err(SfmError::FrameIndexMismatch { index, id: frame.id });
            }
            if frame.registered && !cameras.contains_key(&frame.camera_id) {
                return Err(SfmError::MissingCamera {
                    frame_id: frame.id,
                    camera_id: frame.camera_id,
                });
            }
        }
        for pair in frame_pairs.iter() {
            validate_pair(&frames, pair)?;
        }

        for camera in cameras.values() {
            log::info!("camera {}: {:?}", camera.id, camera.get_camera_type());
        }
        let correspondences = CorrespondenceGraph::build(&frames, &frame_pairs);
        log::info!(
            "map: {} frames, {} cameras, {} frame pairs",
            frames.len(),
            cameras.len(),
            frame_pairs.len()
        );
        Ok(Self {
            frames,
            cameras,
            frame_pairs,
            tracks: Vec::new(),
            correspondences,
        })
    }

    // ---- read access ----

    #[inline]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    #[inline]
    pub fn frame(&self, frame_id: FrameId) -> Option<&Frame> {
        self.frames.get(frame_id)
    }

    #[inline]
    pub fn cameras(&self) -> &BTreeMap<CameraId, PinholeCamera> {
        &self.cameras
    }

    #[inline]
    pub fn camera(&self, camera_id: CameraId) -> Option<&PinholeCamera> {
        self.cameras.get(&camera_id)
    }

    #[inline]
    pub fn camera_of(&self, frame_id: FrameId) -> Option<&PinholeCamera> {
        self.frames
            .get(frame_id)
            .and_then(|frame| self.cameras.get(&frame.camera_id))
    }

    #[inline]
    pub fn frame_pairs(&self) -> &[FramePair] {
        &self.frame_pairs
    }

    #[inline]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[inline]
    pub fn track(&self, track_id: TrackId) -> Option<&Track> {
        self.tracks.get(track_id)
    }

    #[inline]
    pub fn correspondences(&self) -> &CorrespondenceGraph {
        &self.correspondences
    }

    #[inline]
    pub fn is_registered(&self, frame_id: FrameId) -> bool {
        self.frames.get(frame_id).map_or(false, |frame| frame.registered)
    }

    pub fn registered_frames(&self) -> impl Iterator<Item = &Frame> + '_ {
        self.frames.iter().filter(|frame| frame.registered)
    }

    /// Tracks that are not outliers, in id order.
    pub fn inlier_tracks(&self) -> impl Iterator<Item = &Track> + '_ {
        self.tracks.iter().filter(|track| !track.outlier)
    }

    pub fn num_inlier_tracks(&self) -> usize {
        self.inlier_tracks().count()
    }

    // ---- geometry helpers ----

    /// Calibrated ray `(x, y, 1)` of an observation.
    pub fn observation_ray(&self, observation: Observation) -> Option<Vector3<f64>> {
        let camera = self.camera_of(observation.frame_id)?;
        let point = self.frames[observation.frame_id].points.get(observation.keypoint)?;
        Some(camera.lift_projective(point))
    }

    /// Pixel distance between the projection of `position` and the observed
    /// keypoint. `None` when the point is not in front of the camera.
    pub fn reprojection_error(&self, position: &Vector3<f64>, observation: Observation) -> Option<f64> {
        let camera = self.camera_of(observation.frame_id)?;
        let frame = &self.frames[observation.frame_id];
        let point = frame.points.get(observation.keypoint)?;
        let p_c = frame.tcw.transform_point(&Point3::from(*position)).coords;
        if p_c.z <= 0.0 {
            return None;
        }
        Some((camera.space_to_plane(&p_c) - point).norm())
    }

    // ---- frame / camera updates ----

    pub fn set_registered(&mut self, frame_id: FrameId, registered: bool) {
        if let Some(frame) = self.frames.get_mut(frame_id) {
            frame.registered = registered;
        }
    }

    pub fn set_frame_pose(&mut self, frame_id: FrameId, tcw: Pose) {
        if let Some(frame) = self.frames.get_mut(frame_id) {
            frame.tcw = tcw;
        }
    }

    pub fn set_camera_intrinsics(&mut self, camera_id: CameraId, intrinsics: [f64; 4]) {
        if let Some(camera) = self.cameras.get_mut(&camera_id) {
            let [fx, fy, cx, cy] = intrinsics;
            camera.set_intrinsics(fx, fy, cx, cy);
        }
    }

    // ---- track updates ----

    /// Creates a track from at least two observations on distinct frames whose
    /// keypoints are unassigned, and writes its id into those frames.
    pub fn create_track(&mut self, position: Vector3<f64>, observations: &[Observation]) -> Result<TrackId> {
        let track_id = self.tracks.len();
        if observations.len() < 2 {
            return Err(SfmError::TrackConflict {
                track_id,
                frame_id: observations.first().map_or(0, |obs| obs.frame_id),
                reason: "a track needs at least two observations".to_string(),
            });
        }
        for (k, observation) in observations.iter().enumerate() {
            self.check_free_keypoint(track_id, *observation)?;
            if observations[..k]
                .iter()
                .any(|other| other.frame_id == observation.frame_id)
            {
                return Err(SfmError::TrackConflict {
                    track_id,
                    frame_id: observation.frame_id,
                    reason: "two observations in the same frame".to_string(),
                });
            }
        }

        let mut track = Track::new(track_id, position);
        for observation in observations {
            track
                .observations
                .insert(observation.frame_id, observation.keypoint);
            self.frames[observation.frame_id].track_ids[observation.keypoint] = Some(track_id);
        }
        self.tracks.push(track);
        Ok(track_id)
    }

    /// Adds an unassigned keypoint of a frame the track does not observe yet.
    pub fn add_observation(&mut self, track_id: TrackId, observation: Observation) -> Result<()> {
        let track = self.live_track(track_id, observation.frame_id)?;
        if track.contains_frame(observation.frame_id) {
            return Err(SfmError::TrackConflict {
                track_id,
                frame_id: observation.frame_id,
                reason: "frame already observes the track".to_string(),
            });
        }
        self.check_free_keypoint(track_id, observation)?;

        self.tracks[track_id]
            .observations
            .insert(observation.frame_id, observation.keypoint);
        self.frames[observation.frame_id].track_ids[observation.keypoint] = Some(track_id);
        Ok(())
    }

    /// Moves every observation of `absorbed` into `kept`, which takes
    /// `position`. Returns `Ok(false)` and changes nothing when both tracks
    /// observe a common frame. The absorbed track is retired as an outlier.
    pub fn merge_tracks(&mut self, kept: TrackId, absorbed: TrackId, position: Vector3<f64>) -> Result<bool> {
        if kept == absorbed {
            return Err(SfmError::TrackConflict {
                track_id: kept,
                frame_id: 0,
                reason: "cannot merge a track with itself".to_string(),
            });
        }
        let kept_track = self.live_track(kept, 0)?;
        let absorbed_track = self.live_track(absorbed, 0)?;
        if kept_track.shares_frame_with(absorbed_track) {
            return Ok(false);
        }

        let moved = std::mem::take(&mut self.tracks[absorbed].observations);
        for (frame_id, keypoint) in moved {
            self.frames[frame_id].track_ids[keypoint] = Some(kept);
            self.tracks[kept].observations.insert(frame_id, keypoint);
        }
        self.tracks[absorbed].outlier = true;
        self.tracks[kept].position = position;
        Ok(true)
    }

    /// Marks a track outlier and detaches it from every frame. The id stays
    /// reserved.
    pub fn retire_track(&mut self, track_id: TrackId) {
        let Some(track) = self.tracks.get_mut(track_id) else {
            return;
        };
        track.outlier = true;
        for (frame_id, keypoint) in std::mem::take(&mut track.observations) {
            self.frames[frame_id].track_ids[keypoint] = None;
        }
    }

    pub fn set_track_position(&mut self, track_id: TrackId, position: Vector3<f64>) {
        if let Some(track) = self.tracks.get_mut(track_id) {
            track.position = position;
        }
    }

    /// Checks the two-way link between frames and tracks and the outlier rule.
    pub fn check_consistency(&self) -> Result<()> {
        for track in self.tracks.iter() {
            if !track.outlier && track.num_observations() < 2 {
                return Err(SfmError::TrackConflict {
                    track_id: track.id,
                    frame_id: track.observations().next().map_or(0, |obs| obs.frame_id),
                    reason: "inlier track with fewer than two observations".to_string(),
                });
            }
            for observation in track.observations() {
                let frame_track = self
                    .frames
                    .get(observation.frame_id)
                    .and_then(|frame| frame.track_id(observation.keypoint));
                if frame_track != Some(track.id) {
                    return Err(SfmError::TrackConflict {
                        track_id: track.id,
                        frame_id: observation.frame_id,
                        reason: format!("keypoint {} points to {:?}", observation.keypoint, frame_track),
                    });
                }
            }
        }
        for frame in self.frames.iter() {
            for (keypoint, track_id) in frame.track_ids.iter().enumerate() {
                let Some(track_id) = track_id else {
                    continue;
                };
                let listed = self
                    .tracks
                    .get(*track_id)
                    .and_then(|track| track.keypoint_in(frame.id));
                if listed != Some(keypoint) {
                    return Err(SfmError::TrackConflict {
                        track_id: *track_id,
                        frame_id: frame.id,
                        reason: format!("track does not list keypoint {}", keypoint),
                    });
                }
            }
        }
        Ok(())
    }

    fn live_track(&self, track_id: TrackId, frame_id: FrameId) -> Result<&Track> {
        match self.tracks.get(track_id) {
            Some(track) if !track.outlier => Ok(track),
            Some(_) => Err(SfmError::TrackConflict {
                track_id,
                frame_id,
                reason: "track is an outlier".to_string(),
            }),
            None => Err(SfmError::TrackConflict {
                track_id,
                frame_id,
                reason: "unknown track".to_string(),
            }),
        }
    }

    fn check_free_keypoint(&self, track_id: TrackId, observation: Observation) -> Result<()> {
        let conflict = |reason: String| SfmError::TrackConflict {
            track_id,
            frame_id: observation.frame_id,
            reason,
        };
        let frame = self
            .frames
            .get(observation.frame_id)
            .ok_or_else(|| conflict("unknown frame".to_string()))?;
        if !frame.registered {
            return Err(conflict("frame is not registered".to_string()));
        }
        match frame.track_ids.get(observation.keypoint) {
            None => Err(conflict(format!("keypoint {} out of range", observation.keypoint))),
            Some(Some(other)) => Err(conflict(format!(
                "keypoint {} already belongs to track {}",
                observation.keypoint, other
            ))),
            Some(None) => Ok(()),
        }
    }
}

fn validate_pair(frames: &[Frame], pair: &FramePair) -> Result<()> {
    let invalid = |reason: String| SfmError::InvalidMatch {
        id1: pair.id1,
        id2: pair.id2,
        reason,
    };
    if pair.id1 == pair.id2 {
        return Err(invalid("pair of a frame with itself".to_string()));
    }
    if pair.inlier_mask.len() != pair.matches.len() {
        return Err(invalid("inlier mask and matches differ in length".to_string()));
    }
    let frame1 = frames
        .get(pair.id1)
        .ok_or_else(|| invalid(format!("unknown frame {}", pair.id1)))?;
    let frame2 = frames
        .get(pair.id2)
        .ok_or_else(|| invalid(format!("unknown frame {}", pair.id2)))?;
    for m in pair.matches.iter() {
        if m.idx1 >= frame1.num_keypoints() || m.idx2 >= frame2.num_keypoints() {
            return Err(invalid(format!("keypoint index out of range in {:?}", m)));
        }
    }
    Ok(())
}
