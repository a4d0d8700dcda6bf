use std::collections::{HashSet, VecDeque};
use std::ops::AddAssign;

use nalgebra::Vector3;

use super::triangulation::triangulate_rays;
use super::TrackProcessor;
use crate::error::Result;
use crate::global_types::{Observation, TrackId};
use crate::map::Map;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    pub merged: usize,
    /// Both tracks observe a common frame.
    pub rejected_conflict: usize,
    /// No merged position reprojects within the threshold.
    pub rejected_error: usize,
}

impl AddAssign for MergeStats {
    fn add_assign(&mut self, other: Self) {
        self.merged += other.merged;
        self.rejected_conflict += other.rejected_conflict;
        self.rejected_error += other.rejected_error;
    }
}

enum MergeOutcome {
    /// Observations taken over from the absorbed track.
    Merged(Vec<Observation>),
    Conflict,
    TooFar,
}

impl TrackProcessor {
    pub fn merge_all_tracks(&self, map: &mut Map) -> Result<MergeStats> {
        let mut stats = MergeStats::default();
        for track_id in 0..map.tracks().len() {
            stats += self.merge_track(map, track_id)?;
        }
        log::info!(
            "merge done: {} merged, {} rejected on shared frames, {} rejected on reprojection",
            stats.merged,
            stats.rejected_conflict,
            stats.rejected_error
        );
        Ok(stats)
    }

    /// Absorbs every track reachable from this track's observations through
    /// one match, including observations gained by earlier merges of the
    /// same walk.
    pub fn merge_track(&self, map: &mut Map, track_id: TrackId) -> Result<MergeStats> {
        let mut stats = MergeStats::default();
        let mut pending: VecDeque<Observation> = match map.track(track_id) {
            Some(track) if !track.outlier => track.observations().collect(),
            _ => return Ok(stats),
        };
        let mut rejected: HashSet<TrackId> = HashSet::new();

        while let Some(observation) = pending.pop_front() {
            let siblings = map
                .correspondences()
                .siblings(observation.frame_id, observation.keypoint)
                .to_vec();
            for sibling in siblings {
                let Some(other) = map
                    .frame(sibling.frame_id)
                    .and_then(|frame| frame.track_id(sibling.keypoint))
                else {
                    continue;
                };
                if other == track_id || rejected.contains(&other) {
                    continue;
                }
                match self.try_merge(map, track_id, other)? {
                    MergeOutcome::Merged(gained) => {
                        log::debug!("merge track {} into {}", other, track_id);
                        stats.merged += 1;
                        pending.extend(gained);
                    }
                    MergeOutcome::Conflict => {
                        stats.rejected_conflict += 1;
                        rejected.insert(other);
                    }
                    MergeOutcome::TooFar => {
                        log::debug!("reject merge of track {} into {}", other, track_id);
                        stats.rejected_error += 1;
                        rejected.insert(other);
                    }
                }
            }
        }
        Ok(stats)
    }

    fn try_merge(&self, map: &mut Map, kept: TrackId, absorbed: TrackId) -> Result<MergeOutcome> {
        let (Some(kept_track), Some(absorbed_track)) = (map.track(kept), map.track(absorbed)) else {
            return Ok(MergeOutcome::TooFar);
        };
        if kept_track.outlier || absorbed_track.outlier {
            return Ok(MergeOutcome::TooFar);
        }
        if kept_track.shares_frame_with(absorbed_track) {
            return Ok(MergeOutcome::Conflict);
        }

        let gained: Vec<Observation> = absorbed_track.observations().collect();
        let union: Vec<Observation> = kept_track.observations().chain(gained.iter().copied()).collect();
        let weighted = weighted_position(
            &kept_track.position,
            kept_track.num_observations(),
            &absorbed_track.position,
            gained.len(),
        );
        let retriangulated = triangulate_rays(map, &union).map(|(position, _)| position);

        let accepted = [retriangulated, Some(weighted)]
            .into_iter()
            .flatten()
            .find(|position| self.fits_all(map, position, union.iter().copied()));
        let Some(position) = accepted else {
            return Ok(MergeOutcome::TooFar);
        };
        if map.merge_tracks(kept, absorbed, position)? {
            Ok(MergeOutcome::Merged(gained))
        } else {
            Ok(MergeOutcome::Conflict)
        }
    }
}

fn weighted_position(a: &Vector3<f64>, num_a: usize, b: &Vector3<f64>, num_b: usize) -> Vector3<f64> {
    let total = (num_a + num_b).max(1) as f64;
    (a * num_a as f64 + b * num_b as f64) / total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global_types::Match;
    use crate::map::FramePair;
    use crate::test_scene::TestScene;

    #[test]
    fn test_merge_split_track() {
        let scene = TestScene::line_of_frames(4, 1);
        let pairs = vec![
            FramePair::new(0, 1, vec![Match::new(0, 0)]),
            FramePair::new(1, 2, vec![Match::new(0, 0)]),
            FramePair::new(2, 3, vec![Match::new(0, 0)]),
        ];
        let mut map = scene.map_with(scene.frames(), pairs);
        let truth = scene.points[0];
        let offset = Vector3::new(0.01, 0.0, 0.0);
        let a = map
            .create_track(truth + offset, &[Observation::new(0, 0), Observation::new(1, 0)])
            .unwrap();
        let b = map
            .create_track(truth - offset, &[Observation::new(2, 0), Observation::new(3, 0)])
            .unwrap();

        let stats = TrackProcessor::new(8.0).merge_all_tracks(&mut map).unwrap();
        assert_eq!(stats.merged, 1);
        let merged = map.track(a).unwrap();
        assert_eq!(merged.num_observations(), 4);
        assert!((merged.position - truth).norm() < 1e-6);
        assert!(map.track(b).unwrap().outlier);
        assert_eq!(map.frame(3).unwrap().track_id(0), Some(a));
        map.check_consistency().unwrap();
    }

    #[test]
    fn test_merge_chain() {
        let scene = TestScene::line_of_frames(6, 1);
        // a-b and b-c are linked, a-c only through b
        let pairs = vec![
            FramePair::new(1, 2, vec![Match::new(0, 0)]),
            FramePair::new(3, 4, vec![Match::new(0, 0)]),
        ];
        let mut map = scene.map_with(scene.frames(), pairs);
        let truth = scene.points[0];
        let offset = Vector3::new(0.01, 0.0, 0.0);
        let a = map
            .create_track(truth + offset, &[Observation::new(0, 0), Observation::new(1, 0)])
            .unwrap();
        let b = map
            .create_track(truth, &[Observation::new(2, 0), Observation::new(3, 0)])
            .unwrap();
        let c = map
            .create_track(truth - offset, &[Observation::new(4, 0), Observation::new(5, 0)])
            .unwrap();

        let stats = TrackProcessor::new(8.0).merge_all_tracks(&mut map).unwrap();
        assert_eq!(stats.merged, 2);
        assert_eq!(map.track(a).unwrap().num_observations(), 6);
        assert!(map.track(b).unwrap().outlier);
        assert!(map.track(c).unwrap().outlier);
        for frame_id in 0..6 {
            assert_eq!(map.frame(frame_id).unwrap().track_id(0), Some(a));
        }
        map.check_consistency().unwrap();
    }

    #[test]
    fn test_merge_safety() {
        let scene = TestScene::line_of_frames(3, 2);
        let pairs = vec![FramePair::new(0, 2, vec![Match::new(0, 0)])];
        let mut map = scene.map_with(scene.frames(), pairs);
        let a = map
            .create_track(scene.points[0], &[Observation::new(0, 0), Observation::new(1, 0)])
            .unwrap();
        // b also observes frame 1, through another keypoint
        let b = map
            .create_track(scene.points[0], &[Observation::new(2, 0), Observation::new(1, 1)])
            .unwrap();

        let stats = TrackProcessor::new(8.0).merge_all_tracks(&mut map).unwrap();
        assert_eq!(stats.merged, 0);
        assert!(stats.rejected_conflict > 0);
        assert_eq!(map.track(a).unwrap().num_observations(), 2);
        assert_eq!(map.track(b).unwrap().num_observations(), 2);
        assert!(!map.track(b).unwrap().outlier);
        map.check_consistency().unwrap();
    }

    #[test]
    fn test_reject_distant_tracks() {
        let scene = TestScene::line_of_frames(4, 2);
        // a wrong match joins the observations of two different points
        let pairs = vec![FramePair::new(1, 2, vec![Match::new(0, 1)])];
        let mut map = scene.map_with(scene.frames(), pairs);
        let a = map
            .create_track(scene.points[0], &[Observation::new(0, 0), Observation::new(1, 0)])
            .unwrap();
        let b = map
            .create_track(scene.points[1], &[Observation::new(2, 1), Observation::new(3, 1)])
            .unwrap();

        let stats = TrackProcessor::new(8.0).merge_all_tracks(&mut map).unwrap();
        assert_eq!(stats.merged, 0);
        assert!(stats.rejected_error > 0);
        assert!(!map.track(a).unwrap().outlier);
        assert!(!map.track(b).unwrap().outlier);
        map.check_consistency().unwrap();
    }

    #[test]
    fn test_weighted_position() {
        let a = Vector3::new(0.0, 0.0, 3.0);
        let b = Vector3::new(4.0, 0.0, 3.0);
        assert_eq!(weighted_position(&a, 3, &b, 1), Vector3::new(1.0, 0.0, 3.0));
    }
}
