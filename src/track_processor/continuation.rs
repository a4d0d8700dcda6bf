use std::ops::AddAssign;

use super::TrackProcessor;
use crate::error::Result;
use crate::global_types::{Observation, TrackId};
use crate::map::Map;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ContinuationStats {
    pub extended_tracks: usize,
    pub added_observations: usize,
    pub rejected: usize,
}

impl AddAssign for ContinuationStats {
    fn add_assign(&mut self, other: Self) {
        self.extended_tracks += other.extended_tracks;
        self.added_observations += other.added_observations;
        self.rejected += other.rejected;
    }
}

impl TrackProcessor {
    pub fn continue_all_tracks(&self, map: &mut Map) -> Result<ContinuationStats> {
        let mut stats = ContinuationStats::default();
        for track_id in 0..map.tracks().len() {
            stats += self.continue_track(map, track_id)?;
        }
        log::info!(
            "continue done: {} tracks extended by {} observations, {} rejected",
            stats.extended_tracks,
            stats.added_observations,
            stats.rejected
        );
        Ok(stats)
    }

    /// Adds the unassigned siblings of the track's current observations that
    /// lie in registered frames the track does not observe yet and reproject
    /// within the threshold. Observations added here are not expanded again
    /// in the same call.
    pub fn continue_track(&self, map: &mut Map, track_id: TrackId) -> Result<ContinuationStats> {
        let mut stats = ContinuationStats::default();
        let (position, observations) = match map.track(track_id) {
            Some(track) if !track.outlier => (track.position, track.observations().collect::<Vec<_>>()),
            _ => return Ok(stats),
        };

        for observation in observations {
            let siblings = map
                .correspondences()
                .siblings(observation.frame_id, observation.keypoint)
                .to_vec();
            for sibling in siblings {
                let candidate = Observation::new(sibling.frame_id, sibling.keypoint);
                if !map.is_registered(candidate.frame_id) {
                    continue;
                }
                let observed = map
                    .track(track_id)
                    .map_or(true, |track| track.contains_frame(candidate.frame_id));
                let assigned = map
                    .frame(candidate.frame_id)
                    .and_then(|frame| frame.track_id(candidate.keypoint))
                    .is_some();
                if observed || assigned {
                    continue;
                }
                if self.fits(map, &position, candidate) {
                    map.add_observation(track_id, candidate)?;
                    stats.added_observations += 1;
                } else {
                    stats.rejected += 1;
                }
            }
        }
        if stats.added_observations > 0 {
            stats.extended_tracks = 1;
        }
        Ok(stats)
    }
}
