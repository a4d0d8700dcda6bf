//! 三角化与轨迹管理
//!
//! Creates tracks from pairwise matches ([`TrackProcessor::triangulate_all`]),
//! extends them along the match graph ([`TrackProcessor::continue_all_tracks`])
//! and fuses duplicates ([`TrackProcessor::merge_all_tracks`]). Each pass is a
//! single sweep; callers re-invoke a pass for deeper convergence.

mod continuation;
mod merge;
mod triangulation;

pub use continuation::ContinuationStats;
pub use merge::MergeStats;
pub use triangulation::TriangulationStats;

use nalgebra::Vector3;

use crate::config::TriangulationOptions;
use crate::global_types::Observation;
use crate::map::Map;

#[derive(Debug, Clone)]
pub struct TrackProcessor {
    /// Maximum reprojection error (pixel) of an accepted observation.
    pub reprojection_threshold: f64,
    /// Minimum largest pairwise ray angle (radians) of a new track, 0 disables.
    pub min_triangulation_angle: f64,
}

impl TrackProcessor {
    pub fn new(reprojection_threshold: f64) -> Self {
        Self {
            reprojection_threshold,
            min_triangulation_angle: 0.0,
        }
    }

    pub fn from_options(options: &TriangulationOptions) -> Self {
        Self {
            reprojection_threshold: options.reprojection_threshold_px,
            min_triangulation_angle: options.min_triangulation_angle_deg.to_radians(),
        }
    }

    /// In front of the camera and within the reprojection threshold.
    #[inline]
    fn fits(&self, map: &Map, position: &Vector3<f64>, observation: Observation) -> bool {
        map.reprojection_error(position, observation)
            .map_or(false, |error| error < self.reprojection_threshold)
    }

    fn fits_all<I>(&self, map: &Map, position: &Vector3<f64>, observations: I) -> bool
    where
        I: IntoIterator<Item = Observation>,
    {
        observations
            .into_iter()
            .all(|observation| self.fits(map, position, observation))
    }
}
