//! 三角化流程
//!
//! triangulate → continue → merge → prune → global BA, each stage finishing
//! before the next, repeated `outer_iterations` times.

use crate::bundle_adjustment::{global_bundle_adjustment, BundleAdjustmentSummary, Minimizer};
use crate::config::TriangulationOptions;
use crate::error::Result;
use crate::map::Map;
use crate::registration::prune_unconstrained_frames;
use crate::track_processor::{ContinuationStats, MergeStats, TrackProcessor, TriangulationStats};

#[derive(Debug, Clone, Default)]
pub struct RoundSummary {
    pub triangulation: TriangulationStats,
    pub continuation: ContinuationStats,
    pub merge: MergeStats,
    pub pruned_frames: usize,
    pub bundle_adjustment: BundleAdjustmentSummary,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    pub rounds: Vec<RoundSummary>,
    pub num_tracks: usize,
    pub num_registered_frames: usize,
}

pub struct TriangulationPipeline<M: Minimizer> {
    options: TriangulationOptions,
    processor: TrackProcessor,
    minimizer: M,
}

impl<M: Minimizer> TriangulationPipeline<M> {
    pub fn new(options: TriangulationOptions, minimizer: M) -> Self {
        Self {
            processor: TrackProcessor::from_options(&options),
            options,
            minimizer,
        }
    }

    pub fn run(&self, map: &mut Map) -> Result<PipelineSummary> {
        let mut summary = PipelineSummary::default();
        for round in 0..self.options.outer_iterations {
            log::info!("round {}/{}", round + 1, self.options.outer_iterations);
            summary.rounds.push(self.run_round(map)?);
        }
        map.check_consistency()?;

        summary.num_tracks = map.num_inlier_tracks();
        summary.num_registered_frames = map.registered_frames().count();
        log::info!(
            "triangulation pipeline done: {} tracks over {} registered frames",
            summary.num_tracks,
            summary.num_registered_frames
        );
        Ok(summary)
    }

    fn run_round(&self, map: &mut Map) -> Result<RoundSummary> {
        let triangulation = self.processor.triangulate_all(map)?;
        let continuation = self.processor.continue_all_tracks(map)?;
        let merge = self.processor.merge_all_tracks(map)?;
        let pruned_frames = prune_unconstrained_frames(map).len();
        let bundle_adjustment = global_bundle_adjustment(map, &self.options, &self.minimizer)?;
        Ok(RoundSummary {
            triangulation,
            continuation,
            merge,
            pruned_frames,
            bundle_adjustment,
        })
    }
}
