//! Track triangulation for posed image collections.
//!
//! nalgebra
//! https://docs.rs/nalgebra/latest/nalgebra/
//!
//! levenberg-marquardt
//! https://docs.rs/levenberg-marquardt/latest/levenberg_marquardt/

pub mod bundle_adjustment;
pub mod camera;
pub mod config;
pub mod dataset;
pub mod error;
pub mod geometry;
pub mod global_types;
pub mod map;
pub mod pair_filter;
pub mod pipeline;
pub mod preprocess;
pub mod registration;
pub mod save;
pub mod track_processor;
pub mod utility;

#[cfg(test)]
mod test_scene;

pub use bundle_adjustment::{global_bundle_adjustment, LevenbergMarquardtMinimizer, Minimizer};
pub use config::{RunConfig, TriangulationOptions};
pub use error::{Result, SfmError};
pub use map::Map;
pub use pipeline::{PipelineSummary, TriangulationPipeline};
pub use preprocess::build_map;
