//! 几何计算
//!
//! Stateless kernels: ray triangulation and two-view fundamental matrix estimation.

mod common;
pub mod fundamental;
pub mod triangulation;

pub use fundamental::{FundamentalEstimator, TwoViewGeometry};
pub use triangulation::{
    max_triangulation_angle, triangulate_multiview, triangulate_point, triangulation_angle,
};
