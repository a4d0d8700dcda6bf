mod pinhole_camera;
pub use pinhole_camera::{PinholeCamera, PinholeParameters};

use nalgebra::{Matrix2x3, Point2, Vector3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraType {
    /// - 最简单的相机模型，假设光线沿直线传播，不考虑镜头畸变。
    /// - 只包含内参（焦距、主点）。
    Pinhole,
    /// - Pinhole 模型的扩展，考虑了镜头的畸变。
    /// - 除了内参外，还包括径向畸变 k1, k2 和切向畸变 p1, p2。
    PinholeFull,
}

/// 相机的trait
pub trait CameraTrait {
    /// Pixel → normalized ray `(x, y, 1)` with distortion removed.
    fn lift_projective(&self, p: &Point2<f64>) -> Vector3<f64>;
    /// Point in camera coordinates → pixel. Callers check depth first.
    fn space_to_plane(&self, p3d: &Vector3<f64>) -> Point2<f64>;
    /// d(pixel) / d(point in camera coordinates).
    fn space_to_plane_jacobian(&self, p3d: &Vector3<f64>) -> Matrix2x3<f64>;
    fn get_camera_type(&self) -> CameraType;
}
