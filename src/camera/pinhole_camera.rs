use nalgebra::{Matrix2, Matrix2x3, Matrix2x4, Point2, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use super::{CameraTrait, CameraType};
use crate::global_types::CameraId;

/// Fixed-point iterations used to invert the distortion model.
const UNDISTORT_ITERATIONS: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinholeParameters {
    pub camera_name: String,
    // size
    pub image_width: u32,
    pub image_height: u32,
    // intrinsic
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    // distortion
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
}

impl PinholeParameters {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PinholeCamera {
    pub id: CameraId,
    pub parameters: PinholeParameters,
    pub has_distortion: bool,
    pub inv_k11: f64,
    pub inv_k13: f64,
    pub inv_k22: f64,
    pub inv_k23: f64,
}

impl PinholeCamera {
    pub fn new(id: CameraId, parameters: PinholeParameters) -> Self {
        let mut camera = Self {
            id,
            parameters,
            ..Default::default()
        };
        camera.update_cache();
        camera
    }

    /// Replaces `fx, fy, cx, cy`, keeping distortion.
    pub fn set_intrinsics(&mut self, fx: f64, fy: f64, cx: f64, cy: f64) {
        self.parameters.fx = fx;
        self.parameters.fy = fy;
        self.parameters.cx = cx;
        self.parameters.cy = cy;
        self.update_cache();
    }

    #[inline]
    pub fn intrinsics(&self) -> [f64; 4] {
        let p = &self.parameters;
        [p.fx, p.fy, p.cx, p.cy]
    }

    fn update_cache(&mut self) {
        let p = &self.parameters;
        self.has_distortion = p.k1 != 0.0 || p.k2 != 0.0 || p.p1 != 0.0 || p.p2 != 0.0;
        self.inv_k11 = 1.0 / p.fx;
        self.inv_k13 = -p.cx / p.fx;
        self.inv_k22 = 1.0 / p.fy;
        self.inv_k23 = -p.cy / p.fy;
    }

    /// Distortion offset of an undistorted normalized point.
    fn distortion(&self, p_u: &Vector2<f64>) -> Vector2<f64> {
        let p = &self.parameters;
        let (mx2_u, my2_u) = (p_u.x * p_u.x, p_u.y * p_u.y);
        let mxy_u = p_u.x * p_u.y;
        let rho2_u = mx2_u + my2_u;
        let rad_dist_u = p.k1 * rho2_u + p.k2 * rho2_u * rho2_u;
        Vector2::new(
            p_u.x * rad_dist_u + 2.0 * p.p1 * mxy_u + p.p2 * (rho2_u + 2.0 * mx2_u),
            p_u.y * rad_dist_u + 2.0 * p.p2 * mxy_u + p.p1 * (rho2_u + 2.0 * my2_u),
        )
    }

    /// d(distorted) / d(undistorted) of normalized coordinates.
    fn distortion_jacobian(&self, p_u: &Vector2<f64>) -> Matrix2<f64> {
        let p = &self.parameters;
        let (x, y) = (p_u.x, p_u.y);
        let rho2 = x * x + y * y;
        let radial = 1.0 + p.k1 * rho2 + p.k2 * rho2 * rho2;
        let d_radial = 2.0 * (p.k1 + 2.0 * p.k2 * rho2);
        Matrix2::new(
            radial + x * x * d_radial + 2.0 * p.p1 * y + 6.0 * p.p2 * x,
            x * y * d_radial + 2.0 * p.p1 * x + 2.0 * p.p2 * y,
            x * y * d_radial + 2.0 * p.p1 * x + 2.0 * p.p2 * y,
            radial + y * y * d_radial + 6.0 * p.p1 * y + 2.0 * p.p2 * x,
        )
    }

    /// Distorted normalized coordinates of a camera-frame point.
    #[inline]
    pub fn distorted_plane_point(&self, p3d: &Vector3<f64>) -> Vector2<f64> {
        let p_u = Vector2::new(p3d.x / p3d.z, p3d.y / p3d.z);
        if self.has_distortion {
            p_u + self.distortion(&p_u)
        } else {
            p_u
        }
    }

    /// d(pixel) / d(fx, fy, cx, cy).
    pub fn intrinsics_jacobian(&self, p3d: &Vector3<f64>) -> Matrix2x4<f64> {
        let p_d = self.distorted_plane_point(p3d);
        Matrix2x4::new(p_d.x, 0.0, 1.0, 0.0, 0.0, p_d.y, 0.0, 1.0)
    }
}

impl CameraTrait for PinholeCamera {
    fn lift_projective(&self, p: &Point2<f64>) -> Vector3<f64> {
        let mx_d = self.inv_k11 * p.x + self.inv_k13;
        let my_d = self.inv_k22 * p.y + self.inv_k23;
        if !self.has_distortion {
            return Vector3::new(mx_d, my_d, 1.0);
        }
        // 递归去畸变
        let p_d = Vector2::new(mx_d, my_d);
        let mut p_u = p_d;
        for _ in 0..UNDISTORT_ITERATIONS {
            p_u = p_d - self.distortion(&p_u);
        }
        Vector3::new(p_u.x, p_u.y, 1.0)
    }

    fn space_to_plane(&self, p3d: &Vector3<f64>) -> Point2<f64> {
        let p_d = self.distorted_plane_point(p3d);
        let p = &self.parameters;
        Point2::new(p.fx * p_d.x + p.cx, p.fy * p_d.y + p.cy)
    }

    fn space_to_plane_jacobian(&self, p3d: &Vector3<f64>) -> Matrix2x3<f64> {
        let p = &self.parameters;
        let inv_z = 1.0 / p3d.z;
        let p_u = Vector2::new(p3d.x * inv_z, p3d.y * inv_z);
        // d(p_u) / d(p3d)
        let d_plane = Matrix2x3::new(
            inv_z,
            0.0,
            -p_u.x * inv_z,
            0.0,
            inv_z,
            -p_u.y * inv_z,
        );
        let d_dist = if self.has_distortion {
            self.distortion_jacobian(&p_u)
        } else {
            Matrix2::identity()
        };
        Matrix2::new(p.fx, 0.0, 0.0, p.fy) * d_dist * d_plane
    }

    fn get_camera_type(&self) -> CameraType {
        if self.has_distortion {
            CameraType::PinholeFull
        } else {
            CameraType::Pinhole
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distorted_camera() -> PinholeCamera {
        PinholeCamera::new(
            1,
            PinholeParameters {
                fx: 460.0,
                fy: 455.0,
                cx: 320.0,
                cy: 240.0,
                k1: -0.28,
                k2: 0.07,
                p1: 2e-4,
                p2: 1.7e-5,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_lift_projective_inverts_projection() {
        let camera = distorted_camera();
        assert_eq!(camera.get_camera_type(), CameraType::PinholeFull);
        let p3d = Vector3::new(0.3, -0.2, 2.0);
        let uv = camera.space_to_plane(&p3d);
        let ray = camera.lift_projective(&uv);
        assert!((ray.x - 0.15).abs() < 1e-9);
        assert!((ray.y + 0.1).abs() < 1e-9);
        assert_eq!(ray.z, 1.0);
    }

    #[test]
    fn test_space_to_plane_jacobian() {
        let camera = distorted_camera();
        let p3d = Vector3::new(0.4, 0.1, 3.0);
        let analytic = camera.space_to_plane_jacobian(&p3d);
        let eps = 1e-6;
        for k in 0..3 {
            let mut delta = Vector3::zeros();
            delta[k] = eps;
            let plus = camera.space_to_plane(&(p3d + delta));
            let minus = camera.space_to_plane(&(p3d - delta));
            let numeric = (plus - minus) / (2.0 * eps);
            assert!((analytic.column(k) - numeric).norm() < 1e-4, "column {}", k);
        }
    }

    #[test]
    fn test_no_distortion() {
        let camera = PinholeCamera::new(0, PinholeParameters::new(500.0, 500.0, 320.0, 240.0));
        assert_eq!(camera.get_camera_type(), CameraType::Pinhole);
        let uv = camera.space_to_plane(&Vector3::new(0.0, 0.0, 5.0));
        assert_eq!(uv, Point2::new(320.0, 240.0));
    }
}
