use nalgebra::{Isometry3, Matrix3, Translation3, UnitQuaternion, Vector3};

use crate::global_types::Pose;

pub struct Utility {}

impl Utility {
    /// 反对称矩阵 [v]x
    #[inline]
    pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
        Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
    }

    /// Left Jacobian of SO(3): exp(w + dw) ≈ exp(J_l(w) dw) exp(w).
    pub fn so3_left_jacobian(w: &Vector3<f64>) -> Matrix3<f64> {
        let theta = w.norm();
        let wx = Self::skew(w);
        if theta < 1e-8 {
            return Matrix3::identity() + 0.5 * wx;
        }
        let theta2 = theta * theta;
        Matrix3::identity()
            + (1.0 - theta.cos()) / theta2 * wx
            + (theta - theta.sin()) / (theta2 * theta) * wx * wx
    }

    /// 旋转向量 + 平移 → Tcw
    #[inline]
    pub fn pose_from_params(rot: &Vector3<f64>, trans: &Vector3<f64>) -> Pose {
        Isometry3::from_parts(
            Translation3::from(*trans),
            UnitQuaternion::from_scaled_axis(*rot),
        )
    }

    #[inline]
    pub fn pose_to_params(pose: &Pose) -> (Vector3<f64>, Vector3<f64>) {
        (pose.rotation.scaled_axis(), pose.translation.vector)
    }

    /// Camera center in world coordinates for a world→camera pose.
    #[inline]
    pub fn camera_center(tcw: &Pose) -> Vector3<f64> {
        tcw.inverse_transform_vector(&(-tcw.translation.vector))
    }
}
