use nalgebra::{DMatrix, Matrix3x4, Matrix4, Vector3};

use crate::global_types::Pose;
use crate::utility::Utility;

/// Homogeneous coordinates whose last component is below this are treated as
/// points at infinity.
const MIN_HOMOGENEOUS_W: f64 = 1e-12;

#[inline]
fn projection_matrix(tcw: &Pose) -> Matrix3x4<f64> {
    tcw.to_homogeneous().fixed_view::<3, 4>(0, 0).into_owned()
}

/// Two-view DLT on normalized rays `(x, y, 1)`.
pub fn triangulate_point(
    ray_i: &Vector3<f64>,
    ray_j: &Vector3<f64>,
    pose_i: &Pose,
    pose_j: &Pose,
) -> Option<Vector3<f64>> {
    let pose_i = projection_matrix(pose_i);
    let pose_j = projection_matrix(pose_j);
    let row0 = ray_i.x * pose_i.row(2) - pose_i.row(0);
    let row1 = ray_i.y * pose_i.row(2) - pose_i.row(1);
    let row2 = ray_j.x * pose_j.row(2) - pose_j.row(0);
    let row3 = ray_j.y * pose_j.row(2) - pose_j.row(1);
    let design_matrix = Matrix4::<f64>::from_rows(&[row0, row1, row2, row3]);

    let svd = design_matrix.svd(false, true);
    let v_t = svd.v_t?;
    let min_index = svd.singular_values.imin();
    let tri_pt = v_t.row(min_index);
    dehomogenize(tri_pt[0], tri_pt[1], tri_pt[2], tri_pt[3])
}

/// N-view DLT: stacks two rows per view and takes the right null vector.
pub fn triangulate_multiview(rays: &[Vector3<f64>], poses: &[Pose]) -> Option<Vector3<f64>> {
    if rays.len() < 2 || rays.len() != poses.len() {
        return None;
    }
    if rays.len() == 2 {
        return triangulate_point(&rays[0], &rays[1], &poses[0], &poses[1]);
    }
    let mut design_matrix = DMatrix::<f64>::zeros(2 * rays.len(), 4);
    for (k, (ray, pose)) in rays.iter().zip(poses).enumerate() {
        let proj = projection_matrix(pose);
        design_matrix
            .row_mut(2 * k)
            .copy_from(&(ray.x * proj.row(2) - proj.row(0)));
        design_matrix
            .row_mut(2 * k + 1)
            .copy_from(&(ray.y * proj.row(2) - proj.row(1)));
    }
    let svd = design_matrix.svd(false, true);
    let v_t = svd.v_t?;
    let min_index = svd.singular_values.imin();
    let tri_pt = v_t.row(min_index);
    dehomogenize(tri_pt[0], tri_pt[1], tri_pt[2], tri_pt[3])
}

#[inline]
fn dehomogenize(x: f64, y: f64, z: f64, w: f64) -> Option<Vector3<f64>> {
    if w.abs() < MIN_HOMOGENEOUS_W {
        return None;
    }
    let point = Vector3::new(x / w, y / w, z / w);
    point.iter().all(|v| v.is_finite()).then_some(point)
}

/// Angle (radians) between the rays from two camera centers to `point`.
pub fn triangulation_angle(center_i: &Vector3<f64>, center_j: &Vector3<f64>, point: &Vector3<f64>) -> f64 {
    let ray_i = point - center_i;
    let ray_j = point - center_j;
    let norm = ray_i.norm() * ray_j.norm();
    if norm <= f64::EPSILON {
        return 0.0;
    }
    (ray_i.dot(&ray_j) / norm).clamp(-1.0, 1.0).acos()
}

/// Largest pairwise triangulation angle over all views.
pub fn max_triangulation_angle(poses: &[Pose], point: &Vector3<f64>) -> f64 {
    let centers: Vec<_> = poses.iter().map(Utility::camera_center).collect();
    let mut max_angle = 0.0f64;
    for i in 0..centers.len() {
        for j in i + 1..centers.len() {
            max_angle = max_angle.max(triangulation_angle(&centers[i], &centers[j], point));
        }
    }
    max_angle
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn look_forward(center: Vector3<f64>) -> Pose {
        Utility::pose_from_params(&Vector3::zeros(), &(-center))
    }

    fn ray(pose: &Pose, point: &Vector3<f64>) -> Vector3<f64> {
        let p_c = pose.transform_point(&(*point).into()).coords;
        p_c / p_c.z
    }

    #[test]
    fn test_triangulate_point() {
        let pose_i = look_forward(Vector3::zeros());
        let pose_j = look_forward(Vector3::new(1.0, 0.0, 0.0));
        let point = Vector3::new(0.3, -0.4, 5.0);
        let tri = triangulate_point(&ray(&pose_i, &point), &ray(&pose_j, &point), &pose_i, &pose_j)
            .unwrap();
        assert!((tri - point).norm() < 1e-9);
    }

    #[test]
    fn test_triangulate_multiview() {
        let poses: Vec<Pose> = (0..4)
            .map(|k| {
                Utility::pose_from_params(
                    &Vector3::new(0.0, 0.05 * k as f64, 0.0),
                    &Vector3::new(-0.5 * k as f64, 0.1, 0.0),
                )
            })
            .collect();
        let point = Vector3::new(1.0, 0.5, 6.0);
        let rays: Vec<_> = poses.iter().map(|pose| ray(pose, &point)).collect();
        let tri = triangulate_multiview(&rays, &poses).unwrap();
        assert!((tri - point).norm() < 1e-8);
    }

    #[test]
    fn test_triangulate_multiview_rejects_mismatch() {
        let pose = look_forward(Vector3::zeros());
        assert!(triangulate_multiview(&[Vector3::z()], &[pose]).is_none());
        assert!(triangulate_multiview(&[Vector3::z(), Vector3::z()], &[pose]).is_none());
    }

    #[test]
    fn test_triangulation_angle() {
        let angle = triangulation_angle(
            &Vector3::new(-1.0, 0.0, 0.0),
            &Vector3::new(1.0, 0.0, 0.0),
            &Vector3::new(0.0, 0.0, 1.0),
        );
        assert!((angle - std::f64::consts::FRAC_PI_2).abs() < 1e-12);

        let poses = [look_forward(Vector3::zeros()), look_forward(Vector3::zeros())];
        assert_eq!(max_triangulation_angle(&poses, &Vector3::new(0.0, 0.0, 3.0)), 0.0);
    }
}
