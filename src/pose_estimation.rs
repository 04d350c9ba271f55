//! Head pose from the four points of a planar head marker.
//!
//! The marker points are coplanar, so the pose follows from the
//! plane-to-image homography: with `K⁻¹H = λ[r1 r2 t]` the rotation is
//! rebuilt from the first two columns and projected back onto SO(3).

use crate::{
    geometry::Point2D,
    head_pose::HeadPose,
    homography::estimate_homography_dlt,
    Error, Result,
};
use log::debug;
use nalgebra::{Matrix3, Rotation3, Vector3};

/// Marker corners in model units.
///
/// The physical marker sits on the plane `z = 20.02`; a constant depth does
/// not change the recovered rotation, so only `x` and `y` are kept.
pub const MARKER_MODEL_POINTS: [(f64, f64); 4] = [(85.60, 234.44), (-2.92, 238.53), (-8.02, 140.93), (80.74, 140.93)];

/// Text sent by the marker tracker when it sees nothing
pub const NO_MARKERS: &str = "none";

/// Parse a `x1|y1;x2|y2;x3|y3;x4|y4` marker line.
///
/// Points come back last-first, the order [`MarkerPoseEstimator::estimate`]
/// pairs them with [`MARKER_MODEL_POINTS`]. `"none"` yields `Ok(None)`.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] unless the line holds exactly eight numbers.
pub fn parse_marker_line(line: &str) -> Result<Option<[Point2D; 4]>> {
    let line = line.trim();
    if line == NO_MARKERS {
        return Ok(None);
    }

    let values = line
        .split(['|', ';'])
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim()
                .parse::<f64>()
                .map_err(|e| Error::InvalidInput(format!("bad marker coordinate '{s}': {e}")))
        })
        .collect::<Result<Vec<f64>>>()?;

    if values.len() != 8 {
        return Err(Error::InvalidInput(format!(
            "expected 8 marker coordinates, got {}",
            values.len()
        )));
    }

    let mut markers = [Point2D::zero(); 4];
    for (slot, pair) in markers.iter_mut().zip(values.chunks_exact(2).rev()) {
        *slot = Point2D::new(pair[0], pair[1]);
    }
    Ok(Some(markers))
}

/// Planar marker pose solver for a fixed camera geometry
#[derive(Debug, Clone)]
pub struct MarkerPoseEstimator {
    camera_matrix: Matrix3<f64>,
    camera_matrix_inv: Matrix3<f64>,
}

impl MarkerPoseEstimator {
    /// Pinhole camera with `f = max(width, height)` and the principal point at
    /// the image center; no lens distortion.
    ///
    /// # Errors
    ///
    /// Fails for an empty image size.
    pub fn new(image_width: u32, image_height: u32) -> Result<Self> {
        if image_width == 0 || image_height == 0 {
            return Err(Error::InvalidInput(format!(
                "invalid image size {image_width}x{image_height}"
            )));
        }
        let focal = f64::from(image_width.max(image_height));
        let camera_matrix = Matrix3::new(
            focal,
            0.0,
            f64::from(image_width) / 2.0,
            0.0,
            focal,
            f64::from(image_height) / 2.0,
            0.0,
            0.0,
            1.0,
        );
        let camera_matrix_inv = camera_matrix
            .try_inverse()
            .ok_or_else(|| Error::PoseEstimation("camera matrix not invertible".into()))?;

        Ok(Self {
            camera_matrix,
            camera_matrix_inv,
        })
    }

    #[must_use]
    pub fn camera_matrix(&self) -> &Matrix3<f64> {
        &self.camera_matrix
    }

    /// Estimate the head pose from four marker points in image pixels.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoseEstimation`] for degenerate marker layouts.
    pub fn estimate(&self, markers: &[Point2D; 4]) -> Result<HeadPose> {
        let model: Vec<Point2D> = MARKER_MODEL_POINTS.iter().map(|&p| Point2D::from(p)).collect();
        let normalized: Vec<Point2D> = markers
            .iter()
            .map(|m| {
                let v = self.camera_matrix_inv * Vector3::new(m.x, m.y, 1.0);
                Point2D::new(v[0] / v[2], v[1] / v[2])
            })
            .collect();

        let h = estimate_homography_dlt(&model, &normalized)
            .map_err(|e| Error::PoseEstimation(format!("marker homography failed: {e}")))?;
        let rotation = rotation_from_homography(&h)?;
        let rvec = rotation.scaled_axis();

        let position = Point2D::centroid(markers).unwrap_or_default();
        debug!(
            "Marker pose: position=({:.1}, {:.1}) rvec=({:.3}, {:.3}, {:.3})",
            position.x, position.y, rvec[0], rvec[1], rvec[2]
        );
        Ok(HeadPose::new(position, [rvec[0], rvec[1], rvec[2]]))
    }
}

/// Rotation of a plane seen through a normalized-camera homography
fn rotation_from_homography(h: &Matrix3<f64>) -> Result<Rotation3<f64>> {
    let h1 = h.column(0).into_owned();
    let h2 = h.column(1).into_owned();
    let h3 = h.column(2).into_owned();

    let norm = (h1.norm() + h2.norm()) * 0.5;
    if !norm.is_finite() || norm < f64::EPSILON {
        return Err(Error::PoseEstimation("degenerate marker homography".into()));
    }
    // the plane has to sit in front of the camera
    let lambda = if h3[2] < 0.0 { -1.0 / norm } else { 1.0 / norm };

    let r1 = h1 * lambda;
    let r2 = h2 * lambda;
    let r3 = r1.cross(&r2);
    if r3.norm() < 1e-6 {
        return Err(Error::PoseEstimation("marker points are collinear".into()));
    }
    let r = Matrix3::from_columns(&[r1, r2, r3]);

    let svd = r.svd(true, true);
    let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
        return Err(Error::PoseEstimation("SVD of the rotation estimate failed".into()));
    };
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }
    Ok(Rotation3::from_matrix_unchecked(r_orth))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project_markers(estimator: &MarkerPoseEstimator, rot: &Rotation3<f64>, t: Vector3<f64>) -> [Point2D; 4] {
        let k = estimator.camera_matrix();
        let mut out = [Point2D::zero(); 4];
        for (slot, &(x, y)) in out.iter_mut().zip(MARKER_MODEL_POINTS.iter()) {
            let cam = rot * Vector3::new(x, y, 0.0) + t;
            let img = k * cam;
            *slot = Point2D::new(img[0] / img[2], img[1] / img[2]);
        }
        out
    }

    #[test]
    fn test_parse_marker_line_reverses_order() {
        let markers = parse_marker_line("1|2;3|4;5|6;7|8").unwrap().unwrap();
        assert_eq!(markers[0], Point2D::new(7.0, 8.0));
        assert_eq!(markers[1], Point2D::new(5.0, 6.0));
        assert_eq!(markers[2], Point2D::new(3.0, 4.0));
        assert_eq!(markers[3], Point2D::new(1.0, 2.0));
    }

    #[test]
    fn test_parse_marker_line_none_and_errors() {
        assert!(parse_marker_line("none").unwrap().is_none());
        assert!(parse_marker_line("none\n").unwrap().is_none());
        assert!(parse_marker_line("1|2;3|4").is_err());
        assert!(parse_marker_line("1|2;3|4;5|x;7|8").is_err());
    }

    #[test]
    fn test_invalid_image_size() {
        assert!(MarkerPoseEstimator::new(0, 480).is_err());
    }

    #[test]
    fn test_intrinsics() {
        let estimator = MarkerPoseEstimator::new(640, 480).unwrap();
        let k = estimator.camera_matrix();
        assert_eq!(k[(0, 0)], 640.0);
        assert_eq!(k[(1, 1)], 640.0);
        assert_eq!(k[(0, 2)], 320.0);
        assert_eq!(k[(1, 2)], 240.0);
    }

    #[test]
    fn test_recovers_rotation() {
        let estimator = MarkerPoseEstimator::new(640, 480).unwrap();
        let rot = Rotation3::from_euler_angles(0.15, -0.2, 0.05);
        let markers = project_markers(&estimator, &rot, Vector3::new(-40.0, -190.0, 600.0));

        let pose = estimator.estimate(&markers).unwrap();
        let expected = rot.scaled_axis();
        for i in 0..3 {
            assert!(
                (pose.rotation[i] - expected[i]).abs() < 1e-6,
                "component {i}: {} vs {}",
                pose.rotation[i],
                expected[i]
            );
        }

        let c = Point2D::centroid(&markers).unwrap();
        assert_eq!(pose.position, c);
    }

    #[test]
    fn test_frontal_marker_has_no_rotation() {
        let estimator = MarkerPoseEstimator::new(640, 480).unwrap();
        let markers = project_markers(&estimator, &Rotation3::identity(), Vector3::new(-40.0, -190.0, 500.0));
        let pose = estimator.estimate(&markers).unwrap();
        assert!(pose.rotation.iter().all(|r| r.abs() < 1e-9));
    }

    #[test]
    fn test_collapsed_markers_fail() {
        let estimator = MarkerPoseEstimator::new(640, 480).unwrap();
        let markers = [Point2D::new(100.0, 100.0); 4];
        assert!(estimator.estimate(&markers).is_err());
    }
}
