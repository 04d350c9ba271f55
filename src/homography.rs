//! Plane-to-plane homography estimation.
//!
//! DLT with Hartley normalization on ≥4 correspondences, wrapped in a
//! seeded RANSAC loop that refits on the best inlier set.

use crate::{
    constants::{DEFAULT_RANSAC_MAX_ITERS, DEFAULT_RANSAC_THRESHOLD, EPSILON, MIN_HOMOGRAPHY_POINTS},
    geometry::Point2D,
    Error, Result,
};
use nalgebra::{DMatrix, Matrix3, SymmetricEigen, Vector3};
use rand::{rngs::StdRng, SeedableRng};

/// Project a point through `H`, dividing by the homogeneous coordinate.
///
/// A vanishing third component yields NaN coordinates.
#[must_use]
pub fn project(h: &Matrix3<f64>, p: Point2D) -> Point2D {
    let v = h * Vector3::new(p.x, p.y, 1.0);
    if v[2].abs() < EPSILON {
        return Point2D::new(f64::NAN, f64::NAN);
    }
    Point2D::new(v[0] / v[2], v[1] / v[2])
}

/// `|project(H, src) - dst|`
#[must_use]
pub fn reprojection_error(h: &Matrix3<f64>, src: Point2D, dst: Point2D) -> f64 {
    project(h, src).distance(&dst)
}

/// Translate the centroid to the origin and scale the mean radius to √2
fn normalize_points(pts: &[Point2D]) -> (Matrix3<f64>, Vec<Point2D>) {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = pts.iter().map(|p| (p.x - cx).hypot(p.y - cy)).sum::<f64>() / n;

    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = pts
        .iter()
        .map(|p| Point2D::new(s * (p.x - cx), s * (p.y - cy)))
        .collect();

    (t, normalized)
}

/// Estimate `H` with `dst ≈ project(H, src)` from ≥4 correspondences.
///
/// # Errors
///
/// Fails with [`Error::Homography`] on mismatched or too short inputs.
pub fn estimate_homography_dlt(src: &[Point2D], dst: &[Point2D]) -> Result<Matrix3<f64>> {
    if src.len() != dst.len() {
        return Err(Error::Homography(format!(
            "point count mismatch: {} source vs {} destination",
            src.len(),
            dst.len()
        )));
    }
    let n = src.len();
    if n < MIN_HOMOGRAPHY_POINTS {
        return Err(Error::Homography(format!(
            "need at least {MIN_HOMOGRAPHY_POINTS} correspondences, got {n}"
        )));
    }

    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    let mut a = DMatrix::zeros(2 * n, 9);
    for (i, (s, d)) in src_n.iter().zip(dst_n.iter()).enumerate() {
        // [ 0 0 0 | -sx -sy -1 | dy*sx dy*sy dy ]
        a[(2 * i, 3)] = -s.x;
        a[(2 * i, 4)] = -s.y;
        a[(2 * i, 5)] = -1.0;
        a[(2 * i, 6)] = d.y * s.x;
        a[(2 * i, 7)] = d.y * s.y;
        a[(2 * i, 8)] = d.y;

        // [ sx sy 1 | 0 0 0 | -dx*sx -dx*sy -dx ]
        a[(2 * i + 1, 0)] = s.x;
        a[(2 * i + 1, 1)] = s.y;
        a[(2 * i + 1, 2)] = 1.0;
        a[(2 * i + 1, 6)] = -d.x * s.x;
        a[(2 * i + 1, 7)] = -d.x * s.y;
        a[(2 * i + 1, 8)] = -d.x;
    }

    // h is the eigenvector of AᵀA with the smallest eigenvalue
    let eig = SymmetricEigen::new(a.transpose() * &a);
    let min_idx = eig
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|(_, x), (_, y)| x.abs().total_cmp(&y.abs()))
        .map_or(0, |(i, _)| i);
    let h = eig.eigenvectors.column(min_idx);
    let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or_else(|| Error::Homography("normalizing transform not invertible".into()))?;
    let h = t_dst_inv * h_norm * t_src;

    let scale = h[(2, 2)];
    if scale.abs() < 1e-15 {
        Ok(h)
    } else {
        Ok(h / scale)
    }
}

/// RANSAC parameters
#[derive(Debug, Clone)]
pub struct RansacConfig {
    pub max_iters: usize,
    /// Reprojection error below which a pair is an inlier
    pub inlier_threshold: f64,
    pub min_inliers: usize,
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iters: DEFAULT_RANSAC_MAX_ITERS,
            inlier_threshold: DEFAULT_RANSAC_THRESHOLD,
            min_inliers: MIN_HOMOGRAPHY_POINTS,
            seed: 0,
        }
    }
}

/// Result of a RANSAC fit
#[derive(Debug, Clone)]
pub struct RansacHomography {
    pub h: Matrix3<f64>,
    pub inlier_mask: Vec<bool>,
    pub n_inliers: usize,
}

/// Robust homography fit.
///
/// # Errors
///
/// Fails with [`Error::Homography`] when fewer than four pairs are given or
/// no hypothesis gathers `min_inliers` inliers.
pub fn fit_homography_ransac(
    src: &[Point2D],
    dst: &[Point2D],
    config: &RansacConfig,
) -> Result<RansacHomography> {
    let n = src.len();
    if n < MIN_HOMOGRAPHY_POINTS || dst.len() != n {
        return Err(Error::Homography(format!(
            "need at least {MIN_HOMOGRAPHY_POINTS} matched correspondences, got {n} / {}",
            dst.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best_inliers = 0usize;
    let mut best_mask = vec![false; n];
    let mut best_h = Matrix3::identity();

    for _ in 0..config.max_iters {
        let sample = rand::seq::index::sample(&mut rng, n, MIN_HOMOGRAPHY_POINTS);
        let s4: Vec<Point2D> = sample.iter().map(|i| src[i]).collect();
        let d4: Vec<Point2D> = sample.iter().map(|i| dst[i]).collect();

        let Ok(h) = estimate_homography_dlt(&s4, &d4) else {
            continue;
        };

        let mask: Vec<bool> = src
            .iter()
            .zip(dst)
            .map(|(&s, &d)| reprojection_error(&h, s, d) < config.inlier_threshold)
            .collect();
        let count = mask.iter().filter(|&&m| m).count();

        if count > best_inliers {
            best_inliers = count;
            best_mask = mask;
            best_h = h;

            // Early exit above 90% inliers
            if count * 10 > n * 9 {
                break;
            }
        }
    }

    if best_inliers < config.min_inliers {
        return Err(Error::Homography(format!(
            "insufficient inliers: need {}, found {best_inliers}",
            config.min_inliers
        )));
    }

    let (inlier_src, inlier_dst): (Vec<Point2D>, Vec<Point2D>) = src
        .iter()
        .zip(dst)
        .zip(&best_mask)
        .filter(|(_, m)| **m)
        .map(|((&s, &d), _)| (s, d))
        .unzip();
    let h = estimate_homography_dlt(&inlier_src, &inlier_dst).unwrap_or(best_h);

    let inlier_mask: Vec<bool> = src
        .iter()
        .zip(dst)
        .map(|(&s, &d)| reprojection_error(&h, s, d) < config.inlier_threshold)
        .collect();
    let n_inliers = inlier_mask.iter().filter(|&&m| m).count();

    Ok(RansacHomography {
        h,
        inlier_mask,
        n_inliers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::Rng;

    fn test_homography() -> Matrix3<f64> {
        Matrix3::new(1.2, 0.1, 30.0, -0.05, 0.9, 12.0, 1e-4, 2e-4, 1.0)
    }

    fn grid() -> Vec<Point2D> {
        let mut pts = Vec::new();
        for i in 0..6 {
            for j in 0..5 {
                pts.push(Point2D::new(f64::from(i) * 40.0, f64::from(j) * 35.0));
            }
        }
        pts
    }

    #[test]
    fn test_dlt_exact() {
        let h_true = test_homography();
        let src = grid();
        let dst: Vec<Point2D> = src.iter().map(|&p| project(&h_true, p)).collect();

        let h = estimate_homography_dlt(&src, &dst).unwrap();
        for (&s, &d) in src.iter().zip(&dst) {
            assert!(reprojection_error(&h, s, d) < 1e-8);
        }
        assert_relative_eq!(h[(2, 2)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_dlt_four_points() {
        let src = [
            Point2D::new(0.0, 0.0),
            Point2D::new(1.0, 0.0),
            Point2D::new(1.0, 1.0),
            Point2D::new(0.0, 1.0),
        ];
        let dst = [
            Point2D::new(10.0, 10.0),
            Point2D::new(30.0, 12.0),
            Point2D::new(28.0, 35.0),
            Point2D::new(9.0, 30.0),
        ];
        let h = estimate_homography_dlt(&src, &dst).unwrap();
        for (&s, &d) in src.iter().zip(&dst) {
            assert!(reprojection_error(&h, s, d) < 1e-9);
        }
    }

    #[test]
    fn test_too_few_points() {
        let pts = [Point2D::zero(); 3];
        assert!(estimate_homography_dlt(&pts, &pts).is_err());
        assert!(fit_homography_ransac(&pts, &pts, &RansacConfig::default()).is_err());
    }

    #[test]
    fn test_ransac_rejects_outliers() {
        let h_true = test_homography();
        let src = grid();
        let mut dst: Vec<Point2D> = src.iter().map(|&p| project(&h_true, p)).collect();

        let mut rng = StdRng::seed_from_u64(7);
        for d in dst.iter_mut().step_by(7) {
            d.x += rng.gen_range(50.0..100.0);
            d.y -= rng.gen_range(50.0..100.0);
        }

        let result = fit_homography_ransac(&src, &dst, &RansacConfig::default()).unwrap();
        // indices 0, 7, 14, 21 and 28 were corrupted
        assert_eq!(result.n_inliers, src.len() - 5);
        for (i, (&s, &d)) in src.iter().zip(&dst).enumerate() {
            if i % 7 != 0 {
                assert!(reprojection_error(&result.h, s, d) < 1e-6);
            }
        }
    }

    #[test]
    fn test_project_at_infinity_is_nan() {
        let h = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0);
        assert!(project(&h, Point2D::new(0.0, 3.0)).is_nan());
    }
}
