//! Direct least-squares ellipse fitting (Fitzgibbon et al., 1999).
//!
//! Points are normalized to zero mean and mean radius √2 before the
//! scatter matrix is built; the reduced 3×3 generalized eigenproblem is
//! solved through its characteristic cubic.

use crate::{constants::MIN_ELLIPSE_POINTS, geometry::Point2D, Error, Result};
use nalgebra::{DMatrix, Matrix3, Vector3, Vector6};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI, SQRT_2};

/// General conic `A x² + B xy + C y² + D x + E y + F = 0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Conic(pub [f64; 6]);

impl Conic {
    /// True for a proper ellipse discriminant (B² − 4AC < 0)
    #[must_use]
    pub fn is_ellipse(&self) -> bool {
        let [a, b, c, ..] = self.0;
        b * b - 4.0 * a * c < 0.0
    }

    /// Algebraic distance of a point to this conic
    #[must_use]
    pub fn algebraic_distance(&self, x: f64, y: f64) -> f64 {
        let [a, b, c, d, e, f] = self.0;
        a * x * x + b * x * y + c * y * y + d * x + e * y + f
    }
}

/// Ellipse as a rotated rectangle.
///
/// `width` is the full axis length along `angle` (radians, in (−π/2, π/2]),
/// `height` the full axis length perpendicular to it. `width >= height`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedEllipse {
    pub center: Point2D,
    pub width: f64,
    pub height: f64,
    pub angle: f64,
}

impl RotatedEllipse {
    /// Height over width
    #[must_use]
    pub fn oblateness(&self) -> f64 {
        self.height / self.width
    }

    /// Bounding-box area `width * height`, used to rank candidates
    #[must_use]
    pub fn box_area(&self) -> f64 {
        self.width * self.height
    }

    /// Sample `n` points on the boundary
    #[must_use]
    pub fn sample_points(&self, n: usize) -> Vec<Point2D> {
        let (sin_a, cos_a) = self.angle.sin_cos();
        let (ra, rb) = (self.width / 2.0, self.height / 2.0);
        (0..n)
            .map(|i| {
                let t = 2.0 * PI * (i as f64) / (n as f64);
                let px = ra * t.cos();
                let py = rb * t.sin();
                Point2D::new(
                    self.center.x + cos_a * px - sin_a * py,
                    self.center.y + sin_a * px + cos_a * py,
                )
            })
            .collect()
    }

    fn is_valid(&self) -> bool {
        self.width > 0.0
            && self.height > 0.0
            && self.width.is_finite()
            && self.height.is_finite()
            && !self.center.is_nan()
            && self.center.x.is_finite()
            && self.center.y.is_finite()
            && self.angle.is_finite()
    }
}

/// Fit an ellipse to a contour.
///
/// # Errors
///
/// Returns [`Error::Ellipse`] when fewer than six points are given, the
/// points are degenerate (e.g. collinear) or the best conic is not an
/// ellipse.
pub fn fit_ellipse(points: &[Point2D]) -> Result<RotatedEllipse> {
    if points.len() < MIN_ELLIPSE_POINTS {
        return Err(Error::Ellipse(format!(
            "need at least {MIN_ELLIPSE_POINTS} points, got {}",
            points.len()
        )));
    }
    let conic = fit_conic_direct(points)
        .ok_or_else(|| Error::Ellipse("direct fit did not converge to an ellipse".into()))?;
    conic_to_ellipse(&conic).ok_or_else(|| Error::Ellipse("degenerate conic".into()))
}

/// Fitzgibbon direct fit; `None` when the system is singular.
fn fit_conic_direct(points: &[Point2D]) -> Option<Conic> {
    let n = points.len();
    let (mean_x, mean_y, scale) = normalization_params(points);

    // Design matrix D = [x², xy, y², x, y, 1]
    let mut d = DMatrix::<f64>::zeros(n, 6);
    for (i, p) in points.iter().enumerate() {
        let x = (p.x - mean_x) * scale;
        let y = (p.y - mean_y) * scale;
        d[(i, 0)] = x * x;
        d[(i, 1)] = x * y;
        d[(i, 2)] = y * y;
        d[(i, 3)] = x;
        d[(i, 4)] = y;
        d[(i, 5)] = 1.0;
    }

    let s = d.transpose() * &d;
    let s11 = s.fixed_view::<3, 3>(0, 0).into_owned();
    let s12 = s.fixed_view::<3, 3>(0, 3).into_owned();
    let s22 = s.fixed_view::<3, 3>(3, 3).into_owned();

    // Constraint 4AC − B² > 0
    let c1 = Matrix3::new(0.0, 0.0, 2.0, 0.0, -1.0, 0.0, 2.0, 0.0, 0.0);

    let s22_inv = s22.try_inverse()?;
    let m = s11 - s12 * s22_inv * s12.transpose();
    let system = c1.try_inverse()? * m;

    let a1 = constrained_eigenvector(&system)?;
    let a2 = -s22_inv * s12.transpose() * a1;

    let normalized = Vector6::new(a1[0], a1[1], a1[2], a2[0], a2[1], a2[2]);
    let conic = Conic(denormalize_conic(&normalized, mean_x, mean_y, scale));

    conic.is_ellipse().then_some(conic)
}

/// Eigenvector of the 3×3 system satisfying `4 v0 v2 − v1² > 0`, taking the
/// smallest such eigenvalue in magnitude.
fn constrained_eigenvector(system: &Matrix3<f64>) -> Option<Vector3<f64>> {
    let a = system;
    let trace = a.trace();
    let minor_sum = a[(0, 0)] * a[(1, 1)] - a[(0, 1)] * a[(1, 0)] + a[(0, 0)] * a[(2, 2)]
        - a[(0, 2)] * a[(2, 0)]
        + a[(1, 1)] * a[(2, 2)]
        - a[(1, 2)] * a[(2, 1)];
    let det = a.determinant();

    let mut best: Option<(f64, Vector3<f64>)> = None;
    for ev in solve_cubic_real(-trace, minor_sum, -det) {
        let shifted = system - Matrix3::identity() * ev;
        let Some(v) = null_vector(&shifted) else {
            continue;
        };
        if 4.0 * v[0] * v[2] - v[1] * v[1] <= 0.0 {
            continue;
        }
        if best.map_or(true, |(best_ev, _)| ev.abs() < best_ev) {
            best = Some((ev.abs(), v));
        }
    }
    best.map(|(_, v)| v)
}

/// Null vector of a rank-2 3×3 matrix: the largest row of its adjugate.
fn null_vector(m: &Matrix3<f64>) -> Option<Vector3<f64>> {
    let rows = [
        Vector3::new(
            m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)],
            -(m[(1, 0)] * m[(2, 2)] - m[(1, 2)] * m[(2, 0)]),
            m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)],
        ),
        Vector3::new(
            -(m[(0, 1)] * m[(2, 2)] - m[(0, 2)] * m[(2, 1)]),
            m[(0, 0)] * m[(2, 2)] - m[(0, 2)] * m[(2, 0)],
            -(m[(0, 0)] * m[(2, 1)] - m[(0, 1)] * m[(2, 0)]),
        ),
        Vector3::new(
            m[(0, 1)] * m[(1, 2)] - m[(0, 2)] * m[(1, 1)],
            -(m[(0, 0)] * m[(1, 2)] - m[(0, 2)] * m[(1, 0)]),
            m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)],
        ),
    ];

    let best = rows
        .iter()
        .max_by(|a, b| a.norm_squared().total_cmp(&b.norm_squared()))?;
    let norm_sq = best.norm_squared();
    if norm_sq < 1e-30 {
        return None;
    }
    Some(best / norm_sq.sqrt())
}

/// Real roots of the monic cubic `x³ + b x² + c x + d`.
fn solve_cubic_real(b: f64, c: f64, d: f64) -> Vec<f64> {
    // Depressed cubic t³ + pt + q with x = t − b/3
    let p = c - b * b / 3.0;
    let q = 2.0 * b * b * b / 27.0 - b * c / 3.0 + d;
    let shift = -b / 3.0;

    let disc = -4.0 * p * p * p - 27.0 * q * q;
    if disc >= 0.0 {
        let r = (-p / 3.0).sqrt();
        let cos_arg = if r.abs() < 1e-15 {
            0.0
        } else {
            (-q / (2.0 * r * r * r)).clamp(-1.0, 1.0)
        };
        let theta = cos_arg.acos();
        (0..3)
            .map(|k| 2.0 * r * ((theta + 2.0 * PI * f64::from(k)) / 3.0).cos() + shift)
            .collect()
    } else {
        let sqrt_disc = (q * q / 4.0 + p * p * p / 27.0).sqrt();
        let u = (-q / 2.0 + sqrt_disc).cbrt();
        let v = (-q / 2.0 - sqrt_disc).cbrt();
        vec![u + v + shift]
    }
}

/// Returns `(mean_x, mean_y, scale)` with mean distance scaled to √2.
fn normalization_params(points: &[Point2D]) -> (f64, f64, f64) {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.x).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| (p.x - mean_x).hypot(p.y - mean_y))
        .sum::<f64>()
        / n;
    let scale = if mean_dist > 1e-15 { SQRT_2 / mean_dist } else { 1.0 };
    (mean_x, mean_y, scale)
}

/// Map a conic fitted in `x' = s(x − mx), y' = s(y − my)` back to pixels.
fn denormalize_conic(c: &Vector6<f64>, mx: f64, my: f64, s: f64) -> [f64; 6] {
    let [a_, b_, c_, d_, e_, f_] = [c[0], c[1], c[2], c[3], c[4], c[5]];
    let s2 = s * s;

    let a = a_ * s2;
    let b = b_ * s2;
    let c = c_ * s2;
    let d = -2.0 * a_ * s2 * mx - b_ * s2 * my + d_ * s;
    let e = -b_ * s2 * mx - 2.0 * c_ * s2 * my + e_ * s;
    let f =
        a_ * s2 * mx * mx + b_ * s2 * mx * my + c_ * s2 * my * my - d_ * s * mx - e_ * s * my + f_;

    [a, b, c, d, e, f]
}

/// Geometric parameters of an elliptic conic.
#[must_use]
pub fn conic_to_ellipse(conic: &Conic) -> Option<RotatedEllipse> {
    let [a, b, c, d, e, f] = conic.0;

    let denom = 4.0 * a * c - b * b;
    if denom <= 0.0 {
        return None;
    }

    let cx = (b * e - 2.0 * c * d) / denom;
    let cy = (b * d - 2.0 * a * e) / denom;

    let angle = if (a - c).abs() < 1e-15 {
        if b > 0.0 {
            FRAC_PI_4
        } else if b < 0.0 {
            -FRAC_PI_4
        } else {
            0.0
        }
    } else {
        0.5 * b.atan2(a - c)
    };

    let sum = a + c;
    let diff = ((a - c).powi(2) + b * b).sqrt();
    let lambda1 = (sum + diff) / 2.0;
    let lambda2 = (sum - diff) / 2.0;

    // Conic value at the center
    let f_center = a * cx * cx + b * cx * cy + c * cy * cy + d * cx + e * cy + f;
    if f_center.abs() < 1e-15 {
        return None;
    }

    let a_sq = -f_center / lambda1;
    let b_sq = -f_center / lambda2;
    if a_sq <= 0.0 || b_sq <= 0.0 {
        return None;
    }

    let (semi_a, semi_b) = (a_sq.sqrt(), b_sq.sqrt());
    let (semi_major, semi_minor, angle) = if semi_a >= semi_b {
        (semi_a, semi_b, angle)
    } else {
        (semi_b, semi_a, angle + FRAC_PI_2)
    };

    let ellipse = RotatedEllipse {
        center: Point2D::new(cx, cy),
        width: 2.0 * semi_major,
        height: 2.0 * semi_minor,
        angle: normalize_angle(angle),
    };
    ellipse.is_valid().then_some(ellipse)
}

fn normalize_angle(mut angle: f64) -> f64 {
    while angle > FRAC_PI_2 {
        angle -= PI;
    }
    while angle <= -FRAC_PI_2 {
        angle += PI;
    }
    angle
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::prelude::*;

    fn test_ellipse() -> RotatedEllipse {
        RotatedEllipse {
            center: Point2D::new(100.0, 80.0),
            width: 60.0,
            height: 30.0,
            angle: 0.3,
        }
    }

    #[test]
    fn test_fit_exact_points() {
        let e = test_ellipse();
        let fitted = fit_ellipse(&e.sample_points(50)).unwrap();

        assert_relative_eq!(fitted.center.x, e.center.x, epsilon = 1e-6);
        assert_relative_eq!(fitted.center.y, e.center.y, epsilon = 1e-6);
        assert_relative_eq!(fitted.width, e.width, epsilon = 1e-6);
        assert_relative_eq!(fitted.height, e.height, epsilon = 1e-6);
        assert_relative_eq!(fitted.angle, e.angle, epsilon = 1e-6);
    }

    #[test]
    fn test_fit_circle() {
        let e = RotatedEllipse {
            center: Point2D::new(50.0, 50.0),
            width: 40.0,
            height: 40.0,
            angle: 0.0,
        };
        let fitted = fit_ellipse(&e.sample_points(100)).unwrap();
        assert_relative_eq!(fitted.center.x, 50.0, epsilon = 1e-6);
        assert_relative_eq!(fitted.center.y, 50.0, epsilon = 1e-6);
        assert_relative_eq!(fitted.oblateness(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_fit_noisy_points() {
        let e = test_ellipse();
        let mut rng = StdRng::seed_from_u64(123);
        let pts: Vec<Point2D> = e
            .sample_points(200)
            .into_iter()
            .map(|p| {
                Point2D::new(
                    p.x + rng.gen_range(-0.5..0.5),
                    p.y + rng.gen_range(-0.5..0.5),
                )
            })
            .collect();

        let fitted = fit_ellipse(&pts).unwrap();
        assert_relative_eq!(fitted.center.x, e.center.x, epsilon = 1.0);
        assert_relative_eq!(fitted.center.y, e.center.y, epsilon = 1.0);
        assert_relative_eq!(fitted.width, e.width, epsilon = 4.0);
    }

    #[test]
    fn test_too_few_points() {
        let pts = vec![Point2D::new(0.0, 0.0); 5];
        assert!(matches!(fit_ellipse(&pts), Err(Error::Ellipse(_))));
    }

    #[test]
    fn test_collinear_points_rejected() {
        let pts: Vec<Point2D> = (0..20).map(|i| Point2D::new(f64::from(i), 2.0 * f64::from(i))).collect();
        assert!(fit_ellipse(&pts).is_err());
    }

    #[test]
    fn test_conic_of_fit_passes_through_points() {
        let e = test_ellipse();
        let pts = e.sample_points(40);
        let conic = fit_conic_direct(&pts).unwrap();
        assert!(conic.is_ellipse());
        let [a, _, c, ..] = conic.0;
        let norm = (a + c).abs();
        for p in &pts {
            assert!(conic.algebraic_distance(p.x, p.y).abs() / norm < 1e-6);
        }
    }
}
