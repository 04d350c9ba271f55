use super::MovementSmoother;
use crate::{
    constants::{DOUBLE_EXP_ALPHA, DOUBLE_EXP_GAMMA},
    geometry::Point2D,
};

/// One step of double exponential smoothing on a single axis.
///
/// Returns `(smoothed, trend)`.
pub(crate) fn double_exp_step(
    alpha: f64,
    gamma: f64,
    input: f64,
    previous_output: f64,
    previous_trend: f64,
) -> (f64, f64) {
    let smoothed = alpha * input + (1.0 - alpha) * (previous_output + previous_trend);
    let trend = trend_step(gamma, smoothed, previous_output, previous_trend);
    (smoothed, trend)
}

/// Trend update shared by the double exponential smoothers
pub(crate) fn trend_step(gamma: f64, smoothed: f64, previous_output: f64, previous_trend: f64) -> f64 {
    gamma * (smoothed - previous_output) + (1.0 - gamma) * previous_trend
}

/// Double exponential (Holt) smoothing filter
pub struct DoubleExpSmoother {
    alpha: f64,
    gamma: f64,
    previous_output: Point2D,
    previous_trend: Point2D,
}

impl DoubleExpSmoother {
    /// Create a new double exponential smoother
    ///
    /// # Panics
    ///
    /// Panics if alpha or gamma is not in the range (0, 1]
    #[must_use]
    pub fn new(alpha: f64, gamma: f64) -> Self {
        assert!(alpha > 0.0 && alpha <= 1.0, "Alpha must be in (0, 1]");
        assert!(gamma > 0.0 && gamma <= 1.0, "Gamma must be in (0, 1]");
        Self {
            alpha,
            gamma,
            previous_output: Point2D::zero(),
            previous_trend: Point2D::zero(),
        }
    }
}

impl Default for DoubleExpSmoother {
    fn default() -> Self {
        Self::new(DOUBLE_EXP_ALPHA, DOUBLE_EXP_GAMMA)
    }
}

impl MovementSmoother for DoubleExpSmoother {
    fn filter(&mut self, point: Point2D) -> Point2D {
        let (sx, tx) = double_exp_step(
            self.alpha,
            self.gamma,
            point.x,
            self.previous_output.x,
            self.previous_trend.x,
        );
        let (sy, ty) = double_exp_step(
            self.alpha,
            self.gamma,
            point.y,
            self.previous_output.y,
            self.previous_trend.y,
        );

        self.previous_output = Point2D::new(sx, sy);
        self.previous_trend = Point2D::new(tx, ty);

        self.previous_output
    }

    fn reset(&mut self) {
        self.previous_output = Point2D::zero();
        self.previous_trend = Point2D::zero();
    }

    fn name(&self) -> &str {
        "DoubleExpSmoother"
    }
}
