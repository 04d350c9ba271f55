use super::{
    exponential::{double_exp_step, trend_step},
    middle_element, push_bounded, MovementSmoother,
};
use crate::{
    constants::{CUSTOM_ALPHA, CUSTOM_GAMMA, CUSTOM_JITTER_THRESHOLD, DEFAULT_SMOOTHER_BUFFER_SIZE},
    geometry::Point2D,
};
use std::collections::VecDeque;

/// Double exponential smoothing with median-based jitter rejection.
///
/// Per axis: when the input strays more than `jitter_threshold` from the
/// running median, the output snaps to the median; otherwise the usual
/// double exponential blend is used. The trend always follows the emitted
/// value.
pub struct CustomSmoother {
    window_size: usize,
    alpha: f64,
    gamma: f64,
    jitter_threshold: f64,
    x_buffer: VecDeque<f64>,
    y_buffer: VecDeque<f64>,
    previous_output: Point2D,
    previous_trend: Point2D,
}

impl CustomSmoother {
    /// Create a new jitter-rejecting smoother
    ///
    /// # Panics
    ///
    /// Panics if `window_size` is zero, alpha or gamma is outside (0, 1], or
    /// the threshold is negative
    #[must_use]
    pub fn new(window_size: usize, alpha: f64, gamma: f64, jitter_threshold: f64) -> Self {
        assert!(window_size > 0, "Window size must be greater than 0");
        assert!(alpha > 0.0 && alpha <= 1.0, "Alpha must be in (0, 1]");
        assert!(gamma > 0.0 && gamma <= 1.0, "Gamma must be in (0, 1]");
        assert!(jitter_threshold >= 0.0, "Threshold must be non-negative, got {}", jitter_threshold);
        Self {
            window_size,
            alpha,
            gamma,
            jitter_threshold,
            x_buffer: VecDeque::with_capacity(window_size),
            y_buffer: VecDeque::with_capacity(window_size),
            previous_output: Point2D::zero(),
            previous_trend: Point2D::zero(),
        }
    }

    fn axis(&self, input: f64, median: f64, previous_output: f64, previous_trend: f64) -> (f64, f64) {
        if (input - median).abs() > self.jitter_threshold {
            (median, trend_step(self.gamma, median, previous_output, previous_trend))
        } else {
            double_exp_step(self.alpha, self.gamma, input, previous_output, previous_trend)
        }
    }
}

impl Default for CustomSmoother {
    fn default() -> Self {
        Self::new(
            DEFAULT_SMOOTHER_BUFFER_SIZE,
            CUSTOM_ALPHA,
            CUSTOM_GAMMA,
            CUSTOM_JITTER_THRESHOLD,
        )
    }
}

impl MovementSmoother for CustomSmoother {
    fn filter(&mut self, point: Point2D) -> Point2D {
        push_bounded(&mut self.x_buffer, self.window_size, point.x);
        push_bounded(&mut self.y_buffer, self.window_size, point.y);

        let median_x = middle_element(&self.x_buffer);
        let median_y = middle_element(&self.y_buffer);

        let (sx, tx) = self.axis(point.x, median_x, self.previous_output.x, self.previous_trend.x);
        let (sy, ty) = self.axis(point.y, median_y, self.previous_output.y, self.previous_trend.y);

        self.previous_output = Point2D::new(sx, sy);
        self.previous_trend = Point2D::new(tx, ty);

        self.previous_output
    }

    fn reset(&mut self) {
        self.x_buffer.clear();
        self.y_buffer.clear();
        self.previous_output = Point2D::zero();
        self.previous_trend = Point2D::zero();
    }

    fn name(&self) -> &str {
        "CustomSmoother"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_moves_use_exponential_blend() {
        let mut smoother = CustomSmoother::default();
        // median equals the input on the first call
        let p = smoother.filter(Point2D::new(0.2, 0.2));
        assert!((p.x - 0.08).abs() < 1e-12);
        assert!((p.y - 0.08).abs() < 1e-12);
    }

    #[test]
    fn test_jitter_snaps_to_median() {
        let mut smoother = CustomSmoother::default();
        for _ in 0..3 {
            smoother.filter(Point2D::new(1.0, 1.0));
        }
        // buffer [1, 1, 1, 5]: median 1, |5 - 1| > 0.5
        let p = smoother.filter(Point2D::new(5.0, 1.0));
        assert_eq!(p.x, 1.0);
        assert!(p.y > 0.0);
    }

    #[test]
    fn test_axes_are_independent() {
        let mut smoother = CustomSmoother::default();
        for _ in 0..3 {
            smoother.filter(Point2D::new(0.0, 0.0));
        }
        let p = smoother.filter(Point2D::new(3.0, 0.1));
        assert_eq!(p.x, 0.0);
        assert!(p.y > 0.0);
    }
}
