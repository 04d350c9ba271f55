use super::MovementSmoother;
use crate::{
    constants::{KALMAN_INITIAL_ERROR, KALMAN_MEASUREMENT_NOISE, KALMAN_PROCESS_NOISE},
    geometry::Point2D,
};
use nalgebra::{Matrix2, Matrix2x4, Matrix4, Vector2, Vector4};

/// Constant velocity Kalman smoother
///
/// State is `[x, y, vx, vy]` with a unit time step per call; only the
/// position is measured. Each call predicts once and then corrects with the
/// measurement.
pub struct KalmanSmoother {
    // State: [x, y, vx, vy]
    state: Vector4<f64>,
    covariance: Matrix4<f64>,
    process_noise: Matrix4<f64>,
    measurement_noise: Matrix2<f64>,
    transition: Matrix4<f64>,
    measurement: Matrix2x4<f64>,
    initial_error: f64,
}

impl KalmanSmoother {
    #[must_use]
    pub fn new() -> Self {
        Self::with_noise(
            KALMAN_PROCESS_NOISE,
            KALMAN_MEASUREMENT_NOISE,
            KALMAN_INITIAL_ERROR,
        )
    }

    /// Create a smoother with explicit diagonal noise levels
    #[must_use]
    pub fn with_noise(process_noise: f64, measurement_noise: f64, initial_error: f64) -> Self {
        #[rustfmt::skip]
        let transition = Matrix4::new(
            1.0, 0.0, 1.0, 0.0,
            0.0, 1.0, 0.0, 1.0,
            0.0, 0.0, 1.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        );

        // We only measure position
        #[rustfmt::skip]
        let measurement = Matrix2x4::new(
            1.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
        );

        Self {
            state: Vector4::zeros(),
            covariance: Matrix4::identity() * initial_error,
            process_noise: Matrix4::identity() * process_noise,
            measurement_noise: Matrix2::identity() * measurement_noise,
            transition,
            measurement,
            initial_error,
        }
    }

    fn predict(&mut self) {
        self.state = self.transition * self.state;
        self.covariance =
            self.transition * self.covariance * self.transition.transpose() + self.process_noise;
    }

    fn update(&mut self, measurement: Vector2<f64>) {
        let innovation = measurement - self.measurement * self.state;
        let innovation_cov =
            self.measurement * self.covariance * self.measurement.transpose() + self.measurement_noise;

        // Keep the prediction if the innovation covariance is singular
        let Some(innovation_inv) = innovation_cov.try_inverse() else {
            return;
        };
        let gain = self.covariance * self.measurement.transpose() * innovation_inv;

        self.state += gain * innovation;
        self.covariance = (Matrix4::identity() - gain * self.measurement) * self.covariance;
    }
}

impl Default for KalmanSmoother {
    fn default() -> Self {
        Self::new()
    }
}

impl MovementSmoother for KalmanSmoother {
    fn filter(&mut self, point: Point2D) -> Point2D {
        self.predict();
        self.update(Vector2::new(point.x, point.y));

        Point2D::new(self.state[0], self.state[1])
    }

    fn reset(&mut self) {
        self.state = Vector4::zeros();
        self.covariance = Matrix4::identity() * self.initial_error;
    }

    fn name(&self) -> &str {
        "KalmanSmoother"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kalman_first_step_gain() {
        let mut smoother = KalmanSmoother::new();

        // P_pred = 0.1 + 0.1 + 5e-5, gain = P_pred / (P_pred + 0.1)
        let p = smoother.filter(Point2D::new(1.0, 2.0));
        let gain = 0.20005 / 0.30005;
        assert!((p.x - gain).abs() < 1e-9);
        assert!((p.y - 2.0 * gain).abs() < 1e-9);
    }

    #[test]
    fn test_kalman_converges_on_constant_input() {
        let mut smoother = KalmanSmoother::new();
        let target = Point2D::new(0.5, -0.25);
        let mut outputs = Vec::new();
        for _ in 0..200 {
            outputs.push(smoother.filter(target));
        }

        assert!((outputs[99].x - 0.5).abs() < 1e-3);
        assert!((outputs[199].x - 0.5).abs() < 1e-6);
        assert!((outputs[199].y + 0.25).abs() < 1e-6);

        // Overshoot stays within the measurement noise for normalized input
        for p in &outputs {
            assert!(p.x < 0.5 + KALMAN_MEASUREMENT_NOISE);
            assert!(p.y > -0.25 - KALMAN_MEASUREMENT_NOISE);
        }
    }

    #[test]
    fn test_kalman_reset() {
        let mut smoother = KalmanSmoother::new();
        for _ in 0..50 {
            smoother.filter(Point2D::new(3.0, 3.0));
        }
        smoother.reset();
        let mut fresh = KalmanSmoother::new();
        assert_eq!(
            smoother.filter(Point2D::new(1.0, 1.0)),
            fresh.filter(Point2D::new(1.0, 1.0))
        );
    }
}
