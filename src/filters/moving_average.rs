use super::{mean, push_bounded, MovementSmoother};
use crate::{constants::DEFAULT_SMOOTHER_BUFFER_SIZE, geometry::Point2D};
use std::collections::VecDeque;

/// Moving average smoother
pub struct MovingAverageSmoother {
    window_size: usize,
    x_buffer: VecDeque<f64>,
    y_buffer: VecDeque<f64>,
}

impl MovingAverageSmoother {
    /// Create a new moving average smoother
    ///
    /// # Panics
    ///
    /// Panics if `window_size` is zero
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        assert!(window_size > 0, "Window size must be greater than 0");
        Self {
            window_size,
            x_buffer: VecDeque::with_capacity(window_size),
            y_buffer: VecDeque::with_capacity(window_size),
        }
    }
}

impl Default for MovingAverageSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHER_BUFFER_SIZE)
    }
}

impl MovementSmoother for MovingAverageSmoother {
    fn filter(&mut self, point: Point2D) -> Point2D {
        push_bounded(&mut self.x_buffer, self.window_size, point.x);
        push_bounded(&mut self.y_buffer, self.window_size, point.y);

        Point2D::new(mean(&self.x_buffer), mean(&self.y_buffer))
    }

    fn reset(&mut self) {
        self.x_buffer.clear();
        self.y_buffer.clear();
    }

    fn name(&self) -> &str {
        "MovingAverageSmoother"
    }
}

/// Double moving average smoother
///
/// Keeps a second window of first-order averages and extrapolates the trend:
/// `2 * latest_average - average_of_averages`.
pub struct DoubleMovingAverageSmoother {
    window_size: usize,
    x_buffer: VecDeque<f64>,
    y_buffer: VecDeque<f64>,
    x_averages: VecDeque<f64>,
    y_averages: VecDeque<f64>,
}

impl DoubleMovingAverageSmoother {
    /// Create a new double moving average smoother
    ///
    /// # Panics
    ///
    /// Panics if `window_size` is zero
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        assert!(window_size > 0, "Window size must be greater than 0");
        Self {
            window_size,
            x_buffer: VecDeque::with_capacity(window_size),
            y_buffer: VecDeque::with_capacity(window_size),
            x_averages: VecDeque::with_capacity(window_size),
            y_averages: VecDeque::with_capacity(window_size),
        }
    }
}

impl Default for DoubleMovingAverageSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHER_BUFFER_SIZE)
    }
}

impl MovementSmoother for DoubleMovingAverageSmoother {
    fn filter(&mut self, point: Point2D) -> Point2D {
        push_bounded(&mut self.x_buffer, self.window_size, point.x);
        push_bounded(&mut self.y_buffer, self.window_size, point.y);

        let avg_x = mean(&self.x_buffer);
        let avg_y = mean(&self.y_buffer);
        push_bounded(&mut self.x_averages, self.window_size, avg_x);
        push_bounded(&mut self.y_averages, self.window_size, avg_y);

        Point2D::new(
            2.0 * avg_x - mean(&self.x_averages),
            2.0 * avg_y - mean(&self.y_averages),
        )
    }

    fn reset(&mut self) {
        self.x_buffer.clear();
        self.y_buffer.clear();
        self.x_averages.clear();
        self.y_averages.clear();
    }

    fn name(&self) -> &str {
        "DoubleMovingAverageSmoother"
    }
}
