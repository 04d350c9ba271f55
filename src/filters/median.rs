use super::{middle_element, push_bounded, MovementSmoother};
use crate::{constants::DEFAULT_SMOOTHER_BUFFER_SIZE, geometry::Point2D};
use std::collections::VecDeque;

/// Running median smoother
///
/// Reports the buffer element of rank `len / 2`. For even fill levels that
/// is the upper of the two middle values; the two are never averaged.
pub struct MedianSmoother {
    window_size: usize,
    x_buffer: VecDeque<f64>,
    y_buffer: VecDeque<f64>,
}

impl MedianSmoother {
    /// Create a new median smoother
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

impl Default for MedianSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHER_BUFFER_SIZE)
    }
}

impl MovementSmoother for MedianSmoother {
    fn filter(&mut self, point: Point2D) -> Point2D {
        push_bounded(&mut self.x_buffer, self.window_size, point.x);
        push_bounded(&mut self.y_buffer, self.window_size, point.y);

        Point2D::new(middle_element(&self.x_buffer), middle_element(&self.y_buffer))
    }

    fn reset(&mut self) {
        self.x_buffer.clear();
        self.y_buffer.clear();
    }

    fn name(&self) -> &str {
        "MedianSmoother"
    }
}
