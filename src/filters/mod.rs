//! Temporal smoothing filters for noisy 2D point streams.
//!
//! Each smoother owns its private history and is fed one raw measurement per
//! call. The same family is used for the pupil/gaze stream, the head
//! translation and rotation corrections and the final output stream; every
//! use gets its own instance.

/// Kalman filter (constant velocity model)
pub mod kalman;

/// Moving average and double moving average
pub mod moving_average;

/// Running median
pub mod median;

/// Double exponential smoothing
pub mod exponential;

/// Jitter-rejecting double exponential smoothing
pub mod custom;

use crate::{geometry::Point2D, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

/// Trait for all movement smoothers
pub trait MovementSmoother: Send {
    /// Feed one raw measurement and return the smoothed point
    fn filter(&mut self, point: Point2D) -> Point2D;

    /// Reset filter state
    fn reset(&mut self);

    /// Get filter name
    fn name(&self) -> &str;
}

/// Smoother selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingMethod {
    /// Pass-through
    None,
    /// Running mean
    MovingAverage,
    /// Trend-correcting running mean
    DoubleMovingAverage,
    /// Running median
    Median,
    /// Constant velocity Kalman filter
    Kalman,
    /// Double exponential smoothing
    DoubleExp,
    /// Double exponential smoothing with median jitter rejection
    Custom,
}

impl SmoothingMethod {
    /// All methods, in declaration order
    pub const ALL: [Self; 7] = [
        Self::None,
        Self::MovingAverage,
        Self::DoubleMovingAverage,
        Self::Median,
        Self::Kalman,
        Self::DoubleExp,
        Self::Custom,
    ];

    /// Canonical lowercase name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::MovingAverage => "moving_average",
            Self::DoubleMovingAverage => "double_moving_average",
            Self::Median => "median",
            Self::Kalman => "kalman",
            Self::DoubleExp => "double_exp",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for SmoothingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SmoothingMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "none" | "null" => Ok(Self::None),
            "moving_average" | "movingaverage" => Ok(Self::MovingAverage),
            "double_moving_average" | "doublemovingaverage" => Ok(Self::DoubleMovingAverage),
            "median" => Ok(Self::Median),
            "kalman" => Ok(Self::Kalman),
            "double_exp" | "doubleexp" | "double_exponential" => Ok(Self::DoubleExp),
            "custom" => Ok(Self::Custom),
            _ => Err(Error::InvalidInput(format!("Unknown smoothing method: {s}"))),
        }
    }
}

/// Identity smoother
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSmoother;

impl MovementSmoother for NullSmoother {
    fn filter(&mut self, point: Point2D) -> Point2D {
        point
    }

    fn reset(&mut self) {}

    fn name(&self) -> &str {
        "NullSmoother"
    }
}

/// Create a smoother with default parameters
#[must_use]
pub fn create_smoother(method: SmoothingMethod) -> Box<dyn MovementSmoother> {
    match method {
        SmoothingMethod::None => Box::new(NullSmoother),
        SmoothingMethod::MovingAverage => Box::new(moving_average::MovingAverageSmoother::default()),
        SmoothingMethod::DoubleMovingAverage => {
            Box::new(moving_average::DoubleMovingAverageSmoother::default())
        }
        SmoothingMethod::Median => Box::new(median::MedianSmoother::default()),
        SmoothingMethod::Kalman => Box::new(kalman::KalmanSmoother::new()),
        SmoothingMethod::DoubleExp => Box::new(exponential::DoubleExpSmoother::default()),
        SmoothingMethod::Custom => Box::new(custom::CustomSmoother::default()),
    }
}

/// Create a smoother by name
///
/// # Errors
///
/// Returns an error if the name is not a known smoothing method
pub fn create_smoother_by_name(name: &str) -> Result<Box<dyn MovementSmoother>> {
    Ok(create_smoother(name.parse()?))
}

/// Push into a bounded FIFO, evicting the oldest value when full
pub(crate) fn push_bounded(buffer: &mut VecDeque<f64>, capacity: usize, value: f64) {
    if buffer.len() >= capacity {
        buffer.pop_front();
    }
    buffer.push_back(value);
}

/// Mean of the buffer contents
pub(crate) fn mean(buffer: &VecDeque<f64>) -> f64 {
    buffer.iter().sum::<f64>() / buffer.len() as f64
}

/// Element of rank `len / 2`, the upper middle for even lengths
pub(crate) fn middle_element(buffer: &VecDeque<f64>) -> f64 {
    let mut values: Vec<f64> = buffer.iter().copied().collect();
    if values.is_empty() {
        return 0.0;
    }
    let mid = values.len() / 2;
    let (_, nth, _) = values.select_nth_unstable_by(mid, f64::total_cmp);
    *nth
}
