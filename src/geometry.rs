//! Plain 2D point types shared by the pipeline stages.
//!
//! [`EyePoint`] lives in camera image pixels, [`ScreenPoint`] in normalized
//! screen coordinates. Both wrap the same [`Point2D`] payload but are kept
//! apart by the type system: the only way from one to the other is
//! [`crate::calibration::Calibration::gaze_position`].

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Sub};

/// Real-valued 2D coordinate
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
}

impl Point2D {
    /// Create a point from its coordinates
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Origin
    #[must_use]
    pub const fn zero() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    /// True when either coordinate is NaN
    #[must_use]
    pub fn is_nan(&self) -> bool {
        self.x.is_nan() || self.y.is_nan()
    }

    /// Euclidean distance to another point
    #[must_use]
    pub fn distance(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Arithmetic mean of a point set, `None` for an empty set
    #[must_use]
    pub fn centroid(points: &[Self]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let (sx, sy) = points.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some(Self::new(sx / n, sy / n))
    }
}

impl Add for Point2D {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Point2D {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Point2D {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl From<(f64, f64)> for Point2D {
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

/// Pupil position in camera image pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EyePoint(pub Point2D);

impl EyePoint {
    /// Create an eye-space point
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self(Point2D::new(x, y))
    }

    /// Horizontal pixel coordinate
    #[must_use]
    pub const fn x(&self) -> f64 {
        self.0.x
    }

    /// Vertical pixel coordinate
    #[must_use]
    pub const fn y(&self) -> f64 {
        self.0.y
    }
}

/// Gaze position in screen coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScreenPoint(pub Point2D);

impl ScreenPoint {
    /// Create a screen-space point
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self(Point2D::new(x, y))
    }

    /// Horizontal screen coordinate
    #[must_use]
    pub const fn x(&self) -> f64 {
        self.0.x
    }

    /// Vertical screen coordinate
    #[must_use]
    pub const fn y(&self) -> f64 {
        self.0.y
    }

    /// True when either coordinate is NaN
    #[must_use]
    pub fn is_nan(&self) -> bool {
        self.0.is_nan()
    }
}
