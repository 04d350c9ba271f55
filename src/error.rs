//! Error types for the gaze tracking library.
//!
//! Only genuinely exceptional conditions surface here. Expected per-frame
//! outcomes (no pupil found, not enough calibration data, a calibration
//! target running out of time) are reported as plain values by the
//! components that produce them.

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding failed
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Calibration command issued in the wrong session state
    #[error("Calibration error: {0}")]
    Calibration(String),

    /// Homography estimation failed
    #[error("Homography error: {0}")]
    Homography(String),

    /// Ellipse fitting failed
    #[error("Ellipse fit error: {0}")]
    Ellipse(String),

    /// Head pose could not be recovered from the marker points
    #[error("Pose estimation error: {0}")]
    PoseEstimation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Flat key-value settings store error
    #[error("Settings error: {0}")]
    Settings(String),
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
