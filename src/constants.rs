//! Constants used throughout the library

/// Ring buffer capacity of the buffered smoothers
pub const DEFAULT_SMOOTHER_BUFFER_SIZE: usize = 15;

/// Double exponential smoothing: data smoothing factor
pub const DOUBLE_EXP_ALPHA: f64 = 0.5;
/// Double exponential smoothing: trend smoothing factor
pub const DOUBLE_EXP_GAMMA: f64 = 0.6;

/// Jitter-rejecting smoother: data smoothing factor
pub const CUSTOM_ALPHA: f64 = 0.4;
/// Jitter-rejecting smoother: trend smoothing factor
pub const CUSTOM_GAMMA: f64 = 0.6;
/// Jitter-rejecting smoother: distance from the running median that counts as jitter
pub const CUSTOM_JITTER_THRESHOLD: f64 = 0.5;

/// Kalman smoother process noise (identity scale)
pub const KALMAN_PROCESS_NOISE: f64 = 5e-5;
/// Kalman smoother measurement noise (identity scale)
pub const KALMAN_MEASUREMENT_NOISE: f64 = 0.1;
/// Kalman smoother initial error covariance (identity scale)
pub const KALMAN_INITIAL_ERROR: f64 = 0.1;

/// Minimal number of raw (eye, screen) pairs accepted by calibration fitting
pub const MIN_CALIBRATION_SAMPLES: usize = 10;

/// Raw samples collected per calibration target before outlier rejection
pub const DEFAULT_MEASUREMENTS_PER_POINT: usize = 20;
/// Outlier cutoff in standard deviations above the mean centroid distance
pub const DEFAULT_DIST_STD_DEV_COEFF: f64 = 1.6;
/// Time budget for a single calibration target, in milliseconds
pub const DEFAULT_POINT_TIMEOUT_MS: u64 = 5000;

/// Number of kept pupil candidates that marks a frame as ambiguous
pub const MAX_PUPIL_CANDIDATES: usize = 6;

/// Minimal number of points for a direct least-squares ellipse fit
pub const MIN_ELLIPSE_POINTS: usize = 6;

/// Minimal number of correspondences for a homography
pub const MIN_HOMOGRAPHY_POINTS: usize = 4;

/// Default RANSAC reprojection threshold, in destination units (pixels)
pub const DEFAULT_RANSAC_THRESHOLD: f64 = 3.0;
/// RANSAC reprojection threshold for the eye-to-screen homography, in
/// normalized screen units (the screen spans 0..1)
pub const CALIBRATION_RANSAC_THRESHOLD: f64 = 0.05;
/// Default RANSAC iteration cap
pub const DEFAULT_RANSAC_MAX_ITERS: usize = 2000;

/// Reference camera frame used by the default head translation correction
pub const REFERENCE_FRAME_WIDTH: f64 = 640.0;
/// Reference camera frame used by the default head translation correction
pub const REFERENCE_FRAME_HEIGHT: f64 = 480.0;
/// Share of the reference frame the head is expected to travel across
pub const HEAD_TRAVEL_RANGE: f64 = 0.9;

/// Numeric precision epsilon
pub const EPSILON: f64 = 1e-12;
