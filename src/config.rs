//! Configuration management for the gaze tracker

use crate::{
    calibration::{Calibration, ModelKind, Preprocessing},
    calibration_session::SessionSettings,
    constants::CALIBRATION_RANSAC_THRESHOLD,
    filters::SmoothingMethod,
    head_pose::HeadPoseSettings,
    pupil_detection::DetectorSettings,
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pupil detector tunables
    pub detector: DetectorSettings,

    /// Calibration run and model selection
    pub calibration: CalibrationConfig,

    /// Smoother selection per stream
    pub smoothing: SmoothingConfig,

    /// Head movement compensation
    pub head_pose: HeadPoseSettings,
}

/// Calibration configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Model used to map eye positions to the screen
    pub model: ModelKind,

    /// How raw samples are turned into fitting pairs
    pub preprocessing: Preprocessing,

    /// Homography inlier threshold in normalized screen units
    pub ransac_threshold: f64,

    /// Raw samples per target
    pub measurements_per_point: usize,

    /// Outlier cutoff in standard deviations
    pub dist_std_dev_coeff: f64,

    /// Per-target time budget in milliseconds
    pub point_timeout_ms: u64,
}

/// Smoother configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Applied to the mapped gaze before head correction
    pub pupil: SmoothingMethod,

    /// Applied to the final gaze point
    pub output: SmoothingMethod,

    /// Applied to the head translation and rotation corrections
    pub head: SmoothingMethod,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        let session = SessionSettings::default();
        Self {
            model: ModelKind::default(),
            preprocessing: Preprocessing::default(),
            ransac_threshold: CALIBRATION_RANSAC_THRESHOLD,
            measurements_per_point: session.measurements_per_point,
            dist_std_dev_coeff: session.dist_std_dev_coeff,
            point_timeout_ms: session.point_timeout_ms,
        }
    }
}

impl CalibrationConfig {
    /// Unfitted calibration with the configured model, preprocessing and
    /// RANSAC threshold
    #[must_use]
    pub fn calibration(&self) -> Calibration {
        let mut calibration = Calibration::with_options(self.preprocessing, self.model);
        calibration.set_ransac_threshold(self.ransac_threshold);
        calibration
    }

    #[must_use]
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            measurements_per_point: self.measurements_per_point,
            dist_std_dev_coeff: self.dist_std_dev_coeff,
            point_timeout_ms: self.point_timeout_ms,
        }
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            pupil: SmoothingMethod::Kalman,
            output: SmoothingMethod::None,
            head: SmoothingMethod::Kalman,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] on malformed YAML.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Fails when serialization or the write fails.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        self.detector.validate()?;

        if self.calibration.measurements_per_point == 0 {
            return Err(Error::ConfigError(
                "measurements_per_point must be greater than 0".to_string(),
            ));
        }
        if !self.calibration.dist_std_dev_coeff.is_finite() || self.calibration.dist_std_dev_coeff <= 0.0 {
            return Err(Error::ConfigError(
                "dist_std_dev_coeff must be positive".to_string(),
            ));
        }
        if !self.calibration.ransac_threshold.is_finite() || self.calibration.ransac_threshold <= 0.0 {
            return Err(Error::ConfigError(
                "ransac_threshold must be positive".to_string(),
            ));
        }
        if self.calibration.point_timeout_ms == 0 {
            return Err(Error::ConfigError(
                "point_timeout_ms must be greater than 0".to_string(),
            ));
        }

        let head = &self.head_pose;
        for (name, p) in [
            ("translation_scale", head.translation_scale),
            ("translation_offset", head.translation_offset),
            ("rotation_scale", head.rotation_scale),
            ("rotation_offset", head.rotation_offset),
        ] {
            if !p.x.is_finite() || !p.y.is_finite() {
                return Err(Error::ConfigError(format!("head_pose.{name} must be finite")));
            }
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Gaze Tracker Configuration

# Pupil detection
detector:
  mirrored: true
  equalize_histogram: false
  contrast: 1.0
  brightness: 0.0
  gamma: 1.0
  threshold: 27
  top_margin: 0.0
  bottom_margin: 0.0
  left_margin: 0.0
  right_margin: 0.0
  points_min: 25
  points_max: 690
  oblateness_low: 0.67
  oblateness_high: 1.5

# Calibration
calibration:
  model: homography           # homography | affine
  preprocessing: mean_point   # mean_point | no_preprocessing
  ransac_threshold: 0.05      # homography inlier distance, screen units
  measurements_per_point: 20
  dist_std_dev_coeff: 1.6
  point_timeout_ms: 5000

# Smoothers: none, moving_average, double_moving_average, median, kalman,
# double_exp, custom
smoothing:
  pupil: kalman
  output: none
  head: kalman

# Head movement compensation
head_pose:
  translation_scale: { x: 0.001736111111111111, y: 0.0023148148148148147 }
  translation_offset: { x: 320.0, y: 240.0 }
  rotation_scale: { x: 1.0, y: 1.0 }
  rotation_offset: { x: 0.0, y: 0.0 }
  translation_correction: true
  rotation_correction: false
"#;
