//! Calibration sample collection with online outlier rejection.
//!
//! The session walks through screen targets one at a time. Each target
//! collects raw pupil positions until enough have arrived, then drops the
//! points that sit unusually far from their centroid. A target that does not
//! complete before its deadline is abandoned; its partial data stays in the
//! dataset. Deadlines are checked against caller-supplied instants, so a
//! target resolves exactly once, either completed or timed out.

use crate::{
    calibration::{Calibration, CalibrationDataset, CalibrationSample},
    constants::{DEFAULT_DIST_STD_DEV_COEFF, DEFAULT_MEASUREMENTS_PER_POINT, DEFAULT_POINT_TIMEOUT_MS},
    geometry::{EyePoint, Point2D, ScreenPoint},
    Error, Result,
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Session tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Samples needed before outlier rejection runs and the target completes
    pub measurements_per_point: usize,
    /// Outlier cutoff in standard deviations above the mean distance
    pub dist_std_dev_coeff: f64,
    /// Per-target time budget in milliseconds
    pub point_timeout_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            measurements_per_point: DEFAULT_MEASUREMENTS_PER_POINT,
            dist_std_dev_coeff: DEFAULT_DIST_STD_DEV_COEFF,
            point_timeout_ms: DEFAULT_POINT_TIMEOUT_MS,
        }
    }
}

impl SessionSettings {
    #[must_use]
    pub fn point_timeout(&self) -> Duration {
        Duration::from_millis(self.point_timeout_ms)
    }
}

/// How a target was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetResolution {
    Completed,
    TimedOut,
}

/// Result of feeding one raw sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// No target is waiting for samples
    Ignored,
    /// Stored; the target needs more
    Collected,
    /// Stored, outliers removed, target done
    Completed,
    /// The deadline had already passed; the sample was dropped
    TimedOut,
}

#[derive(Debug, Clone, Copy)]
struct ActiveTarget {
    deadline: Instant,
}

/// Session state
#[derive(Debug, Clone, Default)]
pub struct CalibrationSession {
    settings: SessionSettings,
    dataset: CalibrationDataset,
    collecting: bool,
    active: Option<ActiveTarget>,
}

impl CalibrationSession {
    #[must_use]
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Clear the dataset and begin collecting
    pub fn start(&mut self) {
        self.dataset.clear();
        self.collecting = true;
        self.active = None;
        info!("Calibration session started");
    }

    /// Clear the dataset and return to idle
    pub fn stop(&mut self) {
        self.dataset.clear();
        self.collecting = false;
        self.active = None;
        info!("Calibration session stopped");
    }

    #[must_use]
    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    #[must_use]
    pub fn has_active_target(&self) -> bool {
        self.active.is_some()
    }

    #[must_use]
    pub fn dataset(&self) -> &[CalibrationSample] {
        &self.dataset
    }

    /// Append a new target and arm its deadline.
    ///
    /// A target still waiting is superseded; it keeps whatever samples it
    /// gathered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Calibration`] when the session is idle.
    pub fn add_target(&mut self, screen_point: ScreenPoint, now: Instant) -> Result<()> {
        if !self.collecting {
            return Err(Error::Calibration("calibration not started".to_string()));
        }
        self.dataset.push(CalibrationSample::new(screen_point));
        self.active = Some(ActiveTarget {
            deadline: now + self.settings.point_timeout(),
        });
        debug!(
            "Calibration target {} at ({:.3}, {:.3})",
            self.dataset.len(),
            screen_point.x(),
            screen_point.y()
        );
        Ok(())
    }

    /// Feed one raw pupil position to the active target
    pub fn add_raw_sample(&mut self, eye: EyePoint, now: Instant) -> SampleOutcome {
        if self.poll_timeout(now).is_some() {
            return SampleOutcome::TimedOut;
        }
        if !self.collecting || self.active.is_none() {
            return SampleOutcome::Ignored;
        }
        let target_no = self.dataset.len();
        let Some(sample) = self.dataset.last_mut() else {
            self.active = None;
            return SampleOutcome::Ignored;
        };

        sample.eye_positions.push(eye);
        if sample.eye_positions.len() < self.settings.measurements_per_point {
            return SampleOutcome::Collected;
        }

        let removed = reject_outliers(&mut sample.eye_positions, self.settings.dist_std_dev_coeff);
        debug!(
            "Target {} complete: {} samples kept, {} outliers removed",
            target_no,
            sample.eye_positions.len(),
            removed
        );
        self.active = None;
        SampleOutcome::Completed
    }

    /// Resolve the active target as timed out once its deadline has passed
    pub fn poll_timeout(&mut self, now: Instant) -> Option<TargetResolution> {
        let target = self.active?;
        if now < target.deadline {
            return None;
        }
        self.active = None;
        info!("Calibration target {} timed out", self.dataset.len());
        Some(TargetResolution::TimedOut)
    }

    /// Fit `calibration` from the collected dataset
    pub fn compute_and_fit(&self, calibration: &mut Calibration) -> bool {
        calibration.fit(&self.dataset)
    }
}

/// Remove every point whose distance to the centroid is at or beyond
/// `mean + k * stddev` (sample stddev, n − 1). Returns the number removed.
pub fn reject_outliers(points: &mut Vec<EyePoint>, k: f64) -> usize {
    if points.len() < 2 {
        return 0;
    }
    let raw: Vec<Point2D> = points.iter().map(|p| p.0).collect();
    let Some(center) = Point2D::centroid(&raw) else {
        return 0;
    };

    let distances: Vec<f64> = raw.iter().map(|p| p.distance(&center)).collect();
    let n = distances.len() as f64;
    let mean = distances.iter().sum::<f64>() / n;
    let variance = distances.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let cutoff = mean + k * variance.sqrt();

    let before = points.len();
    // back to front keeps the earlier indices valid
    for i in (0..distances.len()).rev() {
        if distances[i] >= cutoff {
            points.remove(i);
        }
    }
    before - points.len()
}
