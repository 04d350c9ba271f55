//! Eye-to-screen calibration.
//!
//! Every successful fit computes two independent models from the same
//! paired data: an ordinary least-squares affine map and a RANSAC
//! homography. Which one [`Calibration::gaze_position`] evaluates is a
//! runtime choice, homography by default.

use crate::{
    constants::{CALIBRATION_RANSAC_THRESHOLD, MIN_CALIBRATION_SAMPLES},
    geometry::{EyePoint, Point2D, ScreenPoint},
    homography::{self, fit_homography_ransac, RansacConfig},
    settings::Settings,
};
use log::{debug, info, warn};
use nalgebra::{Matrix3, MatrixXx3, DVector};
use serde::{Deserialize, Serialize};

/// Raw measurements taken while the user fixated one screen target
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    pub screen_point: ScreenPoint,
    #[serde(default)]
    pub eye_positions: Vec<EyePoint>,
}

impl CalibrationSample {
    #[must_use]
    pub fn new(screen_point: ScreenPoint) -> Self {
        Self {
            screen_point,
            eye_positions: Vec::new(),
        }
    }
}

/// One sample per target shown during a calibration run
pub type CalibrationDataset = Vec<CalibrationSample>;

/// Which fitted model maps eye positions to the screen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    Homography,
    Affine,
}

/// How raw samples become fitting pairs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preprocessing {
    /// One pair per raw measurement
    NoPreprocessing,
    /// One pair per target, using the centroid of its measurements
    #[default]
    MeanPoint,
}

/// Per-axis linear forms `s = c0 * ex + c1 * ey + c2`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AffineModel {
    pub x: [f64; 3],
    pub y: [f64; 3],
}

impl AffineModel {
    /// Ordinary least squares, `coeffs = (AᵀA)⁻¹ Aᵀ b` per axis.
    ///
    /// A singular normal matrix yields NaN coefficients.
    #[must_use]
    pub fn fit(eye: &[Point2D], screen: &[Point2D]) -> Self {
        let a = MatrixXx3::from_fn(eye.len(), |i, j| match j {
            0 => eye[i].x,
            1 => eye[i].y,
            _ => 1.0,
        });
        let bx = DVector::from_iterator(screen.len(), screen.iter().map(|p| p.x));
        let by = DVector::from_iterator(screen.len(), screen.iter().map(|p| p.y));

        let at = a.transpose();
        let Some(normal_inv) = (&at * &a).try_inverse() else {
            warn!("Affine calibration is degenerate: singular normal matrix");
            return Self {
                x: [f64::NAN; 3],
                y: [f64::NAN; 3],
            };
        };
        let px = normal_inv * &at * bx;
        let py = normal_inv * &at * by;

        Self {
            x: [px[0], px[1], px[2]],
            y: [py[0], py[1], py[2]],
        }
    }

    #[must_use]
    pub fn evaluate(&self, p: Point2D) -> Point2D {
        Point2D::new(
            self.x[0] * p.x + self.x[1] * p.y + self.x[2],
            self.y[0] * p.x + self.y[1] * p.y + self.y[2],
        )
    }
}

/// Both fitted representations plus the active selector
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationModel {
    pub affine: AffineModel,
    /// Row-major 3×3, all zeros when unfitted or degenerate
    pub homography: Matrix3<f64>,
    pub active: ModelKind,
}

impl Default for CalibrationModel {
    fn default() -> Self {
        Self {
            affine: AffineModel::default(),
            homography: Matrix3::zeros(),
            active: ModelKind::default(),
        }
    }
}

impl CalibrationModel {
    /// Map an eye position through the active representation
    #[must_use]
    pub fn evaluate(&self, eye: Point2D) -> Point2D {
        match self.active {
            ModelKind::Homography => homography::project(&self.homography, eye),
            ModelKind::Affine => self.affine.evaluate(eye),
        }
    }
}

/// Calibration state
#[derive(Debug, Clone)]
pub struct Calibration {
    model: CalibrationModel,
    preprocessing: Preprocessing,
    ransac: RansacConfig,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            model: CalibrationModel::default(),
            preprocessing: Preprocessing::default(),
            ransac: RansacConfig {
                inlier_threshold: CALIBRATION_RANSAC_THRESHOLD,
                ..RansacConfig::default()
            },
        }
    }
}

impl Calibration {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_options(preprocessing: Preprocessing, active: ModelKind) -> Self {
        let mut calibration = Self {
            preprocessing,
            ..Self::default()
        };
        calibration.model.active = active;
        calibration
    }

    #[must_use]
    pub fn model(&self) -> &CalibrationModel {
        &self.model
    }

    #[must_use]
    pub fn preprocessing(&self) -> Preprocessing {
        self.preprocessing
    }

    pub fn set_preprocessing(&mut self, preprocessing: Preprocessing) {
        self.preprocessing = preprocessing;
    }

    #[must_use]
    pub fn active_model(&self) -> ModelKind {
        self.model.active
    }

    pub fn set_active_model(&mut self, kind: ModelKind) {
        self.model.active = kind;
    }

    /// Homography inlier threshold, in normalized screen units
    #[must_use]
    pub fn ransac_threshold(&self) -> f64 {
        self.ransac.inlier_threshold
    }

    /// Takes effect on the next [`Calibration::fit`]
    pub fn set_ransac_threshold(&mut self, threshold: f64) {
        self.ransac.inlier_threshold = threshold;
    }

    /// Fit both models from a dataset.
    ///
    /// Returns `false` without touching the current model when the dataset
    /// is empty or holds fewer than ten raw measurements in total. Once those
    /// preconditions hold the fit succeeds, even if a model ends up
    /// degenerate.
    pub fn fit(&mut self, dataset: &[CalibrationSample]) -> bool {
        if dataset.is_empty() {
            debug!("Calibration fit skipped: empty dataset");
            return false;
        }
        let total: usize = dataset.iter().map(|s| s.eye_positions.len()).sum();
        if total < MIN_CALIBRATION_SAMPLES {
            debug!(
                "Calibration fit skipped: {} raw samples, need {}",
                total, MIN_CALIBRATION_SAMPLES
            );
            return false;
        }

        let (eye, screen) = self.pairs(dataset);

        let affine = AffineModel::fit(&eye, &screen);
        let homography = match fit_homography_ransac(&eye, &screen, &self.ransac) {
            Ok(result) => {
                debug!("Homography inliers: {}/{}", result.n_inliers, eye.len());
                result.h
            }
            Err(e) => {
                warn!("Homography calibration is degenerate: {}", e);
                Matrix3::zeros()
            }
        };

        self.model = CalibrationModel {
            affine,
            homography,
            active: self.model.active,
        };

        info!(
            "Calibration fitted from {} targets ({} pairs, {} raw samples)",
            dataset.len(),
            eye.len(),
            total
        );
        true
    }

    fn pairs(&self, dataset: &[CalibrationSample]) -> (Vec<Point2D>, Vec<Point2D>) {
        match self.preprocessing {
            Preprocessing::NoPreprocessing => dataset
                .iter()
                .flat_map(|s| s.eye_positions.iter().map(move |e| (e.0, s.screen_point.0)))
                .unzip(),
            Preprocessing::MeanPoint => dataset
                .iter()
                .filter_map(|s| {
                    let eye: Vec<Point2D> = s.eye_positions.iter().map(|e| e.0).collect();
                    Point2D::centroid(&eye).map(|c| (c, s.screen_point.0))
                })
                .unzip(),
        }
    }

    /// Map a pupil position to the screen. Never mutates the model; the
    /// result is not bounds checked and may be NaN.
    #[must_use]
    pub fn gaze_position(&self, eye: EyePoint) -> ScreenPoint {
        ScreenPoint(self.model.evaluate(eye.0))
    }

    /// Zero every coefficient; the active selector is kept
    pub fn reset(&mut self) {
        self.model = CalibrationModel {
            active: self.model.active,
            ..CalibrationModel::default()
        };
    }

    /// Store the fifteen coefficients
    pub fn save(&self, settings: &mut Settings) {
        for i in 0..3 {
            settings.set(&format!("param_x_{i}"), self.model.affine.x[i]);
            settings.set(&format!("param_y_{i}"), self.model.affine.y[i]);
        }
        for r in 0..3 {
            for c in 0..3 {
                settings.set(&format!("transform_{r}_{c}"), self.model.homography[(r, c)]);
            }
        }
    }

    /// Restore the fifteen coefficients; missing keys read as zero
    pub fn load(&mut self, settings: &Settings) {
        let mut affine = AffineModel::default();
        for i in 0..3 {
            affine.x[i] = settings.get_f64(&format!("param_x_{i}"), 0.0);
            affine.y[i] = settings.get_f64(&format!("param_y_{i}"), 0.0);
        }
        let homography =
            Matrix3::from_fn(|r, c| settings.get_f64(&format!("transform_{r}_{c}"), 0.0));

        self.model = CalibrationModel {
            affine,
            homography,
            active: self.model.active,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample(sx: f64, sy: f64, eyes: &[(f64, f64)]) -> CalibrationSample {
        CalibrationSample {
            screen_point: ScreenPoint::new(sx, sy),
            eye_positions: eyes.iter().map(|&(x, y)| EyePoint::new(x, y)).collect(),
        }
    }

    #[test]
    fn test_fit_requires_ten_samples() {
        let mut calibration = Calibration::new();
        let dataset = vec![sample(0.0, 0.0, &[(1.0, 1.0); 9])];
        assert!(!calibration.fit(&dataset));
        assert_eq!(calibration.model(), &CalibrationModel::default());
        assert!(!calibration.fit(&[]));
    }

    #[test]
    fn test_affine_fit_exact() {
        let eye = [
            Point2D::new(100.0, 80.0),
            Point2D::new(220.0, 85.0),
            Point2D::new(215.0, 170.0),
            Point2D::new(95.0, 160.0),
        ];
        let truth = AffineModel {
            x: [0.008, 0.001, -0.7],
            y: [-0.0005, 0.011, -0.9],
        };
        let screen: Vec<Point2D> = eye.iter().map(|&p| truth.evaluate(p)).collect();
        let fitted = AffineModel::fit(&eye, &screen);
        for i in 0..3 {
            assert_relative_eq!(fitted.x[i], truth.x[i], epsilon = 1e-9);
            assert_relative_eq!(fitted.y[i], truth.y[i], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_collinear_affine_is_nan() {
        let eye = [Point2D::new(0.0, 0.0), Point2D::new(1.0, 1.0), Point2D::new(2.0, 2.0)];
        let screen = [Point2D::zero(); 3];
        let fitted = AffineModel::fit(&eye, &screen);
        assert!(fitted.x.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_mean_point_skips_empty_targets() {
        let mut calibration = Calibration::with_options(Preprocessing::MeanPoint, ModelKind::Affine);
        let dataset = vec![
            sample(0.0, 0.0, &[(10.0, 10.0); 3]),
            sample(1.0, 0.0, &[(20.0, 10.0); 3]),
            sample(0.5, 0.5, &[]),
            sample(1.0, 1.0, &[(20.0, 20.0); 2]),
            sample(0.0, 1.0, &[(10.0, 20.0); 2]),
        ];
        assert!(calibration.fit(&dataset));
        let p = calibration.gaze_position(EyePoint::new(15.0, 15.0));
        assert_relative_eq!(p.x(), 0.5, epsilon = 1e-9);
        assert_relative_eq!(p.y(), 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_reset_zeroes_model() {
        let mut calibration = Calibration::new();
        calibration.set_active_model(ModelKind::Affine);
        calibration.model.affine.x = [1.0, 2.0, 3.0];
        calibration.reset();
        assert_eq!(calibration.model().affine, AffineModel::default());
        assert_eq!(calibration.active_model(), ModelKind::Affine);
    }

    #[test]
    fn test_load_missing_keys_reads_zero() {
        let mut calibration = Calibration::new();
        calibration.model.homography = Matrix3::identity();
        let mut settings = Settings::new();
        settings.set("param_x_1", 4.5);
        calibration.load(&settings);
        assert_eq!(calibration.model().affine.x, [0.0, 4.5, 0.0]);
        assert_eq!(calibration.model().homography, Matrix3::zeros());
    }
}
