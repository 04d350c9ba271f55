//! Pupil detection on thresholded eye frames.
//!
//! Every border of the dark foreground is traced, filtered by contour
//! length, fitted with an ellipse and filtered again by shape and position.
//! The largest surviving ellipse is the pupil.

use crate::{
    constants::MAX_PUPIL_CANDIDATES,
    ellipse::{fit_ellipse, RotatedEllipse},
    geometry::{EyePoint, Point2D},
    preprocessing::{preprocess, PreprocessedFrame},
    settings::Settings,
    Error, Result,
};
use image::{DynamicImage, GrayImage, Rgb, RgbImage};
use imageproc::{
    contours::find_contours,
    drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut},
    rect::Rect,
};
use log::{debug, info};
use rusttype::{Font, Scale};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Pixel height of the status label
const LABEL_SIZE: f32 = 16.0;

/// Detector tunables, all persisted as named settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Flip the frame horizontally before anything else
    pub mirrored: bool,
    /// Equalize the grayscale histogram before thresholding
    pub equalize_histogram: bool,
    pub contrast: f64,
    pub brightness: f64,
    pub gamma: f64,
    /// Gray level at or below which a pixel is a pupil candidate
    pub threshold: u8,
    pub top_margin: f64,
    pub bottom_margin: f64,
    pub left_margin: f64,
    pub right_margin: f64,
    /// Shortest accepted contour, in points
    pub points_min: usize,
    /// Longest accepted contour, in points
    pub points_max: usize,
    /// Exclusive lower bound on height / width
    pub oblateness_low: f64,
    /// Exclusive upper bound on height / width
    pub oblateness_high: f64,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            mirrored: true,
            equalize_histogram: false,
            contrast: 1.0,
            brightness: 0.0,
            gamma: 1.0,
            threshold: 27,
            top_margin: 0.0,
            bottom_margin: 0.0,
            left_margin: 0.0,
            right_margin: 0.0,
            points_min: 25,
            points_max: 690,
            oblateness_low: 0.67,
            oblateness_high: 1.5,
        }
    }
}

fn clamp_margin(value: f64, opposite: f64) -> f64 {
    value.clamp(0.0, (1.0 - opposite).max(0.0))
}

impl DetectorSettings {
    pub fn set_top_margin(&mut self, value: f64) {
        self.top_margin = clamp_margin(value, self.bottom_margin);
    }

    pub fn set_bottom_margin(&mut self, value: f64) {
        self.bottom_margin = clamp_margin(value, self.top_margin);
    }

    pub fn set_left_margin(&mut self, value: f64) {
        self.left_margin = clamp_margin(value, self.right_margin);
    }

    pub fn set_right_margin(&mut self, value: f64) {
        self.right_margin = clamp_margin(value, self.left_margin);
    }

    /// Active search rectangle `(x_from, y_from, x_to, y_to)` in pixels
    #[must_use]
    pub fn active_rect(&self, width: u32, height: u32) -> (f64, f64, f64, f64) {
        let (w, h) = (f64::from(width), f64::from(height));
        (
            self.left_margin * w,
            self.top_margin * h,
            w * (1.0 - self.right_margin),
            h * (1.0 - self.bottom_margin),
        )
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.gamma <= 0.0 || !self.gamma.is_finite() {
            return Err(Error::ConfigError("Gamma must be positive".to_string()));
        }
        if !self.contrast.is_finite() || !self.brightness.is_finite() {
            return Err(Error::ConfigError(
                "Contrast and brightness must be finite".to_string(),
            ));
        }
        for margin in [self.top_margin, self.bottom_margin, self.left_margin, self.right_margin] {
            if !(0.0..=1.0).contains(&margin) {
                return Err(Error::ConfigError(
                    "Margins must be between 0.0 and 1.0".to_string(),
                ));
            }
        }
        if self.top_margin + self.bottom_margin > 1.0 || self.left_margin + self.right_margin > 1.0 {
            return Err(Error::ConfigError(
                "Opposite margins must not sum past 1.0".to_string(),
            ));
        }
        if self.points_min > self.points_max {
            return Err(Error::ConfigError(
                "points_min must not exceed points_max".to_string(),
            ));
        }
        if self.oblateness_low >= self.oblateness_high {
            return Err(Error::ConfigError(
                "oblateness_low must be below oblateness_high".to_string(),
            ));
        }
        Ok(())
    }

    /// Read every tunable, keeping the current value for missing keys
    pub fn load(&mut self, settings: &Settings) {
        self.mirrored = settings.get_bool("mirrored", self.mirrored);
        self.equalize_histogram = settings.get_bool("equalize_hist", self.equalize_histogram);
        self.contrast = settings.get_f64("contrast", self.contrast);
        self.brightness = settings.get_f64("brightness", self.brightness);
        self.gamma = settings.get_f64("gamma", self.gamma);
        self.threshold = settings
            .get_i64("threshold", i64::from(self.threshold))
            .clamp(0, 255) as u8;

        self.set_top_margin(settings.get_f64("margin_top", self.top_margin));
        self.set_bottom_margin(settings.get_f64("margin_bottom", self.bottom_margin));
        self.set_right_margin(settings.get_f64("margin_right", self.right_margin));
        self.set_left_margin(settings.get_f64("margin_left", self.left_margin));

        self.points_min = load_count(settings, "points_min", self.points_min);
        self.points_max = load_count(settings, "points_max", self.points_max);

        self.oblateness_low = settings.get_f64("oblateness_low", self.oblateness_low);
        self.oblateness_high = settings.get_f64("oblateness_high", self.oblateness_high);
    }

    pub fn save(&self, settings: &mut Settings) {
        settings.set("mirrored", self.mirrored);
        settings.set("equalize_hist", self.equalize_histogram);
        settings.set("contrast", self.contrast);
        settings.set("brightness", self.brightness);
        settings.set("gamma", self.gamma);
        settings.set("threshold", self.threshold);

        settings.set("margin_top", self.top_margin);
        settings.set("margin_bottom", self.bottom_margin);
        settings.set("margin_right", self.right_margin);
        settings.set("margin_left", self.left_margin);

        settings.set("points_min", self.points_min);
        settings.set("points_max", self.points_max);

        settings.set("oblateness_low", self.oblateness_low);
        settings.set("oblateness_high", self.oblateness_high);
    }
}

fn load_count(settings: &Settings, key: &str, current: usize) -> usize {
    let fallback = i64::try_from(current).unwrap_or(i64::MAX);
    usize::try_from(settings.get_i64(key, fallback).max(0)).unwrap_or(current)
}

/// Background of the debug frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewType {
    #[default]
    Color,
    Grayscale,
    Threshold,
}

/// A detected pupil
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pupil {
    /// Ellipse center in image pixels
    pub center: EyePoint,
    /// `width * height / 4`
    pub size: f64,
    pub ellipse: RotatedEllipse,
}

/// Outcome of one detection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PupilDetection {
    Ok(Pupil),
    /// Nothing survived the size and shape filters
    NoPupilCandidate,
    /// The candidate cap was reached; the frame is ambiguous
    TooManyPupilCandidates,
}

impl PupilDetection {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    #[must_use]
    pub fn pupil(&self) -> Option<&Pupil> {
        match self {
            Self::Ok(pupil) => Some(pupil),
            _ => None,
        }
    }

    /// Status label, also printed on the debug frame
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ok(_) => "PUPIL_DETECTED",
            Self::NoPupilCandidate => "NO_PUPIL_CANDIDATE",
            Self::TooManyPupilCandidates => "TOO_MANY_PUPIL_CANDIDATES",
        }
    }
}

/// Detection result together with the intermediate candidates
#[derive(Debug, Clone)]
pub struct DetectionReport {
    pub detection: PupilDetection,
    pub candidates: Vec<RotatedEllipse>,
    /// Active rectangle `(x_from, y_from, x_to, y_to)`
    pub active_rect: (f64, f64, f64, f64),
}

/// TrueType font used for the debug frame status label
#[derive(Clone)]
pub struct LabelFont(Arc<Font<'static>>);

impl LabelFont {
    /// Load a `.ttf`/`.otf` file
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or is not a usable font.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let font = Font::try_from_vec(data)
            .ok_or_else(|| Error::InvalidInput(format!("{} is not a usable font", path.display())))?;
        info!("Loaded label font from {}", path.display());
        Ok(Self(Arc::new(font)))
    }
}

impl fmt::Debug for LabelFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LabelFont")
    }
}

/// Pupil detector
#[derive(Debug, Clone, Default)]
pub struct PupilDetector {
    settings: DetectorSettings,
    preview: PreviewType,
    label_font: Option<LabelFont>,
}

impl PupilDetector {
    #[must_use]
    pub fn new(settings: DetectorSettings) -> Self {
        Self {
            settings,
            preview: PreviewType::default(),
            label_font: None,
        }
    }

    /// Write the detection label into debug frames with `font`.
    /// Without a font only the status bar is drawn.
    pub fn set_label_font(&mut self, font: Option<LabelFont>) {
        self.label_font = font;
    }

    #[must_use]
    pub fn has_label_font(&self) -> bool {
        self.label_font.is_some()
    }

    #[must_use]
    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut DetectorSettings {
        &mut self.settings
    }

    pub fn set_preview_type(&mut self, preview: PreviewType) {
        self.preview = preview;
    }

    #[must_use]
    pub fn preview_type(&self) -> PreviewType {
        self.preview
    }

    /// Detect the pupil in a binary frame (non-zero = candidate)
    #[must_use]
    pub fn detect(&self, binary: &GrayImage) -> PupilDetection {
        self.detect_report(binary).detection
    }

    /// Detect the pupil and keep the candidate list
    #[must_use]
    pub fn detect_report(&self, binary: &GrayImage) -> DetectionReport {
        let s = &self.settings;
        let active_rect = s.active_rect(binary.width(), binary.height());
        let (x_from, y_from, x_to, y_to) = active_rect;

        let mut candidates = Vec::with_capacity(MAX_PUPIL_CANDIDATES);
        let contours = if binary.width() == 0 || binary.height() == 0 {
            Vec::new()
        } else {
            find_contours::<i32>(binary)
        };
        for contour in contours {
            let len = contour.points.len();
            if len < s.points_min || len > s.points_max {
                continue;
            }

            let points: Vec<Point2D> = contour
                .points
                .iter()
                .map(|p| Point2D::new(f64::from(p.x), f64::from(p.y)))
                .collect();
            let Ok(ellipse) = fit_ellipse(&points) else {
                continue;
            };

            let oblateness = ellipse.oblateness();
            let c = ellipse.center;
            if oblateness > s.oblateness_low
                && oblateness < s.oblateness_high
                && c.x > x_from
                && c.y > y_from
                && c.x < x_to
                && c.y < y_to
            {
                candidates.push(ellipse);
                if candidates.len() >= MAX_PUPIL_CANDIDATES {
                    break;
                }
            }
        }

        let detection = if candidates.is_empty() {
            PupilDetection::NoPupilCandidate
        } else if candidates.len() >= MAX_PUPIL_CANDIDATES {
            PupilDetection::TooManyPupilCandidates
        } else {
            let best = candidates
                .iter()
                .copied()
                .fold(None::<RotatedEllipse>, |best, e| match best {
                    Some(b) if b.box_area() >= e.box_area() => Some(b),
                    _ => Some(e),
                });
            match best {
                Some(ellipse) => PupilDetection::Ok(Pupil {
                    center: EyePoint(ellipse.center),
                    size: ellipse.box_area() / 4.0,
                    ellipse,
                }),
                None => PupilDetection::NoPupilCandidate,
            }
        };

        if !detection.is_ok() {
            debug!("Pupil detection failed: {}", detection.label());
        }

        DetectionReport {
            detection,
            candidates,
            active_rect,
        }
    }

    /// Preprocess a raw frame and detect the pupil
    #[must_use]
    pub fn process_frame(&self, frame: &DynamicImage) -> PupilDetection {
        let pre = preprocess(frame, &self.settings);
        self.detect(&pre.binary)
    }

    /// Preprocess, detect and render an annotated debug frame
    #[must_use]
    pub fn process_frame_debug(&self, frame: &DynamicImage) -> (PupilDetection, RgbImage) {
        let pre = preprocess(frame, &self.settings);
        let report = self.detect_report(&pre.binary);
        let canvas = self.draw_debug(&pre, &report);
        (report.detection, canvas)
    }

    fn draw_debug(&self, pre: &PreprocessedFrame, report: &DetectionReport) -> RgbImage {
        let mut canvas = match self.preview {
            PreviewType::Color => pre.color.clone(),
            PreviewType::Grayscale => DynamicImage::ImageLuma8(pre.gray.clone()).to_rgb8(),
            PreviewType::Threshold => DynamicImage::ImageLuma8(pre.binary.clone()).to_rgb8(),
        };
        if canvas.width() == 0 || canvas.height() == 0 {
            return canvas;
        }

        let (x_from, y_from, x_to, y_to) = report.active_rect;
        let rect_w = (x_to - x_from).max(0.0) as u32;
        let rect_h = (y_to - y_from).max(0.0) as u32;
        if rect_w > 0 && rect_h > 0 {
            draw_hollow_rect_mut(
                &mut canvas,
                Rect::at(x_from as i32, y_from as i32).of_size(rect_w, rect_h),
                Rgb([255, 255, 255]),
            );
        }

        for candidate in &report.candidates {
            draw_ellipse(&mut canvas, candidate, Rgb([0, 255, 0]));
        }

        let status_color = if let PupilDetection::Ok(pupil) = &report.detection {
            draw_ellipse(&mut canvas, &pupil.ellipse, Rgb([0, 255, 192]));
            draw_cross(&mut canvas, pupil.center.0, Rgb([0, 255, 192]));
            Rgb([0, 255, 0])
        } else {
            Rgb([255, 0, 0])
        };

        let bar_w = canvas.width();
        let bar_h = canvas.height().min(4);
        draw_filled_rect_mut(&mut canvas, Rect::at(0, 0).of_size(bar_w, bar_h), status_color);

        if let Some(LabelFont(font)) = &self.label_font {
            draw_text_mut(
                &mut canvas,
                status_color,
                4,
                bar_h as i32 + 2,
                Scale::uniform(LABEL_SIZE),
                font,
                report.detection.label(),
            );
        }

        canvas
    }
}

fn draw_ellipse(canvas: &mut RgbImage, ellipse: &RotatedEllipse, color: Rgb<u8>) {
    let points = ellipse.sample_points(64);
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        draw_line_segment_mut(canvas, (p.x as f32, p.y as f32), (q.x as f32, q.y as f32), color);
    }
}

fn draw_cross(canvas: &mut RgbImage, center: Point2D, color: Rgb<u8>) {
    const CROSS_SIZE: f32 = 20.0;
    let (x, y) = (center.x as f32, center.y as f32);
    draw_line_segment_mut(canvas, (x, y - CROSS_SIZE), (x, y + CROSS_SIZE), color);
    draw_line_segment_mut(canvas, (x - CROSS_SIZE, y), (x + CROSS_SIZE, y), color);
}
