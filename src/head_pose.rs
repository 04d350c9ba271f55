//! Head movement compensation for the gaze estimate.
//!
//! Head translation and rotation are each turned into a screen-space offset,
//! smoothed by its own smoother (Kalman by default) and added to the gaze
//! point.

use crate::{
    constants::{HEAD_TRAVEL_RANGE, REFERENCE_FRAME_HEIGHT, REFERENCE_FRAME_WIDTH},
    filters::{create_smoother, MovementSmoother, SmoothingMethod},
    geometry::{Point2D, ScreenPoint},
};
use log::trace;
use serde::{Deserialize, Serialize};

/// Head position in image pixels and rotation as a Rodrigues vector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeadPose {
    pub position: Point2D,
    pub rotation: [f64; 3],
}

impl HeadPose {
    #[must_use]
    pub fn new(position: Point2D, rotation: [f64; 3]) -> Self {
        Self { position, rotation }
    }
}

/// Linear mapping of head pose components onto screen offsets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadPoseSettings {
    pub translation_scale: Point2D,
    pub translation_offset: Point2D,
    pub rotation_scale: Point2D,
    pub rotation_offset: Point2D,
    pub translation_correction: bool,
    pub rotation_correction: bool,
}

impl Default for HeadPoseSettings {
    fn default() -> Self {
        Self {
            translation_scale: Point2D::new(
                1.0 / (HEAD_TRAVEL_RANGE * REFERENCE_FRAME_WIDTH),
                1.0 / (HEAD_TRAVEL_RANGE * REFERENCE_FRAME_HEIGHT),
            ),
            translation_offset: Point2D::new(REFERENCE_FRAME_WIDTH / 2.0, REFERENCE_FRAME_HEIGHT / 2.0),
            rotation_scale: Point2D::new(1.0, 1.0),
            rotation_offset: Point2D::zero(),
            translation_correction: true,
            rotation_correction: false,
        }
    }
}

fn scaled_offset(value: Point2D, offset: Point2D, scale: Point2D) -> Point2D {
    Point2D::new(scale.x * (value.x - offset.x), scale.y * (value.y - offset.y))
}

/// Smoothed translation and rotation corrections
pub struct HeadPoseCorrector {
    settings: HeadPoseSettings,
    translation_smoother: Box<dyn MovementSmoother>,
    rotation_smoother: Box<dyn MovementSmoother>,
    translation: Point2D,
    rotation: Point2D,
    last_raw_translation: Point2D,
    last_raw_rotation: Point2D,
    last_pose: Option<HeadPose>,
}

impl Default for HeadPoseCorrector {
    fn default() -> Self {
        Self::new(HeadPoseSettings::default(), SmoothingMethod::Kalman)
    }
}

impl HeadPoseCorrector {
    /// `smoother` is instantiated twice, once per correction vector
    #[must_use]
    pub fn new(settings: HeadPoseSettings, smoother: SmoothingMethod) -> Self {
        Self {
            translation_smoother: create_smoother(smoother),
            rotation_smoother: create_smoother(smoother),
            settings,
            translation: Point2D::zero(),
            rotation: Point2D::zero(),
            last_raw_translation: Point2D::zero(),
            last_raw_rotation: Point2D::zero(),
            last_pose: None,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &HeadPoseSettings {
        &self.settings
    }

    /// Toggle the corrections without touching smoother state
    pub fn set_corrections(&mut self, translation: bool, rotation: bool) {
        self.settings.translation_correction = translation;
        self.settings.rotation_correction = rotation;
    }

    /// Feed a new head pose.
    ///
    /// A NaN component makes the last valid raw correction stand in for the
    /// new one before smoothing.
    pub fn update(&mut self, pose: HeadPose) {
        let mut translation = scaled_offset(
            pose.position,
            self.settings.translation_offset,
            self.settings.translation_scale,
        );
        if translation.is_nan() {
            translation = self.last_raw_translation;
        } else {
            self.last_raw_translation = translation;
        }
        self.translation = self.translation_smoother.filter(translation);

        let mut rotation = scaled_offset(
            Point2D::new(pose.rotation[0], pose.rotation[1]),
            self.settings.rotation_offset,
            self.settings.rotation_scale,
        );
        if rotation.is_nan() {
            rotation = self.last_raw_rotation;
        } else {
            self.last_raw_rotation = rotation;
        }
        self.rotation = self.rotation_smoother.filter(rotation);

        self.last_pose = Some(pose);
        trace!(
            "Head correction t=({:.4}, {:.4}) r=({:.4}, {:.4})",
            self.translation.x,
            self.translation.y,
            self.rotation.x,
            self.rotation.y
        );
    }

    /// Add the enabled corrections to `point`
    #[must_use]
    pub fn apply_to(&self, point: ScreenPoint) -> ScreenPoint {
        let mut p = point.0;
        if self.settings.translation_correction {
            p += self.translation;
        }
        if self.settings.rotation_correction {
            p += self.rotation;
        }
        ScreenPoint(p)
    }

    #[must_use]
    pub fn translation_correction(&self) -> Point2D {
        self.translation
    }

    #[must_use]
    pub fn rotation_correction(&self) -> Point2D {
        self.rotation
    }

    #[must_use]
    pub fn last_pose(&self) -> Option<HeadPose> {
        self.last_pose
    }

    pub fn reset(&mut self) {
        self.translation_smoother.reset();
        self.rotation_smoother.reset();
        self.translation = Point2D::zero();
        self.rotation = Point2D::zero();
        self.last_raw_translation = Point2D::zero();
        self.last_raw_rotation = Point2D::zero();
        self.last_pose = None;
    }
}
