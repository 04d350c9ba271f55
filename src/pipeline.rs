//! Per-stream gaze pipeline.
//!
//! Ties the detector, the calibration model, the calibration session, the
//! smoothers and the head pose corrector together. Every input returns the
//! events it caused; nothing is delivered through callbacks.

use crate::{
    calibration::Calibration,
    calibration_session::{CalibrationSession, SampleOutcome},
    config::Config,
    filters::{create_smoother, MovementSmoother},
    geometry::{EyePoint, ScreenPoint},
    head_pose::{HeadPose, HeadPoseCorrector},
    pupil_detection::{PupilDetection, PupilDetector},
    settings::Settings,
};
use image::DynamicImage;
use log::{debug, info, warn};
use std::time::Instant;

/// Message sent when a frame yields no usable pupil
pub const DETECTION_FAILED_MESSAGE: &str = "Tracker failed in detecting any pupil.";

/// Which calibration step an event reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationEventKind {
    Started,
    Stopped,
    PointCalibrated,
    ComputeAndSetFinished,
}

/// Outcome of a calibration command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationEvent {
    pub kind: CalibrationEventKind,
    pub success: bool,
    pub message: String,
}

impl CalibrationEvent {
    fn ok(kind: CalibrationEventKind) -> Self {
        Self {
            kind,
            success: true,
            message: String::new(),
        }
    }

    fn failed(kind: CalibrationEventKind, message: &str) -> Self {
        Self {
            kind,
            success: false,
            message: message.to_string(),
        }
    }
}

/// Everything the pipeline reports
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// New gaze estimate; `eye_detected` is false when the point was
    /// carried over from an earlier frame
    Gaze { eye_detected: bool, point: ScreenPoint },
    GazeDetectionFailed(String),
    Calibration(CalibrationEvent),
}

/// Gaze pipeline for one camera stream
pub struct GazePipeline {
    detector: PupilDetector,
    calibration: Calibration,
    session: CalibrationSession,
    pupil_smoother: Box<dyn MovementSmoother>,
    output_smoother: Box<dyn MovementSmoother>,
    head: HeadPoseCorrector,
    tracking: bool,
    last_gaze: ScreenPoint,
    previous_output: ScreenPoint,
}

impl Default for GazePipeline {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

impl GazePipeline {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        info!(
            "Creating gaze pipeline: pupil smoother {}, output smoother {}, head smoother {}, model {:?}",
            config.smoothing.pupil, config.smoothing.output, config.smoothing.head, config.calibration.model
        );
        Self {
            detector: PupilDetector::new(config.detector.clone()),
            calibration: config.calibration.calibration(),
            session: CalibrationSession::new(config.calibration.session_settings()),
            pupil_smoother: create_smoother(config.smoothing.pupil),
            output_smoother: create_smoother(config.smoothing.output),
            head: HeadPoseCorrector::new(config.head_pose.clone(), config.smoothing.head),
            tracking: false,
            last_gaze: ScreenPoint::default(),
            previous_output: ScreenPoint::default(),
        }
    }

    #[must_use]
    pub fn detector(&self) -> &PupilDetector {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut PupilDetector {
        &mut self.detector
    }

    #[must_use]
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn calibration_mut(&mut self) -> &mut Calibration {
        &mut self.calibration
    }

    #[must_use]
    pub fn session(&self) -> &CalibrationSession {
        &self.session
    }

    #[must_use]
    pub fn head_pose(&self) -> &HeadPoseCorrector {
        &self.head
    }

    pub fn head_pose_mut(&mut self) -> &mut HeadPoseCorrector {
        &mut self.head
    }

    pub fn start_tracking(&mut self) {
        self.tracking = true;
        info!("Gaze tracking started");
    }

    pub fn stop_tracking(&mut self) {
        self.tracking = false;
        info!("Gaze tracking stopped");
    }

    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    /// Begin a calibration run. The current model is zeroed.
    pub fn calibration_start(&mut self) -> CalibrationEvent {
        self.session.start();
        self.calibration.reset();
        CalibrationEvent::ok(CalibrationEventKind::Started)
    }

    /// Abort the run and discard its data
    pub fn calibration_stop(&mut self) -> CalibrationEvent {
        self.session.stop();
        CalibrationEvent::ok(CalibrationEventKind::Stopped)
    }

    /// Show a new target.
    ///
    /// Returns a failed `PointCalibrated` event when no run is active; the
    /// success event comes later, once the target has collected its samples.
    pub fn calibration_add_point(&mut self, screen_point: ScreenPoint, now: Instant) -> Option<CalibrationEvent> {
        match self.session.add_target(screen_point, now) {
            Ok(()) => None,
            Err(e) => {
                warn!("Calibration point rejected: {}", e);
                Some(CalibrationEvent::failed(
                    CalibrationEventKind::PointCalibrated,
                    "calibration not started",
                ))
            }
        }
    }

    /// Fit the model from everything collected so far
    pub fn calibration_compute_and_set(&mut self) -> CalibrationEvent {
        if self.session.compute_and_fit(&mut self.calibration) {
            CalibrationEvent::ok(CalibrationEventKind::ComputeAndSetFinished)
        } else {
            CalibrationEvent::failed(CalibrationEventKind::ComputeAndSetFinished, "calibration failed")
        }
    }

    /// Report a timed-out target without waiting for a frame
    pub fn poll(&mut self, now: Instant) -> Vec<PipelineEvent> {
        self.session
            .poll_timeout(now)
            .map(|_| vec![timeout_event()])
            .unwrap_or_default()
    }

    /// Feed the head pose of the current frame
    pub fn process_head_pose(&mut self, pose: HeadPose) {
        self.head.update(pose);
    }

    /// Run the detector on a raw camera frame and process the result
    pub fn process_frame(&mut self, frame: &DynamicImage, now: Instant) -> Vec<PipelineEvent> {
        let detection = self.detector.process_frame(frame);
        self.process_detection(&detection, now)
    }

    /// Process one detector result
    pub fn process_detection(&mut self, detection: &PupilDetection, now: Instant) -> Vec<PipelineEvent> {
        let mut events = self.poll(now);

        let Some(pupil) = detection.pupil() else {
            debug!("No pupil: {}", detection.label());
            events.push(PipelineEvent::GazeDetectionFailed(
                DETECTION_FAILED_MESSAGE.to_string(),
            ));
            return events;
        };

        if self.tracking {
            events.push(self.track(pupil.center));
        }

        if self.session.is_collecting() && self.session.has_active_target() {
            match self.session.add_raw_sample(pupil.center, now) {
                SampleOutcome::Completed => {
                    events.push(PipelineEvent::Calibration(CalibrationEvent::ok(
                        CalibrationEventKind::PointCalibrated,
                    )));
                }
                SampleOutcome::TimedOut => events.push(timeout_event()),
                SampleOutcome::Collected | SampleOutcome::Ignored => {}
            }
        }

        events
    }

    fn track(&mut self, eye: EyePoint) -> PipelineEvent {
        let mapped = self.calibration.gaze_position(eye);
        let gaze = if mapped.is_nan() {
            self.last_gaze
        } else {
            self.last_gaze = mapped;
            mapped
        };

        let smoothed = ScreenPoint(self.pupil_smoother.filter(gaze.0));
        let corrected = self.head.apply_to(smoothed);
        self.emit(corrected, !mapped.is_nan())
    }

    fn emit(&mut self, point: ScreenPoint, eye_detected: bool) -> PipelineEvent {
        let (point, eye_detected) = if point.is_nan() {
            (self.previous_output, false)
        } else {
            (point, eye_detected)
        };
        let smoothed = ScreenPoint(self.output_smoother.filter(point.0));
        self.previous_output = smoothed;
        PipelineEvent::Gaze {
            eye_detected,
            point: smoothed,
        }
    }

    /// Restore detector tunables and the calibration model
    pub fn load_settings(&mut self, settings: &Settings) {
        self.detector.settings_mut().load(settings);
        self.calibration.load(settings);
        debug!("Loaded {} settings", settings.len());
    }

    /// Store detector tunables and the calibration model
    pub fn save_settings(&self, settings: &mut Settings) {
        self.detector.settings().save(settings);
        self.calibration.save(settings);
    }

    /// Drop smoother history and the carried-over gaze
    pub fn reset(&mut self) {
        self.pupil_smoother.reset();
        self.output_smoother.reset();
        self.head.reset();
        self.last_gaze = ScreenPoint::default();
        self.previous_output = ScreenPoint::default();
    }
}

fn timeout_event() -> PipelineEvent {
    PipelineEvent::Calibration(CalibrationEvent::failed(
        CalibrationEventKind::PointCalibrated,
        "point calibration timeout",
    ))
}
