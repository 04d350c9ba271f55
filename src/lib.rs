//! Camera-based eye gaze tracking library.
//!
//! The pipeline turns frames of an eye camera into gaze points on a screen:
//! 1. Preprocessing and thresholding of the eye frame
//! 2. Pupil detection by contour tracing and ellipse fitting
//! 3. Mapping of the pupil position through a fitted calibration model
//! 4. Temporal smoothing and head movement compensation
//!
//! Calibration collects raw pupil positions for a sequence of screen targets,
//! rejects outliers and fits an affine and a homography model.
//!
//! # Examples
//!
//! ## Detecting a pupil
//!
//! ```no_run
//! use gaze_tracker::pupil_detection::PupilDetector;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let frame = image::open("eye.png")?;
//! let detector = PupilDetector::default();
//! if let Some(pupil) = detector.process_frame(&frame).pupil() {
//!     println!("Pupil at ({:.1}, {:.1})", pupil.center.x(), pupil.center.y());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Using smoothers
//!
//! ```
//! use gaze_tracker::filters::create_smoother_by_name;
//! use gaze_tracker::geometry::Point2D;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut smoother = create_smoother_by_name("median")?;
//! let smoothed = smoother.filter(Point2D::new(0.4, 0.6));
//! assert_eq!(smoothed, Point2D::new(0.4, 0.6));
//! smoother.reset();
//! # Ok(())
//! # }
//! ```
//!
//! ## Calibrating and tracking
//!
//! ```no_run
//! use gaze_tracker::{config::Config, geometry::ScreenPoint, pipeline::GazePipeline};
//! use std::time::Instant;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut pipeline = GazePipeline::new(&Config::default());
//! pipeline.calibration_start();
//! pipeline.calibration_add_point(ScreenPoint::new(0.1, 0.1), Instant::now());
//! // feed frames while the target is shown, then the next targets ...
//! let frame = image::open("eye.png")?;
//! for event in pipeline.process_frame(&frame, Instant::now()) {
//!     println!("{event:?}");
//! }
//! let finished = pipeline.calibration_compute_and_set();
//! if finished.success {
//!     pipeline.start_tracking();
//! }
//! # Ok(())
//! # }
//! ```

/// Point types for image and screen space
pub mod geometry;

/// Frame preprocessing and binarization
pub mod preprocessing;

/// Direct least-squares ellipse fitting
pub mod ellipse;

/// Pupil detection on thresholded frames
pub mod pupil_detection;

/// Plane-to-plane homography estimation
pub mod homography;

/// Eye-to-screen calibration models
pub mod calibration;

/// Calibration sample collection
pub mod calibration_session;

/// Temporal smoothers for point streams
pub mod filters;

/// Head movement compensation
pub mod head_pose;

/// Head pose from a planar marker
pub mod pose_estimation;

/// Per-stream gaze pipeline
pub mod pipeline;

/// Latest-frame handoff between threads
pub mod frame_slot;

/// Time sources for deadlines
pub mod clock;

/// Flat key-value settings store
pub mod settings;

/// Error types and result handling
pub mod error;

/// Constants used throughout the library
pub mod constants;

/// Configuration management
pub mod config;

pub use error::{Error, Result};
