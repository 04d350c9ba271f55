//! Error handling tests for all modules

use gaze_tracker::{
    calibration_session::{CalibrationSession, SessionSettings},
    config::Config,
    ellipse::fit_ellipse,
    filters::create_smoother_by_name,
    geometry::{Point2D, ScreenPoint},
    homography::{estimate_homography_dlt, fit_homography_ransac, RansacConfig},
    pipeline::{CalibrationEventKind, GazePipeline},
    pose_estimation::{parse_marker_line, MarkerPoseEstimator},
    settings::Settings,
    Error,
};
use std::time::Instant;

#[test]
fn test_smoother_creation_errors() {
    let result = create_smoother_by_name("invalid_smoother");
    match result {
        Err(Error::InvalidInput(msg)) => assert!(msg.contains("invalid_smoother")),
        _ => panic!("Expected InvalidInput"),
    }

    for name in ["kalman", "Median", "double-moving-average", "none"] {
        assert!(create_smoother_by_name(name).is_ok(), "{name} should be accepted");
    }
}

#[test]
fn test_config_validation_errors() {
    let mut config = Config::default();
    config.calibration.measurements_per_point = 0;
    assert!(matches!(config.validate(), Err(Error::ConfigError(_))));

    let mut config = Config::default();
    config.calibration.dist_std_dev_coeff = f64::NAN;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.detector.gamma = 0.0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.detector.top_margin = 0.6;
    config.detector.bottom_margin = 0.6;
    assert!(config.validate().is_err());

    assert!(matches!(Config::from_yaml("detector: [1, 2"), Err(Error::ConfigError(_))));
    assert!(Config::from_file("/nonexistent/gaze.yaml").is_err());
}

#[test]
fn test_settings_errors() {
    assert!(matches!(Settings::from_yaml("- just\n- a list"), Err(Error::Settings(_))));
    assert!(matches!(Settings::from_file("/nonexistent/settings.yaml"), Err(Error::Io(_))));
    assert!(Settings::from_yaml("").unwrap().is_empty());
}

#[test]
fn test_geometry_fit_errors() {
    let line: Vec<Point2D> = (0..20).map(|i| Point2D::new(f64::from(i), 2.0 * f64::from(i))).collect();
    assert!(matches!(fit_ellipse(&line), Err(Error::Ellipse(_))));

    let few = [Point2D::new(0.0, 0.0), Point2D::new(1.0, 0.0), Point2D::new(0.0, 1.0)];
    assert!(matches!(estimate_homography_dlt(&few, &few), Err(Error::Homography(_))));
    assert!(fit_homography_ransac(&few, &few, &RansacConfig::default()).is_err());
}

#[test]
fn test_pose_errors() {
    assert!(matches!(MarkerPoseEstimator::new(0, 480), Err(Error::InvalidInput(_))));
    assert!(parse_marker_line("1|2;3|4").is_err());
    assert!(parse_marker_line("none").unwrap().is_none());

    let estimator = MarkerPoseEstimator::new(640, 480).unwrap();
    let collapsed = [Point2D::new(100.0, 100.0); 4];
    assert!(estimator.estimate(&collapsed).is_err());
}

#[test]
fn test_calibration_state_errors() {
    let mut session = CalibrationSession::new(SessionSettings::default());
    let result = session.add_target(ScreenPoint::new(0.5, 0.5), Instant::now());
    assert!(matches!(result, Err(Error::Calibration(_))));

    let mut pipeline = GazePipeline::default();
    let event = pipeline
        .calibration_add_point(ScreenPoint::new(0.5, 0.5), Instant::now())
        .expect("idle pipeline must report the rejected point");
    assert_eq!(event.kind, CalibrationEventKind::PointCalibrated);
    assert!(!event.success);
    assert_eq!(event.message, "calibration not started");

    let event = pipeline.calibration_compute_and_set();
    assert!(!event.success);
    assert_eq!(event.message, "calibration failed");
}

#[test]
fn test_error_display() {
    let err = Error::Calibration("calibration not started".to_string());
    assert_eq!(err.to_string(), "Calibration error: calibration not started");

    let io: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
    assert!(io.to_string().starts_with("IO error"));
}
