//! Tests for smoother output accuracy comparing with expected values

use gaze_tracker::filters::{
    create_smoother, create_smoother_by_name, kalman::KalmanSmoother, median::MedianSmoother,
    moving_average::MovingAverageSmoother, MovementSmoother, SmoothingMethod,
};
use gaze_tracker::geometry::Point2D;
use proptest::prelude::*;

fn feed(smoother: &mut dyn MovementSmoother, xs: &[f64]) -> Vec<f64> {
    xs.iter().map(|&x| smoother.filter(Point2D::new(x, -x)).x).collect()
}

/// Test that smoothers produce expected output values
#[test]
fn test_smoother_output_accuracy() {
    // Median picks the upper middle element
    {
        let mut smoother = create_smoother(SmoothingMethod::Median);
        assert_eq!(feed(smoother.as_mut(), &[1.0, 2.0, 3.0, 4.0, 5.0]), vec![1.0, 2.0, 2.0, 3.0, 3.0]);
    }

    // Moving average over the samples seen so far
    {
        let mut smoother = create_smoother(SmoothingMethod::MovingAverage);
        assert_eq!(feed(smoother.as_mut(), &[3.0, 6.0, 9.0]), vec![3.0, 4.5, 6.0]);
    }

    // Double moving average corrects for the lag of the first average
    {
        let mut smoother = create_smoother(SmoothingMethod::DoubleMovingAverage);
        assert_eq!(feed(smoother.as_mut(), &[1.0, 2.0, 3.0]), vec![1.0, 1.75, 2.5]);
    }

    // Double exponential starts from a zero state
    {
        let mut smoother = create_smoother(SmoothingMethod::DoubleExp);
        let out = feed(smoother.as_mut(), &[1.0, 1.0, 1.0]);
        assert!((out[0] - 0.5).abs() < 1e-12);
        assert!((out[1] - 0.9).abs() < 1e-12);
        assert!((out[2] - 1.13).abs() < 1e-12);
    }

    // Null smoother passes values through unchanged
    {
        let mut smoother = create_smoother(SmoothingMethod::None);
        for &(x, y) in &[(1.23, 4.56), (-10.0, 20.0), (0.0, 0.0), (100.0, -100.0)] {
            assert_eq!(smoother.filter(Point2D::new(x, y)), Point2D::new(x, y));
        }
    }
}

/// Test convergence to a constant input
#[test]
fn test_smoother_convergence_accuracy() {
    for method in SmoothingMethod::ALL {
        let mut smoother = create_smoother(method);
        let mut last = Point2D::zero();
        for _ in 0..400 {
            last = smoother.filter(Point2D::new(0.5, -0.25));
        }
        assert!((last.x - 0.5).abs() < 1e-3, "{method} did not converge: {last:?}");
        assert!((last.y + 0.25).abs() < 1e-3, "{method} did not converge: {last:?}");
    }
}

#[test]
fn test_moving_average_window_eviction() {
    let mut smoother = MovingAverageSmoother::new(3);
    let out = feed(&mut smoother, &[3.0, 6.0, 9.0, 12.0]);
    assert_eq!(out[3], 9.0, "Average of [6, 9, 12]");
}

#[test]
fn test_median_rejects_single_spike() {
    let mut smoother = MedianSmoother::new(5);
    let out = feed(&mut smoother, &[1.0, 1.0, 1.0, 100.0, 1.0]);
    assert!(out.iter().all(|&v| v == 1.0));
}

#[test]
fn test_kalman_step_response_bounded() {
    let mut smoother = KalmanSmoother::new();
    let mut max_x: f64 = 0.0;
    for _ in 0..200 {
        max_x = max_x.max(smoother.filter(Point2D::new(0.5, 0.5)).x);
    }
    assert!(max_x < 0.6, "overshoot too large: {max_x}");
}

#[test]
fn test_reset_restores_initial_behavior() {
    for method in SmoothingMethod::ALL {
        let mut smoother = create_smoother(method);
        let first = smoother.filter(Point2D::new(2.0, 3.0));
        for i in 0..20 {
            smoother.filter(Point2D::new(f64::from(i), 1.0));
        }
        smoother.reset();
        assert_eq!(smoother.filter(Point2D::new(2.0, 3.0)), first, "{method} reset incomplete");
    }
}

#[test]
fn test_smoother_names() {
    for method in SmoothingMethod::ALL {
        let parsed: SmoothingMethod = method.as_str().parse().unwrap();
        assert_eq!(parsed, method);
        assert!(!create_smoother(method).name().is_empty());
    }
    assert!(create_smoother_by_name("kalman").is_ok());
    assert!(create_smoother_by_name("lowpass").is_err());
}

proptest! {
    #[test]
    fn prop_window_smoothers_stay_in_input_range(values in prop::collection::vec(-1000.0f64..1000.0, 1..60)) {
        let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        for method in [SmoothingMethod::MovingAverage, SmoothingMethod::Median] {
            let mut smoother = create_smoother(method);
            for &v in &values {
                let p = smoother.filter(Point2D::new(v, v));
                prop_assert!(p.x >= lo - 1e-9 && p.x <= hi + 1e-9);
            }
        }
    }
}
