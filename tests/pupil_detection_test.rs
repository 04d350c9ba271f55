//! End-to-end pupil detection on synthetic eye frames


use gaze_tracker::pupil_detection::{DetectorSettings, LabelFont, PreviewType, PupilDetection, PupilDetector};
use gaze_tracker::Error;
use std::path::Path;
use test_helpers::eye_frame;

#[test]
fn test_mirrored_frame_reports_flipped_center() {
    let frame = eye_frame(160, 120, (50.0, 60.0), 15.0);
    let detection = PupilDetector::default().process_frame(&frame);
    let pupil = detection.pupil().expect("pupil should be found");
    assert!((pupil.center.x() - 109.0).abs() < 0.5, "x = {}", pupil.center.x());
    assert!((pupil.center.y() - 60.0).abs() < 0.5, "y = {}", pupil.center.y());
}

#[test]
fn test_unmirrored_frame_keeps_center() {
    let frame = eye_frame(160, 120, (50.0, 60.0), 15.0);
    let settings = DetectorSettings {
        mirrored: false,
        ..DetectorSettings::default()
    };
    let detection = PupilDetector::new(settings).process_frame(&frame);
    let pupil = detection.pupil().expect("pupil should be found");
    assert!((pupil.center.x() - 50.0).abs() < 0.5);
    assert!((pupil.center.y() - 60.0).abs() < 0.5);
    // roughly the disk area divided by pi
    assert!((pupil.size - 225.0).abs() < 40.0, "size = {}", pupil.size);
}

#[test]
fn test_threshold_below_pupil_level_finds_nothing() {
    let frame = eye_frame(160, 120, (80.0, 60.0), 15.0);
    let settings = DetectorSettings {
        threshold: 5,
        ..DetectorSettings::default()
    };
    assert_eq!(
        PupilDetector::new(settings).process_frame(&frame),
        PupilDetection::NoPupilCandidate
    );
}

#[test]
fn test_tiny_blob_rejected_by_contour_length() {
    let frame = eye_frame(160, 120, (80.0, 60.0), 2.0);
    assert_eq!(
        PupilDetector::default().process_frame(&frame),
        PupilDetection::NoPupilCandidate
    );
}

#[test]
fn test_brightness_can_hide_the_pupil() {
    let frame = eye_frame(160, 120, (80.0, 60.0), 15.0);
    let settings = DetectorSettings {
        brightness: 40.0,
        ..DetectorSettings::default()
    };
    assert!(!PupilDetector::new(settings).process_frame(&frame).is_ok());
}

#[test]
fn test_debug_frame_matches_input_size() {
    let frame = eye_frame(160, 120, (80.0, 60.0), 15.0);
    for preview in [PreviewType::Color, PreviewType::Grayscale, PreviewType::Threshold] {
        let mut detector = PupilDetector::default();
        detector.set_preview_type(preview);
        let (detection, debug) = detector.process_frame_debug(&frame);
        assert!(detection.is_ok());
        assert_eq!(debug.dimensions(), (160, 120));
        // green status bar on success
        assert_eq!(debug.get_pixel(0, 0).0, [0, 255, 0]);
    }
}

#[test]
fn test_debug_frame_marks_failure() {
    let frame = eye_frame(160, 120, (80.0, 60.0), 2.0);
    let (detection, debug) = PupilDetector::default().process_frame_debug(&frame);
    assert!(!detection.is_ok());
    assert_eq!(debug.get_pixel(0, 0).0, [255, 0, 0]);
}

#[test]
fn test_gray_frame_input() {
    let frame = eye_frame(160, 120, (80.0, 60.0), 15.0).to_luma8();
    let detection = PupilDetector::default().process_frame(&image::DynamicImage::ImageLuma8(frame));
    assert!(detection.is_ok());
}

const SYSTEM_FONTS: [&str; 3] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
];

#[test]
fn test_label_font_rejects_bad_files() {
    assert!(matches!(LabelFont::from_file("/nonexistent/font.ttf"), Err(Error::Io(_))));

    let not_a_font = std::env::temp_dir().join(format!("gaze_tracker_font_{}.ttf", std::process::id()));
    std::fs::write(&not_a_font, b"definitely not a font").unwrap();
    let result = LabelFont::from_file(&not_a_font);
    std::fs::remove_file(&not_a_font).ok();
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

#[test]
fn test_status_label_drawn_below_bar() {
    let Some(path) = SYSTEM_FONTS.iter().map(Path::new).find(|p| p.exists()) else {
        eprintln!("Skipping test: no system font found");
        return;
    };
    let frame = eye_frame(160, 120, (80.0, 60.0), 2.0);

    let plain = PupilDetector::default();
    assert!(!plain.has_label_font());
    let (_, without_label) = plain.process_frame_debug(&frame);

    let mut labelled = PupilDetector::default();
    labelled.set_label_font(Some(LabelFont::from_file(path).unwrap()));
    let (detection, with_label) = labelled.process_frame_debug(&frame);
    assert_eq!(detection, PupilDetection::NoPupilCandidate);

    // red text lands in the band under the status bar
    let changed = (4..24)
        .flat_map(|y| (0..160).map(move |x| (x, y)))
        .filter(|&(x, y)| without_label.get_pixel(x, y) != with_label.get_pixel(x, y))
        .count();
    assert!(changed > 20, "only {changed} pixels differ");
    // the bar itself is untouched
    assert_eq!(with_label.get_pixel(0, 0).0, [255, 0, 0]);
}
