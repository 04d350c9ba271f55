//! Frame preprocessing ahead of pupil detection.
//!
//! mirror → contrast/brightness → gamma LUT → grayscale → optional
//! histogram equalization → dark-pixel binarization.

use crate::pupil_detection::DetectorSettings;
use image::{DynamicImage, GrayImage, Luma, RgbImage};

/// Intermediate images of one preprocessing pass
#[derive(Debug, Clone)]
pub struct PreprocessedFrame {
    /// Color frame after mirror, contrast/brightness and gamma
    pub color: RgbImage,
    /// Grayscale frame, equalized when enabled
    pub gray: GrayImage,
    /// Binary frame; 255 marks pupil candidates
    pub binary: GrayImage,
}

/// Run the full preprocessing chain on a raw frame
#[must_use]
pub fn preprocess(frame: &DynamicImage, settings: &DetectorSettings) -> PreprocessedFrame {
    let mut color = frame.to_rgb8();
    if settings.mirrored {
        image::imageops::flip_horizontal_in_place(&mut color);
    }

    let lut = combined_lut(settings.contrast, settings.brightness, settings.gamma);
    for pixel in color.pixels_mut() {
        for channel in &mut pixel.0 {
            *channel = lut[usize::from(*channel)];
        }
    }

    let mut gray = to_gray(&color);
    if settings.equalize_histogram {
        gray = imageproc::contrast::equalize_histogram(&gray);
    }

    let binary = binarize(&gray, settings.threshold);

    PreprocessedFrame {
        color,
        gray,
        binary,
    }
}

/// `saturate(round(contrast * v + brightness))`
#[must_use]
pub fn contrast_brightness_lut(contrast: f64, brightness: f64) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        *entry = saturate_u8(contrast * i as f64 + brightness);
    }
    lut
}

/// `lut[i] = trunc(255 * (i / 255)^(1 / gamma))`
#[must_use]
pub fn gamma_lut(gamma: f64) -> [u8; 256] {
    let inverse_gamma = 1.0 / gamma;
    let mut lut = [0u8; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        let v = (i as f64 / 255.0).powf(inverse_gamma) * 255.0;
        *entry = if v.is_finite() { v.clamp(0.0, 255.0) as u8 } else { 0 };
    }
    lut
}

/// Contrast/brightness followed by gamma, folded into one table
fn combined_lut(contrast: f64, brightness: f64, gamma: f64) -> [u8; 256] {
    let linear = contrast_brightness_lut(contrast, brightness);
    let gamma = gamma_lut(gamma);
    let mut lut = [0u8; 256];
    for (entry, &v) in lut.iter_mut().zip(linear.iter()) {
        *entry = gamma[usize::from(v)];
    }
    lut
}

/// BT.601 luma in the fixed-point form used by common camera stacks
#[must_use]
pub fn to_gray(color: &RgbImage) -> GrayImage {
    GrayImage::from_fn(color.width(), color.height(), |x, y| {
        let [r, g, b] = color.get_pixel(x, y).0;
        let luma = (u32::from(r) * 4899 + u32::from(g) * 9617 + u32::from(b) * 1868 + 8192) >> 14;
        Luma([luma.min(255) as u8])
    })
}

/// Pixels at or below `threshold` become foreground (255)
#[must_use]
pub fn binarize(gray: &GrayImage, threshold: u8) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] <= threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

fn saturate_u8(v: f64) -> u8 {
    if v.is_nan() {
        0
    } else {
        v.round().clamp(0.0, 255.0) as u8
    }
}
