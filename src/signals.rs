//! Per-pixel watermark signals.
//!
//! Five independent analyses of a grayscale image, each producing a binary
//! map (0 or 255) of the same size:
//! 1. **Edges**: Canny edges dilated to close gaps between strokes
//! 2. **High frequency**: absolute Laplacian above a threshold
//! 3. **Local variance**: difference from a Gaussian-blurred copy
//! 4. **Outliers**: intensities far from the global mean
//! 5. **Corners**: Harris corner response relative to its maximum
//!
//! None of the extractors mutate their input.

use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::{gaussian_blur_f32, laplacian_filter};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use imageproc::morphology::dilate;

use crate::detection::DetectionConfig;

const ON: u8 = 255;

/// The five signal maps extracted from one image.
#[derive(Debug, Clone)]
pub struct SignalMaps {
    /// Dilated edge response.
    pub edges: GrayImage,
    /// Thresholded Laplacian response.
    pub high_frequency: GrayImage,
    /// Thresholded blur-difference response.
    pub local_variance: GrayImage,
    /// Global statistical outliers.
    pub outliers: GrayImage,
    /// Thresholded corner response.
    pub corners: GrayImage,
}

impl SignalMaps {
    /// All five maps, in extraction order.
    #[must_use]
    pub fn all(&self) -> [&GrayImage; 5] {
        [
            &self.edges,
            &self.high_frequency,
            &self.local_variance,
            &self.outliers,
            &self.corners,
        ]
    }
}

/// Convert an RGB image to 8-bit grayscale.
///
/// Uses luminance formula: `0.299*R + 0.587*G + 0.114*B`.
#[must_use]
pub fn to_grayscale(image: &RgbImage) -> GrayImage {
    let mut gray = GrayImage::new(image.width(), image.height());
    for (src, dst) in image.pixels().zip(gray.pixels_mut()) {
        let lum = 0.299 * f32::from(src[0]) + 0.587 * f32::from(src[1]) + 0.114 * f32::from(src[2]);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            dst[0] = lum.round().clamp(0.0, 255.0) as u8;
        }
    }
    gray
}

/// Run every extractor with the thresholds from `config`.
#[must_use]
pub fn extract_all(gray: &GrayImage, config: &DetectionConfig) -> SignalMaps {
    SignalMaps {
        edges: edge_response(
            gray,
            config.canny_low,
            config.canny_high,
            config.edge_dilation,
        ),
        high_frequency: high_frequency_response(gray, config.laplacian_threshold),
        local_variance: local_variance_response(
            gray,
            config.variance_sigma,
            config.variance_threshold,
        ),
        outliers: outlier_response(gray, config.outlier_sigmas),
        corners: corner_response(gray, config.harris_k, config.corner_threshold),
    }
}

/// Canny edges, dilated by a square structuring element of the given radius.
#[must_use]
pub fn edge_response(gray: &GrayImage, low: f32, high: f32, dilation: u8) -> GrayImage {
    let edges = canny(gray, low, high);
    if dilation == 0 {
        edges
    } else {
        dilate(&edges, Norm::LInf, dilation)
    }
}

/// Pixels whose absolute Laplacian exceeds `threshold`.
#[must_use]
pub fn high_frequency_response(gray: &GrayImage, threshold: u8) -> GrayImage {
    let laplacian = laplacian_filter(gray);
    let mut out = GrayImage::new(gray.width(), gray.height());
    for (src, dst) in laplacian.pixels().zip(out.pixels_mut()) {
        let magnitude = src[0].unsigned_abs().min(255);
        if magnitude > u16::from(threshold) {
            dst[0] = ON;
        }
    }
    out
}

/// Pixels that differ from a Gaussian-blurred copy by more than `threshold`.
///
/// Catches semi-transparent overlays whose edges are too soft for Canny.
#[must_use]
pub fn local_variance_response(gray: &GrayImage, sigma: f32, threshold: u8) -> GrayImage {
    let mut out = GrayImage::new(gray.width(), gray.height());
    if sigma <= 0.0 {
        return out;
    }
    let blurred = gaussian_blur_f32(gray, sigma);
    for ((src, blur), dst) in gray.pixels().zip(blurred.pixels()).zip(out.pixels_mut()) {
        if src[0].abs_diff(blur[0]) > threshold {
            dst[0] = ON;
        }
    }
    out
}

/// Pixels more than `sigmas` standard deviations from the global mean.
#[must_use]
pub fn outlier_response(gray: &GrayImage, sigmas: f32) -> GrayImage {
    let mut out = GrayImage::new(gray.width(), gray.height());
    let (mean, std) = mean_stddev(gray.as_raw());
    let lower = mean - f64::from(sigmas) * std;
    let upper = mean + f64::from(sigmas) * std;

    for (src, dst) in gray.pixels().zip(out.pixels_mut()) {
        let v = f64::from(src[0]);
        if v < lower || v > upper {
            dst[0] = ON;
        }
    }
    out
}

/// Harris corner response, dilated, kept where it exceeds `relative` times its maximum.
#[must_use]
pub fn corner_response(gray: &GrayImage, k: f32, relative: f32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let mut out = GrayImage::new(w, h);
    if w == 0 || h == 0 {
        return out;
    }

    let response = max_filter3(&harris(gray, k), w as usize, h as usize);
    let max = response.iter().copied().fold(f32::MIN, f32::max);
    if max <= 0.0 {
        return out;
    }

    let cutoff = relative * max;
    for (r, dst) in response.iter().zip(out.pixels_mut()) {
        if *r > cutoff {
            *dst = Luma([ON]);
        }
    }
    out
}

/// Raw Harris response `det(M) - k * trace(M)^2` over a 3x3 window.
fn harris(gray: &GrayImage, k: f32) -> Vec<f32> {
    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);
    let w = gray.width() as usize;
    let h = gray.height() as usize;

    let mut xx = Vec::with_capacity(w * h);
    let mut yy = Vec::with_capacity(w * h);
    let mut xy = Vec::with_capacity(w * h);
    for (a, b) in gx.pixels().zip(gy.pixels()) {
        let dx = f32::from(a[0]);
        let dy = f32::from(b[0]);
        xx.push(dx * dx);
        yy.push(dy * dy);
        xy.push(dx * dy);
    }

    let sxx = box_sum3(&xx, w, h);
    let syy = box_sum3(&yy, w, h);
    let sxy = box_sum3(&xy, w, h);

    sxx.iter()
        .zip(&syy)
        .zip(&sxy)
        .map(|((&a, &b), &c)| {
            let det = a * b - c * c;
            let trace = a + b;
            det - k * trace * trace
        })
        .collect()
}

/// 3x3 neighborhood sum with clamp-to-edge borders.
fn box_sum3(data: &[f32], width: usize, height: usize) -> Vec<f32> {
    neighborhood3(data, width, height, 0.0, |acc, v| acc + v)
}

/// 3x3 neighborhood maximum with clamp-to-edge borders.
fn max_filter3(data: &[f32], width: usize, height: usize) -> Vec<f32> {
    neighborhood3(data, width, height, f32::MIN, f32::max)
}

fn neighborhood3(
    data: &[f32],
    width: usize,
    height: usize,
    init: f32,
    fold: impl Fn(f32, f32) -> f32,
) -> Vec<f32> {
    let mut result = vec![0.0_f32; width * height];
    for y in 0..height {
        for x in 0..width {
            let mut acc = init;
            for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
                for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                    acc = fold(acc, data[ny * width + nx]);
                }
            }
            result[y * width + x] = acc;
        }
    }
    result
}

/// Mean and population standard deviation of 8-bit samples.
pub(crate) fn mean_stddev(data: &[u8]) -> (f64, f64) {
    if data.is_empty() {
        return (0.0, 0.0);
    }
    #[allow(clippy::cast_precision_loss)]
    let n = data.len() as f64;
    let mean = data.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let variance = data
        .iter()
        .map(|&v| (f64::from(v) - mean).powi(2))
        .sum::<f64>()
        / n;
    (mean, variance.sqrt())
}
