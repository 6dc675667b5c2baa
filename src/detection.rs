//! Automatic watermark region detection.
//!
//! Fuses the five [signal maps](crate::signals) into a single binary mask:
//! 1. **Union**: bitwise OR of every signal
//! 2. **Location prior**: corner quadrants and the central third are boosted
//! 3. **Threshold**: weighted map cut at a fixed level
//! 4. **Morphology**: closing joins fragments, opening drops speckle
//! 5. **Pruning**: connected components below a minimum area are removed
//! 6. **Aggressive dilation** (optional): grow the mask over soft edges

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{close, dilate, open};
use imageproc::region_labelling::{connected_components, Connectivity};
use tracing::debug;

use crate::error::{Error, Result};
use crate::mask::{Mask, MASKED, UNMASKED};
use crate::signals::{self, SignalMaps};

/// Tunable thresholds for automatic detection.
///
/// The defaults are empirical and may need re-tuning for a given image domain.
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Canny low hysteresis threshold.
    pub canny_low: f32,
    /// Canny high hysteresis threshold.
    pub canny_high: f32,
    /// Square dilation radius applied to the edge map.
    pub edge_dilation: u8,
    /// Absolute Laplacian level above which a pixel is high frequency.
    pub laplacian_threshold: u8,
    /// Gaussian sigma of the blur used by the variance signal.
    pub variance_sigma: f32,
    /// Blur difference above which a pixel is flagged.
    pub variance_threshold: u8,
    /// Standard deviations from the mean that make a pixel an outlier.
    pub outlier_sigmas: f32,
    /// Harris detector sensitivity `k`.
    pub harris_k: f32,
    /// Fraction of the maximum corner response kept as a corner.
    pub corner_threshold: f32,
    /// Location weight outside the favored zones.
    pub base_weight: f32,
    /// Location weight in each corner quadrant.
    pub corner_weight: f32,
    /// Location weight in the central third.
    pub center_weight: f32,
    /// Cutoff applied to the weighted map.
    pub binary_threshold: u8,
    /// Disc radius of the closing step.
    pub close_radius: u8,
    /// Disc radius of the opening step.
    pub open_radius: u8,
    /// Components smaller than this fraction of the image area are dropped.
    pub min_region_fraction: f32,
    /// Disc radius of the extra dilation in aggressive mode.
    pub aggressive_radius: u8,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            canny_low: 30.0,
            canny_high: 100.0,
            edge_dilation: 1,
            laplacian_threshold: 20,
            variance_sigma: 1.1,
            variance_threshold: 15,
            outlier_sigmas: 1.5,
            harris_k: 0.04,
            corner_threshold: 0.01,
            base_weight: 1.0,
            corner_weight: 1.5,
            center_weight: 1.2,
            binary_threshold: 50,
            close_radius: 4,
            open_radius: 2,
            min_region_fraction: 0.0001,
            aggressive_radius: 6,
        }
    }
}

/// Bitwise OR of every signal map.
///
/// # Errors
///
/// Returns [`Error::DimensionMismatch`] if any map differs in size from the first.
pub fn combine(maps: &SignalMaps) -> Result<GrayImage> {
    let all = maps.all();
    let dims = all[0].dimensions();
    let mut combined = GrayImage::new(dims.0, dims.1);

    for map in all {
        if map.dimensions() != dims {
            return Err(Error::mismatch(dims, map.dimensions()));
        }
        for (dst, src) in combined.pixels_mut().zip(map.pixels()) {
            dst[0] |= src[0];
        }
    }
    Ok(combined)
}

/// Positional prior: watermarks cluster in corners and the center.
///
/// Each corner zone spans a quarter of the width and height. The center zone
/// spans the middle third; where it overlaps a corner zone the corner wins.
#[must_use]
pub fn location_weights(width: u32, height: u32, config: &DetectionConfig) -> Vec<f32> {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = (w / 4, h / 4);
    let mut weights = vec![config.base_weight; w * h];

    for y in h / 3..2 * h / 3 {
        for x in w / 3..2 * w / 3 {
            weights[y * w + x] = config.center_weight;
        }
    }

    let in_band = |v: usize, size: usize, band: usize| v < band || v >= size - band;
    for y in 0..h {
        if !in_band(y, h, ch) {
            continue;
        }
        for x in 0..w {
            if in_band(x, w, cw) {
                weights[y * w + x] = config.corner_weight;
            }
        }
    }
    weights
}

/// Apply location weights to the combined map and threshold it.
fn weighted_threshold(combined: &GrayImage, weights: &[f32], cutoff: u8) -> GrayImage {
    let mut out = GrayImage::new(combined.width(), combined.height());
    for ((src, &weight), dst) in combined.pixels().zip(weights).zip(out.pixels_mut()) {
        let value = (f32::from(src[0]) * weight).clamp(0.0, 255.0);
        if value > f32::from(cutoff) {
            dst[0] = MASKED;
        }
    }
    out
}

/// Remove 8-connected components smaller than `min_area` pixels.
fn prune_small_regions(mask: &mut GrayImage, min_area: usize) {
    if min_area <= 1 {
        return;
    }
    let labels = connected_components(mask, Connectivity::Eight, Luma([UNMASKED]));
    let max_label = labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;
    if max_label == 0 {
        return;
    }

    let mut sizes = vec![0_usize; max_label + 1];
    for p in labels.pixels() {
        sizes[p[0] as usize] += 1;
    }

    let mut removed = 0_usize;
    for (label, dst) in labels.pixels().zip(mask.pixels_mut()) {
        let id = label[0] as usize;
        if id != 0 && sizes[id] < min_area {
            dst[0] = UNMASKED;
            removed += 1;
        }
    }
    debug!(components = max_label, removed, min_area, "pruned small regions");
}

/// Turn five signal maps into a binary watermark mask.
///
/// Returns an empty mask, not an error, when nothing survives pruning.
///
/// # Errors
///
/// Returns [`Error::DimensionMismatch`] if the maps do not share one size.
pub fn synthesize(maps: &SignalMaps, config: &DetectionConfig, aggressive: bool) -> Result<Mask> {
    let combined = combine(maps)?;
    let (width, height) = combined.dimensions();
    if width == 0 || height == 0 {
        return Ok(Mask::new(width, height));
    }

    let weights = location_weights(width, height, config);
    let mut mask = weighted_threshold(&combined, &weights, config.binary_threshold);

    if config.close_radius > 0 {
        mask = close(&mask, Norm::L2, config.close_radius);
    }
    if config.open_radius > 0 {
        mask = open(&mask, Norm::L2, config.open_radius);
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let min_area = ((width as f32) * (height as f32) * config.min_region_fraction).ceil() as usize;
    prune_small_regions(&mut mask, min_area);

    let mut result = Mask::from_gray(&mask);
    if result.is_empty() {
        debug!(width, height, "no candidate region survived cleanup");
        return Ok(result);
    }

    if aggressive && config.aggressive_radius > 0 {
        let grown = dilate(result.as_gray(), Norm::L2, config.aggressive_radius);
        result = Mask::from_gray(&grown);
    }

    debug!(
        width,
        height,
        masked = result.count(),
        aggressive,
        "synthesized watermark mask"
    );
    Ok(result)
}

/// Extract signals from an RGB image and synthesize its watermark mask.
///
/// # Errors
///
/// Propagates errors from [`synthesize`].
pub fn detect_watermark(
    image: &image::RgbImage,
    config: &DetectionConfig,
    aggressive: bool,
) -> Result<Mask> {
    let gray = signals::to_grayscale(image);
    let maps = signals::extract_all(&gray, config);
    synthesize(&maps, config, aggressive)
}
