//! Post-compositing of reconstructed images.
//!
//! Inpainting can shift brightness and soften detail. Two corrections run on
//! the whole reconstructed image:
//!
//! 1. `blended = (1 - w) * reconstructed + w * sharpen(reconstructed)`
//! 2. per channel, `out = (blended - mean_b) * (std_o / std_b) + mean_o`
//!
//! where `o` is the original image. The affine match in step 2 suppresses
//! tonal seams without an explicit blur along the mask boundary.

use image::RgbImage;
use tracing::debug;

use crate::error::{Error, Result};

/// 3x3 sharpening kernel (sums to 1).
const SHARPEN_KERNEL: [[f32; 3]; 3] = [[-1.0, -1.0, -1.0], [-1.0, 9.0, -1.0], [-1.0, -1.0, -1.0]];

/// Tunable post-compositing parameters.
#[derive(Debug, Clone)]
pub struct CompositeConfig {
    /// Share of the sharpened image in the blend, in `[0, 1]`.
    pub sharpen_weight: f32,
    /// Match per-channel mean and standard deviation to the original.
    pub match_color: bool,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            sharpen_weight: 0.15,
            match_color: true,
        }
    }
}

/// Per-channel statistics of an RGB image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStats {
    /// Mean of each channel.
    pub mean: [f32; 3],
    /// Population standard deviation of each channel.
    pub std: [f32; 3],
}

impl ChannelStats {
    /// Compute statistics from a flat per-pixel channel buffer.
    fn from_values(values: &[[f32; 3]]) -> Self {
        let mut mean = [0.0_f64; 3];
        let mut sq = [0.0_f64; 3];
        for px in values {
            for c in 0..3 {
                let v = f64::from(px[c]);
                mean[c] += v;
                sq[c] += v * v;
            }
        }
        #[allow(clippy::cast_precision_loss)]
        let n = values.len().max(1) as f64;
        let mut stats = Self {
            mean: [0.0; 3],
            std: [0.0; 3],
        };
        for c in 0..3 {
            let m = mean[c] / n;
            let var = (sq[c] / n - m * m).max(0.0);
            #[allow(clippy::cast_possible_truncation)]
            {
                stats.mean[c] = m as f32;
                stats.std[c] = var.sqrt() as f32;
            }
        }
        stats
    }

    /// Compute statistics of an 8-bit RGB image.
    #[must_use]
    pub fn of(image: &RgbImage) -> Self {
        Self::from_values(&to_values(image))
    }
}

fn to_values(image: &RgbImage) -> Vec<[f32; 3]> {
    image
        .pixels()
        .map(|p| [f32::from(p[0]), f32::from(p[1]), f32::from(p[2])])
        .collect()
}

/// Convolve with [`SHARPEN_KERNEL`] using clamp-to-edge borders.
fn sharpen(values: &[[f32; 3]], width: usize, height: usize) -> Vec<[f32; 3]> {
    let mut out = vec![[0.0_f32; 3]; values.len()];
    for y in 0..height {
        for x in 0..width {
            let mut acc = [0.0_f32; 3];
            for (ky, row) in SHARPEN_KERNEL.iter().enumerate() {
                let sy = (y + ky).saturating_sub(1).min(height - 1);
                for (kx, &k) in row.iter().enumerate() {
                    let sx = (x + kx).saturating_sub(1).min(width - 1);
                    let src = values[sy * width + sx];
                    for (a, v) in acc.iter_mut().zip(src) {
                        *a += k * v;
                    }
                }
            }
            out[y * width + x] = acc;
        }
    }
    out
}

/// Sharpen, blend and color-match a reconstruction against the original.
///
/// # Errors
///
/// Returns [`Error::DimensionMismatch`] if the two images differ in size.
pub fn composite(
    reconstructed: &RgbImage,
    original: &RgbImage,
    config: &CompositeConfig,
) -> Result<RgbImage> {
    if reconstructed.dimensions() != original.dimensions() {
        return Err(Error::mismatch(
            original.dimensions(),
            reconstructed.dimensions(),
        ));
    }
    let (w, h) = (reconstructed.width() as usize, reconstructed.height() as usize);
    if w == 0 || h == 0 {
        return Ok(reconstructed.clone());
    }

    let base = to_values(reconstructed);
    let weight = config.sharpen_weight.clamp(0.0, 1.0);
    let mut blended = base.clone();
    if weight > 0.0 {
        let sharp = sharpen(&base, w, h);
        for (b, s) in blended.iter_mut().zip(&sharp) {
            for (bv, sv) in b.iter_mut().zip(s) {
                // Round-trip through u8 as an 8-bit pipeline would.
                let sv = sv.clamp(0.0, 255.0);
                *bv = ((1.0 - weight) * *bv + weight * sv).round().clamp(0.0, 255.0);
            }
        }
    }

    if config.match_color {
        let source = ChannelStats::from_values(&blended);
        let target = ChannelStats::of(original);
        debug!(?source, ?target, "matching channel statistics");
        for px in &mut blended {
            for c in 0..3 {
                if source.std[c] > 0.0 {
                    px[c] = (px[c] - source.mean[c]) * (target.std[c] / source.std[c])
                        + target.mean[c];
                }
            }
        }
    }

    let mut out = RgbImage::new(reconstructed.width(), reconstructed.height());
    for (px, v) in out.pixels_mut().zip(&blended) {
        for (ch, &value) in px.0.iter_mut().zip(v) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                *ch = value.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    Ok(out)
}
