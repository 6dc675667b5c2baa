//! Inpainting algorithm selection and dispatch.

use std::fmt;
use std::str::FromStr;

use image::RgbImage;
use tracing::debug;

use crate::diffusion;
use crate::error::{Error, Result};
use crate::fast_marching;
use crate::mask::{Mask, MASKED};

/// Reconstruction algorithm applied to the masked region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    /// Distance-ordered fast marching; quick, suits thin marks.
    FastMarching,
    /// Edge-stopping diffusion; slower, keeps larger structures.
    AnisotropicDiffusion,
    /// Equal-weight average of fast marching and diffusion.
    #[default]
    Blend,
    /// Repeated fast marching with a wider radius, for heavy marks.
    MultiPassEnhanced,
}

impl Algorithm {
    /// Every algorithm, in declaration order.
    pub const ALL: [Algorithm; 4] = [
        Algorithm::FastMarching,
        Algorithm::AnisotropicDiffusion,
        Algorithm::Blend,
        Algorithm::MultiPassEnhanced,
    ];

    /// Short stable name, as accepted by [`FromStr`].
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::FastMarching => "fast-marching",
            Algorithm::AnisotropicDiffusion => "diffusion",
            Algorithm::Blend => "blend",
            Algorithm::MultiPassEnhanced => "enhanced",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    /// Accepts the short names plus the legacy `telea`, `ns`, `mixed` and `ai`.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fast-marching" | "telea" => Ok(Algorithm::FastMarching),
            "diffusion" | "ns" => Ok(Algorithm::AnisotropicDiffusion),
            "blend" | "mixed" => Ok(Algorithm::Blend),
            "enhanced" | "ai" => Ok(Algorithm::MultiPassEnhanced),
            other => Err(Error::InvalidInput(format!("unknown algorithm: {other}"))),
        }
    }
}

/// Tunable parameters for the inpainting algorithms.
#[derive(Debug, Clone)]
pub struct InpaintConfig {
    /// Fast-marching sampling radius in pixels.
    pub radius: u32,
    /// Sampling radius used by [`Algorithm::MultiPassEnhanced`].
    pub multi_pass_radius: u32,
    /// Number of passes for [`Algorithm::MultiPassEnhanced`].
    pub passes: u32,
    /// Relative weight of the previous pass's fill in refinement passes.
    pub prior_weight: f32,
    /// Maximum diffusion sweeps.
    pub diffusion_iterations: u32,
    /// Diffusion conductance (color difference at which flow halves).
    pub conductance: f32,
    /// Diffusion time step, at most 0.25.
    pub time_step: f32,
}

impl Default for InpaintConfig {
    fn default() -> Self {
        Self {
            radius: 3,
            multi_pass_radius: 5,
            passes: 3,
            prior_weight: 0.25,
            diffusion_iterations: 150,
            conductance: 20.0,
            time_step: 0.2,
        }
    }
}

/// Reconstruct the masked pixels of `image`.
///
/// Only pixels where the mask is set may change; every other pixel is
/// returned byte-identical. An empty mask returns a copy of the input.
///
/// # Errors
///
/// Returns [`Error::DimensionMismatch`] if the mask and image sizes differ and
/// [`Error::AlgorithmFailure`] if a pass breaks the output invariants.
pub fn inpaint(
    image: &RgbImage,
    mask: &Mask,
    algorithm: Algorithm,
    config: &InpaintConfig,
) -> Result<RgbImage> {
    if mask.dimensions() != image.dimensions() {
        return Err(Error::mismatch(image.dimensions(), mask.dimensions()));
    }
    if mask.is_empty() {
        return Ok(image.clone());
    }

    debug!(
        %algorithm,
        width = image.width(),
        height = image.height(),
        masked = mask.count(),
        "inpainting"
    );

    let result = match algorithm {
        Algorithm::FastMarching => fast_marching::inpaint(image, mask, config.radius, 0.0),
        Algorithm::AnisotropicDiffusion => diffuse(image, mask, config),
        Algorithm::Blend => {
            let marched = fast_marching::inpaint(image, mask, config.radius, 0.0);
            let diffused = diffuse(image, mask, config);
            average(&marched, &diffused, mask)
        }
        Algorithm::MultiPassEnhanced => multi_pass(image, mask, config),
    };

    verify(image, mask, &result, algorithm)?;
    Ok(result)
}

fn diffuse(image: &RgbImage, mask: &Mask, config: &InpaintConfig) -> RgbImage {
    diffusion::inpaint(
        image,
        mask,
        config.diffusion_iterations,
        config.conductance,
        config.time_step,
    )
}

/// First pass fills from scratch; later passes refine on top of it.
fn multi_pass(image: &RgbImage, mask: &Mask, config: &InpaintConfig) -> RgbImage {
    let mut current = fast_marching::inpaint(image, mask, config.multi_pass_radius, 0.0);
    for pass in 1..config.passes {
        debug!(pass, "refinement pass");
        current = fast_marching::inpaint(
            &current,
            mask,
            config.multi_pass_radius,
            config.prior_weight,
        );
    }
    current
}

/// Rounded pixel-wise mean of two reconstructions over the masked region.
fn average(a: &RgbImage, b: &RgbImage, mask: &Mask) -> RgbImage {
    let mut out = a.clone();
    for ((px, other), &m) in out.pixels_mut().zip(b.pixels()).zip(mask.as_raw()) {
        if m == MASKED {
            for (ch, &o) in px.0.iter_mut().zip(&other.0) {
                #[allow(clippy::cast_possible_truncation)]
                {
                    *ch = ((u16::from(*ch) + u16::from(o) + 1) / 2) as u8;
                }
            }
        }
    }
    out
}

/// Output must match the input size and leave unmasked pixels untouched.
fn verify(image: &RgbImage, mask: &Mask, result: &RgbImage, algorithm: Algorithm) -> Result<()> {
    if result.dimensions() != image.dimensions() {
        return Err(Error::AlgorithmFailure {
            algorithm,
            reason: format!(
                "output is {}x{}, expected {}x{}",
                result.width(),
                result.height(),
                image.width(),
                image.height()
            ),
        });
    }

    let touched = image
        .pixels()
        .zip(result.pixels())
        .zip(mask.as_raw())
        .filter(|((a, b), &m)| m != MASKED && a != b)
        .count();
    if touched > 0 {
        return Err(Error::AlgorithmFailure {
            algorithm,
            reason: format!("{touched} pixels outside the mask were modified"),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn stripe_mask(w: u32, h: u32) -> Mask {
        let mut mask = Mask::new(w, h);
        for y in h / 2 - 1..h / 2 + 2 {
            for x in 5..w - 5 {
                mask.set(x, y, true);
            }
        }
        mask
    }

    fn textured(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            Rgb([(x * 4) as u8, (y * 4) as u8, ((x + y) * 2) as u8])
        })
    }

    #[test]
    fn algorithm_parses_names_and_legacy_aliases() {
        assert_eq!("telea".parse::<Algorithm>().unwrap(), Algorithm::FastMarching);
        assert_eq!("NS".parse::<Algorithm>().unwrap(), Algorithm::AnisotropicDiffusion);
        assert_eq!("mixed".parse::<Algorithm>().unwrap(), Algorithm::Blend);
        assert_eq!("ai".parse::<Algorithm>().unwrap(), Algorithm::MultiPassEnhanced);
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.name().parse::<Algorithm>().unwrap(), algorithm);
        }
        assert!("lama".parse::<Algorithm>().is_err());
    }

    #[test]
    fn default_algorithm_is_blend() {
        assert_eq!(Algorithm::default(), Algorithm::Blend);
    }

    #[test]
    fn rejects_mismatched_mask() {
        let img = RgbImage::new(10, 10);
        let err = inpaint(&img, &Mask::new(9, 10), Algorithm::Blend, &InpaintConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn empty_mask_is_identity() {
        let img = textured(32, 32);
        for algorithm in Algorithm::ALL {
            let out = inpaint(&img, &Mask::new(32, 32), algorithm, &InpaintConfig::default())
                .unwrap();
            assert_eq!(out, img);
        }
    }

    #[test]
    fn every_algorithm_preserves_unmasked_pixels() {
        let img = textured(40, 30);
        let mask = stripe_mask(40, 30);
        for algorithm in Algorithm::ALL {
            let out = inpaint(&img, &mask, algorithm, &InpaintConfig::default()).unwrap();
            assert_eq!(out.dimensions(), img.dimensions());
            for (x, y, px) in out.enumerate_pixels() {
                if !mask.is_masked(x, y) {
                    assert_eq!(px, img.get_pixel(x, y), "{algorithm} changed ({x},{y})");
                }
            }
        }
    }

    #[test]
    fn every_algorithm_handles_full_mask() {
        let img = textured(12, 12);
        for algorithm in Algorithm::ALL {
            let out = inpaint(&img, &Mask::full(12, 12), algorithm, &InpaintConfig::default())
                .unwrap();
            assert_eq!(out.dimensions(), (12, 12));
        }
    }

    #[test]
    fn average_rounds_half_up() {
        let a = RgbImage::from_pixel(1, 1, Rgb([10, 0, 255]));
        let b = RgbImage::from_pixel(1, 1, Rgb([11, 1, 254]));
        let out = average(&a, &b, &Mask::full(1, 1));
        assert_eq!(out.get_pixel(0, 0), &Rgb([11, 1, 255]));
    }

    #[test]
    fn verify_flags_changes_outside_mask() {
        let img = RgbImage::new(4, 4);
        let mut changed = img.clone();
        changed.put_pixel(0, 0, Rgb([1, 1, 1]));
        let err = verify(&img, &Mask::new(4, 4), &changed, Algorithm::FastMarching).unwrap_err();
        assert!(matches!(err, Error::AlgorithmFailure { .. }));
    }

    #[test]
    fn reconstruction_is_deterministic() {
        let img = textured(36, 36);
        let mask = stripe_mask(36, 36);
        for algorithm in Algorithm::ALL {
            let a = inpaint(&img, &mask, algorithm, &InpaintConfig::default()).unwrap();
            let b = inpaint(&img, &mask, algorithm, &InpaintConfig::default()).unwrap();
            assert_eq!(a, b);
        }
    }
}
