//! Core watermark removal engine.

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, RgbImage};
use tracing::{debug, info, warn};

use crate::blending::{self, CompositeConfig};
use crate::detection::{self, DetectionConfig};
use crate::error::{Error, Result};
use crate::inpaint::{self, Algorithm, InpaintConfig};
use crate::mask::Mask;

/// JPEG quality used when saving results.
const JPEG_QUALITY: u8 = 95;

/// Options controlling watermark processing behavior.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    /// Reconstruction algorithm.
    pub algorithm: Algorithm,
    /// Grow detected masks to cover soft watermark edges.
    pub aggressive: bool,
    /// Automatic detection thresholds.
    pub detection: DetectionConfig,
    /// Inpainting parameters.
    pub inpaint: InpaintConfig,
    /// Post-compositing parameters.
    pub composite: CompositeConfig,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            aggressive: true,
            detection: DetectionConfig::default(),
            inpaint: InpaintConfig::default(),
            composite: CompositeConfig::default(),
        }
    }
}

/// Result of processing a single image file.
#[derive(Debug)]
pub struct ProcessResult {
    /// Path of the processed file.
    pub path: PathBuf,
    /// Path the result was written to, if any.
    pub output: Option<PathBuf>,
    /// Whether processing succeeded.
    pub success: bool,
    /// Whether the file was passed through (nothing to remove).
    pub skipped: bool,
    /// Number of pixels reconstructed.
    pub masked_pixels: usize,
    /// Human-readable status message.
    pub message: String,
}

impl ProcessResult {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            output: None,
            success: false,
            skipped: false,
            masked_pixels: 0,
            message: String::new(),
        }
    }
}

/// The watermark engine: detection, reconstruction and compositing.
///
/// Create once with [`WatermarkEngine::new()`] and reuse for multiple images.
/// The engine holds only configuration; every call works on its own copies.
#[derive(Debug, Clone, Default)]
pub struct WatermarkEngine {
    options: ProcessOptions,
}

impl WatermarkEngine {
    /// Create a new engine with the given options.
    #[must_use]
    pub fn new(options: ProcessOptions) -> Self {
        Self { options }
    }

    /// Options this engine was built with.
    #[must_use]
    pub fn options(&self) -> &ProcessOptions {
        &self.options
    }

    /// Detect the probable watermark region of an image.
    ///
    /// Returns an all-zero mask when nothing is found.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty image.
    pub fn detect(&self, image: &RgbImage, aggressive: bool) -> Result<Mask> {
        check_image(image)?;
        detection::detect_watermark(image, &self.options.detection, aggressive)
    }

    /// Full automatic pipeline: detect, inpaint, composite.
    ///
    /// Returns a copy of the input unchanged if no watermark region is found.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty image and propagates
    /// reconstruction failures.
    pub fn detect_and_remove(
        &self,
        image: &RgbImage,
        algorithm: Algorithm,
        aggressive: bool,
    ) -> Result<RgbImage> {
        let mask = self.detect(image, aggressive)?;
        if mask.is_empty() {
            info!(
                width = image.width(),
                height = image.height(),
                "no watermark region detected, returning original"
            );
            return Ok(image.clone());
        }
        self.reconstruct(image, &mask, algorithm)
    }

    /// Reconstruct the region marked by a caller-supplied mask.
    ///
    /// A mask of a different size is resized (nearest neighbor) once to match
    /// the image. An all-zero mask returns the input byte-identical.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty image or zero-sized mask,
    /// and propagates reconstruction failures.
    pub fn remove_with_mask(
        &self,
        image: &RgbImage,
        mask: &Mask,
        algorithm: Algorithm,
    ) -> Result<RgbImage> {
        check_image(image)?;
        let mask = mask.fit_to(image.width(), image.height())?;
        if mask.is_empty() {
            debug!("empty mask, returning original");
            return Ok(image.clone());
        }
        self.reconstruct(image, &mask, algorithm)
    }

    /// Detect-or-use-mask entry point shared by the file and batch paths.
    pub(crate) fn run(
        &self,
        image: &RgbImage,
        mask: Option<&Mask>,
    ) -> Result<(RgbImage, usize)> {
        let mask = match mask {
            Some(m) => {
                check_image(image)?;
                m.fit_to(image.width(), image.height())?
            }
            None => self.detect(image, self.options.aggressive)?,
        };
        let masked = mask.count();
        if masked == 0 {
            return Ok((image.clone(), 0));
        }
        let out = self.reconstruct(image, &mask, self.options.algorithm)?;
        Ok((out, masked))
    }

    fn reconstruct(&self, image: &RgbImage, mask: &Mask, algorithm: Algorithm) -> Result<RgbImage> {
        let inpainted = inpaint::inpaint(image, mask, algorithm, &self.options.inpaint)?;
        let result = blending::composite(&inpainted, image, &self.options.composite)?;
        if result.dimensions() != image.dimensions() {
            return Err(Error::mismatch(image.dimensions(), result.dimensions()));
        }
        Ok(result)
    }

    /// Process a single image file: load, detect or apply mask, remove, save.
    ///
    /// Returns a [`ProcessResult`] indicating success, pass-through, or failure.
    #[must_use]
    pub fn process_file(&self, input: &Path, output: &Path, mask: Option<&Path>) -> ProcessResult {
        let mut result = ProcessResult::new(input);

        // Load image
        let rgb_img = match image::open(input) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                result.message = format!("Failed to load: {e}");
                return result;
            }
        };

        let mask = match mask.map(Mask::load).transpose() {
            Ok(m) => m,
            Err(e) => {
                result.message = format!("Failed to load mask: {e}");
                return result;
            }
        };

        let (cleaned, masked) = match self.run(&rgb_img, mask.as_ref()) {
            Ok(r) => r,
            Err(e) => {
                result.message = format!("Failed to process: {e}");
                return result;
            }
        };
        result.masked_pixels = masked;
        result.skipped = masked == 0;

        // Save output
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    result.message = format!("Failed to create output directory: {e}");
                    return result;
                }
            }
        }

        match save_image(&cleaned, output) {
            Ok(()) => {
                result.success = true;
                result.output = Some(output.to_path_buf());
                result.message = if result.skipped {
                    "No watermark detected, original kept".to_string()
                } else {
                    format!("Watermark removed ({masked} pixels)")
                };
            }
            Err(e) => {
                result.message = format!("Failed to save: {e}");
            }
        }

        result
    }

    /// Process all supported images in a directory.
    ///
    /// Relative paths are preserved under `output_dir`. When `mask_dir` is
    /// given, a file named `{stem}_mask{ext}` there is used as the manual mask
    /// for the matching image. Uses parallel iteration when the `cli` feature
    /// is enabled (via rayon). Returns a [`ProcessResult`] for each image found.
    #[must_use]
    pub fn process_directory(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        mask_dir: Option<&Path>,
        recursive: bool,
    ) -> Vec<ProcessResult> {
        let mut files = Vec::new();
        if let Err(e) = collect_images(input_dir, recursive, &mut files) {
            let mut failed = ProcessResult::new(input_dir);
            failed.message = format!("Failed to read directory: {e}");
            return vec![failed];
        }
        files.sort();
        info!(count = files.len(), dir = %input_dir.display(), "found images");

        let job = |input_path: &PathBuf| {
            let relative = input_path.strip_prefix(input_dir).unwrap_or(input_path);
            let output_path = output_dir.join(relative);
            let mask_path = mask_dir.and_then(|dir| mask_path_for(dir, input_path));
            let result = self.process_file(input_path, &output_path, mask_path.as_deref());
            if !result.success {
                warn!(path = %input_path.display(), message = %result.message, "failed");
            }
            result
        };

        #[cfg(feature = "cli")]
        {
            use rayon::prelude::*;
            files.par_iter().map(job).collect()
        }

        #[cfg(not(feature = "cli"))]
        {
            files.iter().map(job).collect()
        }
    }
}

fn check_image(image: &RgbImage) -> Result<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(Error::InvalidInput(format!(
            "image has zero size ({}x{})",
            image.width(),
            image.height()
        )));
    }
    Ok(())
}

fn collect_images(dir: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if recursive {
                collect_images(&path, recursive, out)?;
            }
        } else if is_supported_image(&path) {
            out.push(path);
        }
    }
    Ok(())
}

/// Mask file for `image` inside `mask_dir`: `{stem}_mask{ext}`, if it exists.
#[must_use]
pub fn mask_path_for(mask_dir: &Path, image: &Path) -> Option<PathBuf> {
    let stem = image.file_stem()?.to_string_lossy();
    let name = match image.extension() {
        Some(ext) => format!("{stem}_mask.{}", ext.to_string_lossy()),
        None => format!("{stem}_mask"),
    };
    let candidate = mask_dir.join(name);
    candidate.is_file().then_some(candidate)
}

/// Check if a file has a supported image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp" | "tif" | "tiff"
        ),
        None => false,
    }
}

/// Save an RGB image with format-specific quality settings.
///
/// # Errors
///
/// Returns an error if the format is unsupported or writing fails.
pub fn save_image(img: &RgbImage, path: &Path) -> Result<()> {
    let format =
        ImageFormat::from_path(path).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;

    match format {
        ImageFormat::Jpeg => {
            let file = std::fs::File::create(path)?;
            let mut encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(file, JPEG_QUALITY);
            encoder.encode_image(img)?;
        }
        ImageFormat::Png | ImageFormat::WebP | ImageFormat::Bmp | ImageFormat::Tiff => {
            DynamicImage::ImageRgb8(img.clone()).save(path)?;
        }
        _ => {
            return Err(Error::UnsupportedFormat(format!("{format:?}")));
        }
    }

    Ok(())
}

/// Generate a default output path from an input path.
///
/// Example: `"photo.jpg"` becomes `"photo_no_watermark.jpg"`.
#[must_use]
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let ext = input.extension().unwrap_or_default().to_string_lossy();
    let parent = input.parent().unwrap_or(Path::new("."));
    parent.join(format!("{stem}_no_watermark.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn with_square() -> RgbImage {
        let mut img = RgbImage::from_pixel(120, 120, Rgb([90, 100, 110]));
        for y in 10..30 {
            for x in 10..30 {
                img.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }
        img
    }

    #[test]
    fn default_output_path_appends_suffix() {
        let p = default_output_path(Path::new("/tmp/photo.jpg"));
        assert_eq!(p, PathBuf::from("/tmp/photo_no_watermark.jpg"));

        let p = default_output_path(Path::new("image.png"));
        assert_eq!(
            p.file_name().unwrap().to_str().unwrap(),
            "image_no_watermark.png"
        );
    }

    #[test]
    fn is_supported_image_accepts_common_formats() {
        assert!(is_supported_image(Path::new("photo.jpg")));
        assert!(is_supported_image(Path::new("photo.JPEG")));
        assert!(is_supported_image(Path::new("photo.png")));
        assert!(is_supported_image(Path::new("photo.webp")));
        assert!(is_supported_image(Path::new("photo.bmp")));
        assert!(is_supported_image(Path::new("photo.tif")));
    }

    #[test]
    fn is_supported_image_rejects_unsupported_formats() {
        assert!(!is_supported_image(Path::new("photo.gif")));
        assert!(!is_supported_image(Path::new("photo.txt")));
        assert!(!is_supported_image(Path::new("photo")));
    }

    #[test]
    fn default_options_match_observed_behavior() {
        let opts = ProcessOptions::default();
        assert_eq!(opts.algorithm, Algorithm::Blend);
        assert!(opts.aggressive);
    }

    #[test]
    fn empty_image_is_invalid_input() {
        let engine = WatermarkEngine::default();
        let err = engine
            .detect_and_remove(&RgbImage::new(0, 0), Algorithm::FastMarching, false)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn uniform_image_passes_through() {
        let engine = WatermarkEngine::default();
        let img = RgbImage::from_pixel(64, 48, Rgb([33, 66, 99]));
        let out = engine
            .detect_and_remove(&img, Algorithm::Blend, true)
            .unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn run_reports_masked_pixel_count() {
        let engine = WatermarkEngine::default();
        let (out, masked) = engine.run(&with_square(), None).unwrap();
        assert!(masked > 400);
        assert_eq!(out.dimensions(), (120, 120));
    }

    #[test]
    fn run_resizes_manual_mask() {
        let engine = WatermarkEngine::default();
        let mut mask = Mask::new(60, 60);
        for y in 5..15 {
            for x in 5..15 {
                mask.set(x, y, true);
            }
        }
        let (out, masked) = engine.run(&with_square(), Some(&mask)).unwrap();
        // 10x10 scaled by two, give or take a row of nearest-neighbor rounding.
        assert!((360..=440).contains(&masked), "masked = {masked}");
        assert_eq!(out.dimensions(), (120, 120));
    }
}
