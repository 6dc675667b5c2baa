//! Binary reconstruction masks.
//!
//! A [`Mask`] marks the pixels to reconstruct with 255 and the pixels to keep
//! with 0. Any other value is normalized at construction time: values at or
//! above [`MASK_THRESHOLD`] become 255, everything else becomes 0.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use tracing::warn;

use crate::error::{Error, Result};

/// Gray level at or above which a loaded mask pixel counts as masked.
pub const MASK_THRESHOLD: u8 = 128;

/// Value stored for masked pixels.
pub const MASKED: u8 = 255;

/// Value stored for pixels that keep their original color.
pub const UNMASKED: u8 = 0;

/// Axis-aligned bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    /// Left edge (inclusive).
    pub x: u32,
    /// Top edge (inclusive).
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl BoundingBox {
    /// Number of pixels covered by the box.
    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Intersection over union with another box, in `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let intersection = if x2 > x1 && y2 > y1 {
            u64::from(x2 - x1) * u64::from(y2 - y1)
        } else {
            0
        };
        let union = self.area() + other.area() - intersection;
        if union == 0 {
            return 0.0;
        }
        intersection as f32 / union as f32
    }
}

/// Single-channel binary mask, 255 = reconstruct, 0 = keep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    buffer: GrayImage,
}

impl Mask {
    /// Create an all-zero mask ("nothing to reconstruct").
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            buffer: GrayImage::new(width, height),
        }
    }

    /// Create a mask with every pixel marked for reconstruction.
    #[must_use]
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            buffer: GrayImage::from_pixel(width, height, Luma([MASKED])),
        }
    }

    /// Build a mask from a grayscale image, binarizing at [`MASK_THRESHOLD`].
    #[must_use]
    pub fn from_gray(gray: &GrayImage) -> Self {
        let mut buffer = gray.clone();
        binarize(&mut buffer);
        Self { buffer }
    }

    /// Build a mask from a raw row-major byte buffer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `data.len() != width * height`.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let len = data.len();
        let mut buffer = GrayImage::from_raw(width, height, data).ok_or_else(|| {
            Error::InvalidInput(format!(
                "mask buffer of {len} bytes does not match {width}x{height}"
            ))
        })?;
        binarize(&mut buffer);
        Ok(Self { buffer })
    }

    /// Load a mask from an image file where light pixels mark the region.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Image`] if the file cannot be opened or decoded.
    pub fn load(path: &Path) -> Result<Self> {
        let gray = image::open(path)?.to_luma8();
        Ok(Self::from_gray(&gray))
    }

    /// Mask width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    /// Mask height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    /// `(width, height)` of the mask.
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// Whether the pixel at `(x, y)` is marked for reconstruction.
    ///
    /// Out-of-bounds coordinates are reported as unmasked.
    #[must_use]
    pub fn is_masked(&self, x: u32, y: u32) -> bool {
        x < self.width() && y < self.height() && self.buffer.get_pixel(x, y)[0] == MASKED
    }

    /// Mark or unmark a single pixel. Out-of-bounds coordinates are ignored.
    pub fn set(&mut self, x: u32, y: u32, masked: bool) {
        if x < self.width() && y < self.height() {
            self.buffer
                .put_pixel(x, y, Luma([if masked { MASKED } else { UNMASKED }]));
        }
    }

    /// Number of masked pixels.
    #[must_use]
    pub fn count(&self) -> usize {
        self.buffer.as_raw().iter().filter(|&&v| v == MASKED).count()
    }

    /// Whether no pixel is masked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.as_raw().iter().all(|&v| v == UNMASKED)
    }

    /// Smallest box containing every masked pixel, or `None` for an empty mask.
    #[must_use]
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0;
        let mut max_y = 0;
        let mut found = false;

        for (x, y, px) in self.buffer.enumerate_pixels() {
            if px[0] == MASKED {
                found = true;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }

        found.then(|| BoundingBox {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        })
    }

    /// Nearest-neighbor resize to the given dimensions.
    #[must_use]
    pub fn resized(&self, width: u32, height: u32) -> Self {
        let mut buffer = imageops::resize(&self.buffer, width, height, FilterType::Nearest);
        binarize(&mut buffer);
        Self { buffer }
    }

    /// Return a mask matching `width x height`, resizing once if needed.
    ///
    /// This is the single permitted correction for mismatched masks; the
    /// result is re-checked and rejected if it still does not match.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a zero-sized mask and
    /// [`Error::DimensionMismatch`] if the resized mask still differs.
    pub fn fit_to(&self, width: u32, height: u32) -> Result<Self> {
        if self.dimensions() == (width, height) {
            return Ok(self.clone());
        }
        if self.width() == 0 || self.height() == 0 {
            return Err(Error::InvalidInput("mask has zero size".to_string()));
        }

        warn!(
            mask_width = self.width(),
            mask_height = self.height(),
            width,
            height,
            "resizing mask to match image"
        );
        let resized = self.resized(width, height);
        if resized.dimensions() != (width, height) {
            return Err(Error::mismatch((width, height), resized.dimensions()));
        }
        Ok(resized)
    }

    /// Borrow the underlying grayscale buffer.
    #[must_use]
    pub fn as_gray(&self) -> &GrayImage {
        &self.buffer
    }

    /// Consume the mask and return the underlying grayscale buffer.
    #[must_use]
    pub fn into_gray(self) -> GrayImage {
        self.buffer
    }

    pub(crate) fn as_raw(&self) -> &[u8] {
        self.buffer.as_raw()
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut GrayImage {
        &mut self.buffer
    }
}

fn binarize(buffer: &mut GrayImage) {
    for px in buffer.pixels_mut() {
        px[0] = if px[0] >= MASK_THRESHOLD { MASKED } else { UNMASKED };
    }
}
