//! Error types for the watermark-inpaint crate.

use crate::inpaint::Algorithm;

/// Errors that can occur during watermark detection and reconstruction.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller-supplied image or mask data is unusable (undecodable, empty).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Two buffers that must share dimensions do not.
    #[error("dimension mismatch: expected {expected_width}x{expected_height}, got {width}x{height}")]
    DimensionMismatch {
        /// Width the stage expected.
        expected_width: u32,
        /// Height the stage expected.
        expected_height: u32,
        /// Width actually received.
        width: u32,
        /// Height actually received.
        height: u32,
    },

    /// An inpainting pass failed or produced an invalid result.
    #[error("{algorithm} inpainting failed: {reason}")]
    AlgorithmFailure {
        /// The algorithm that failed.
        algorithm: Algorithm,
        /// What went wrong.
        reason: String,
    },

    /// A batch index does not refer to an enqueued item.
    #[error("no batch item at index {0}")]
    InvalidBatchIndex(usize),

    /// A batch item was processed and failed.
    #[error("batch item {index} failed: {reason}")]
    ItemFailed {
        /// Index of the failed item.
        index: usize,
        /// The item's error message.
        reason: String,
    },

    /// A batch item has not been processed yet.
    #[error("batch item {0} has not been processed")]
    NotProcessed(usize),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The image format is not supported.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// An error occurred during image processing (load, save, encode).
    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// Build a [`Error::DimensionMismatch`] from two `(width, height)` pairs.
    #[must_use]
    pub fn mismatch(expected: (u32, u32), actual: (u32, u32)) -> Self {
        Self::DimensionMismatch {
            expected_width: expected.0,
            expected_height: expected.1,
            width: actual.0,
            height: actual.1,
        }
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
