//! Detect watermark regions automatically and reconstruct them by inpainting.
//!
//! The pipeline locates a probable overlay without a human-supplied mask,
//! fills the region from its surroundings and blends the result back so no
//! tonal seam is left:
//!
//! 1. **Signals**: edges, Laplacian, blur difference, outliers, corners
//! 2. **Detection**: signal fusion, location prior, morphology, pruning
//! 3. **Inpainting**: fast marching, anisotropic diffusion, or both
//! 4. **Compositing**: light sharpening and per-channel color matching
//!
//! # Quick Start
//!
//! ```no_run
//! use watermark_inpaint::{Algorithm, WatermarkEngine};
//!
//! let engine = WatermarkEngine::default();
//! let img = image::open("photo.jpg").unwrap().to_rgb8();
//! let cleaned = engine.detect_and_remove(&img, Algorithm::Blend, true).unwrap();
//! cleaned.save("cleaned.jpg").unwrap();
//! ```
//!
//! # Manual masks
//!
//! A mask painted with the [`MaskEditor`] or loaded from disk skips detection.
//! White pixels (value 128 or above) mark the region to reconstruct.
//!
//! ```no_run
//! use watermark_inpaint::{Algorithm, Mask, WatermarkEngine};
//!
//! let engine = WatermarkEngine::default();
//! let img = image::open("photo.jpg").unwrap().to_rgb8();
//! let mask = Mask::load("photo_mask.png".as_ref()).unwrap();
//! let cleaned = engine.remove_with_mask(&img, &mask, Algorithm::FastMarching).unwrap();
//! ```
//!
//! # Batches
//!
//! ```no_run
//! use std::path::PathBuf;
//! use watermark_inpaint::{BatchCoordinator, WatermarkEngine};
//!
//! let mut batch = BatchCoordinator::new(WatermarkEngine::default());
//! batch.enqueue(PathBuf::from("a.png"));
//! batch.enqueue(PathBuf::from("b.png"));
//! let report = batch.process_all();
//! println!("done: {}, failed: {}", report.done_count(), report.failed_count());
//! ```

#![deny(missing_docs)]

pub mod batch;
pub mod blending;
pub mod detection;
mod diffusion;
pub mod editor;
mod engine;
pub mod error;
mod fast_marching;
pub mod inpaint;
#[cfg(feature = "cli")]
pub mod logger;
pub mod mask;
pub mod signals;

pub use batch::{BatchCoordinator, BatchReport, BatchSource, BatchStatus};
pub use blending::CompositeConfig;
pub use detection::DetectionConfig;
pub use editor::{BrushStroke, EditorState, MaskEditor, PointerButton, Polarity};
pub use engine::{
    default_output_path, is_supported_image, mask_path_for, save_image, ProcessOptions,
    ProcessResult, WatermarkEngine,
};
pub use error::{Error, Result};
pub use inpaint::{Algorithm, InpaintConfig};
pub use mask::{BoundingBox, Mask};
