//! Batch processing with per-item failure isolation.
//!
//! Items move `Pending -> Processing -> Done | Failed`. A failing item never
//! aborts the batch; its error is kept on the item and reported with the rest.

use std::path::{Path, PathBuf};

use image::RgbImage;
use tracing::{info, warn};

use crate::engine::{save_image, WatermarkEngine};
use crate::error::{Error, Result};
use crate::mask::Mask;

/// Where a batch item's image comes from.
#[derive(Debug, Clone)]
pub enum BatchSource {
    /// Decoded lazily when the item is processed.
    Path(PathBuf),
    /// Already in memory.
    Image(RgbImage),
}

impl From<PathBuf> for BatchSource {
    fn from(path: PathBuf) -> Self {
        BatchSource::Path(path)
    }
}

impl From<&Path> for BatchSource {
    fn from(path: &Path) -> Self {
        BatchSource::Path(path.to_path_buf())
    }
}

impl From<RgbImage> for BatchSource {
    fn from(image: RgbImage) -> Self {
        BatchSource::Image(image)
    }
}

/// Processing state of a batch item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// Enqueued, not yet processed.
    Pending,
    /// Currently being processed.
    Processing,
    /// Finished with a result image.
    Done,
    /// Finished with an error.
    Failed,
}

/// One image in the batch.
#[derive(Debug)]
pub struct BatchItem {
    label: String,
    source: BatchSource,
    mask: Option<Mask>,
    status: BatchStatus,
    outcome: Option<Result<RgbImage>>,
    masked_pixels: usize,
}

impl BatchItem {
    fn new(index: usize, source: BatchSource, mask: Option<Mask>) -> Self {
        let label = match &source {
            BatchSource::Path(p) => p.display().to_string(),
            BatchSource::Image(_) => format!("image #{}", index + 1),
        };
        Self {
            label,
            source,
            mask,
            status: BatchStatus::Pending,
            outcome: None,
            masked_pixels: 0,
        }
    }

    /// Path of the source file, or a positional label for in-memory images.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current state.
    #[must_use]
    pub fn status(&self) -> BatchStatus {
        self.status
    }

    /// Result image, once done.
    #[must_use]
    pub fn image(&self) -> Option<&RgbImage> {
        self.outcome.as_ref().and_then(|r| r.as_ref().ok())
    }

    /// Error, once failed.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        self.outcome.as_ref().and_then(|r| r.as_ref().err())
    }

    /// Pixels reconstructed for this item (0 if passed through).
    #[must_use]
    pub fn masked_pixels(&self) -> usize {
        self.masked_pixels
    }

    fn process(&mut self, engine: &WatermarkEngine) {
        self.status = BatchStatus::Processing;
        let outcome = self.load().and_then(|img| engine.run(&img, self.mask.as_ref()));
        match outcome {
            Ok((image, masked)) => {
                self.masked_pixels = masked;
                self.status = BatchStatus::Done;
                self.outcome = Some(Ok(image));
            }
            Err(e) => {
                warn!(item = %self.label, error = %e, "batch item failed");
                self.status = BatchStatus::Failed;
                self.outcome = Some(Err(e));
            }
        }
    }

    fn load(&self) -> Result<RgbImage> {
        match &self.source {
            BatchSource::Path(path) => Ok(image::open(path)?.to_rgb8()),
            BatchSource::Image(image) => Ok(image.clone()),
        }
    }
}

/// A failed batch entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Queue index of the item.
    pub index: usize,
    /// Item label (source path or positional name).
    pub label: String,
    /// Error message.
    pub message: String,
}

/// Outcome of [`BatchCoordinator::process_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Indices of items that finished successfully.
    pub done: Vec<usize>,
    /// Items that failed, in queue order.
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    /// Number of successful items.
    #[must_use]
    pub fn done_count(&self) -> usize {
        self.done.len()
    }

    /// Number of failed items.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// Runs the pipeline over a queue of images.
#[derive(Debug, Default)]
pub struct BatchCoordinator {
    engine: WatermarkEngine,
    items: Vec<BatchItem>,
}

impl BatchCoordinator {
    /// Create an empty batch that processes with `engine`.
    #[must_use]
    pub fn new(engine: WatermarkEngine) -> Self {
        Self {
            engine,
            items: Vec::new(),
        }
    }

    /// Add an image (path or in-memory) for automatic detection. Returns its index.
    pub fn enqueue(&mut self, source: impl Into<BatchSource>) -> usize {
        self.push(source.into(), None)
    }

    /// Add an image with a manual mask, skipping detection. Returns its index.
    pub fn enqueue_with_mask(&mut self, source: impl Into<BatchSource>, mask: Mask) -> usize {
        self.push(source.into(), Some(mask))
    }

    fn push(&mut self, source: BatchSource, mask: Option<Mask>) -> usize {
        let index = self.items.len();
        self.items.push(BatchItem::new(index, source, mask));
        index
    }

    /// Number of enqueued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All items in queue order.
    #[must_use]
    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    /// Status of the item at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBatchIndex`] for an unknown index.
    pub fn status(&self, index: usize) -> Result<BatchStatus> {
        self.item(index).map(BatchItem::status)
    }

    fn item(&self, index: usize) -> Result<&BatchItem> {
        self.items.get(index).ok_or(Error::InvalidBatchIndex(index))
    }

    /// Process every pending item, continuing past failures.
    ///
    /// Items already done or failed are left as they are. Uses parallel
    /// iteration when the `cli` feature is enabled (via rayon); each worker
    /// owns its item for the duration of the run.
    pub fn process_all(&mut self) -> BatchReport {
        let engine = &self.engine;
        let pending = self
            .items
            .iter_mut()
            .filter(|item| item.status == BatchStatus::Pending);

        #[cfg(feature = "cli")]
        {
            use rayon::prelude::*;
            pending
                .collect::<Vec<_>>()
                .into_par_iter()
                .for_each(|item| item.process(engine));
        }

        #[cfg(not(feature = "cli"))]
        {
            pending.for_each(|item| item.process(engine));
        }

        let report = self.report();
        info!(
            done = report.done_count(),
            failed = report.failed_count(),
            total = self.items.len(),
            "batch finished"
        );
        report
    }

    /// Summary of every finished item.
    #[must_use]
    pub fn report(&self) -> BatchReport {
        let mut report = BatchReport::default();
        for (index, item) in self.items.iter().enumerate() {
            match item.status {
                BatchStatus::Done => report.done.push(index),
                BatchStatus::Failed => report.failed.push(BatchFailure {
                    index,
                    label: item.label.clone(),
                    message: item.error().map(ToString::to_string).unwrap_or_default(),
                }),
                BatchStatus::Pending | BatchStatus::Processing => {}
            }
        }
        report
    }

    /// Result image of the item at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBatchIndex`] for an unknown index,
    /// [`Error::NotProcessed`] if the item has not run yet, and
    /// [`Error::ItemFailed`] if it failed.
    pub fn result_for(&self, index: usize) -> Result<&RgbImage> {
        let item = self.item(index)?;
        match &item.outcome {
            None => Err(Error::NotProcessed(index)),
            Some(Ok(image)) => Ok(image),
            Some(Err(e)) => Err(Error::ItemFailed {
                index,
                reason: e.to_string(),
            }),
        }
    }

    /// Write every done item to `output_dir`; returns the written paths.
    ///
    /// Path sources keep their file name; in-memory images are saved as
    /// `image_{n}.png`.
    ///
    /// # Errors
    ///
    /// Returns the first I/O or encoding error.
    pub fn save_results(&self, output_dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(output_dir)?;
        let mut written = Vec::new();
        for (index, item) in self.items.iter().enumerate() {
            let Some(image) = item.image() else {
                continue;
            };
            let name = match &item.source {
                BatchSource::Path(p) => p.file_name().map_or_else(
                    || format!("image_{}.png", index + 1),
                    |f| f.to_string_lossy().into_owned(),
                ),
                BatchSource::Image(_) => format!("image_{}.png", index + 1),
            };
            let path = output_dir.join(name);
            save_image(image, &path)?;
            written.push(path);
        }
        Ok(written)
    }
}
