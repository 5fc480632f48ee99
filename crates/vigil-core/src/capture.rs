//! Probe image acquisition.

use image::DynamicImage;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture device unavailable: {0}")]
    Unavailable(String),
    #[error("capture failed: {0}")]
    Failed(String),
    #[error("capture cancelled")]
    Cancelled,
    #[error("cannot read probe image {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Something that can produce a probe image for one decision attempt.
pub trait ProbeSource {
    fn capture(&mut self) -> Result<DynamicImage, CaptureError>;
}

/// Probe read from an image file on disk.
#[derive(Debug, Clone)]
pub struct ImageFile {
    path: PathBuf,
}

impl ImageFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ProbeSource for ImageFile {
    fn capture(&mut self) -> Result<DynamicImage, CaptureError> {
        image::open(&self.path).map_err(|source| CaptureError::Unreadable {
            path: self.path.clone(),
            source,
        })
    }
}

/// Shared flag used to abort an in-progress capture.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
