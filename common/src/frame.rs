//! Captured frames and the single-slot hand-off between capture and detection.
//!
use std::sync::{Arc, Mutex, PoisonError};

use image::RgbImage;

use crate::error::{PipelineError, Result};

/// A mirrored RGB frame as published by the capture loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Capture sequence number, starting at 1 for the first published frame.
    pub seq: u64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(seq: u64, image: RgbImage) -> Self {
        Self { seq, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Most recently published frame.
///
/// Only the newest frame matters, so this is a single slot rather than a queue: publishing
/// replaces the previous frame and never waits for readers. Published frames are immutable
/// behind an `Arc`, the lock is only held to swap or clone that pointer. A reader therefore
/// sees either the old or the new frame in full.
#[derive(Debug, Default)]
pub struct LatestFrame {
    slot: Mutex<Option<Arc<Frame>>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the published frame.
    pub fn publish(&self, frame: Frame) {
        let frame = Arc::new(frame);
        let previous = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(frame);
        // Drop the old frame outside of the lock
        drop(previous);
    }

    /// Shared handle to the published frame without copying pixels.
    pub fn snapshot(&self) -> Option<Arc<Frame>> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Owned copy of the published frame.
    pub fn latest(&self) -> Result<Frame> {
        self.snapshot()
            .map(|frame| Frame::clone(&frame))
            .ok_or(PipelineError::NoFrameYet)
    }
}
