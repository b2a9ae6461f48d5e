//! Frames: the unit of work for a stream.
//!
//! A `Frame` carries its capture order (`seq`), capture time, a source reference
//! (file name or camera tag), and the decoded image. Frames are processed
//! independently; the only cross-frame state lives in the deduplicator.

use image::RgbImage;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Clone, Debug)]
pub struct Frame {
    /// Capture order within the stream.
    pub seq: u64,
    pub captured_at: SystemTime,
    /// Reference to the original image (upload file name, camera tag, ...).
    pub name: String,
    image: RgbImage,
}

impl Frame {
    pub fn new(seq: u64, captured_at: SystemTime, name: impl Into<String>, image: RgbImage) -> Self {
        Self {
            seq,
            captured_at,
            name: name.into(),
            image,
        }
    }

    /// Black frame of the given size. Used when only detections matter.
    pub fn blank(seq: u64, captured_at: SystemTime, width: u32, height: u32) -> Self {
        Self::new(
            seq,
            captured_at,
            format!("frame_{seq:06}"),
            RgbImage::new(width, height),
        )
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Milliseconds since the epoch, saturating to zero for pre-epoch clocks.
pub fn epoch_millis(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

pub fn epoch_secs(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}
