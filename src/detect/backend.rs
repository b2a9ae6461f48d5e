use thiserror::Error;

use crate::detect::result::{FrameDetections, RawDetection};
use crate::frame::Frame;

#[derive(Debug, Error)]
pub enum DetectError {
    /// The detector could not produce results for this frame (model error,
    /// unreadable input, ...). The frame is skipped; the stream continues.
    #[error("detection source unavailable: {0}")]
    SourceUnavailable(String),
}

/// A single black-box model.
///
/// Implementations treat the frame as read-only and must not retain it past
/// the `detect` call.
pub trait Detector: Send {
    /// Detector identifier.
    fn name(&self) -> &'static str;

    /// Run the model on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<RawDetection>, DetectError>;
}

/// Produces the three typed detection sets the correlation engine consumes.
///
/// The engine never calls models directly; it only sees this trait.
pub trait DetectionSource: Send {
    /// Source identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<FrameDetections, DetectError>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<(), DetectError> {
        Ok(())
    }
}
