use std::collections::VecDeque;

use crate::detect::backend::{DetectError, DetectionSource};
use crate::detect::result::FrameDetections;
use crate::frame::Frame;

/// In-memory source for tests: returns queued results in order, then empty sets.
#[derive(Default)]
pub struct ScriptedSource {
    queue: VecDeque<Result<FrameDetections, DetectError>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, detections: FrameDetections) -> Self {
        self.queue.push_back(Ok(detections));
        self
    }

    pub fn push_failure(mut self, reason: &str) -> Self {
        self.queue
            .push_back(Err(DetectError::SourceUnavailable(reason.to_string())));
        self
    }
}

impl DetectionSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<FrameDetections, DetectError> {
        self.queue
            .pop_front()
            .unwrap_or_else(|| Ok(FrameDetections::default()))
    }
}
