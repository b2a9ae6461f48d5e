//! Replays recorded detections from a JSON Lines file.
//!
//! One line per frame:
//!
//! ```json
//! {"frame": 3, "persons": [{"bbox": [100, 100, 200, 300], "confidence": 0.9}], "vehicles": [], "no_helmets": []}
//! ```
//!
//! Frames without a line produce an empty detection set.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::detect::backend::{DetectError, DetectionSource};
use crate::detect::result::{Detection, FrameDetections, Label};
use crate::frame::Frame;
use crate::geometry::BoundingBox;

#[derive(Debug, Deserialize)]
struct FixtureLine {
    frame: u64,
    #[serde(default)]
    persons: Vec<FixtureBox>,
    #[serde(default)]
    vehicles: Vec<FixtureBox>,
    #[serde(default)]
    no_helmets: Vec<FixtureBox>,
}

#[derive(Debug, Deserialize)]
struct FixtureBox {
    bbox: BoundingBox,
    confidence: f32,
}

pub struct FixtureSource {
    frames: HashMap<u64, FrameDetections>,
}

impl FixtureSource {
    pub fn open(path: &Path) -> Result<Self, DetectError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DetectError::SourceUnavailable(format!(
                "failed to read detections file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&raw).map_err(|e| match e {
            DetectError::SourceUnavailable(msg) => {
                DetectError::SourceUnavailable(format!("{}: {}", path.display(), msg))
            }
        })
    }

    pub fn parse(raw: &str) -> Result<Self, DetectError> {
        let mut frames = HashMap::new();
        for (lineno, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parsed: FixtureLine = serde_json::from_str(line).map_err(|e| {
                DetectError::SourceUnavailable(format!("line {}: {}", lineno + 1, e))
            })?;
            let mut dets = FrameDetections::default();
            for (label, boxes) in [
                (Label::Person, parsed.persons),
                (Label::Vehicle, parsed.vehicles),
                (Label::NoHelmet, parsed.no_helmets),
            ] {
                for b in boxes {
                    dets.push(Detection::new(label, b.bbox, b.confidence));
                }
            }
            frames.insert(parsed.frame, dets);
        }
        Ok(Self { frames })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl DetectionSource for FixtureSource {
    fn name(&self) -> &'static str {
        "fixture"
    }

    fn detect(&mut self, frame: &Frame) -> Result<FrameDetections, DetectError> {
        Ok(self.frames.get(&frame.seq).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    #[test]
    fn parses_lines_and_replays_by_frame_seq() {
        let raw = r#"
# recorded from lane 2
{"frame": 1, "persons": [{"bbox": [100, 100, 200, 300], "confidence": 0.9}], "vehicles": [{"bbox": [90, 250, 210, 350], "confidence": 0.7}], "no_helmets": [{"bbox": [130, 100, 170, 140], "confidence": 0.8}]}
{"frame": 3, "persons": [{"bbox": [0, 0, 5, 5], "confidence": 0.4}]}
"#;
        let mut source = FixtureSource::parse(raw).unwrap();
        assert_eq!(source.frame_count(), 2);

        let f1 = source
            .detect(&Frame::blank(1, SystemTime::now(), 8, 8))
            .unwrap();
        assert_eq!(f1.len(), 3);
        assert_eq!(f1.vehicles[0].label, Label::Vehicle);

        let f2 = source
            .detect(&Frame::blank(2, SystemTime::now(), 8, 8))
            .unwrap();
        assert!(f2.is_empty());

        let f3 = source
            .detect(&Frame::blank(3, SystemTime::now(), 8, 8))
            .unwrap();
        assert_eq!(f3.persons.len(), 1);
        assert!(f3.no_helmets.is_empty());
    }

    #[test]
    fn malformed_line_is_source_unavailable() {
        let err = FixtureSource::parse("{\"frame\": \"one\"}").err().unwrap();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn missing_file_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let result = FixtureSource::open(&dir.path().join("absent.jsonl"));
        assert!(matches!(result, Err(DetectError::SourceUnavailable(_))));
    }
}
