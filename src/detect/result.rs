use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;

/// Object labels the correlation engine understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Label {
    Person,
    Vehicle,
    NoHelmet,
}

impl Label {
    /// Map a raw detector class name onto a label.
    ///
    /// Two-wheelers of any kind count as vehicles. Helmet detectors disagree on
    /// naming ("without helmet", "no_helmet", ...), so substring matching is used.
    pub fn from_class_name(class_name: &str) -> Option<Self> {
        let name = class_name.trim().to_lowercase();
        if name == "person" {
            return Some(Label::Person);
        }
        if ["motorbike", "motorcycle", "bicycle", "bike"]
            .iter()
            .any(|k| name.contains(k))
        {
            return Some(Label::Vehicle);
        }
        if ["without helmet", "no helmet", "no_helmet", "no-helmet"]
            .iter()
            .any(|k| name.contains(k))
        {
            return Some(Label::NoHelmet);
        }
        None
    }
}

/// One typed detector output. No identity persists across frames.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub label: Label,
    /// 0..=1
    pub confidence: f32,
}

impl Detection {
    pub fn new(label: Label, bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            bbox,
            label,
            confidence,
        }
    }

    pub fn person(bbox: BoundingBox, confidence: f32) -> Self {
        Self::new(Label::Person, bbox, confidence)
    }

    pub fn vehicle(bbox: BoundingBox, confidence: f32) -> Self {
        Self::new(Label::Vehicle, bbox, confidence)
    }

    pub fn no_helmet(bbox: BoundingBox, confidence: f32) -> Self {
        Self::new(Label::NoHelmet, bbox, confidence)
    }
}

/// Untyped detector output, before label mapping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    pub class_name: String,
    pub confidence: f32,
}

/// The three unordered detection sets for a single frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameDetections {
    pub persons: Vec<Detection>,
    pub vehicles: Vec<Detection>,
    pub no_helmets: Vec<Detection>,
}

impl FrameDetections {
    pub fn is_empty(&self) -> bool {
        self.persons.is_empty() && self.vehicles.is_empty() && self.no_helmets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.persons.len() + self.vehicles.len() + self.no_helmets.len()
    }

    /// Route a typed detection into its set.
    pub fn push(&mut self, detection: Detection) {
        match detection.label {
            Label::Person => self.persons.push(detection),
            Label::Vehicle => self.vehicles.push(detection),
            Label::NoHelmet => self.no_helmets.push(detection),
        }
    }

    /// Merge raw outputs, keeping only the labels in `owned`.
    ///
    /// Returns the number of raw detections dropped (unknown class or foreign label).
    pub fn extend_raw(&mut self, raw: Vec<RawDetection>, owned: &[Label]) -> usize {
        let mut dropped = 0;
        for r in raw {
            match Label::from_class_name(&r.class_name) {
                Some(label) if owned.contains(&label) => {
                    self.push(Detection::new(label, r.bbox, r.confidence));
                }
                _ => dropped += 1,
            }
        }
        dropped
    }
}
