//! Correlation engine: decides which no-helmet detections are riding violations.
//!
//! Per frame:
//! 1. screen every detection (geometry, confidence range, confidence floor),
//! 2. resolve the person whose box contains the no-helmet center,
//! 3. resolve the vehicle under that person,
//! 4. gate on person confidence and emit one `Violation`.
//!
//! Each no-helmet detection is evaluated independently and yields at most one
//! candidate. Repeats are the deduplicator's concern, not this module's.

use std::marker::PhantomData;
use std::time::SystemTime;

use crate::detect::{Detection, FrameDetections};
use crate::frame::Frame;
use crate::geometry::BoundingBox;
use crate::index::{GeometricIndex, LinearIndex};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.0;
pub const DEFAULT_FINE_AMOUNT: u32 = 500;

/// Which point of the person box must land inside a vehicle box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VehicleAnchor {
    /// Person center only.
    Center,
    /// Person center, falling back to the bottom-center when the center sits
    /// above the vehicle box (tall rider boxes over a low bike box).
    CenterThenFootpoint,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CorrelationConfig {
    /// Person confidence must exceed this. `<= 0` disables the gate.
    pub confidence_threshold: f32,
    /// Detections of any label below this are discarded before geometry.
    pub confidence_floor: f32,
    /// Attached verbatim to every violation.
    pub fine_amount: u32,
    pub vehicle_anchor: VehicleAnchor,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
            fine_amount: DEFAULT_FINE_AMOUNT,
            vehicle_anchor: VehicleAnchor::CenterThenFootpoint,
        }
    }
}

/// A no-helmet rider, fully attributed within one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Violation {
    pub frame_seq: u64,
    /// Reference to the frame's original image.
    pub frame_name: String,
    pub person_box: BoundingBox,
    pub person_confidence: f32,
    pub vehicle_box: BoundingBox,
    pub no_helmet_box: BoundingBox,
    pub detected_at: SystemTime,
    pub fine_amount: u32,
}

/// Output of correlating one frame.
#[derive(Clone, Debug, Default)]
pub struct Correlation {
    pub candidates: Vec<Violation>,
    /// Detections dropped for malformed boxes or confidences outside [0, 1].
    pub skipped_invalid: usize,
    /// Detections dropped by the confidence floor.
    pub below_floor: usize,
}

pub struct CorrelationEngine<I: GeometricIndex = LinearIndex> {
    config: CorrelationConfig,
    _index: PhantomData<fn() -> I>,
}

impl CorrelationEngine<LinearIndex> {
    pub fn new(config: CorrelationConfig) -> Self {
        Self::with_index(config)
    }
}

impl<I: GeometricIndex> CorrelationEngine<I> {
    pub fn with_index(config: CorrelationConfig) -> Self {
        Self {
            config,
            _index: PhantomData,
        }
    }

    /// Correlate one frame's detections. Never fails: bad detections are skipped.
    pub fn correlate(&self, frame: &Frame, detections: &FrameDetections) -> Correlation {
        let mut out = Correlation::default();

        let persons = I::build(self.screen(frame.seq, &detections.persons, &mut out));
        let vehicles = I::build(self.screen(frame.seq, &detections.vehicles, &mut out));
        let no_helmets = self.screen(frame.seq, &detections.no_helmets, &mut out);

        if persons.is_empty() || vehicles.is_empty() {
            return out;
        }

        for nh in &no_helmets {
            let Some(person) = persons.containing(nh.bbox.center()) else {
                continue;
            };
            let Some(vehicle) = self.vehicle_under(&vehicles, &person.bbox) else {
                continue;
            };
            if !self.passes_threshold(person) {
                log::debug!(
                    "frame {}: rider confidence {:.2} at or below threshold {:.2}",
                    frame.seq,
                    person.confidence,
                    self.config.confidence_threshold
                );
                continue;
            }
            out.candidates.push(Violation {
                frame_seq: frame.seq,
                frame_name: frame.name.clone(),
                person_box: person.bbox,
                person_confidence: person.confidence,
                vehicle_box: vehicle.bbox,
                no_helmet_box: nh.bbox,
                detected_at: frame.captured_at,
                fine_amount: self.config.fine_amount,
            });
        }
        out
    }

    fn screen(&self, seq: u64, dets: &[Detection], out: &mut Correlation) -> Vec<Detection> {
        let mut kept = Vec::with_capacity(dets.len());
        for det in dets {
            if let Err(e) = det.bbox.validate() {
                log::debug!("frame {}: skipping {:?} detection: {}", seq, det.label, e);
                out.skipped_invalid += 1;
                continue;
            }
            // NaN fails the range check too; it must never reach the index sort.
            if !(0.0..=1.0).contains(&det.confidence) {
                log::debug!(
                    "frame {}: skipping {:?} detection with confidence {}",
                    seq,
                    det.label,
                    det.confidence
                );
                out.skipped_invalid += 1;
                continue;
            }
            if det.confidence < self.config.confidence_floor {
                out.below_floor += 1;
                continue;
            }
            kept.push(*det);
        }
        kept
    }

    fn vehicle_under<'a>(&self, vehicles: &'a I, person: &BoundingBox) -> Option<&'a Detection> {
        let by_center = vehicles.containing(person.center());
        match self.config.vehicle_anchor {
            VehicleAnchor::Center => by_center,
            VehicleAnchor::CenterThenFootpoint => {
                by_center.or_else(|| vehicles.containing(person.foot_point()))
            }
        }
    }

    fn passes_threshold(&self, person: &Detection) -> bool {
        self.config.confidence_threshold <= 0.0
            || person.confidence > self.config.confidence_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: u64) -> Frame {
        Frame::blank(seq, SystemTime::UNIX_EPOCH, 640, 480)
    }

    fn rider_scene() -> FrameDetections {
        FrameDetections {
            persons: vec![Detection::person(
                BoundingBox::new(100.0, 100.0, 200.0, 300.0),
                0.9,
            )],
            vehicles: vec![Detection::vehicle(
                BoundingBox::new(90.0, 150.0, 210.0, 350.0),
                0.8,
            )],
            no_helmets: vec![Detection::no_helmet(
                BoundingBox::new(130.0, 100.0, 170.0, 140.0),
                0.8,
            )],
        }
    }

    #[test]
    fn emits_one_violation_per_attributed_no_helmet() {
        let engine = CorrelationEngine::new(CorrelationConfig::default());
        let out = engine.correlate(&frame(7), &rider_scene());
        assert_eq!(out.candidates.len(), 1);
        let v = &out.candidates[0];
        assert_eq!(v.frame_seq, 7);
        assert_eq!(v.fine_amount, DEFAULT_FINE_AMOUNT);
        assert_eq!(v.vehicle_box, BoundingBox::new(90.0, 150.0, 210.0, 350.0));
    }

    #[test]
    fn threshold_is_strict_and_zero_disables_it() {
        let mut scene = rider_scene();
        scene.persons[0].confidence = 0.5;
        let engine = CorrelationEngine::new(CorrelationConfig::default());
        assert!(engine.correlate(&frame(1), &scene).candidates.is_empty());

        scene.persons[0].confidence = 0.0;
        let geometric_only = CorrelationEngine::new(CorrelationConfig {
            confidence_threshold: 0.0,
            ..CorrelationConfig::default()
        });
        assert_eq!(geometric_only.correlate(&frame(1), &scene).candidates.len(), 1);
    }

    #[test]
    fn invalid_boxes_are_skipped_not_fatal() {
        let mut scene = rider_scene();
        scene
            .no_helmets
            .push(Detection::no_helmet(BoundingBox::new(170.0, 140.0, 130.0, 100.0), 0.9));
        scene
            .persons
            .push(Detection::person(BoundingBox::new(5.0, 5.0, 5.0, 50.0), 0.9));
        let engine = CorrelationEngine::new(CorrelationConfig::default());
        let out = engine.correlate(&frame(1), &scene);
        assert_eq!(out.skipped_invalid, 2);
        assert_eq!(out.candidates.len(), 1);
    }

    #[test]
    fn out_of_range_confidence_cannot_shadow_a_real_rider() {
        let mut scene = rider_scene();
        let ghost_box = scene.persons[0].bbox;
        scene.persons.insert(0, Detection::person(ghost_box, f32::NAN));
        scene.persons.push(Detection::person(ghost_box, 1.5));
        scene.vehicles.push(Detection::vehicle(scene.vehicles[0].bbox, -0.1));

        let engine = CorrelationEngine::new(CorrelationConfig::default());
        let out = engine.correlate(&frame(1), &scene);
        assert_eq!(out.skipped_invalid, 3);
        assert_eq!(out.candidates.len(), 1);
        assert_eq!(out.candidates[0].person_confidence, 0.9);

        let geometric_only = CorrelationEngine::new(CorrelationConfig {
            confidence_threshold: 0.0,
            ..CorrelationConfig::default()
        });
        let out = geometric_only.correlate(&frame(1), &scene);
        assert_eq!(out.candidates.len(), 1);
        assert!(out.candidates.iter().all(|v| v.person_confidence.is_finite()));
    }

    #[test]
    fn confidence_floor_applies_to_every_label() {
        let mut scene = rider_scene();
        scene.vehicles[0].confidence = 0.2;
        let engine = CorrelationEngine::new(CorrelationConfig {
            confidence_floor: 0.3,
            ..CorrelationConfig::default()
        });
        let out = engine.correlate(&frame(1), &scene);
        assert_eq!(out.below_floor, 1);
        assert!(out.candidates.is_empty());
    }

    #[test]
    fn duplicate_no_helmets_on_one_rider_are_each_candidates() {
        let mut scene = rider_scene();
        scene.no_helmets.push(Detection::no_helmet(
            BoundingBox::new(132.0, 102.0, 168.0, 138.0),
            0.7,
        ));
        let engine = CorrelationEngine::new(CorrelationConfig::default());
        assert_eq!(engine.correlate(&frame(1), &scene).candidates.len(), 2);
    }

    #[test]
    fn center_anchor_requires_person_center_on_vehicle() {
        let mut scene = rider_scene();
        scene.vehicles[0].bbox = BoundingBox::new(90.0, 250.0, 210.0, 350.0);

        let strict = CorrelationEngine::new(CorrelationConfig {
            vehicle_anchor: VehicleAnchor::Center,
            ..CorrelationConfig::default()
        });
        assert!(strict.correlate(&frame(1), &scene).candidates.is_empty());

        let lenient = CorrelationEngine::new(CorrelationConfig::default());
        assert_eq!(lenient.correlate(&frame(1), &scene).candidates.len(), 1);
    }
}
