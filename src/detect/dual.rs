use std::thread;

use crate::detect::backend::{DetectError, DetectionSource, Detector};
use crate::detect::result::{FrameDetections, Label};
use crate::frame::Frame;

const GENERAL_LABELS: &[Label] = &[Label::Person, Label::Vehicle];
const HELMET_LABELS: &[Label] = &[Label::NoHelmet];

/// Pairs a person/vehicle detector with a helmet detector.
///
/// Both models run concurrently on the same frame; the frame's detection set is
/// only assembled after both have returned. A failure in either model makes the
/// whole frame unavailable, since half a detection set cannot be correlated.
pub struct DualDetectorSource<G, H> {
    general: G,
    helmet: H,
}

impl<G: Detector, H: Detector> DualDetectorSource<G, H> {
    pub fn new(general: G, helmet: H) -> Self {
        Self { general, helmet }
    }
}

impl<G: Detector, H: Detector> DetectionSource for DualDetectorSource<G, H> {
    fn name(&self) -> &'static str {
        "dual"
    }

    fn detect(&mut self, frame: &Frame) -> Result<FrameDetections, DetectError> {
        let general_name = self.general.name();
        let general = &mut self.general;
        let helmet = &mut self.helmet;

        let (general_out, helmet_out) = thread::scope(|scope| {
            let handle = scope.spawn(move || general.detect(frame));
            let helmet_out = helmet.detect(frame);
            (handle.join(), helmet_out)
        });

        let general_raw = general_out.map_err(|_| {
            DetectError::SourceUnavailable(format!("detector {} panicked", general_name))
        })??;
        let helmet_raw = helmet_out?;

        let mut detections = FrameDetections::default();
        let dropped = detections.extend_raw(general_raw, GENERAL_LABELS)
            + detections.extend_raw(helmet_raw, HELMET_LABELS);
        if dropped > 0 {
            log::debug!(
                "frame {}: dropped {} detections with unmapped labels",
                frame.seq,
                dropped
            );
        }
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::RawDetection;
    use crate::geometry::BoundingBox;
    use std::time::SystemTime;

    struct FixedDetector {
        name: &'static str,
        out: Vec<(&'static str, [f32; 4])>,
        fail: bool,
    }

    impl Detector for FixedDetector {
        fn name(&self) -> &'static str {
            self.name
        }

        fn detect(&mut self, _frame: &Frame) -> Result<Vec<RawDetection>, DetectError> {
            if self.fail {
                return Err(DetectError::SourceUnavailable("model error".into()));
            }
            Ok(self
                .out
                .iter()
                .map(|(class, b)| RawDetection {
                    bbox: BoundingBox::from(*b),
                    class_name: class.to_string(),
                    confidence: 0.9,
                })
                .collect())
        }
    }

    fn frame() -> Frame {
        Frame::blank(1, SystemTime::now(), 64, 64)
    }

    #[test]
    fn joins_both_detectors_and_partitions_by_owner() {
        let general = FixedDetector {
            name: "yolo",
            out: vec![
                ("person", [1.0, 1.0, 10.0, 10.0]),
                ("motorcycle", [0.0, 5.0, 12.0, 20.0]),
                // Foreign label from the general model is ignored.
                ("no helmet", [2.0, 2.0, 4.0, 4.0]),
            ],
            fail: false,
        };
        let helmet = FixedDetector {
            name: "helmet",
            out: vec![
                ("without helmet", [2.0, 1.0, 6.0, 4.0]),
                ("with helmet", [2.0, 1.0, 6.0, 4.0]),
            ],
            fail: false,
        };
        let mut source = DualDetectorSource::new(general, helmet);
        let dets = source.detect(&frame()).unwrap();
        assert_eq!(dets.persons.len(), 1);
        assert_eq!(dets.vehicles.len(), 1);
        assert_eq!(dets.no_helmets.len(), 1);
        assert_eq!(dets.no_helmets[0].bbox, BoundingBox::new(2.0, 1.0, 6.0, 4.0));
    }

    #[test]
    fn failure_in_either_detector_makes_frame_unavailable() {
        let general = FixedDetector {
            name: "yolo",
            out: vec![("person", [1.0, 1.0, 10.0, 10.0])],
            fail: false,
        };
        let helmet = FixedDetector {
            name: "helmet",
            out: vec![],
            fail: true,
        };
        let mut source = DualDetectorSource::new(general, helmet);
        assert!(matches!(
            source.detect(&frame()),
            Err(DetectError::SourceUnavailable(_))
        ));
    }
}
