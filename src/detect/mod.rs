//! Detection sources.
//!
//! Models are black boxes behind `Detector`; the engine consumes a
//! `DetectionSource` producing typed person/vehicle/no-helmet sets per frame.

mod backend;
mod backends;
mod dual;
mod result;

pub use backend::{DetectError, DetectionSource, Detector};
pub use backends::{FixtureSource, ScriptedSource};
pub use dual::DualDetectorSource;
pub use result::{Detection, FrameDetections, Label, RawDetection};
