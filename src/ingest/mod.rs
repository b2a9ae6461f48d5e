//! Frame ingestion sources.
//!
//! Camera capture and video decoding live outside this crate; hosts hand
//! decoded frames to `StreamHost::feed_frame`. The directory source here covers
//! batch processing of uploaded images and recorded frame dumps.

pub mod dir;

pub use dir::{ImageDirSource, ImageDirStats};
