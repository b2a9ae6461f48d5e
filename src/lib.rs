//! Helmet Witness
//!
//! Correlates per-frame object detections (persons, two-wheelers, bare heads)
//! into helmet-rule violations and records each distinct violation once.
//!
//! # Pipeline
//!
//! For every frame of a stream:
//!
//! 1. **Detect**: a `DetectionSource` produces persons, vehicles and no-helmet
//!    boxes (`detect`).
//! 2. **Correlate**: each no-helmet box is attributed to the person containing
//!    its center, and that person to the vehicle under them (`correlate`,
//!    backed by a `GeometricIndex`).
//! 3. **Deduplicate**: violations near a recently admitted one are suppressed
//!    (`dedup`).
//! 4. **Emit**: admitted violations are annotated and handed to an
//!    `EvidenceSink` (`sink`, `annotate`, `storage`).
//!
//! `stream::StreamHost` owns any number of independent streams and exposes the
//! `start` / `feed_frame` / `stop` lifecycle.

use anyhow::Result;
use rand::RngCore;
use rusqlite::{Connection, OpenFlags};

pub mod annotate;
pub mod config;
pub mod correlate;
pub mod dedup;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod index;
pub mod ingest;
pub mod sink;
pub mod storage;
pub mod stream;

pub use config::HelmetConfig;
pub use correlate::{Correlation, CorrelationConfig, CorrelationEngine, VehicleAnchor, Violation};
pub use dedup::{DedupConfig, DedupWindow, Deduplicator};
pub use detect::{DetectError, Detection, DetectionSource, FrameDetections, Label};
pub use frame::Frame;
pub use geometry::{BoundingBox, GeometryError, Point};
pub use index::{GeometricIndex, LinearIndex};
pub use sink::{EvidenceSink, Handoff, RecordId, RecordingSink, SinkError};
pub use storage::{SqliteViolationStore, ViolationRecord, ViolationStore};
pub use stream::{FrameOutcome, StreamConfig, StreamError, StreamHost, StreamStats};

/// Private in-memory SQLite URI, shareable between connections of one process.
pub fn shared_memory_uri() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!(
        "file:helmet_witness_{:x}?mode=memory&cache=shared",
        u64::from_le_bytes(bytes)
    )
}

pub(crate) fn open_db_connection(db_path: &str) -> Result<Connection> {
    if db_path == ":memory:" {
        return open_db_connection(&shared_memory_uri());
    }
    if db_path.starts_with("file:") {
        return Ok(Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI,
        )?);
    }
    Ok(Connection::open(db_path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_memory_uris_are_unique() {
        let a = shared_memory_uri();
        let b = shared_memory_uri();
        assert_ne!(a, b);
        assert!(a.starts_with("file:") && a.ends_with("cache=shared"));
    }

    #[test]
    fn memory_alias_opens_a_private_database() {
        let conn = open_db_connection(":memory:").unwrap();
        let one: i64 = conn.query_row("SELECT 1", [], |r| r.get(0)).unwrap();
        assert_eq!(one, 1);
    }
}
