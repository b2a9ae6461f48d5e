//! Evidence image storage.
//!
//! Annotated frames are written as JPEG into a local directory. Writes go to a
//! temp file first and are renamed into place, so a reader never sees a partial
//! image.

use anyhow::{anyhow, Result};
use image::{ImageFormat, RgbImage};
use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use crate::correlate::Violation;
use crate::frame::epoch_millis;

pub const DEFAULT_EVIDENCE_DIR: &str = "static/violations";

pub struct EvidenceStore {
    root: PathBuf,
    written: u64,
}

impl EvidenceStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| anyhow!("failed to create evidence dir {}: {}", root.display(), e))?;
        Ok(Self { root, written: 0 })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes the evidence image and returns its file name (relative to `root`).
    pub fn write(&mut self, violation: &Violation, image: &RgbImage) -> Result<String> {
        self.written += 1;
        let name = format!(
            "viol_{}_{}_{}.jpg",
            epoch_millis(violation.detected_at),
            violation.frame_seq,
            self.written
        );
        let path = self.root.join(&name);
        if path.exists() {
            return Err(anyhow!("evidence image {} already exists", path.display()));
        }

        let mut encoded = Vec::new();
        image.write_to(&mut Cursor::new(&mut encoded), ImageFormat::Jpeg)?;
        write_atomic(&path, &encoded)?;
        Ok(name)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("jpg.tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;
    use std::time::SystemTime;

    fn violation(seq: u64) -> Violation {
        Violation {
            frame_seq: seq,
            frame_name: "upload.jpg".into(),
            person_box: BoundingBox::new(1.0, 1.0, 5.0, 9.0),
            person_confidence: 0.9,
            vehicle_box: BoundingBox::new(0.0, 5.0, 8.0, 12.0),
            no_helmet_box: BoundingBox::new(2.0, 1.0, 4.0, 3.0),
            detected_at: SystemTime::now(),
            fine_amount: 500,
        }
    }

    #[test]
    fn writes_decodable_jpeg_with_unique_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = EvidenceStore::new(dir.path().join("violations")).unwrap();
        let v = violation(4);
        let a = store.write(&v, &RgbImage::new(16, 16)).unwrap();
        let b = store.write(&v, &RgbImage::new(16, 16)).unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("viol_") && a.ends_with(".jpg"));

        let decoded = image::open(store.root().join(&a)).unwrap();
        assert_eq!(decoded.width(), 16);
        assert!(!store.root().join(format!("{a}.tmp")).exists());
    }
}
