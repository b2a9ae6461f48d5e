//! Image-directory frame source.
//!
//! Yields one frame per image file (jpg/jpeg/png) in lexical file-name order.
//! Sequence numbers start at 1 and advance for every file, including files
//! that fail to decode, so they line up with recorded detections.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
}

#[derive(Clone, Debug)]
pub struct ImageDirStats {
    pub frames_read: u64,
    pub frames_total: u64,
    pub dir: String,
}

impl ImageDirSource {
    pub fn open(dir: &Path) -> Result<Self> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| anyhow!("failed to read frames dir {}: {}", dir.display(), e))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.is_file() && has_image_extension(&path) {
                files.push(path);
            }
        }
        files.sort();
        log::info!(
            "ImageDirSource: {} frames in {}",
            files.len(),
            dir.display()
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            cursor: 0,
        })
    }

    /// Next frame, `Ok(None)` when exhausted.
    ///
    /// A decode failure is returned as an error, but the cursor still advances
    /// so the caller can log it and keep going.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.cursor).cloned() else {
            return Ok(None);
        };
        self.cursor += 1;
        let seq = self.cursor as u64;

        let image = image::open(&path)
            .map_err(|e| anyhow!("frame {} ({}) unreadable: {}", seq, path.display(), e))?
            .to_rgb8();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("frame_{seq:06}"));
        Ok(Some(Frame::new(seq, SystemTime::now(), name, image)))
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.files.len()
    }

    pub fn stats(&self) -> ImageDirStats {
        ImageDirStats {
            frames_read: self.cursor as u64,
            frames_total: self.files.len() as u64,
            dir: self.dir.display().to_string(),
        }
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn yields_images_in_name_order_and_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::new(8, 6).save(dir.path().join("b.png")).unwrap();
        RgbImage::new(4, 4).save(dir.path().join("a.png")).unwrap();
        std::fs::write(dir.path().join("c.jpg"), b"not a jpeg").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let mut source = ImageDirSource::open(dir.path()).unwrap();
        assert_eq!(source.stats().frames_total, 3);

        let a = source.next_frame().unwrap().unwrap();
        assert_eq!((a.seq, a.name.as_str(), a.width()), (1, "a.png", 4));
        let b = source.next_frame().unwrap().unwrap();
        assert_eq!((b.seq, b.height()), (2, 6));
        assert!(source.next_frame().is_err());
        assert!(source.is_exhausted());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn missing_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageDirSource::open(&dir.path().join("absent")).is_err());
    }
}
