//! Image directory replay source.
//!
//! This module provides `DirectorySource` for replaying still images from a
//! local directory as a frame stream:
//! - Only local paths (no URL schemes)
//! - `*.jpg`, `*.jpeg` and `*.png`, in lexical filename order
//! - Decoded in-memory to RGB24
//! - Exhausted after the last file

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

use crate::frame::{Frame, FrameSource};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub struct DirectorySource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cursor: usize,
    frame_count: u64,
    connected: bool,
    last_error: Option<String>,
}

impl DirectorySource {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if dir.to_string_lossy().contains("://") {
            return Err(anyhow!(
                "directory replay only supports local paths (no URL schemes)"
            ));
        }
        Ok(Self {
            dir,
            files: Vec::new(),
            cursor: 0,
            frame_count: 0,
            connected: false,
            last_error: None,
        })
    }

    pub fn remaining(&self) -> usize {
        self.files.len().saturating_sub(self.cursor)
    }
}

impl FrameSource for DirectorySource {
    fn describe(&self) -> String {
        format!("dir:{}", self.dir.display())
    }

    fn connect(&mut self) -> Result<()> {
        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("open image directory {}", self.dir.display()))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.context("read image directory entry")?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if path.is_file() && is_image {
                files.push(path);
            }
        }
        files.sort();
        log::info!(
            "DirectorySource: connected to {} ({} images)",
            self.dir.display(),
            files.len()
        );
        self.files = files;
        self.cursor = 0;
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("directory source not connected; call connect() first"));
        }
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;

        let image = image::open(path)
            .with_context(|| format!("decode {}", path.display()))
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                err
            })?
            .into_rgb8();
        self.frame_count += 1;
        Ok(Some(Frame::new(self.frame_count, image)))
    }

    fn release(&mut self) {
        self.connected = false;
        self.files.clear();
    }

    fn is_healthy(&self) -> bool {
        self.connected && self.last_error.is_none()
    }

    fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn replays_images_in_name_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        RgbImage::from_pixel(4, 3, Rgb([200, 0, 0])).save(dir.path().join("b.png"))?;
        RgbImage::from_pixel(5, 2, Rgb([0, 200, 0])).save(dir.path().join("a.png"))?;
        std::fs::write(dir.path().join("notes.txt"), "not an image")?;

        let mut source = DirectorySource::new(dir.path())?;
        source.connect()?;
        assert_eq!(source.remaining(), 2);

        let first = source.next_frame()?.expect("first frame");
        assert_eq!((first.width(), first.height()), (5, 2));
        let second = source.next_frame()?.expect("second frame");
        assert_eq!((second.width(), second.height()), (4, 3));
        assert_eq!(second.index, 2);
        assert!(source.next_frame()?.is_none());
        Ok(())
    }

    #[test]
    fn missing_directory_fails_to_connect() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut source = DirectorySource::new(dir.path().join("absent"))?;
        assert!(source.connect().is_err());
        Ok(())
    }

    #[test]
    fn corrupt_image_is_a_read_failure() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("broken.jpg"), b"\xFF\xD8 nope")?;
        let mut source = DirectorySource::new(dir.path())?;
        source.connect()?;
        assert!(source.next_frame().is_err());
        assert!(!source.is_healthy());
        Ok(())
    }
}
