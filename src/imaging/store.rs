use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use super::annotate::ImageAnnotator;
use super::compress::{write_jpeg, CompressionOutcome, ImageCompressor};
use crate::detect::Detection;
use crate::error::PipelineError;
use crate::frame::Frame;
use crate::EventType;

/// Writes annotated, size-bounded event snapshots into one directory.
#[derive(Clone, Debug)]
pub struct EventImageStore {
    dir: PathBuf,
    quality: u8,
    annotator: ImageAnnotator,
    compressor: ImageCompressor,
}

impl EventImageStore {
    /// Create the store, creating `dir` (and parents) if needed.
    pub fn new(dir: impl Into<PathBuf>, quality: u8, max_size_kb: u64) -> Result<Self, PipelineError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            PipelineError::storage(format!("create image dir {}: {}", dir.display(), e))
        })?;
        log::info!("event images go to {}", dir.display());
        Ok(Self {
            dir,
            quality,
            annotator: ImageAnnotator::new(),
            compressor: ImageCompressor::new(max_size_kb),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `event_{YYYYMMDD_HHMMSS}_{event_type}.jpg`
    pub fn file_name(event_type: EventType, at: DateTime<Local>) -> String {
        format!("event_{}_{}.jpg", at.format("%Y%m%d_%H%M%S"), event_type.as_str())
    }

    /// Annotate, write and compress one event snapshot.
    pub fn save(
        &self,
        frame: &Frame,
        detections: &[Detection],
        event_type: EventType,
        at: DateTime<Local>,
    ) -> Result<PathBuf, PipelineError> {
        let path = self.dir.join(Self::file_name(event_type, at));
        let annotated = self.annotator.annotate(frame, detections, at);
        write_jpeg(&annotated, &path, self.quality)
            .map_err(|e| PipelineError::storage(format!("{:#}", e)))?;

        self.compress_or_discard(&path)?;
        log::info!("saved event image {}", path.display());
        Ok(path)
    }

    /// Compress a freshly written snapshot. On failure the file is removed so
    /// no uncompressed image outlives an event sent without it.
    fn compress_or_discard(&self, path: &Path) -> Result<(), PipelineError> {
        match self.compressor.compress(path) {
            Ok(CompressionOutcome::WithinBudget { bytes }) => {
                log::debug!("{} is {} bytes, within budget", path.display(), bytes);
                Ok(())
            }
            Ok(CompressionOutcome::Reencoded { .. }) => Ok(()),
            Err(err) => {
                if let Err(remove_err) = std::fs::remove_file(path) {
                    log::warn!(
                        "uncompressed image {} left behind: {}",
                        path.display(),
                        remove_err
                    );
                }
                Err(err)
            }
        }
    }
}
