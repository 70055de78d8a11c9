//! Frame ingestion sources.
//!
//! This module provides different sources for frames:
//! - Synthetic frames (`stub://name`, testing and demos)
//! - Image directory replay (a local directory of JPEG/PNG files)
//! - HTTP MJPEG/JPEG cameras (`http(s)://`)
//! - USB/V4L2 devices (`/dev/video*`, feature: ingest-v4l2)
//!
//! All sources produce `Frame` instances consumed by the sampling loop.
//! The ingestion layer is responsible for:
//! - Decoding into packed RGB24
//! - Frame decimation to the configured FPS where the transport is push-based
//! - Reporting exhaustion (`Ok(None)`) separately from failure (`Err`)
//!
//! The ingestion layer MUST NOT:
//! - Store frames to disk
//! - Retain frames beyond handoff to the loop

pub mod directory;
pub mod mjpeg;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

use anyhow::{anyhow, Result};
use std::path::Path;
use std::time::Duration;

use crate::config::CameraSettings;
use crate::frame::FrameSource;

pub use directory::DirectorySource;
pub use mjpeg::MjpegSource;
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;

/// Select a frame source from the configured source string.
///
/// - `stub://...` → `SyntheticSource`
/// - `http://...` / `https://...` → `MjpegSource`
/// - an existing directory → `DirectorySource`
/// - anything else is treated as a V4L2 device node
pub fn open_source(settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    let source = settings.source.trim();
    if source.is_empty() {
        return Err(anyhow!("camera source is empty"));
    }
    if source.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::from_url(
            source,
            settings.width,
            settings.height,
        )?));
    }
    if source.starts_with("http://") || source.starts_with("https://") {
        return Ok(Box::new(MjpegSource::new(source, settings.fps)?));
    }
    if source.contains("://") {
        return Err(anyhow!("unsupported camera source scheme in '{}'", source));
    }
    let path = Path::new(source);
    if path.is_dir() {
        return Ok(Box::new(DirectorySource::new(path)?));
    }
    open_device(source, settings)
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(device: &str, settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    let config = v4l2::V4l2Config {
        device: device.to_string(),
        target_fps: settings.fps,
        width: settings.width,
        height: settings.height,
    };
    Ok(Box::new(V4l2Source::new(config)))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(device: &str, _settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    Err(anyhow!(
        "camera device {} requires the ingest-v4l2 feature",
        device
    ))
}

/// Minimum spacing between delivered frames for a target rate.
pub(crate) fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}

/// How long a source may go without a frame before it reports unhealthy.
pub(crate) fn health_grace(target_fps: u32) -> Duration {
    let base_ms = if target_fps == 0 {
        2_000
    } else {
        (1000 / target_fps).saturating_mul(6)
    };
    Duration::from_millis(base_ms.max(2_000) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(source: &str) -> CameraSettings {
        CameraSettings {
            index: 0,
            width: 32,
            height: 24,
            fps: 30,
            source: source.to_string(),
        }
    }

    #[test]
    fn stub_sources_are_synthetic() -> Result<()> {
        let source = open_source(&camera("stub://front"))?;
        assert_eq!(source.describe(), "stub://front");
        Ok(())
    }

    #[test]
    fn directories_are_replayed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().to_string_lossy().to_string();
        let source = open_source(&camera(&path))?;
        assert!(source.describe().starts_with("dir:"));
        Ok(())
    }

    #[test]
    fn unknown_schemes_are_rejected() {
        assert!(open_source(&camera("rtsp://cam/stream")).is_err());
        assert!(open_source(&camera("  ")).is_err());
    }

    #[test]
    fn pacing_helpers_bound_intervals() {
        assert_eq!(frame_interval(0), Duration::ZERO);
        assert_eq!(frame_interval(10), Duration::from_millis(100));
        assert_eq!(health_grace(30), Duration::from_millis(2_000));
        assert_eq!(health_grace(1), Duration::from_millis(6_000));
    }
}
