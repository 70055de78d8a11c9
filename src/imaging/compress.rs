use std::path::Path;

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

use crate::error::PipelineError;

pub const BASE_QUALITY: u64 = 85;
pub const MIN_QUALITY: u8 = 20;
pub const MAX_QUALITY: u8 = 95;

/// What a compression pass did to the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionOutcome {
    WithinBudget { bytes: u64 },
    /// Re-encoded once. `after_bytes` may still exceed the budget.
    Reencoded {
        quality: u8,
        before_bytes: u64,
        after_bytes: u64,
    },
}

/// Quality for a single re-encode: `85 * max / current`, clamped to 20..=95.
pub fn estimate_quality(current_bytes: u64, max_bytes: u64) -> u8 {
    if current_bytes == 0 {
        return MAX_QUALITY;
    }
    let raw = BASE_QUALITY.saturating_mul(max_bytes) / current_bytes;
    raw.clamp(MIN_QUALITY as u64, MAX_QUALITY as u64) as u8
}

/// Shrinks a JPEG on disk toward a byte budget with one estimated re-encode.
#[derive(Clone, Debug)]
pub struct ImageCompressor {
    max_bytes: u64,
}

impl ImageCompressor {
    pub fn new(max_size_kb: u64) -> Self {
        Self {
            max_bytes: max_size_kb.saturating_mul(1024),
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn compress(&self, path: &Path) -> Result<CompressionOutcome, PipelineError> {
        self.compress_inner(path).map_err(|e| {
            PipelineError::storage(format!("compress {}: {:#}", path.display(), e))
        })
    }

    fn compress_inner(&self, path: &Path) -> Result<CompressionOutcome> {
        let before_bytes = file_size(path)?;
        if before_bytes <= self.max_bytes {
            return Ok(CompressionOutcome::WithinBudget {
                bytes: before_bytes,
            });
        }

        let quality = estimate_quality(before_bytes, self.max_bytes);
        let image = image::open(path)
            .with_context(|| format!("decode {}", path.display()))?
            .into_rgb8();
        write_jpeg(&image, path, quality)?;

        // Measured for the log line only; there is no second pass.
        let after_bytes = file_size(path)?;
        log::info!(
            "compressed {}: {:.1}KB -> {:.1}KB (quality {})",
            path.display(),
            before_bytes as f64 / 1024.0,
            after_bytes as f64 / 1024.0,
            quality
        );
        Ok(CompressionOutcome::Reencoded {
            quality,
            before_bytes,
            after_bytes,
        })
    }
}

pub(crate) fn write_jpeg(image: &RgbImage, path: &Path, quality: u8) -> Result<()> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .encode_image(image)
        .context("JPEG encode failed")?;
    std::fs::write(path, &buffer).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn file_size(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path)
        .with_context(|| format!("stat {}", path.display()))?
        .len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn noise(width: u32, height: u32) -> RgbImage {
        let mut state: u32 = 0x1234_5678;
        RgbImage::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let [a, b, c, _] = state.to_le_bytes();
            Rgb([a, b, c])
        })
    }

    #[test]
    fn quality_estimate_matches_documented_example() {
        assert_eq!(estimate_quality(500 * 1024, 200 * 1024), 34);
    }

    #[test]
    fn quality_estimate_is_clamped() {
        assert_eq!(estimate_quality(10_000 * 1024, 200 * 1024), MIN_QUALITY);
        assert_eq!(estimate_quality(201 * 1024, 200 * 1024), 84);
        assert_eq!(estimate_quality(1, 1_000), MAX_QUALITY);
    }

    #[test]
    fn small_files_are_left_alone() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("small.jpg");
        write_jpeg(&RgbImage::from_pixel(16, 16, Rgb([1, 2, 3])), &path, 85)?;
        let before = std::fs::read(&path)?;

        let outcome = ImageCompressor::new(200).compress(&path)?;
        assert!(matches!(outcome, CompressionOutcome::WithinBudget { .. }));
        assert_eq!(std::fs::read(&path)?, before);
        Ok(())
    }

    #[test]
    fn oversized_file_is_reencoded_exactly_once() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("noisy.jpg");
        write_jpeg(&noise(256, 256), &path, 95)?;
        let original = std::fs::metadata(&path)?.len();
        assert!(original > 1024);

        let outcome = ImageCompressor::new(1).compress(&path)?;
        match outcome {
            CompressionOutcome::Reencoded {
                quality,
                before_bytes,
                after_bytes,
            } => {
                assert_eq!(before_bytes, original);
                assert_eq!(quality, estimate_quality(original, 1024));
                assert_eq!(after_bytes, std::fs::metadata(&path)?.len());
                // One pass only: noise at the floor quality is still over 1KB.
                assert!(after_bytes > 1024);
            }
            other => panic!("expected a re-encode, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn missing_file_is_a_storage_error() {
        let err = ImageCompressor::new(1)
            .compress(Path::new("/nonexistent/event.jpg"))
            .unwrap_err();
        assert_eq!(err.kind(), "storage");
    }
}
