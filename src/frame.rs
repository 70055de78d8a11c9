//! Frame container and the frame source contract.
//!
//! - `Frame`: one captured RGB image plus its sequence index.
//! - `FrameSource`: anything that yields frames until it is exhausted or fails.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::time::Instant;

/// A captured frame. Owned by the loop iteration that read it; detectors and
/// the annotator only ever borrow it.
#[derive(Clone, Debug)]
pub struct Frame {
    /// 1-based sequence number assigned by the source.
    pub index: u64,
    image: RgbImage,
    captured_at: Instant,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self {
            index,
            image,
            captured_at: Instant::now(),
        }
    }

    /// Wrap a packed RGB24 buffer.
    pub fn from_rgb(index: u64, width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                data.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("failed to wrap {}x{} RGB buffer", width, height))?;
        Ok(Self::new(index, image))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}

/// Frame source contract.
///
/// `next_frame` returns `Ok(None)` once the source is exhausted and `Err` when
/// it fails; both stop the loop. `release` must be idempotent.
pub trait FrameSource: Send {
    /// Human-readable source identifier for logs.
    fn describe(&self) -> String;

    /// Open the underlying device or stream. Failure here is fatal at startup.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Close the device or stream.
    fn release(&mut self);

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool;

    /// Frames handed out so far.
    fn frames_captured(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_checks_buffer_length() {
        assert!(Frame::from_rgb(1, 4, 2, vec![0u8; 4 * 2 * 3]).is_ok());
        assert!(Frame::from_rgb(1, 4, 2, vec![0u8; 5]).is_err());
    }

    #[test]
    fn frame_reports_dimensions() {
        let frame = Frame::from_rgb(7, 6, 3, vec![10u8; 6 * 3 * 3]).unwrap();
        assert_eq!(frame.index, 7);
        assert_eq!(frame.width(), 6);
        assert_eq!(frame.height(), 3);
        assert_eq!(frame.image().get_pixel(5, 2).0, [10, 10, 10]);
    }
}
