use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Object detector capability.
///
/// Implementations receive a borrowed frame and return every detection they
/// found, in frame pixel coordinates. They must not retain the frame past the
/// call. An `Err` is treated as a per-frame detection failure: the frame is
/// skipped and the loop continues.
pub trait ObjectDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
