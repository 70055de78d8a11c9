//! Synthetic frame source (`stub://`).
//!
//! Produces moving-gradient RGB frames without any device. The URL query may
//! bound the run:
//! - `frames=N`: exhausted after N frames
//! - `fail_at=N`: the Nth read fails (simulates a device dropping out)

use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use url::Url;

use crate::frame::{Frame, FrameSource};

pub struct SyntheticSource {
    url: String,
    width: u32,
    height: u32,
    frame_limit: Option<u64>,
    fail_at: Option<u64>,
    frame_count: u64,
    /// Simulated scene state, bumped every 50 frames.
    scene_state: u8,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            url: "stub://synthetic".to_string(),
            width,
            height,
            frame_limit: None,
            fail_at: None,
            frame_count: 0,
            scene_state: 0,
            connected: false,
        }
    }

    pub fn from_url(url: &str, width: u32, height: u32) -> Result<Self> {
        let parsed = Url::parse(url).context("parse stub url")?;
        if parsed.scheme() != "stub" {
            return Err(anyhow!("synthetic source expects stub://, got '{}'", url));
        }
        let mut source = Self::new(width, height);
        source.url = url.to_string();
        for (key, value) in parsed.query_pairs() {
            let parsed_value = || {
                value
                    .parse::<u64>()
                    .map_err(|_| anyhow!("stub url parameter {}={} is not an integer", key, value))
            };
            match key.as_ref() {
                "frames" => source.frame_limit = Some(parsed_value()?),
                "fail_at" => source.fail_at = Some(parsed_value()?),
                other => return Err(anyhow!("unknown stub url parameter '{}'", other)),
            }
        }
        Ok(source)
    }

    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    fn generate_synthetic_image(&mut self) -> RgbImage {
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let shift = self.frame_count + self.scene_state as u64;
        RgbImage::from_fn(self.width, self.height, |x, y| {
            let base = x as u64 + y as u64 + shift;
            image::Rgb([
                (base % 256) as u8,
                ((base * 3) % 256) as u8,
                ((base * 7) % 256) as u8,
            ])
        })
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn connect(&mut self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(anyhow!(
                "synthetic source needs a non-zero resolution, got {}x{}",
                self.width,
                self.height
            ));
        }
        self.connected = true;
        log::info!("SyntheticSource: connected to {}", self.url);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("synthetic source not connected; call connect() first"));
        }
        if self.frame_limit.is_some_and(|limit| self.frame_count >= limit) {
            return Ok(None);
        }
        if self.fail_at.is_some_and(|n| self.frame_count + 1 == n) {
            self.connected = false;
            return Err(anyhow!("synthetic source dropped at frame {}", self.frame_count + 1));
        }

        self.frame_count += 1;
        let image = self.generate_synthetic_image();
        Ok(Some(Frame::new(self.frame_count, image)))
    }

    fn release(&mut self) {
        if self.connected {
            log::info!("SyntheticSource: released {}", self.url);
        }
        self.connected = false;
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}
