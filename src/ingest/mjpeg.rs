//! HTTP camera source.
//!
//! This module provides `MjpegSource` for IP cameras that serve either a
//! `multipart/x-mixed-replace` MJPEG stream or single JPEG snapshots over
//! HTTP. The response `Content-Type` decides which mode is used.
//!
//! JPEG frames are decoded in-memory to RGB24 and decimated to the target
//! frame rate.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::{Duration, Instant};

use url::Url;

use super::{frame_interval, health_grace};
use crate::frame::{Frame, FrameSource};

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(10);

pub struct MjpegSource {
    url: String,
    target_fps: u32,
    agent: ureq::Agent,
    stream: Option<HttpStream>,
    last_frame_at: Option<Instant>,
    connected_at: Option<Instant>,
    frame_count: u64,
    last_error: Option<String>,
}

enum HttpStream {
    Multipart(MultipartStream),
    Snapshot,
}

impl MjpegSource {
    pub fn new(url: &str, target_fps: u32) -> Result<Self> {
        let parsed = Url::parse(url).context("parse camera url")?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!(
                "unsupported camera scheme '{}'; expected http(s)",
                parsed.scheme()
            ));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build();
        Ok(Self {
            url: url.to_string(),
            target_fps,
            agent,
            stream: None,
            last_frame_at: None,
            connected_at: None,
            frame_count: 0,
            last_error: None,
        })
    }

    fn fetch_snapshot(&self) -> Result<Vec<u8>> {
        let response = self
            .agent
            .get(&self.url)
            .call()
            .with_context(|| format!("fetch jpeg snapshot from {}", self.url))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_JPEG_BYTES as u64)
            .read_to_end(&mut bytes)
            .context("read jpeg snapshot")?;
        if bytes.is_empty() {
            return Err(anyhow!("empty jpeg snapshot"));
        }
        Ok(bytes)
    }

    fn read_jpeg(&mut self) -> Result<Vec<u8>> {
        match self.stream.as_mut() {
            Some(HttpStream::Multipart(stream)) => stream.read_next_jpeg(),
            Some(HttpStream::Snapshot) => self.fetch_snapshot(),
            None => Err(anyhow!("http camera not connected; call connect() first")),
        }
    }
}

impl FrameSource for MjpegSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    fn connect(&mut self) -> Result<()> {
        let response = self
            .agent
            .get(&self.url)
            .call()
            .with_context(|| format!("connect to http camera {}", self.url))?;
        let content_type = response.header("Content-Type").unwrap_or("");
        if content_type.to_lowercase().contains("multipart") {
            let reader = response.into_reader();
            self.stream = Some(HttpStream::Multipart(MultipartStream::new(reader)));
            log::info!("MjpegSource: streaming multipart from {}", self.url);
        } else {
            self.stream = Some(HttpStream::Snapshot);
            log::info!("MjpegSource: polling snapshots from {}", self.url);
        }
        self.connected_at = Some(Instant::now());
        self.last_error = None;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let min_interval = frame_interval(self.target_fps);
        loop {
            let jpeg_bytes = self.read_jpeg().map_err(|err| {
                self.last_error = Some(err.to_string());
                err
            })?;

            let now = Instant::now();
            if let Some(last) = self.last_frame_at {
                if now.duration_since(last) < min_interval {
                    continue;
                }
            }

            let image = image::load_from_memory(&jpeg_bytes)
                .context("decode jpeg")?
                .into_rgb8();
            self.frame_count += 1;
            self.last_frame_at = Some(now);
            return Ok(Some(Frame::new(self.frame_count, image)));
        }
    }

    fn release(&mut self) {
        self.stream = None;
        self.connected_at = None;
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        let Some(last_frame_at) = self.last_frame_at else {
            return connected_at.elapsed() <= Duration::from_secs(5);
        };
        last_frame_at.elapsed() <= health_grace(self.target_fps)
    }

    fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

struct MultipartStream {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl MultipartStream {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    fn read_next_jpeg(&mut self) -> Result<Vec<u8>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(frame);
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Err(anyhow!("mjpeg stream ended"));
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            // Keep the tail so a marker split across reads still matches.
            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let drain_len = self.buffer.len() - 2;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

/// Locate the first complete SOI..EOI span in `buffer`.
fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}
