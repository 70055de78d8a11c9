use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::detect::DetectorKind;
use crate::error::PipelineError;

const DEFAULT_CAMERA_INDEX: u32 = 0;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_MODEL_PATH: &str = "./saved_models/yolov8n.onnx";
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);
const DEFAULT_SAMPLE_EVERY_N_FRAMES: u64 = 5;
const DEFAULT_IMAGE_SAVE_PATH: &str = "../uploads/events/";
const DEFAULT_IMAGE_QUALITY: u8 = 85;
const DEFAULT_MAX_IMAGE_SIZE_KB: u64 = 200;
const DEFAULT_API_URL: &str = "http://localhost:5000";
const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable naming an optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "SCENE_WATCH_CONFIG";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    log_level: Option<String>,
    camera: Option<CameraConfigFile>,
    detection: Option<DetectionConfigFile>,
    events: Option<EventsConfigFile>,
    images: Option<ImagesConfigFile>,
    api: Option<ApiConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    index: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    source: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectionConfigFile {
    confidence_threshold: Option<f32>,
    model_path: Option<PathBuf>,
    backend: Option<DetectorKind>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct EventsConfigFile {
    cooldown_seconds: Option<f64>,
    sample_every_n_frames: Option<u64>,
    concurrent_dispatch: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ImagesConfigFile {
    save_path: Option<PathBuf>,
    quality: Option<u8>,
    max_size_kb: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ApiConfigFile {
    base_url: Option<String>,
}

/// Fully resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub camera: CameraSettings,
    pub detection: DetectionSettings,
    pub events: EventSettings,
    pub images: ImageSettings,
    pub api: ApiSettings,
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// `stub://...`, `http(s)://...`, an image directory or a device node.
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub confidence_threshold: f32,
    pub model_path: PathBuf,
    pub backend: DetectorKind,
}

#[derive(Debug, Clone)]
pub struct EventSettings {
    pub cooldown: Duration,
    pub sample_every_n_frames: u64,
    pub concurrent_dispatch: bool,
}

#[derive(Debug, Clone)]
pub struct ImageSettings {
    pub save_path: PathBuf,
    pub quality: u8,
    pub max_size_kb: u64,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        let mut cfg = Self::assemble(ConfigFile::default(), DEFAULT_COOLDOWN);
        cfg.resolve_camera_source();
        cfg
    }
}

impl Config {
    /// Defaults, then `$SCENE_WATCH_CONFIG`, then environment overrides.
    pub fn load() -> Result<Self, PipelineError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Same as `load`, with an explicit config file taking the place of
    /// `$SCENE_WATCH_CONFIG`.
    pub fn load_from(path: Option<&Path>) -> Result<Self, PipelineError> {
        Self::load_inner(path).map_err(|e| PipelineError::Config(format!("{:#}", e)))
    }

    fn load_inner(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => ConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.resolve_camera_source();
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConfigFile) -> Result<Self> {
        let cooldown = match file.events.as_ref().and_then(|e| e.cooldown_seconds) {
            Some(seconds) => cooldown_from_secs(seconds, "events.cooldown_seconds")?,
            None => DEFAULT_COOLDOWN,
        };
        Ok(Self::assemble(file, cooldown))
    }

    fn assemble(file: ConfigFile, cooldown: Duration) -> Self {
        let camera = file.camera.unwrap_or_default();
        let detection = file.detection.unwrap_or_default();
        let events = file.events.unwrap_or_default();
        let images = file.images.unwrap_or_default();
        let api = file.api.unwrap_or_default();

        Self {
            camera: CameraSettings {
                index: camera.index.unwrap_or(DEFAULT_CAMERA_INDEX),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                fps: camera.fps.unwrap_or(DEFAULT_CAMERA_FPS),
                // Resolved from the index once env overrides are in.
                source: camera.source.unwrap_or_default(),
            },
            detection: DetectionSettings {
                confidence_threshold: detection
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                model_path: detection
                    .model_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                backend: detection.backend.unwrap_or(DetectorKind::Scripted),
            },
            events: EventSettings {
                cooldown,
                sample_every_n_frames: events
                    .sample_every_n_frames
                    .unwrap_or(DEFAULT_SAMPLE_EVERY_N_FRAMES),
                concurrent_dispatch: events.concurrent_dispatch.unwrap_or(false),
            },
            images: ImageSettings {
                save_path: images
                    .save_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE_SAVE_PATH)),
                quality: images.quality.unwrap_or(DEFAULT_IMAGE_QUALITY),
                max_size_kb: images.max_size_kb.unwrap_or(DEFAULT_MAX_IMAGE_SIZE_KB),
            },
            api: ApiSettings {
                base_url: api.base_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            },
            log_level: file
                .log_level
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(index) = env_parse("CAMERA_INDEX")? {
            self.camera.index = index;
        }
        if let Some(width) = env_parse("CAMERA_WIDTH")? {
            self.camera.width = width;
        }
        if let Some(height) = env_parse("CAMERA_HEIGHT")? {
            self.camera.height = height;
        }
        if let Some(fps) = env_parse("CAMERA_FPS")? {
            self.camera.fps = fps;
        }
        if let Some(source) = env_string("CAMERA_SOURCE") {
            self.camera.source = source;
        }
        if let Some(threshold) = env_parse("CONFIDENCE_THRESHOLD")? {
            self.detection.confidence_threshold = threshold;
        }
        if let Some(path) = env_string("MODEL_PATH") {
            self.detection.model_path = PathBuf::from(path);
        }
        if let Some(backend) = env_string("DETECTOR_BACKEND") {
            self.detection.backend = DetectorKind::parse(&backend)
                .ok_or_else(|| anyhow!("DETECTOR_BACKEND '{}' is not a known backend", backend))?;
        }
        if let Some(url) = env_string("NODEJS_API_URL") {
            self.api.base_url = url;
        }
        if let Some(path) = env_string("IMAGE_SAVE_PATH") {
            self.images.save_path = PathBuf::from(path);
        }
        if let Some(quality) = env_parse("IMAGE_QUALITY")? {
            self.images.quality = quality;
        }
        if let Some(max_kb) = env_parse("MAX_IMAGE_SIZE_KB")? {
            self.images.max_size_kb = max_kb;
        }
        if let Some(seconds) = env_parse::<f64>("EVENT_COOLDOWN_SECONDS")? {
            self.events.cooldown = cooldown_from_secs(seconds, "EVENT_COOLDOWN_SECONDS")?;
        }
        if let Some(n) = env_parse("PROCESS_EVERY_N_FRAMES")? {
            self.events.sample_every_n_frames = n;
        }
        if let Some(level) = env_string("LOG_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    fn resolve_camera_source(&mut self) {
        if self.camera.source.trim().is_empty() {
            self.camera.source = format!("/dev/video{}", self.camera.index);
        }
    }

    fn validate(&mut self) -> Result<()> {
        if self.events.sample_every_n_frames == 0 {
            return Err(anyhow!("sample interval (PROCESS_EVERY_N_FRAMES) must be at least 1"));
        }
        let threshold = self.detection.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!(
                "confidence threshold must be within [0, 1], got {}",
                threshold
            ));
        }
        if !(1..=100).contains(&self.images.quality) {
            return Err(anyhow!(
                "image quality must be within [1, 100], got {}",
                self.images.quality
            ));
        }
        if self.images.max_size_kb == 0 {
            return Err(anyhow!("max image size must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!(
                "camera resolution must be non-zero, got {}x{}",
                self.camera.width,
                self.camera.height
            ));
        }

        let base = self.api.base_url.trim().trim_end_matches('/');
        let url = url::Url::parse(base)
            .with_context(|| format!("invalid API url '{}'", self.api.base_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "API url must use http or https, got '{}'",
                url.scheme()
            ));
        }
        self.api.base_url = base.to_string();
        self.log_level = self.log_level.trim().to_lowercase();
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env_string(name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} has malformed value '{}'", name, raw)),
        None => Ok(None),
    }
}

/// Cooldowns must be finite and non-negative wherever they come from.
fn cooldown_from_secs(seconds: f64, origin: &str) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds).map_err(|_| {
        anyhow!(
            "{} must be a non-negative number of seconds, got {}",
            origin,
            seconds
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.camera.source, "/dev/video0");
        assert_eq!((cfg.camera.width, cfg.camera.height, cfg.camera.fps), (640, 480, 30));
        assert_eq!(cfg.detection.confidence_threshold, 0.5);
        assert_eq!(cfg.events.cooldown, Duration::from_secs(5));
        assert_eq!(cfg.events.sample_every_n_frames, 5);
        assert_eq!(cfg.images.quality, 85);
        assert_eq!(cfg.images.max_size_kb, 200);
        assert_eq!(cfg.api.base_url, "http://localhost:5000");
        assert!(!cfg.events.concurrent_dispatch);
    }

    #[test]
    fn validate_rejects_zero_sample_interval() {
        let mut cfg = Config::default();
        cfg.events.sample_every_n_frames = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_trims_trailing_slash_from_api_url() -> Result<()> {
        let mut cfg = Config::default();
        cfg.api.base_url = "http://collector:5000/".to_string();
        cfg.validate()?;
        assert_eq!(cfg.api.base_url, "http://collector:5000");

        cfg.api.base_url = "ftp://collector".to_string();
        assert!(cfg.validate().is_err());
        Ok(())
    }

    #[test]
    fn cooldown_seconds_must_be_finite_and_non_negative() -> Result<()> {
        assert_eq!(cooldown_from_secs(0.25, "cooldown")?, Duration::from_millis(250));
        assert_eq!(cooldown_from_secs(0.0, "cooldown")?, Duration::ZERO);
        assert!(cooldown_from_secs(-1.0, "cooldown").is_err());
        assert!(cooldown_from_secs(f64::NAN, "cooldown").is_err());
        assert!(cooldown_from_secs(f64::INFINITY, "cooldown").is_err());
        Ok(())
    }

    #[test]
    fn negative_cooldown_in_file_is_rejected() {
        let file: ConfigFile = toml::from_str("[events]\ncooldown_seconds = -2.5\n")
            .expect("valid toml");
        let err = Config::from_file(file).unwrap_err();
        assert!(format!("{:#}", err).contains("events.cooldown_seconds"));
    }
}
