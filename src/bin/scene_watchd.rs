//! scene_watchd - camera scene event daemon
//!
//! This daemon:
//! 1. Loads configuration (defaults, TOML file, environment, CLI flags)
//! 2. Opens the configured frame source and detector backend
//! 3. Samples every Nth frame through the detector and event rules
//! 4. Saves an annotated snapshot per event and posts it to the collector
//! 5. Stops on Ctrl-C, source exhaustion or source failure

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use scene_watch::config::{Config, CONFIG_PATH_ENV};
use scene_watch::detect::{build_detector, DetectorKind};
use scene_watch::{
    open_source, EventDispatcher, EventImageStore, Orchestrator, PipelineError, PipelineSettings,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Turn camera detections into collector events")]
struct Args {
    /// TOML config file.
    #[arg(long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Frame source: stub://name, http(s)://camera, an image directory or a device node.
    #[arg(long)]
    camera_source: Option<String>,

    /// Collector base URL.
    #[arg(long)]
    api_url: Option<String>,

    /// Detector backend: 'scripted' or 'tract'.
    #[arg(long)]
    detector: Option<String>,

    /// Log filter; overrides RUST_LOG and the configured level.
    #[arg(long)]
    log_level: Option<String>,

    /// Do not probe the collector before starting.
    #[arg(long)]
    skip_health_check: bool,

    /// Stop after reading this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let loaded = Config::load_from(args.config.as_deref());
    init_logging(args.log_level.as_deref(), loaded.as_ref().ok());
    let mut cfg = loaded?;

    if let Some(source) = args.camera_source {
        cfg.camera.source = source;
    }
    if let Some(url) = args.api_url {
        cfg.api.base_url = url;
    }
    if let Some(detector) = args.detector.as_deref() {
        cfg.detection.backend = DetectorKind::parse(detector).ok_or_else(|| {
            PipelineError::Config(format!("unknown detector backend '{}'", detector))
        })?;
    }

    log::info!(
        "scene_watchd {} starting: camera {} ({}x{} @ {} fps) -> {}",
        env!("CARGO_PKG_VERSION"),
        cfg.camera.source,
        cfg.camera.width,
        cfg.camera.height,
        cfg.camera.fps,
        cfg.api.base_url
    );

    let source = open_source(&cfg.camera)
        .map_err(|e| PipelineError::Device(format!("{}: {:#}", cfg.camera.source, e)))?;
    let detector = build_detector(&cfg.detection).context("build detector backend")?;
    let store = match EventImageStore::new(
        &cfg.images.save_path,
        cfg.images.quality,
        cfg.images.max_size_kb,
    ) {
        Ok(store) => Some(store),
        Err(err) => {
            log::error!("{}; events will be sent without images", err);
            None
        }
    };
    let sink = EventDispatcher::new(&cfg.api.base_url);

    let mut settings = PipelineSettings::from_config(&cfg);
    settings.max_frames = args.max_frames;
    settings.skip_health_check = args.skip_health_check;

    let mut orchestrator =
        Orchestrator::new(settings, source, detector, store, Box::new(sink));
    let stop = orchestrator.stop_handle();
    ctrlc::set_handler(move || {
        log::info!("interrupt received, stopping after the current frame");
        stop.stop();
    })
    .context("install Ctrl-C handler")?;

    let stats = orchestrator.run()?;
    log::info!(
        "scene_watchd done: {} frames read, {} events, {} delivered",
        stats.frames_read,
        stats.events_emitted,
        stats.dispatch_ok
    );
    Ok(())
}

/// `--log-level` wins, then `RUST_LOG`, then the configured level.
fn init_logging(cli_level: Option<&str>, cfg: Option<&Config>) {
    match cli_level {
        Some(level) => env_logger::Builder::new().parse_filters(level).init(),
        None => {
            let fallback = cfg.map_or("info", |c| c.log_level.as_str());
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(fallback))
                .init()
        }
    }
}
