//! collector_probe - check that the event collector is reachable.
//!
//! Runs the same health check the daemon runs at startup and can optionally
//! post one test event, with an image if given.

use anyhow::{anyhow, Result};
use chrono::Local;
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

use scene_watch::config::Config;
use scene_watch::{Event, EventDispatcher, EventPayload, EventSink, EventType};

#[derive(Parser, Debug)]
#[command(author, version, about = "Probe the scene event collector")]
struct Args {
    /// Collector base URL; defaults to the configured one.
    #[arg(long, env = "NODEJS_API_URL")]
    api_url: Option<String>,

    /// Also post one test event.
    #[arg(long)]
    send_test_event: bool,

    /// Event type of the test event.
    #[arg(long, default_value = "person_entered")]
    event_type: String,

    /// JPEG to embed in the test event.
    #[arg(long)]
    image: Option<PathBuf>,

    /// Camera index reported in the test event.
    #[arg(long, default_value_t = 0)]
    camera_index: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let base_url = match args.api_url {
        Some(url) => url,
        None => Config::load()?.api.base_url,
    };
    let dispatcher = EventDispatcher::new(&base_url);

    if !dispatcher.health_check() {
        return Err(anyhow!("collector at {} is not healthy", dispatcher.base_url()));
    }

    if args.send_test_event {
        let event_type = EventType::parse(&args.event_type)
            .ok_or_else(|| anyhow!("unknown event type '{}'", args.event_type))?;
        let event = Event::new(
            event_type,
            format!("Test event from collector_probe ({})", event_type),
            Instant::now(),
        );
        let payload = EventPayload::new(&event, &[], args.camera_index, Local::now());
        if !dispatcher.send(payload, args.image.as_deref()) {
            return Err(anyhow!("collector rejected the test event"));
        }
        println!("test event accepted by {}", dispatcher.events_url());
    } else {
        println!("collector at {} is healthy", dispatcher.base_url());
    }
    Ok(())
}
