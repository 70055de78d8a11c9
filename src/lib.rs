//! Scene Watch
//!
//! This crate turns a stream of per-frame object detections into discrete,
//! rate-limited scene events and forwards each event, with an annotated and
//! size-bounded snapshot, to a remote collector over HTTP.
//!
//! # Architecture
//!
//! Data flows strictly downward:
//!
//! `FrameSource` → (sampled) `ObjectDetector` → `EventDetector` →
//! `ImageAnnotator` → `ImageCompressor` → `EventDispatcher`
//!
//! Only `EventDetector` keeps state across frames (previous detection set and
//! per-type cooldown clocks). Every other stage is a pure function of its
//! inputs or a one-shot side effect.
//!
//! # Module Structure
//!
//! - `frame`: Frame container and the `FrameSource` trait
//! - `ingest`: Frame sources (synthetic, image directory, HTTP MJPEG, V4L2)
//! - `detect`: Detection value types and `ObjectDetector` backends
//! - `events`: `EventDetector` and cooldown gating
//! - `imaging`: Annotation, compression and event image storage
//! - `dispatch`: Wire payload and the HTTP collector client
//! - `pipeline`: The sampling loop (`Orchestrator`)
//! - Core types: `EventType`, `Event`

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

pub mod clock;
pub mod config;
pub mod detect;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod frame;
pub mod imaging;
pub mod ingest;
pub mod pipeline;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use detect::{BoundingBox, Detection, ObjectDetector, ScriptedDetector, PERSON_CLASS};
pub use dispatch::{EventDispatcher, EventPayload, EventSink};
pub use error::PipelineError;
pub use events::{CooldownGate, EventDetector};
pub use frame::{Frame, FrameSource};
pub use imaging::{CompressionOutcome, EventImageStore, ImageAnnotator, ImageCompressor};
pub use ingest::{open_source, DirectorySource, MjpegSource, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use ingest::V4l2Source;
pub use pipeline::{LoopStats, Orchestrator, OrchestratorState, PipelineSettings, StopHandle};

// -------------------- Event Types --------------------

/// Closed set of semantic events the detector can emit.
///
/// Serialized in snake_case, which is the collector's wire vocabulary.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PersonEntered,
    PersonExited,
    ObjectPlaced,
    ObjectPicked,
    MultiplePeople,
}

impl EventType {
    pub const COUNT: usize = 5;

    pub const ALL: [EventType; EventType::COUNT] = [
        EventType::PersonEntered,
        EventType::PersonExited,
        EventType::ObjectPlaced,
        EventType::ObjectPicked,
        EventType::MultiplePeople,
    ];

    /// Dense index for fixed-size per-type tables.
    pub const fn index(self) -> usize {
        match self {
            EventType::PersonEntered => 0,
            EventType::PersonExited => 1,
            EventType::ObjectPlaced => 2,
            EventType::ObjectPicked => 3,
            EventType::MultiplePeople => 4,
        }
    }

    /// Wire name, also used in event image filenames.
    pub const fn as_str(self) -> &'static str {
        match self {
            EventType::PersonEntered => "person_entered",
            EventType::PersonExited => "person_exited",
            EventType::ObjectPlaced => "object_placed",
            EventType::ObjectPicked => "object_picked",
            EventType::MultiplePeople => "multiple_people",
        }
    }

    /// Fixed confidence attached to every event of this type.
    pub const fn confidence(self) -> f32 {
        match self {
            EventType::PersonEntered | EventType::PersonExited => 0.8,
            EventType::ObjectPlaced | EventType::ObjectPicked => 0.7,
            EventType::MultiplePeople => 0.9,
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let wanted = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|ty| ty.as_str() == wanted)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// -------------------- Events --------------------

/// A semantic, cooldown-gated occurrence derived from two detection sets.
#[derive(Clone, Debug)]
pub struct Event {
    pub event_type: EventType,
    pub description: String,
    /// Fixed per event type, never derived from detection confidences.
    pub confidence: f32,
    /// Monotonic instant of the `detect` call that produced this event.
    pub detected_at: Instant,
    pub duration: Option<Duration>,
}

impl Event {
    pub fn new(event_type: EventType, description: impl Into<String>, at: Instant) -> Self {
        Self {
            event_type,
            description: description.into(),
            confidence: event_type.confidence(),
            detected_at: at,
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_indexes_are_dense_and_unique() {
        for (i, ty) in EventType::ALL.iter().enumerate() {
            assert_eq!(ty.index(), i);
        }
    }

    #[test]
    fn event_type_serializes_as_wire_name() {
        let json = serde_json::to_string(&EventType::MultiplePeople).unwrap();
        assert_eq!(json, "\"multiple_people\"");
        for ty in EventType::ALL {
            let json = serde_json::to_string(&ty).unwrap();
            assert_eq!(json, format!("\"{}\"", ty.as_str()));
        }
    }

    #[test]
    fn event_type_parse_accepts_wire_names() {
        assert_eq!(EventType::parse("person_exited"), Some(EventType::PersonExited));
        assert_eq!(EventType::parse(" Object_Picked "), Some(EventType::ObjectPicked));
        assert_eq!(EventType::parse("loitering"), None);
    }

    #[test]
    fn event_confidence_is_fixed_per_type() {
        let ev = Event::new(EventType::ObjectPlaced, "New objects detected: cup", Instant::now());
        assert_eq!(ev.confidence, 0.7);
        assert!(ev.duration.is_none());
    }
}
