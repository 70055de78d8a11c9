//! Event delivery to the remote collector.

mod client;
mod payload;

use std::path::Path;

pub use client::{EventDispatcher, EVENTS_PATH, HEALTH_TIMEOUT, SEND_TIMEOUT};
pub use payload::{
    Coordinates, EventMetadata, EventPayload, WireBoundingBox, MAX_DESCRIPTION_CHARS,
};

/// Where the loop hands finished events.
///
/// `send` never fails loudly: the boolean is the whole outcome. Sinks must
/// tolerate concurrent `send` calls for events of the same frame.
pub trait EventSink: Send + Sync {
    /// Deliver one event, embedding the image at `image_path` if readable.
    fn send(&self, payload: EventPayload, image_path: Option<&Path>) -> bool;

    /// One-shot startup reachability probe.
    fn health_check(&self) -> bool {
        true
    }
}
