use chrono::{DateTime, Local, SecondsFormat};
use serde::{Deserialize, Serialize};

use crate::detect::Detection;
use crate::{Event, EventType};

/// Longest description the collector stores.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// JSON body of `POST /api/events/from-python`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    /// ISO-8601 wall time.
    pub timestamp: String,
    pub location: String,
    pub event_type: EventType,
    pub description: String,
    pub confidence: f32,
    pub bounding_boxes: Vec<WireBoundingBox>,
    pub metadata: EventMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireBoundingBox {
    pub object: String,
    pub confidence: f32,
    pub coordinates: Coordinates,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    pub objects_detected: Vec<String>,
    pub person_count: usize,
    /// Seconds; 0 when the event carries no duration.
    pub activity_duration: f64,
    pub camera_id: String,
}

impl EventPayload {
    /// Build the wire form of `event`, observed on camera `camera_index`
    /// together with the full detection set of its frame.
    pub fn new(
        event: &Event,
        detections: &[Detection],
        camera_index: u32,
        at: DateTime<Local>,
    ) -> Self {
        let bounding_boxes = detections
            .iter()
            .map(|d| WireBoundingBox {
                object: d.class_name.clone(),
                confidence: d.confidence,
                coordinates: Coordinates {
                    x: d.bbox.x1,
                    y: d.bbox.y1,
                    width: d.bbox.width(),
                    height: d.bbox.height(),
                },
            })
            .collect();

        Self {
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, false),
            location: format!("Camera-{}", camera_index),
            event_type: event.event_type,
            description: truncate_chars(&event.description, MAX_DESCRIPTION_CHARS),
            confidence: event.confidence,
            bounding_boxes,
            metadata: EventMetadata {
                objects_detected: detections.iter().map(|d| d.class_name.clone()).collect(),
                person_count: detections.iter().filter(|d| d.is_person()).count(),
                activity_duration: event.duration.map_or(0.0, |d| d.as_secs_f64()),
                camera_id: format!("cam-{:03}", camera_index),
            },
            image_base64: None,
            image_path: None,
        }
    }

    pub fn has_image(&self) -> bool {
        self.image_base64.is_some()
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}
