mod backend;
mod backends;
mod result;

use anyhow::Result;
use serde::Deserialize;

use crate::config::DetectionSettings;

pub use backend::ObjectDetector;
pub use backends::ScriptedDetector;
#[cfg(feature = "backend-tract")]
pub use backends::{tract::COCO_CLASSES, TractDetector};
pub use result::{BoundingBox, Detection, PERSON_CLASS};

/// Which detector backend the daemon builds at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    /// Replays a fixed demo script; pairs with `stub://` sources.
    Scripted,
    /// YOLOv8 ONNX model on tract (feature `backend-tract`).
    Tract,
}

impl DetectorKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "scripted" | "stub" => Some(DetectorKind::Scripted),
            "tract" | "onnx" | "yolo" => Some(DetectorKind::Tract),
            _ => None,
        }
    }
}

/// Build the configured detector backend.
pub fn build_detector(settings: &DetectionSettings) -> Result<Box<dyn ObjectDetector>> {
    match settings.backend {
        DetectorKind::Scripted => Ok(Box::new(ScriptedDetector::demo())),
        #[cfg(feature = "backend-tract")]
        DetectorKind::Tract => {
            let detector = TractDetector::new(&settings.model_path)?
                .with_threshold(settings.confidence_threshold);
            Ok(Box::new(detector))
        }
        #[cfg(not(feature = "backend-tract"))]
        DetectorKind::Tract => Err(anyhow::anyhow!(
            "detector backend 'tract' requires the backend-tract feature (model {})",
            settings.model_path.display()
        )),
    }
}
