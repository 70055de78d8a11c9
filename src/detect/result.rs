use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Class label that the event rules treat as a person.
pub const PERSON_CLASS: &str = "person";

/// Axis-aligned box in pixel space, origin top-left.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from top-left corner plus size.
    pub fn from_xywh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new(x, y, x + width, y + height)
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let intersection = if x2 > x1 && y2 > y1 {
            (x2 - x1) * (y2 - y1)
        } else {
            0.0
        };
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    fn validate(&self) -> Result<()> {
        let coords = [self.x1, self.y1, self.x2, self.y2];
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(anyhow!("bounding box has non-finite coordinates"));
        }
        if self.x2 < self.x1 || self.y2 < self.y1 {
            return Err(anyhow!(
                "bounding box corners inverted: ({}, {}) -> ({}, {})",
                self.x1,
                self.y1,
                self.x2,
                self.y2
            ));
        }
        Ok(())
    }
}

/// One object-class prediction from a single frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_name: String,
    /// 0..=1
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_name: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_name: class_name.into(),
            confidence,
            bbox,
        }
    }

    pub fn is_person(&self) -> bool {
        self.class_name == PERSON_CLASS
    }

    /// Reject detector output that the event rules cannot reason about.
    pub fn validate(&self) -> Result<()> {
        if self.class_name.trim().is_empty() {
            return Err(anyhow!("detection has an empty class name"));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(anyhow!(
                "detection '{}' confidence {} outside 0..=1",
                self.class_name,
                self.confidence
            ));
        }
        self.bbox
            .validate()
            .map_err(|e| anyhow!("detection '{}': {}", self.class_name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_derives_width_and_height() {
        let b = BoundingBox::new(10.0, 20.0, 50.0, 80.0);
        assert_eq!(b.width(), 40.0);
        assert_eq!(b.height(), 60.0);
        assert_eq!(BoundingBox::from_xywh(10.0, 20.0, 40.0, 60.0), b);
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert!((b.iou(&b) - 1.0).abs() < 1e-6);
        let far = BoundingBox::new(100.0, 100.0, 110.0, 110.0);
        assert_eq!(b.iou(&far), 0.0);
    }

    #[test]
    fn validate_rejects_malformed_detections() {
        let ok = Detection::new("cup", 0.6, BoundingBox::new(0.0, 0.0, 5.0, 5.0));
        assert!(ok.validate().is_ok());

        let inverted = Detection::new("cup", 0.6, BoundingBox::new(5.0, 0.0, 1.0, 5.0));
        assert!(inverted.validate().is_err());

        let nan = Detection::new("cup", 0.6, BoundingBox::new(f32::NAN, 0.0, 1.0, 5.0));
        assert!(nan.validate().is_err());

        let overconfident = Detection::new("cup", 1.5, BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert!(overconfident.validate().is_err());

        let unnamed = Detection::new(" ", 0.5, BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert!(unnamed.validate().is_err());
    }
}
