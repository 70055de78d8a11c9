use anyhow::Result;

use crate::detect::backend::ObjectDetector;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Detector that replays a fixed script of detection sets, one per call,
/// wrapping around at the end. Pixels are ignored.
///
/// Used with `stub://` sources for demos and by tests that need exact
/// control over what the event rules see.
pub struct ScriptedDetector {
    script: Vec<Vec<Detection>>,
    cursor: usize,
}

impl ScriptedDetector {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self { script, cursor: 0 }
    }

    /// A short scene: someone walks in, puts a cup down, two friends join,
    /// everybody leaves with the cup.
    pub fn demo() -> Self {
        let person = |x: f32| {
            Detection::new("person", 0.88, BoundingBox::new(x, 120.0, x + 90.0, 400.0))
        };
        let cup = Detection::new("cup", 0.71, BoundingBox::new(300.0, 330.0, 340.0, 380.0));
        Self::new(vec![
            vec![],
            vec![person(60.0)],
            vec![person(70.0), cup.clone()],
            vec![person(70.0), person(200.0), person(420.0), cup.clone()],
            vec![person(80.0), cup],
            vec![],
        ])
    }

    pub fn calls(&self) -> usize {
        self.cursor
    }
}

impl Default for ScriptedDetector {
    fn default() -> Self {
        Self::demo()
    }
}

impl ObjectDetector for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        if self.script.is_empty() {
            return Ok(Vec::new());
        }
        let step = self.script[self.cursor % self.script.len()].clone();
        self.cursor += 1;
        Ok(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn scripted_detector_cycles_through_script() {
        let frame = Frame::new(1, RgbImage::new(4, 4));
        let cup = Detection::new("cup", 0.5, BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        let mut detector = ScriptedDetector::new(vec![vec![], vec![cup.clone()]]);

        assert!(detector.detect(&frame).unwrap().is_empty());
        assert_eq!(detector.detect(&frame).unwrap(), vec![cup]);
        assert!(detector.detect(&frame).unwrap().is_empty());
        assert_eq!(detector.calls(), 3);
    }

    #[test]
    fn empty_script_detects_nothing() {
        let frame = Frame::new(1, RgbImage::new(4, 4));
        let mut detector = ScriptedDetector::new(Vec::new());
        assert!(detector.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn demo_script_outputs_are_valid() {
        let frame = Frame::new(1, RgbImage::new(4, 4));
        let mut detector = ScriptedDetector::demo();
        for _ in 0..6 {
            for det in detector.detect(&frame).unwrap() {
                det.validate().unwrap();
            }
        }
    }
}
