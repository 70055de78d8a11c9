#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::ObjectDetector;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const MAX_DETECTIONS: usize = 100;

/// COCO label set used by the stock YOLOv8 exports.
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// YOLOv8 ONNX detector running on tract.
///
/// Loads a local model file once and runs inference on RGB frames. Expects the
/// `[1, 4 + classes, anchors]` output layout with `cx, cy, w, h` in input
/// pixel units followed by per-class scores.
pub struct TractDetector {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl TractDetector {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        Self::with_input_size(model_path, DEFAULT_INPUT_SIZE)
    }

    pub fn with_input_size<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            confidence_threshold: 0.5,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let size = self.input_size;
        let resized = imageops::resize(frame.image(), size, size, FilterType::Triangle);
        let side = size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output is not [batch, attrs, anchors]")?;

        let attrs = view.shape()[1];
        if attrs < 5 {
            return Err(anyhow!("model output has {} attributes per anchor", attrs));
        }
        let classes = (attrs - 4).min(COCO_CLASSES.len());
        let anchors = view.shape()[2];
        let scale_x = frame.width() as f32 / self.input_size as f32;
        let scale_y = frame.height() as f32 / self.input_size as f32;
        let max_x = frame.width() as f32;
        let max_y = frame.height() as f32;

        let mut candidates = Vec::new();
        for i in 0..anchors {
            let (class_id, score) = (0..classes)
                .map(|c| (c, view[[0, 4 + c, i]]))
                .fold((0, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score < self.confidence_threshold {
                continue;
            }

            let cx = view[[0, 0, i]];
            let cy = view[[0, 1, i]];
            let w = view[[0, 2, i]];
            let h = view[[0, 3, i]];
            let bbox = BoundingBox::new(
                ((cx - w / 2.0) * scale_x).clamp(0.0, max_x),
                ((cy - h / 2.0) * scale_y).clamp(0.0, max_y),
                ((cx + w / 2.0) * scale_x).clamp(0.0, max_x),
                ((cy + h / 2.0) * scale_y).clamp(0.0, max_y),
            );
            candidates.push(Detection::new(COCO_CLASSES[class_id], score.min(1.0), bbox));
        }

        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

/// Greedy per-class NMS, highest score first.
fn non_max_suppression(mut boxes: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    boxes.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in boxes {
        let suppressed = keep.iter().any(|kept| {
            kept.class_name == candidate.class_name
                && kept.bbox.iou(&candidate.bbox) >= iou_threshold
        });
        if !suppressed {
            keep.push(candidate);
            if keep.len() == MAX_DETECTIONS {
                break;
            }
        }
    }
    keep
}

impl ObjectDetector for TractDetector {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame)
    }
}
