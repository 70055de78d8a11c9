use chrono::{DateTime, Local};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use super::font::{draw_text, text_size};
use crate::detect::Detection;
use crate::frame::Frame;

const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: u32 = 1;
const LABEL_PADDING: i32 = 10;
const LABEL_BASELINE_OFFSET: i32 = 5;
const TIMESTAMP_SCALE: u32 = 2;
const TIMESTAMP_ORIGIN: (i32, i32) = (10, 30);
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const LABEL_TEXT: Rgb<u8> = Rgb([255, 255, 255]);
const TIMESTAMP_TEXT: Rgb<u8> = Rgb([0, 255, 0]);
const UNKNOWN_CLASS: Rgb<u8> = Rgb([128, 128, 128]);

/// Fixed class-to-color table; anything not listed is gray.
pub fn class_color(class_name: &str) -> Rgb<u8> {
    match class_name {
        "person" => Rgb([0, 255, 0]),
        "car" => Rgb([0, 0, 255]),
        "truck" => Rgb([255, 0, 0]),
        "bicycle" => Rgb([0, 255, 255]),
        "motorcycle" => Rgb([255, 0, 255]),
        "bus" => Rgb([255, 255, 0]),
        _ => UNKNOWN_CLASS,
    }
}

/// Draws detection boxes, labels and a timestamp onto a copy of a frame.
#[derive(Clone, Debug, Default)]
pub struct ImageAnnotator;

impl ImageAnnotator {
    pub fn new() -> Self {
        Self
    }

    pub fn annotate_now(&self, frame: &Frame, detections: &[Detection]) -> RgbImage {
        self.annotate(frame, detections, Local::now())
    }

    /// Annotate at a given wall time. Same inputs give the same pixels.
    pub fn annotate(&self, frame: &Frame, detections: &[Detection], at: DateTime<Local>) -> RgbImage {
        let mut image = frame.image().clone();
        let (width, height) = image.dimensions();

        for detection in detections {
            let bbox = &detection.bbox;
            if bbox.x2 < 0.0 || bbox.y2 < 0.0 || bbox.x1 >= width as f32 || bbox.y1 >= height as f32 {
                continue;
            }
            let color = class_color(&detection.class_name);
            let x1 = clip(bbox.x1, width);
            let y1 = clip(bbox.y1, height);
            let x2 = clip(bbox.x2, width);
            let y2 = clip(bbox.y2, height);

            for inset in 0..BOX_THICKNESS {
                let w = x2 - x1 + 1 - 2 * inset;
                let h = y2 - y1 + 1 - 2 * inset;
                if w < 1 || h < 1 {
                    break;
                }
                let rect = Rect::at(x1 + inset, y1 + inset).of_size(w as u32, h as u32);
                draw_hollow_rect_mut(&mut image, rect, color);
            }

            let label = format!("{}: {:.2}", detection.class_name, detection.confidence);
            let (text_w, text_h) = text_size(&label, LABEL_SCALE);
            let background_top = y1 - text_h as i32 - LABEL_PADDING;
            let background = Rect::at(x1, background_top)
                .of_size(text_w.max(1), (text_h as i32 + LABEL_PADDING).max(1) as u32);
            draw_filled_rect_mut(&mut image, background, color);

            let text_top = y1 - LABEL_BASELINE_OFFSET - text_h as i32;
            draw_text(&mut image, x1, text_top, &label, LABEL_SCALE, LABEL_TEXT);
        }

        let stamp = at.format(TIMESTAMP_FORMAT).to_string();
        let (_, stamp_h) = text_size(&stamp, TIMESTAMP_SCALE);
        let (x, baseline) = TIMESTAMP_ORIGIN;
        draw_text(
            &mut image,
            x,
            baseline - stamp_h as i32,
            &stamp,
            TIMESTAMP_SCALE,
            TIMESTAMP_TEXT,
        );

        image
    }
}

/// Clamp a coordinate to just outside `[0, extent)` so clipped edges stay
/// off-frame and the box arithmetic cannot overflow.
fn clip(value: f32, extent: u32) -> i32 {
    let margin = (BOX_THICKNESS + 1) as f32;
    value.clamp(-margin, extent as f32 + margin) as i32
}
