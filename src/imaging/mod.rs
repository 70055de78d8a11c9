//! Event snapshot imaging.
//!
//! - `ImageAnnotator`: boxes, labels and timestamp drawn onto a frame copy
//! - `ImageCompressor`: one-shot JPEG re-encode toward a byte budget
//! - `EventImageStore`: annotate, write and compress into the image directory

mod annotate;
mod compress;
mod font;
mod store;

pub use annotate::{class_color, ImageAnnotator};
pub use compress::{estimate_quality, CompressionOutcome, ImageCompressor};
pub use store::EventImageStore;
