//! Input documents
//!
//! Format detection for incoming files, the geometry types shared by the
//! OCR and PDF layers, and conversion of image scans into PDFs (one page per frame).

mod convert;
mod error;
mod format;
mod geometry;
pub mod metadata;

pub use convert::image_to_pdf;
pub use error::{DocumentError, DocumentResult};
pub use format::{describe_unknown, InputFormat};
pub use geometry::{Matrix, Point, Quad, Rect};
