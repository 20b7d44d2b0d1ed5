//! MuPDF rasterization
//!
//! Renders pages whose scanned image cannot be decoded directly and reports
//! whether a page already carries extractable text.

pub mod error;
pub mod render;

pub use error::{RenderError, RenderResult};
pub use render::PageRasterizer;
