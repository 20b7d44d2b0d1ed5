//! Rasterization errors

use thiserror::Error;

/// Errors raised while rendering pages with MuPDF
#[derive(Debug, Error)]
pub enum RenderError {
    /// MuPDF failure (open, load, render)
    #[error("MuPDF error: {0}")]
    Mupdf(String),

    /// Page index out of range
    #[error("Page {0} not found (document has {1} pages)")]
    PageNotFound(usize, usize),

    /// Requested resolution is not usable
    #[error("Invalid render resolution: {0}")]
    InvalidDpi(f32),

    /// Pixmap could not be turned into an image
    #[error("Image error: {0}")]
    Image(String),
}

impl From<mupdf::Error> for RenderError {
    fn from(err: mupdf::Error) -> Self {
        RenderError::Mupdf(err.to_string())
    }
}

/// Result type alias for rendering
pub type RenderResult<T> = std::result::Result<T, RenderError>;
