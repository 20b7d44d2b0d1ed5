//! PDF editing errors

use thiserror::Error;

/// Errors raised while editing PDF pages
#[derive(Debug, Error)]
pub enum PdfError {
    /// lopdf parse/serialize error
    #[error("PDF error: {0}")]
    Lopdf(#[from] lopdf::Error),

    /// Page index out of range
    #[error("Page {0} not found (document has {1} pages)")]
    PageNotFound(usize, usize),

    /// Structurally broken page or resource dictionary
    #[error("Malformed document: {0}")]
    Malformed(String),

    /// Image XObject that cannot be decoded without a renderer
    #[error("Unsupported image encoding: {0}")]
    UnsupportedImage(String),

    /// Image buffer construction/encoding error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Result type alias for PDF operations
pub type PdfResult<T> = std::result::Result<T, PdfError>;
