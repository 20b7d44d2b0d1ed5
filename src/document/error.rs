//! Input document errors

use thiserror::Error;

/// Errors raised while classifying or converting an input file
#[derive(Debug, Error)]
pub enum DocumentError {
    /// Failed to decode the input image
    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    /// Failed to assemble the converted PDF
    #[error("PDF assembly error: {0}")]
    PdfError(#[from] lopdf::Error),

    /// Invalid content (zero-sized image, bad resolution)
    #[error("Invalid content: {0}")]
    InvalidContent(String),

    /// Failed to decode a TIFF frame
    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),
}

/// Result type alias for document operations
pub type DocumentResult<T> = std::result::Result<T, DocumentError>;
