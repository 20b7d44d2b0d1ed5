//! Input format detection
//!
//! Inputs are classified by content, not by file name. The file name is only
//! used to label inputs we refuse.

use std::path::Path;

/// Detected input format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Pdf,
    Image(image::ImageFormat),
}

/// Image formats accepted as scans
const SUPPORTED_IMAGES: &[image::ImageFormat] = &[
    image::ImageFormat::Png,
    image::ImageFormat::Jpeg,
    image::ImageFormat::Tiff,
    image::ImageFormat::Bmp,
    image::ImageFormat::Gif,
    image::ImageFormat::WebP,
    image::ImageFormat::Pnm,
];

/// Some writers put garbage before the header; readers accept it within 1KB
const PDF_HEADER_WINDOW: usize = 1024;

impl InputFormat {
    /// Detect format from magic bytes
    pub fn from_magic_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 4 {
            return None;
        }

        let window = &bytes[..bytes.len().min(PDF_HEADER_WINDOW)];
        if window.windows(5).any(|w| w == b"%PDF-") {
            return Some(Self::Pdf);
        }

        image::guess_format(bytes)
            .ok()
            .filter(|format| SUPPORTED_IMAGES.contains(format))
            .map(Self::Image)
    }

    /// MIME type of the detected format
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Image(format) => format.to_mime_type(),
        }
    }
}

/// Best-effort MIME label for an input we could not classify
pub fn describe_unknown(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}
