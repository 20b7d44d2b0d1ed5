//! ocrlayer
//!
//! Adds an invisible, selectable OCR text layer to scanned PDFs and images.
//!
//! # Modules
//!
//! - `document`: Input sniffing, geometry and image to PDF conversion
//! - `pdf`: Page editing with lopdf (stripping, image lookup, text layer)
//! - `raster`: Page rendering and text detection via MuPDF
//! - `ocr`: OCR providers and the service choosing between them
//! - `pipeline`: The per-file procedure
//! - `watch`: Folder watch mode

pub mod config;
pub mod document;
pub mod error;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod raster;
pub mod watch;

pub use config::Config;
pub use error::{ProcessError, Result, WatchError};
pub use pipeline::{Pipeline, ProcessReport};
pub use watch::FolderWatch;
