//! Error types for ocrlayer

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::document::DocumentError;
use crate::ocr::OcrError;
use crate::pdf::PdfError;
use crate::raster::RenderError;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, ProcessError>;

/// Failure while processing one input file
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Input error: {0}")]
    Document(#[from] DocumentError),

    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Task join error: {0}")]
    Join(String),
}

impl ProcessError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProcessError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Folder-watch errors
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
