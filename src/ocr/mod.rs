//! OCR Module
//!
//! Word-level OCR of page images through Tesseract.
//!
//! Supports two backends:
//! - the `tesseract` binary, fed PNG on stdin and read back as TSV (default)
//! - libtesseract through the `tesseract` crate (feature `ocr-tesseract`)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ocrlayer::config::OcrConfig;
//! use ocrlayer::ocr::OcrService;
//!
//! let service = OcrService::new(OcrConfig::default());
//! service.check().await?;
//!
//! let result = service.recognize(page_image, Some(300.0)).await?;
//! for word in &result.words {
//!     println!("{} {:?}", word.text, word.quad);
//! }
//! ```

mod provider;
mod service;
mod tsv;
mod types;

pub use provider::{validate_language, OcrProviderTrait, TesseractCliProvider};
pub use service::{encode_png, OcrService};
pub use tsv::parse_tsv;
pub use types::{OcrError, OcrProvider, OcrResult, OcrWord, RecognizeOptions};

#[cfg(feature = "ocr-tesseract")]
pub use provider::TesseractProvider;

#[cfg(test)]
pub(crate) use provider::MockProvider;
