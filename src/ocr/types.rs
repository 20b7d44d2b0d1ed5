//! OCR Types
//!
//! Defines the engine selection, recognition options and word-level results.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::Quad;

/// OCR provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OcrProvider {
    /// `tesseract` binary driven through stdin/stdout
    #[default]
    TesseractCli,
    /// libtesseract bindings (feature `ocr-tesseract`)
    Tesseract,
}

impl OcrProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TesseractCli => "tesseract-cli",
            Self::Tesseract => "tesseract",
        }
    }
}

impl fmt::Display for OcrProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OcrProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tesseract-cli" | "cli" => Ok(Self::TesseractCli),
            "tesseract" | "libtesseract" => Ok(Self::Tesseract),
            other => Err(format!(
                "unknown OCR engine '{}' (expected tesseract-cli or tesseract)",
                other
            )),
        }
    }
}

/// Per-call recognition settings
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizeOptions {
    /// Tesseract language string, e.g. `chi_sim+eng`
    pub language: String,
    /// Page segmentation mode
    pub psm: u8,
    /// Source resolution hint
    pub dpi: Option<u32>,
    /// Words below this confidence (0-100) are dropped
    pub min_confidence: f32,
}

impl Default for RecognizeOptions {
    fn default() -> Self {
        Self {
            language: "chi_sim+eng".to_string(),
            psm: 3,
            dpi: None,
            min_confidence: 0.0,
        }
    }
}

/// OCR result
#[derive(Debug, Clone, Serialize)]
pub struct OcrResult {
    /// Recognized text, words joined by spaces, lines by newlines
    pub text: String,
    /// Mean word confidence (0-100)
    pub confidence: f32,
    /// Provider used
    pub provider: OcrProvider,
    /// Recognized words in reading order
    pub words: Vec<OcrWord>,
}

impl OcrResult {
    /// Assemble a result from parsed words
    pub fn from_words(provider: OcrProvider, words: Vec<OcrWord>) -> Self {
        let confidence = if words.is_empty() {
            0.0
        } else {
            words.iter().map(|w| w.confidence).sum::<f32>() / words.len() as f32
        };

        let mut text = String::new();
        let mut last_line = None;
        for word in &words {
            match last_line {
                Some(line) if line == word.line => text.push(' '),
                Some(_) => text.push('\n'),
                None => {}
            }
            text.push_str(&word.text);
            last_line = Some(word.line);
        }

        Self {
            text,
            confidence,
            provider,
            words,
        }
    }
}

/// Single word OCR result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrWord {
    /// Word text
    pub text: String,
    /// Confidence for this word (0-100)
    pub confidence: f32,
    /// Word box in image pixels (y down)
    pub quad: Quad,
    /// Line key (block, paragraph, line) used to rebuild plain text
    #[serde(skip)]
    pub line: (u32, u32, u32),
}

/// OCR error types
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("OCR provider not available: {0}")]
    ProviderNotAvailable(String),

    #[error("Invalid language code: {0}")]
    InvalidLanguage(String),

    #[error("Failed to encode image for OCR: {0}")]
    ImageEncoding(String),

    #[error("OCR processing failed: {0}")]
    ProcessingError(String),

    #[error("Failed to parse OCR output: {0}")]
    ParseError(String),
}
