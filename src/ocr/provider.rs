//! OCR Providers
//!
//! Defines the provider trait and the Tesseract backends.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::tsv::parse_tsv;
use super::types::{OcrError, OcrProvider, OcrResult, RecognizeOptions};

/// OCR provider trait
#[async_trait]
pub trait OcrProviderTrait: Send + Sync {
    /// Get the provider type
    fn provider_type(&self) -> OcrProvider;

    /// Check if the provider is available
    async fn is_available(&self) -> bool;

    /// Whether inference can run on a GPU
    fn supports_gpu(&self) -> bool {
        false
    }

    /// Perform OCR on an encoded (PNG) image
    async fn recognize(&self, image_data: &[u8], options: &RecognizeOptions) -> Result<OcrResult, OcrError>;
}

/// Validate language code to prevent argument injection
pub fn validate_language(lang: &str) -> Result<(), OcrError> {
    // Tesseract codes: alphanumerics with underscores, joined by '+' (e.g. "chi_sim+eng")
    if lang.is_empty() || lang.len() > 64 {
        return Err(OcrError::InvalidLanguage("Invalid language code length".to_string()));
    }
    for c in lang.chars() {
        if !c.is_ascii_alphanumeric() && c != '+' && c != '_' {
            return Err(OcrError::InvalidLanguage(format!(
                "Invalid character in language code: {}",
                c
            )));
        }
    }
    if lang.split('+').any(str::is_empty) {
        return Err(OcrError::InvalidLanguage(format!("Empty language in '{}'", lang)));
    }
    Ok(())
}

/// Tesseract command-line provider
///
/// Pipes the image through `tesseract stdin stdout ... tsv`, so no temporary
/// files are involved.
pub struct TesseractCliProvider {
    /// Path to the tesseract executable
    binary: String,
    /// Explicit tessdata directory (otherwise tesseract's own lookup)
    tessdata_dir: Option<PathBuf>,
}

impl TesseractCliProvider {
    pub fn new(binary: &str, tessdata_dir: Option<PathBuf>) -> Self {
        Self {
            binary: binary.to_string(),
            tessdata_dir,
        }
    }

    fn command(&self, options: &RecognizeOptions) -> Command {
        let mut cmd = Command::new(&self.binary);

        if let Some(dir) = &self.tessdata_dir {
            cmd.arg("--tessdata-dir").arg(dir);
        }

        cmd.arg("stdin").arg("stdout");
        cmd.arg("-l").arg(&options.language);
        cmd.arg("--psm").arg(options.psm.to_string());
        if let Some(dpi) = options.dpi {
            cmd.arg("--dpi").arg(dpi.to_string());
        }
        cmd.arg("tsv");

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Default for TesseractCliProvider {
    fn default() -> Self {
        Self::new("tesseract", None)
    }
}

#[async_trait]
impl OcrProviderTrait for TesseractCliProvider {
    fn provider_type(&self) -> OcrProvider {
        OcrProvider::TesseractCli
    }

    async fn is_available(&self) -> bool {
        let result = Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        matches!(result, Ok(status) if status.success())
    }

    async fn recognize(&self, image_data: &[u8], options: &RecognizeOptions) -> Result<OcrResult, OcrError> {
        validate_language(&options.language)?;

        let mut child = self.command(options).spawn().map_err(|e| {
            OcrError::ProviderNotAvailable(format!("Failed to spawn {}: {}", self.binary, e))
        })?;

        // Write image to stdin, then close it to signal end of input
        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(image_data).await {
                let _ = child.kill().await;
                return Err(OcrError::ProcessingError(format!(
                    "Failed to write to tesseract stdin: {}",
                    e
                )));
            }
            if let Err(e) = stdin.flush().await {
                let _ = child.kill().await;
                return Err(OcrError::ProcessingError(format!(
                    "Failed to flush tesseract stdin: {}",
                    e
                )));
            }
            drop(stdin);
        }

        let output = child.wait_with_output().await.map_err(|e| {
            OcrError::ProcessingError(format!("Failed to wait for tesseract: {}", e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::ProcessingError(format!(
                "Tesseract failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let words = parse_tsv(&tsv, options.min_confidence)?;
        tracing::debug!("tesseract recognized {} words", words.len());

        Ok(OcrResult::from_words(OcrProvider::TesseractCli, words))
    }
}

/// libtesseract provider
#[cfg(feature = "ocr-tesseract")]
pub struct TesseractProvider {
    /// Tessdata directory passed to `TessBaseAPI::Init`
    datapath: Option<String>,
}

#[cfg(feature = "ocr-tesseract")]
impl TesseractProvider {
    pub fn new(datapath: Option<PathBuf>) -> Self {
        Self {
            datapath: datapath.map(|p| p.to_string_lossy().into_owned()),
        }
    }
}

#[cfg(feature = "ocr-tesseract")]
#[async_trait]
impl OcrProviderTrait for TesseractProvider {
    fn provider_type(&self) -> OcrProvider {
        OcrProvider::Tesseract
    }

    async fn is_available(&self) -> bool {
        let datapath = self.datapath.clone();
        tokio::task::spawn_blocking(move || {
            tesseract::Tesseract::new(datapath.as_deref(), Some("eng")).is_ok()
        })
        .await
        .unwrap_or(false)
    }

    async fn recognize(&self, image_data: &[u8], options: &RecognizeOptions) -> Result<OcrResult, OcrError> {
        validate_language(&options.language)?;

        let datapath = self.datapath.clone();
        let image_data = image_data.to_vec();
        let options = options.clone();

        let tsv = tokio::task::spawn_blocking(move || -> Result<String, OcrError> {
            let processing = |e: &dyn std::fmt::Display| OcrError::ProcessingError(e.to_string());

            let mut api = tesseract::Tesseract::new(datapath.as_deref(), Some(&options.language))
                .map_err(|e| processing(&e))?
                .set_variable("tessedit_pageseg_mode", &options.psm.to_string())
                .map_err(|e| processing(&e))?
                .set_image_from_mem(&image_data)
                .map_err(|e| processing(&e))?;
            if let Some(dpi) = options.dpi {
                api = api.set_source_resolution(dpi as i32);
            }
            let mut api = api.recognize().map_err(|e| processing(&e))?;
            api.get_tsv_text(0).map_err(|e| processing(&e))
        })
        .await
        .map_err(|e| OcrError::ProcessingError(format!("Task join error: {}", e)))??;

        let words = parse_tsv(&tsv, options.min_confidence)?;
        Ok(OcrResult::from_words(OcrProvider::Tesseract, words))
    }
}

/// Canned provider for pipeline tests
#[cfg(test)]
pub(crate) struct MockProvider {
    pub words: Vec<super::types::OcrWord>,
    pub available: bool,
    pub fail: bool,
}

#[cfg(test)]
#[async_trait]
impl OcrProviderTrait for MockProvider {
    fn provider_type(&self) -> OcrProvider {
        OcrProvider::TesseractCli
    }

    async fn is_available(&self) -> bool {
        self.available
    }

    async fn recognize(&self, image_data: &[u8], options: &RecognizeOptions) -> Result<OcrResult, OcrError> {
        validate_language(&options.language)?;
        if self.fail {
            return Err(OcrError::ProcessingError("mock failure".to_string()));
        }
        image::load_from_memory(image_data).map_err(|e| OcrError::ImageEncoding(e.to_string()))?;
        let words = self
            .words
            .iter()
            .filter(|w| w.confidence >= options.min_confidence)
            .cloned()
            .collect();
        Ok(OcrResult::from_words(OcrProvider::TesseractCli, words))
    }
}
