//! OCR Service
//!
//! Builds the configured providers and runs recognition on page images.

use std::io::Cursor;
use std::sync::Arc;

use image::DynamicImage;

use crate::config::OcrConfig;

use super::provider::{validate_language, OcrProviderTrait, TesseractCliProvider};
use super::types::{OcrError, OcrProvider, OcrResult, RecognizeOptions};

/// OCR service for page images
pub struct OcrService {
    config: OcrConfig,
    providers: Vec<Arc<dyn OcrProviderTrait>>,
}

impl OcrService {
    /// Create the service for the configured engine
    pub fn new(config: OcrConfig) -> Self {
        let mut providers: Vec<Arc<dyn OcrProviderTrait>> = Vec::new();

        match config.engine {
            OcrProvider::Tesseract => {
                #[cfg(feature = "ocr-tesseract")]
                {
                    use super::provider::TesseractProvider;
                    providers.push(Arc::new(TesseractProvider::new(config.tessdata_dir.clone())));
                }
                #[cfg(not(feature = "ocr-tesseract"))]
                {
                    tracing::warn!("Built without the ocr-tesseract feature, using the tesseract binary");
                }
            }
            OcrProvider::TesseractCli => {}
        }

        // The binary is always the last resort
        providers.push(Arc::new(TesseractCliProvider::new(
            &config.tesseract_path,
            config.tessdata_dir.clone(),
        )));

        Self::with_providers(config, providers)
    }

    /// Create the service around explicit providers (in preference order)
    pub fn with_providers(config: OcrConfig, providers: Vec<Arc<dyn OcrProviderTrait>>) -> Self {
        if config.use_gpu && !providers.iter().any(|p| p.supports_gpu()) {
            tracing::warn!(
                "GPU inference requested but {} has no GPU support, running on CPU",
                config.engine
            );
        }
        Self { config, providers }
    }

    pub fn language(&self) -> &str {
        &self.config.language
    }

    /// Get available providers
    pub async fn available_providers(&self) -> Vec<OcrProvider> {
        let mut available = Vec::new();
        for provider in &self.providers {
            if provider.is_available().await {
                available.push(provider.provider_type());
            }
        }
        available
    }

    /// Fail early when the language is malformed or no provider can run
    pub async fn check(&self) -> Result<(), OcrError> {
        validate_language(&self.config.language)?;
        if self.available_providers().await.is_empty() {
            return Err(OcrError::ProviderNotAvailable(format!(
                "no OCR engine available (tried {} at '{}')",
                self.config.engine, self.config.tesseract_path
            )));
        }
        Ok(())
    }

    /// Recognition options for an image at `dpi`
    pub fn options(&self, dpi: Option<f32>) -> RecognizeOptions {
        RecognizeOptions {
            language: self.config.language.clone(),
            psm: self.config.psm,
            dpi: dpi.filter(|d| d.is_finite() && *d >= 1.0).map(|d| d.round() as u32),
            min_confidence: self.config.min_confidence,
        }
    }

    /// Perform OCR on a page image
    pub async fn recognize(&self, image: DynamicImage, dpi: Option<f32>) -> Result<OcrResult, OcrError> {
        let options = self.options(dpi);
        let png = tokio::task::spawn_blocking(move || encode_png(&image))
            .await
            .map_err(|e| OcrError::ImageEncoding(format!("Task join error: {}", e)))??;

        let mut last_error = None;
        for provider in &self.providers {
            match provider.recognize(&png, &options).await {
                Ok(result) => return Ok(result),
                Err(e @ OcrError::InvalidLanguage(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        "OCR provider {} failed: {}, trying next",
                        provider.provider_type(),
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            OcrError::ProviderNotAvailable("No OCR providers configured".to_string())
        }))
    }
}

/// Encode as PNG, the format every provider accepts on stdin
pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, OcrError> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), image::ImageFormat::Png)
        .map_err(|e| OcrError::ImageEncoding(e.to_string()))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Quad, Rect};
    use crate::ocr::provider::MockProvider;
    use crate::ocr::types::OcrWord;

    fn mock(words: Vec<OcrWord>, fail: bool) -> Arc<dyn OcrProviderTrait> {
        Arc::new(MockProvider {
            words,
            available: true,
            fail,
        })
    }

    fn word(text: &str, confidence: f32) -> OcrWord {
        OcrWord {
            text: text.to_string(),
            confidence,
            quad: Quad::from_rect(&Rect::new(0.0, 0.0, 10.0, 10.0)),
            line: (1, 1, 1),
        }
    }

    #[tokio::test]
    async fn test_recognize_with_mock() {
        let config = OcrConfig {
            min_confidence: 50.0,
            ..Default::default()
        };
        let service = OcrService::with_providers(config, vec![mock(vec![word("a", 90.0), word("b", 10.0)], false)]);

        let result = service.recognize(DynamicImage::new_rgb8(8, 8), Some(300.0)).await.unwrap();
        assert_eq!(result.words.len(), 1);
        assert_eq!(result.text, "a");
    }

    #[tokio::test]
    async fn test_falls_back_to_next_provider() {
        let service = OcrService::with_providers(
            OcrConfig::default(),
            vec![mock(vec![], true), mock(vec![word("ok", 99.0)], false)],
        );
        let result = service.recognize(DynamicImage::new_luma8(4, 4), None).await.unwrap();
        assert_eq!(result.text, "ok");
    }

    #[tokio::test]
    async fn test_all_providers_fail() {
        let service = OcrService::with_providers(OcrConfig::default(), vec![mock(vec![], true)]);
        let result = service.recognize(DynamicImage::new_luma8(4, 4), None).await;
        assert!(matches!(result, Err(OcrError::ProcessingError(_))));
    }

    #[tokio::test]
    async fn test_check_rejects_bad_language() {
        let config = OcrConfig {
            language: "eng;x".to_string(),
            ..Default::default()
        };
        let service = OcrService::with_providers(config, vec![mock(vec![], false)]);
        assert!(matches!(service.check().await, Err(OcrError::InvalidLanguage(_))));
    }

    #[test]
    fn test_options_dpi_rounding() {
        let service = OcrService::with_providers(OcrConfig::default(), vec![]);
        assert_eq!(service.options(Some(299.6)).dpi, Some(300));
        assert_eq!(service.options(Some(0.2)).dpi, None);
        assert_eq!(service.options(None).psm, 3);
    }
}
