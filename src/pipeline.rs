//! Per-file OCR pipeline
//!
//! Detects the input type, wraps images into a PDF, then for every page
//! strips the old text layer, OCRs the scanned image and writes the words
//! back as invisible text.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::config::Config;
use crate::document::{describe_unknown, image_to_pdf, DocumentError, InputFormat, Matrix};
use crate::error::{ProcessError, Result};
use crate::ocr::OcrService;
use crate::pdf::{place_word, CjkFont, PageImage, PageSource, PdfWorkspace, PlacedWord, PreparedPage};
use crate::raster::PageRasterizer;

/// Summary of one processed file
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessReport {
    pub input: PathBuf,
    pub output: PathBuf,
    /// MIME type of the detected input
    pub format: String,
    pub pages_total: usize,
    /// Pages that received a text layer
    pub pages_ocred: usize,
    /// Pages left untouched because they already had text
    pub pages_skipped: usize,
    /// Pages without any image to OCR
    pub pages_without_image: usize,
    /// Pages OCR'd from a MuPDF rendering
    pub pages_rendered: usize,
    /// Old text objects removed
    pub text_objects_removed: usize,
    pub words: usize,
    pub elapsed_secs: f64,
}

/// The OCR pipeline, reusable across files
pub struct Pipeline {
    config: Config,
    ocr: OcrService,
}

impl Pipeline {
    pub fn new(config: Config) -> Self {
        let ocr = OcrService::new(config.ocr.clone());
        Self { config, ocr }
    }

    /// Use a preconfigured OCR service
    pub fn with_ocr(config: Config, ocr: OcrService) -> Self {
        Self { config, ocr }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Verify the OCR engine before touching any files
    pub async fn check(&self) -> Result<()> {
        self.ocr.check().await?;
        Ok(())
    }

    /// Process `input` and write the searchable PDF to `output`
    pub async fn process_file(&self, input: &Path, output: &Path) -> Result<ProcessReport> {
        let started = Instant::now();
        tracing::info!("Processing {}", input.display());

        let bytes = tokio::fs::read(input)
            .await
            .map_err(|e| ProcessError::io(input, e))?;

        let (pdf, mut report) = self.process_bytes(bytes, input).await?;

        // Write next to the target first so watchers never see a partial file
        let partial = partial_path(output);
        tokio::fs::write(&partial, &pdf)
            .await
            .map_err(|e| ProcessError::io(&partial, e))?;
        if let Err(e) = tokio::fs::rename(&partial, output).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(ProcessError::io(output, e));
        }

        report.input = input.to_path_buf();
        report.output = output.to_path_buf();
        report.elapsed_secs = started.elapsed().as_secs_f64();

        tracing::info!(
            "Wrote {} ({} pages, {} OCR'd, {} words) in {:.1}s",
            output.display(),
            report.pages_total,
            report.pages_ocred,
            report.words,
            report.elapsed_secs
        );
        Ok(report)
    }

    /// Process an in-memory input, returning the output PDF bytes
    ///
    /// `name` only labels unsupported inputs in errors.
    pub async fn process_bytes(&self, bytes: Vec<u8>, name: &Path) -> Result<(Vec<u8>, ProcessReport)> {
        let started = Instant::now();

        let format = InputFormat::from_magic_bytes(&bytes)
            .ok_or_else(|| ProcessError::UnsupportedFileType(describe_unknown(name)))?;

        let mut report = ProcessReport {
            format: format.mime().to_string(),
            ..Default::default()
        };

        let pdf_bytes = match format {
            InputFormat::Pdf => bytes,
            InputFormat::Image(image_format) => {
                let dpi = self.config.render.image_dpi;
                blocking(move || -> std::result::Result<Vec<u8>, DocumentError> {
                    let mut doc = image_to_pdf(&bytes, image_format, dpi)?;
                    let mut buffer = Vec::new();
                    doc.save_to(&mut buffer).map_err(lopdf::Error::from)?;
                    Ok(buffer)
                })
                .await?
            }
        };

        let font = CjkFont::for_language(self.ocr.language());
        let workspace = Arc::new(blocking(move || PdfWorkspace::load(pdf_bytes, font)).await?);
        let page_count = workspace.page_count();
        report.pages_total = page_count;

        let mut rasterizer: Option<Arc<PageRasterizer>> = None;
        let progress = self.progress_bar(page_count);

        for index in 0..page_count {
            progress.set_message(format!("page {}/{}", index + 1, page_count));

            if self.config.render.skip_text && self.page_has_text(&workspace, &mut rasterizer, index).await? {
                tracing::info!("Page {}: already has text, skipping", index + 1);
                report.pages_skipped += 1;
                progress.inc(1);
                continue;
            }

            let ws = Arc::clone(&workspace);
            let PreparedPage {
                page_id,
                source,
                stripped,
                ..
            } = blocking(move || ws.prepare_page(index)).await?;
            report.text_objects_removed += stripped;

            let page_image = match source {
                PageSource::Embedded(image) => image,
                PageSource::NeedsRender { page_box, rotation } => {
                    let raster = self.rasterizer(&workspace, &mut rasterizer).await?;
                    let dpi = self.config.render.render_dpi;
                    let image = blocking(move || raster.render_page(index, dpi)).await?;
                    report.pages_rendered += 1;
                    PageImage {
                        image,
                        placement: Matrix::rendered_page_placement(&page_box, rotation),
                        dpi: Some(dpi),
                    }
                }
                PageSource::NoImage => {
                    tracing::info!("Page {}: no image found, nothing to OCR", index + 1);
                    report.pages_without_image += 1;
                    progress.inc(1);
                    continue;
                }
            };

            let (width, height) = (page_image.width(), page_image.height());
            let placement = page_image.placement;
            let result = self.ocr.recognize(page_image.image, page_image.dpi).await?;

            let words: Vec<PlacedWord> = result
                .words
                .iter()
                .filter_map(|word| place_word(&word.text, &word.quad, width, height, &placement))
                .collect();

            tracing::debug!(
                "Page {}: {} words from {}x{} image (confidence {:.1})",
                index + 1,
                words.len(),
                width,
                height,
                result.confidence
            );

            if !words.is_empty() {
                report.words += words.len();
                report.pages_ocred += 1;
                let ws = Arc::clone(&workspace);
                blocking(move || ws.apply_text_layer(page_id, &words)).await?;
            }

            progress.inc(1);
        }

        progress.finish_and_clear();

        let ws = Arc::clone(&workspace);
        let output = blocking(move || ws.save()).await?;
        report.elapsed_secs = started.elapsed().as_secs_f64();

        Ok((output, report))
    }

    async fn page_has_text(
        &self,
        workspace: &Arc<PdfWorkspace>,
        rasterizer: &mut Option<Arc<PageRasterizer>>,
        index: usize,
    ) -> Result<bool> {
        let raster = match self.rasterizer(workspace, rasterizer).await {
            Ok(raster) => raster,
            Err(e) => {
                tracing::warn!("MuPDF unavailable for text detection ({}), checking content stream", e);
                let ws = Arc::clone(workspace);
                return blocking(move || ws.page_shows_text(index)).await;
            }
        };

        match blocking(move || raster.page_has_text(index)).await {
            Ok(has_text) => Ok(has_text),
            Err(e) => {
                tracing::warn!("Page {}: text detection failed ({}), checking content stream", index + 1, e);
                let ws = Arc::clone(workspace);
                blocking(move || ws.page_shows_text(index)).await
            }
        }
    }

    /// Open MuPDF on first use
    async fn rasterizer(
        &self,
        workspace: &PdfWorkspace,
        slot: &mut Option<Arc<PageRasterizer>>,
    ) -> Result<Arc<PageRasterizer>> {
        if let Some(raster) = slot {
            return Ok(Arc::clone(raster));
        }
        let source = workspace.source();
        let raster = Arc::new(blocking(move || PageRasterizer::new(source)).await?);
        *slot = Some(Arc::clone(&raster));
        Ok(raster)
    }

    fn progress_bar(&self, pages: usize) -> ProgressBar {
        if !self.config.render.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(pages as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    }
}

/// Run CPU-bound work off the async runtime
async fn blocking<T, E, F>(f: F) -> Result<T>
where
    F: FnOnce() -> std::result::Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ProcessError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ProcessError::Join(e.to_string()))?
        .map_err(Into::into)
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    output.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Quad, Rect};
    use crate::ocr::{MockProvider, OcrProviderTrait, OcrWord};
    use crate::pdf::content::number;
    use crate::pdf::fixtures::{run_length_pdf, scanned_pdf};
    use lopdf::content::Content;
    use lopdf::{Document, Object};
    use std::io::Cursor;

    fn pipeline(words: Vec<OcrWord>) -> Pipeline {
        let mut config = Config::default();
        config.render.show_progress = false;
        let provider: Arc<dyn OcrProviderTrait> = Arc::new(MockProvider {
            words,
            available: true,
            fail: false,
        });
        let ocr = OcrService::with_providers(config.ocr.clone(), vec![provider]);
        Pipeline::with_ocr(config, ocr)
    }

    fn word(text: &str, rect: Rect) -> OcrWord {
        OcrWord {
            text: text.to_string(),
            confidence: 95.0,
            quad: Quad::from_rect(&rect),
            line: (1, 1, 1),
        }
    }

    fn page_content(pdf: &[u8]) -> (Document, Content) {
        let doc = Document::load_mem(pdf).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        let content = Content::decode(&doc.get_page_content(page_id).unwrap()).unwrap();
        (doc, content)
    }

    #[tokio::test]
    async fn test_replaces_old_text_with_invisible_layer() {
        let pipeline = pipeline(vec![
            word("你好", Rect::new(0.0, 0.0, 2.0, 1.0)),
            word("scan", Rect::new(2.0, 1.0, 2.0, 1.0)),
        ]);

        let (pdf, report) = pipeline
            .process_bytes(scanned_pdf(), Path::new("scan.pdf"))
            .await
            .unwrap();
        assert_eq!(report.pages_total, 1);
        assert_eq!(report.pages_ocred, 1);
        assert_eq!(report.words, 2);
        assert_eq!(report.text_objects_removed, 1);

        let (doc, content) = page_content(&pdf);
        let has_old_text = content.operations.iter().any(|op| {
            op.operands
                .iter()
                .any(|o| matches!(o, Object::String(s, _) if s == b"old layer"))
        });
        assert!(!has_old_text);
        assert!(content.operations.iter().any(|op| op.operator == "Do"));

        let render_mode = content
            .operations
            .iter()
            .find(|op| op.operator == "Tr")
            .and_then(|op| op.operands.first())
            .and_then(|o| o.as_i64().ok());
        assert_eq!(render_mode, Some(3));
        assert_eq!(content.operations.iter().filter(|op| op.operator == "Tj").count(), 2);

        // Font used by the layer is registered on the page
        let font_name = content
            .operations
            .iter()
            .find(|op| op.operator == "Tf")
            .and_then(|op| op.operands.first())
            .and_then(|o| o.as_name().ok())
            .unwrap()
            .to_vec();
        let page_id = *doc.get_pages().values().next().unwrap();
        let resources = crate::pdf::resources::page_resources(&doc, page_id);
        let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
        let font_id = fonts.get(&font_name).unwrap().as_reference().unwrap();
        let font = doc.get_dictionary(font_id).unwrap();
        assert_eq!(font.get(b"Subtype").unwrap().as_name().unwrap(), b"Type0");
    }

    async fn assert_rendered_words_land_on_page(rotate: Option<i64>) {
        let mut pipeline = pipeline(vec![word("rendered", Rect::new(0.0, 0.0, 40.0, 10.0))]);
        pipeline.config.render.render_dpi = 72.0;

        let (pdf, report) = pipeline
            .process_bytes(run_length_pdf(rotate), Path::new("scan.pdf"))
            .await
            .unwrap();
        assert_eq!(report.pages_rendered, 1);
        assert_eq!(report.words, 1);
        assert_eq!(report.text_objects_removed, 1);

        let (_, content) = page_content(&pdf);
        let tm = content
            .operations
            .iter()
            .find(|op| op.operator == "Tm")
            .unwrap();
        let origin: Vec<f32> = tm.operands[4..].iter().filter_map(number).collect();
        assert_eq!(origin.len(), 2);
        assert!((0.0..=200.0).contains(&origin[0]), "x {} off page", origin[0]);
        assert!((0.0..=100.0).contains(&origin[1]), "y {} off page", origin[1]);
    }

    #[tokio::test]
    async fn test_undecodable_image_is_rendered_and_placed_on_page() {
        assert_rendered_words_land_on_page(None).await;
    }

    #[tokio::test]
    async fn test_rendered_rotated_page_keeps_words_on_page() {
        assert_rendered_words_land_on_page(Some(90)).await;
    }

    #[tokio::test]
    async fn test_image_input_becomes_pdf() {
        let img = image::DynamicImage::new_luma8(96, 48);
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png).unwrap();

        let pipeline = pipeline(vec![word("hello", Rect::new(10.0, 10.0, 40.0, 12.0))]);
        let (pdf, report) = pipeline.process_bytes(png, Path::new("scan.png")).await.unwrap();
        assert_eq!(report.format, "image/png");
        assert_eq!(report.words, 1);

        let (_, content) = page_content(&pdf);
        assert!(content.operations.iter().any(|op| op.operator == "Tj"));
    }

    #[tokio::test]
    async fn test_no_words_leaves_page_stripped() {
        let pipeline = pipeline(vec![]);
        let (pdf, report) = pipeline
            .process_bytes(scanned_pdf(), Path::new("scan.pdf"))
            .await
            .unwrap();
        assert_eq!(report.pages_ocred, 0);

        let (_, content) = page_content(&pdf);
        assert!(!content.operations.iter().any(|op| op.operator == "BT"));
        assert!(content.operations.iter().any(|op| op.operator == "Do"));
    }

    #[tokio::test]
    async fn test_skip_text_leaves_page_untouched() {
        let mut pipeline = pipeline(vec![word("x", Rect::new(0.0, 0.0, 1.0, 1.0))]);
        pipeline.config.render.skip_text = true;

        let (pdf, report) = pipeline
            .process_bytes(scanned_pdf(), Path::new("scan.pdf"))
            .await
            .unwrap();
        assert_eq!(report.pages_skipped, 1);
        assert_eq!(report.words, 0);

        let (_, content) = page_content(&pdf);
        assert!(!content.operations.iter().any(|op| op.operator == "Tr"));
    }

    #[tokio::test]
    async fn test_unsupported_file_type() {
        let pipeline = pipeline(vec![]);
        let result = pipeline
            .process_bytes(b"just some notes\n".to_vec(), Path::new("notes.txt"))
            .await;
        match result {
            Err(ProcessError::UnsupportedFileType(mime)) => assert_eq!(mime, "text/plain"),
            other => panic!("expected unsupported file type, got {:?}", other.map(|(_, r)| r)),
        }
    }

    #[tokio::test]
    async fn test_process_file_writes_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("scan.pdf");
        let output = dir.path().join("scan_ocr.pdf");
        std::fs::write(&input, scanned_pdf()).unwrap();

        let pipeline = pipeline(vec![word("a", Rect::new(0.0, 0.0, 1.0, 1.0))]);
        let report = pipeline.process_file(&input, &output).await.unwrap();

        assert_eq!(report.output, output);
        assert!(output.exists());
        assert!(!partial_path(&output).exists());
        assert!(std::fs::read(&output).unwrap().starts_with(b"%PDF-"));
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/out/scan_ocr.pdf")),
            PathBuf::from("/out/scan_ocr.pdf.part")
        );
    }
}
