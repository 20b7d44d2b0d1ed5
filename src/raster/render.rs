//! Page rasterization with MuPDF

use std::sync::Arc;

use image::{DynamicImage, RgbImage};
use mupdf::{Colorspace, Document, Matrix};
use parking_lot::Mutex;

use super::error::{RenderError, RenderResult};

const PDF_MIME: &str = "application/pdf";

/// Longest side of a rendered page, in pixels
const MAX_RENDER_SIDE: f32 = 12_000.0;

/// Serialized MuPDF access to one PDF
///
/// MuPDF documents are not thread-safe, so each operation opens a fresh
/// document from the shared bytes while holding the lock.
pub struct PageRasterizer {
    source: Arc<Vec<u8>>,
    page_count: usize,
    lock: Mutex<()>,
}

impl PageRasterizer {
    /// Open the document once to validate it and count pages
    pub fn new(source: Arc<Vec<u8>>) -> RenderResult<Self> {
        let doc = Document::from_bytes(&source, PDF_MIME)?;
        let page_count = doc.page_count()? as usize;

        Ok(Self {
            source,
            page_count,
            lock: Mutex::new(()),
        })
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    fn with_doc<F, R>(&self, f: F) -> RenderResult<R>
    where
        F: FnOnce(&Document) -> RenderResult<R>,
    {
        let _guard = self.lock.lock();
        let doc = Document::from_bytes(&self.source, PDF_MIME)?;
        f(&doc)
    }

    fn check_index(&self, index: usize) -> RenderResult<()> {
        if index >= self.page_count {
            return Err(RenderError::PageNotFound(index, self.page_count));
        }
        Ok(())
    }

    /// Render a page to RGB at `dpi`, rotation applied, white background
    pub fn render_page(&self, index: usize, dpi: f32) -> RenderResult<DynamicImage> {
        self.check_index(index)?;
        if !(dpi.is_finite() && dpi > 0.0) {
            return Err(RenderError::InvalidDpi(dpi));
        }

        self.with_doc(|doc| {
            let page = doc.load_page(index as i32)?;
            let bounds = page.bounds()?;
            let longest = (bounds.x1 - bounds.x0).max(bounds.y1 - bounds.y0);

            let mut scale = dpi / 72.0;
            if longest * scale > MAX_RENDER_SIDE {
                scale = MAX_RENDER_SIDE / longest;
                tracing::warn!(
                    "Page {} too large for {} dpi, rendering at {:.0} dpi",
                    index + 1,
                    dpi,
                    scale * 72.0
                );
            }

            let matrix = Matrix::new_scale(scale, scale);
            let pixmap = page.to_pixmap(&matrix, &Colorspace::device_rgb(), false, false)?;
            pixmap_to_image(&pixmap)
        })
    }

    /// Whether MuPDF extracts any non-whitespace text from the page
    pub fn page_has_text(&self, index: usize) -> RenderResult<bool> {
        self.check_index(index)?;
        self.with_doc(|doc| {
            let page = doc.load_page(index as i32)?;
            let text = page.to_text()?;
            Ok(text.chars().any(|c| !c.is_whitespace()))
        })
    }
}

fn pixmap_to_image(pixmap: &mupdf::Pixmap) -> RenderResult<DynamicImage> {
    let width = pixmap.width() as u32;
    let height = pixmap.height() as u32;
    let samples = pixmap.samples();
    let n = pixmap.n() as usize;

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height as usize {
        for x in 0..width as usize {
            let offset = (y * width as usize + x) * n;
            let r = samples.get(offset).copied().unwrap_or(255);
            let g = samples.get(offset + 1).copied().unwrap_or(r);
            let b = samples.get(offset + 2).copied().unwrap_or(r);
            rgb.extend_from_slice(&[r, g, b]);
        }
    }

    let img = RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| RenderError::Image("Failed to create image buffer".to_string()))?;
    Ok(DynamicImage::ImageRgb8(img))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::fixtures::scanned_pdf;

    #[test]
    fn test_render_page_size_follows_dpi() {
        let rasterizer = PageRasterizer::new(Arc::new(scanned_pdf())).unwrap();
        assert_eq!(rasterizer.page_count(), 1);

        let img = rasterizer.render_page(0, 144.0).unwrap();
        assert_eq!((img.width(), img.height()), (400, 200));
    }

    #[test]
    fn test_page_has_text() {
        let rasterizer = PageRasterizer::new(Arc::new(scanned_pdf())).unwrap();
        assert!(rasterizer.page_has_text(0).unwrap());
    }

    #[test]
    fn test_rejects_bad_input() {
        let rasterizer = PageRasterizer::new(Arc::new(scanned_pdf())).unwrap();
        assert!(matches!(
            rasterizer.render_page(1, 72.0),
            Err(RenderError::PageNotFound(1, 1))
        ));
        assert!(matches!(
            rasterizer.render_page(0, 0.0),
            Err(RenderError::InvalidDpi(_))
        ));
        assert!(PageRasterizer::new(Arc::new(b"not a pdf".to_vec())).is_err());
    }
}
