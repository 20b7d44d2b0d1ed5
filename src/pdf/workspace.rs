//! Editable PDF document
//!
//! `PdfWorkspace` owns the `lopdf::Document` being rewritten and serializes
//! all access through a mutex, so it can be shared with blocking tasks.

use std::sync::Arc;

use image::{DynamicImage, GenericImageView};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, ObjectId, Stream};
use parking_lot::Mutex;

use crate::document::{Matrix, Rect};

use super::content::{contains_text, find_image_draws, strip_text};
use super::error::{PdfError, PdfResult};
use super::fonts::CjkFont;
use super::images::decode_image;
use super::resources::{image_xobject, page_box, page_resources, page_rotation, register_font};
use super::text_layer::{text_operations, PlacedWord};

/// Pixels to OCR plus where they sit on the page
#[derive(Debug, Clone)]
pub struct PageImage {
    pub image: DynamicImage,
    /// Normalized image coordinates (top-left origin, y down) to user space
    pub placement: Matrix,
    /// Effective resolution of the image on the page
    pub dpi: Option<f32>,
}

impl PageImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Where the OCR input for a page comes from
#[derive(Debug, Clone)]
pub enum PageSource {
    /// First painted image XObject, decoded
    Embedded(PageImage),
    /// The image exists but cannot be decoded here, rasterize the page
    NeedsRender { page_box: Rect, rotation: i32 },
    /// The page paints no image
    NoImage,
}

/// A page after its old text has been stripped
#[derive(Debug, Clone)]
pub struct PreparedPage {
    pub page_id: ObjectId,
    pub source: PageSource,
    /// Number of text objects removed
    pub stripped: usize,
}

struct WorkspaceState {
    doc: Document,
    pages: Vec<ObjectId>,
    font_id: Option<ObjectId>,
}

/// Thread-safe wrapper around the document being rewritten
pub struct PdfWorkspace {
    state: Mutex<WorkspaceState>,
    source: Arc<Vec<u8>>,
    font: CjkFont,
}

impl PdfWorkspace {
    /// Parse a PDF for editing
    pub fn load(bytes: Vec<u8>, font: CjkFont) -> PdfResult<Self> {
        let doc = Document::load_mem(&bytes)?;
        if doc.is_encrypted() {
            return Err(PdfError::Malformed("encrypted documents are not supported".into()));
        }

        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        tracing::debug!("Loaded PDF with {} pages", pages.len());

        Ok(Self {
            state: Mutex::new(WorkspaceState {
                doc,
                pages,
                font_id: None,
            }),
            source: Arc::new(bytes),
            font,
        })
    }

    /// Original bytes, for rasterizing pages
    pub fn source(&self) -> Arc<Vec<u8>> {
        Arc::clone(&self.source)
    }

    pub fn page_count(&self) -> usize {
        self.state.lock().pages.len()
    }

    /// Whether the page content shows any text (structural check)
    pub fn page_shows_text(&self, index: usize) -> PdfResult<bool> {
        let state = self.state.lock();
        let page_id = page_id(&state, index)?;
        let content = decode_page_content(&state.doc, page_id)?;
        Ok(contains_text(&content.operations))
    }

    /// Strip old text from a page and locate its OCR source
    pub fn prepare_page(&self, index: usize) -> PdfResult<PreparedPage> {
        let mut state = self.state.lock();
        let page_id = page_id(&state, index)?;

        let content = decode_page_content(&state.doc, page_id)?;
        let (operations, stripped) = strip_text(content.operations);

        let source = {
            let doc = &state.doc;
            let resources = page_resources(doc, page_id);
            let draws = find_image_draws(&operations, |name| {
                image_xobject(doc, &resources, name).is_some()
            });

            match draws.first() {
                None => PageSource::NoImage,
                Some(draw) => {
                    let stream = image_xobject(doc, &resources, &draw.name)
                        .ok_or_else(|| PdfError::Malformed("image XObject vanished".into()))?;
                    match decode_image(doc, stream) {
                        Ok(image) => {
                            let dpi = effective_dpi(&image, &draw.ctm);
                            PageSource::Embedded(PageImage {
                                image,
                                placement: Matrix::image_placement(&draw.ctm),
                                dpi,
                            })
                        }
                        Err(e) => {
                            tracing::debug!(
                                "Page {}: image /{} not decodable ({}), rendering instead",
                                index + 1,
                                String::from_utf8_lossy(&draw.name),
                                e
                            );
                            PageSource::NeedsRender {
                                page_box: page_box(doc, page_id),
                                rotation: page_rotation(doc, page_id),
                            }
                        }
                    }
                }
            }
        };

        if stripped > 0 {
            set_page_content(&mut state.doc, page_id, operations)?;
            tracing::debug!("Page {}: removed {} text objects", index + 1, stripped);
        }

        Ok(PreparedPage {
            page_id,
            source,
            stripped,
        })
    }

    /// Append an invisible text layer to a prepared page
    pub fn apply_text_layer(&self, page_id: ObjectId, words: &[PlacedWord]) -> PdfResult<()> {
        if words.is_empty() {
            return Ok(());
        }

        let mut state = self.state.lock();
        let font_id = match state.font_id {
            Some(id) => id,
            None => {
                let id = self.font.add_to(&mut state.doc);
                state.font_id = Some(id);
                id
            }
        };

        let font_name = register_font(&mut state.doc, page_id, font_id)?;
        let existing = decode_page_content(&state.doc, page_id)?;

        // Isolate the old content so its graphics state cannot leak into the layer
        let mut operations = Vec::with_capacity(existing.operations.len() + words.len() * 4 + 5);
        operations.push(Operation::new("q", vec![]));
        operations.extend(existing.operations);
        operations.push(Operation::new("Q", vec![]));
        operations.extend(text_operations(words, &font_name));

        set_page_content(&mut state.doc, page_id, operations)
    }

    /// Serialize the edited document
    pub fn save(&self) -> PdfResult<Vec<u8>> {
        let mut state = self.state.lock();
        state.doc.prune_objects();
        state.doc.compress();

        let mut buffer = Vec::new();
        state.doc.save_to(&mut buffer).map_err(lopdf::Error::from)?;
        Ok(buffer)
    }
}

fn page_id(state: &WorkspaceState, index: usize) -> PdfResult<ObjectId> {
    state
        .pages
        .get(index)
        .copied()
        .ok_or(PdfError::PageNotFound(index, state.pages.len()))
}

fn decode_page_content(doc: &Document, page_id: ObjectId) -> PdfResult<Content> {
    let bytes = doc.get_page_content(page_id)?;
    Ok(Content::decode(&bytes)?)
}

/// Replace the page's content with a single new stream
fn set_page_content(doc: &mut Document, page_id: ObjectId, operations: Vec<Operation>) -> PdfResult<()> {
    let encoded = Content { operations }.encode()?;
    let stream_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    doc.get_object_mut(page_id)?
        .as_dict_mut()
        .map_err(|_| PdfError::Malformed("page object is not a dictionary".into()))?
        .set("Contents", stream_id);
    Ok(())
}

/// Image resolution implied by its size on the page
fn effective_dpi(image: &DynamicImage, ctm: &Matrix) -> Option<f32> {
    let (width, height) = image.dimensions();
    let (extent_x, extent_y) = ctm.unit_extent();
    if extent_x <= 0.0 || extent_y <= 0.0 {
        return None;
    }
    let dpi = (width as f32 * 72.0 / extent_x).max(height as f32 * 72.0 / extent_y);
    dpi.is_finite().then_some(dpi)
}
