//! PDF page editing
//!
//! Everything that rewrites the output document goes through `lopdf`:
//!
//! - `content`: content-stream scanning (text stripping, image placement)
//! - `images`: decoding image XObjects into pixels
//! - `fonts`: the non-embedded CJK font used by the text layer
//! - `resources`: inherited page attributes and font registration
//! - `text_layer`: OCR words to invisible text operators
//! - `workspace`: the mutex-guarded document being rewritten

pub mod content;
pub mod error;
pub mod fonts;
pub mod images;
pub mod resources;
pub mod text_layer;
pub mod workspace;

pub use error::{PdfError, PdfResult};
pub use fonts::CjkFont;
pub use text_layer::{place_word, PlacedWord};
pub use workspace::{PageImage, PageSource, PdfWorkspace, PreparedPage};

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::{dictionary, Document, Object, Stream};

    /// One 200x100pt page painting a 4x2 gray image, plus an old text object
    pub fn scanned_pdf() -> Vec<u8> {
        let image = Stream::new(gray_image_dict(), vec![255; 8]);
        pdf_with_image(image, None)
    }

    /// Like `scanned_pdf`, but the image is run-length encoded, which only
    /// the renderer decodes
    pub fn run_length_pdf(rotate: Option<i64>) -> Vec<u8> {
        let mut dict = gray_image_dict();
        dict.set("Filter", "RunLengthDecode");
        // 8 repeats of 0xFF, then end of data
        let image = Stream::new(dict, vec![249, 255, 128]).with_compression(false);
        pdf_with_image(image, rotate)
    }

    fn gray_image_dict() -> lopdf::Dictionary {
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 4,
            "Height" => 2,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        }
    }

    fn pdf_with_image(image: Stream, rotate: Option<i64>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let image_id = doc.add_object(image);
        let old_font = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let content = b"q 200 0 0 100 0 0 cm /Im0 Do Q BT /F1 12 Tf 10 10 Td (old layer) Tj ET".to_vec();
        let content_id = doc.add_object(Stream::new(dictionary! {}, content));
        let mut page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 200.into(), 100.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
                "Font" => dictionary! { "F1" => old_font },
            },
        };
        if let Some(rotate) = rotate {
            page.set("Rotate", rotate);
        }
        let page_id = doc.add_object(page);
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }
}
