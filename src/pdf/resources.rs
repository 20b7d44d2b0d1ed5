//! Page dictionary helpers
//!
//! Resolves inheritable page attributes (`Resources`, `MediaBox`, `CropBox`,
//! `Rotate`) and registers the text-layer font in a page's resources.

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};

use crate::document::Rect;

use super::content::number;
use super::error::{PdfError, PdfResult};

/// Guard against cyclic `/Parent` chains
const MAX_TREE_DEPTH: usize = 64;

/// US Letter, used when a page carries no usable MediaBox
const DEFAULT_PAGE_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Look up an inheritable page attribute, walking `/Parent` links
pub fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;

    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return doc.dereference(value).ok().map(|(_, o)| o);
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }

    None
}

/// Effective resource dictionary of a page (cloned, possibly empty)
pub fn page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    inherited(doc, page_id, b"Resources")
        .and_then(|o| o.as_dict().ok())
        .cloned()
        .unwrap_or_default()
}

/// Visible page area: CropBox if present, else MediaBox
pub fn page_box(doc: &Document, page_id: ObjectId) -> Rect {
    let parse = |key: &[u8]| -> Option<Rect> {
        let values: Vec<f32> = inherited(doc, page_id, key)?
            .as_array()
            .ok()?
            .iter()
            .map(|o| doc.dereference(o).ok().and_then(|(_, o)| number(o)))
            .collect::<Option<_>>()?;
        if values.len() != 4 {
            return None;
        }
        let rect = Rect::from_corners(values[0], values[1], values[2], values[3]);
        (!rect.is_empty()).then_some(rect)
    };

    parse(b"CropBox").or_else(|| parse(b"MediaBox")).unwrap_or_else(|| {
        let [x0, y0, x1, y1] = DEFAULT_PAGE_BOX;
        Rect::from_corners(x0, y0, x1, y1)
    })
}

/// Page rotation normalized to 0, 90, 180 or 270
pub fn page_rotation(doc: &Document, page_id: ObjectId) -> i32 {
    inherited(doc, page_id, b"Rotate")
        .and_then(|o| o.as_i64().ok())
        .map(|r| (r.rem_euclid(360) / 90 * 90) as i32)
        .unwrap_or(0)
}

/// Image XObject registered under `name` in the page resources
pub fn image_xobject<'a>(doc: &'a Document, resources: &Dictionary, name: &[u8]) -> Option<&'a Stream> {
    let xobjects = resources.get(b"XObject").ok()?;
    let (_, xobjects) = doc.dereference(xobjects).ok()?;
    let entry = xobjects.as_dict().ok()?.get(name).ok()?;
    let id = entry.as_reference().ok()?;
    let stream = doc.get_object(id).ok()?.as_stream().ok()?;

    let is_image = stream
        .dict
        .get(b"Subtype")
        .and_then(|s| s.as_name())
        .map(|s| s == b"Image")
        .unwrap_or(false);
    is_image.then_some(stream)
}

/// Register `font_id` in the page's font resources
///
/// The page gets its own copy of the effective resource dictionary, so
/// inherited or shared resources are never modified in place. Returns the
/// resource name the font was registered under.
pub fn register_font(doc: &mut Document, page_id: ObjectId, font_id: ObjectId) -> PdfResult<Vec<u8>> {
    let mut resources = page_resources(doc, page_id);

    let mut fonts = match resources.get(b"Font") {
        Ok(obj) => doc
            .dereference(obj)?
            .1
            .as_dict()
            .cloned()
            .unwrap_or_default(),
        Err(_) => Dictionary::new(),
    };

    // Reuse an existing registration of the same font
    let existing = fonts
        .iter()
        .find(|(_, v)| v.as_reference().ok() == Some(font_id))
        .map(|(k, _)| k.clone());

    let name = match existing {
        Some(name) => name,
        None => {
            let name = unique_name(&fonts, "FOcr");
            fonts.set(name.clone(), font_id);
            name
        }
    };

    resources.set("Font", fonts);

    let page = doc
        .get_object_mut(page_id)?
        .as_dict_mut()
        .map_err(|_| PdfError::Malformed("page object is not a dictionary".into()))?;
    page.set("Resources", resources);

    Ok(name)
}

fn unique_name(dict: &Dictionary, prefix: &str) -> Vec<u8> {
    let mut candidate = prefix.as_bytes().to_vec();
    let mut n = 0;
    while dict.has(&candidate) {
        n += 1;
        candidate = format!("{}{}", prefix, n).into_bytes();
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    /// Pages node with inherited attributes and a single kid
    fn doc_with_inherited_attributes() -> (Document, ObjectId) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! { "Type" => "Font", "Subtype" => "Type1", "BaseFont" => "Helvetica" });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "FOcr" => font_id },
        });
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                "Rotate" => -90,
                "Resources" => resources_id,
            }),
        );
        (doc, page_id)
    }

    #[test]
    fn test_inherited_box_and_rotation() {
        let (doc, page_id) = doc_with_inherited_attributes();
        let rect = page_box(&doc, page_id);
        assert_eq!(rect, Rect::new(0.0, 0.0, 595.0, 842.0));
        assert_eq!(page_rotation(&doc, page_id), 270);
    }

    #[test]
    fn test_crop_box_wins() {
        let (mut doc, page_id) = doc_with_inherited_attributes();
        doc.get_object_mut(page_id)
            .unwrap()
            .as_dict_mut()
            .unwrap()
            .set("CropBox", vec![10.into(), 20.into(), 110.into(), 220.into()]);
        assert_eq!(page_box(&doc, page_id), Rect::new(10.0, 20.0, 100.0, 200.0));
    }

    #[test]
    fn test_register_font_avoids_name_clash() {
        let (mut doc, page_id) = doc_with_inherited_attributes();
        let ocr_font = doc.add_object(dictionary! { "Type" => "Font" });

        let name = register_font(&mut doc, page_id, ocr_font).unwrap();
        assert_eq!(name, b"FOcr1".to_vec());

        // Page now owns its resources, inherited font entry preserved
        let page = doc.get_dictionary(page_id).unwrap();
        let fonts = page
            .get(b"Resources")
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"Font")
            .unwrap()
            .as_dict()
            .unwrap();
        assert!(fonts.has(b"FOcr"));
        assert_eq!(fonts.get(b"FOcr1").unwrap().as_reference().unwrap(), ocr_font);

        // Second registration reuses the name
        let again = register_font(&mut doc, page_id, ocr_font).unwrap();
        assert_eq!(again, name);
    }

    #[test]
    fn test_image_xobject_lookup() {
        let mut doc = Document::with_version("1.5");
        let image_id = doc.add_object(Stream::new(
            dictionary! { "Subtype" => "Image", "Width" => 1, "Height" => 1 },
            vec![0],
        ));
        let form_id = doc.add_object(Stream::new(dictionary! { "Subtype" => "Form" }, vec![]));
        let resources = dictionary! {
            "XObject" => dictionary! { "Im0" => image_id, "Fm0" => form_id },
        };

        assert!(image_xobject(&doc, &resources, b"Im0").is_some());
        assert!(image_xobject(&doc, &resources, b"Fm0").is_none());
        assert!(image_xobject(&doc, &resources, b"Missing").is_none());
    }
}
