//! Invisible text layer
//!
//! Converts OCR word boxes (pixel quads of the OCR'd image) into text-showing
//! operators in render mode 3, positioned so each word's selection box
//! covers the word on the scanned image.

use lopdf::content::Operation;
use lopdf::{Object, StringFormat};

use crate::document::{Matrix, Point, Quad};

use super::fonts::{encode_utf16be, text_advance};

/// Boxes smaller than this (in points) are dropped
const MIN_EXTENT: f32 = 0.01;

/// A word positioned in PDF user space
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedWord {
    pub text: String,
    /// Baseline start (lower-left corner of the word box)
    pub origin: Point,
    /// Unit vector along the baseline
    pub direction: (f32, f32),
    /// Unit vector from baseline towards the top of the word
    pub up: (f32, f32),
    /// Baseline length in points
    pub width: f32,
    /// Box height in points, used as font size
    pub font_size: f32,
}

impl PlacedWord {
    /// Horizontal scaling (percent) that stretches the text to `width`
    pub fn horizontal_scale(&self) -> f32 {
        let natural = self.font_size * text_advance(&self.text);
        if natural <= 0.0 {
            100.0
        } else {
            100.0 * self.width / natural
        }
    }
}

/// Map a word from image pixels into PDF user space
///
/// `placement` maps normalized image coordinates (top-left origin, y down)
/// to user space. Returns `None` for blank text or degenerate boxes.
pub fn place_word(
    text: &str,
    quad: &Quad,
    image_width: u32,
    image_height: u32,
    placement: &Matrix,
) -> Option<PlacedWord> {
    let text = text.trim();
    if text.is_empty() || image_width == 0 || image_height == 0 {
        return None;
    }

    let to_page = Matrix::scale(1.0 / image_width as f32, 1.0 / image_height as f32).concat(placement);
    let q = quad.transform(&to_page);

    let width = q.ll.distance(&q.lr);
    let height = q.ll.distance(&q.ul);
    if width < MIN_EXTENT || height < MIN_EXTENT {
        return None;
    }

    let direction = ((q.lr.x - q.ll.x) / width, (q.lr.y - q.ll.y) / width);
    let up = ((q.ul.x - q.ll.x) / height, (q.ul.y - q.ll.y) / height);

    Some(PlacedWord {
        text: text.to_string(),
        origin: q.ll,
        direction,
        up,
        width,
        font_size: height,
    })
}

/// Text object showing `words` invisibly with the font registered as `font_name`
pub fn text_operations(words: &[PlacedWord], font_name: &[u8]) -> Vec<Operation> {
    if words.is_empty() {
        return Vec::new();
    }

    let mut ops = Vec::with_capacity(words.len() * 4 + 3);
    ops.push(Operation::new("BT", vec![]));
    ops.push(Operation::new("Tr", vec![3.into()]));

    for word in words {
        ops.push(Operation::new(
            "Tf",
            vec![Object::Name(font_name.to_vec()), word.font_size.into()],
        ));
        ops.push(Operation::new("Tz", vec![word.horizontal_scale().into()]));
        ops.push(Operation::new(
            "Tm",
            vec![
                word.direction.0.into(),
                word.direction.1.into(),
                word.up.0.into(),
                word.up.1.into(),
                word.origin.x.into(),
                word.origin.y.into(),
            ],
        ));
        ops.push(Operation::new(
            "Tj",
            vec![Object::String(encode_utf16be(&word.text), StringFormat::Hexadecimal)],
        ));
    }

    ops.push(Operation::new("ET", vec![]));
    ops
}
