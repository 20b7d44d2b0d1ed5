//! Content stream scanning
//!
//! A small interpreter over decoded page operations: it removes text
//! objects and tracks the graphics-state matrix far enough to tell where
//! image XObjects are painted.

use lopdf::content::Operation;
use lopdf::Object;

use crate::document::Matrix;

/// An image XObject painted by a content stream
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDraw {
    /// Resource name of the XObject (without the leading slash)
    pub name: Vec<u8>,
    /// Transformation in effect when the image was painted
    pub ctm: Matrix,
}

/// Operators that only have meaning inside a text object
const TEXT_OPERATORS: &[&str] = &[
    "Tc", "Tw", "Tz", "TL", "Tf", "Tr", "Ts", "Td", "TD", "Tm", "T*", "Tj", "TJ", "'", "\"",
];

/// Remove every text object (`BT` .. `ET`) from a content stream
///
/// Only the text operators go; color, graphics-state and path operators
/// inside a text object are kept so later painting is unaffected.
/// Returns the remaining operations and the number of text objects removed.
/// An unterminated text object runs to the end of the stream.
pub fn strip_text(operations: Vec<Operation>) -> (Vec<Operation>, usize) {
    let mut kept = Vec::with_capacity(operations.len());
    let mut in_text = false;
    let mut removed = 0;

    for op in operations {
        match op.operator.as_str() {
            "BT" => {
                in_text = true;
                removed += 1;
            }
            "ET" => in_text = false,
            name if in_text && TEXT_OPERATORS.contains(&name) => {}
            _ => kept.push(op),
        }
    }

    (kept, removed)
}

/// Whether the stream shows any text
pub fn contains_text(operations: &[Operation]) -> bool {
    operations
        .iter()
        .any(|op| matches!(op.operator.as_str(), "Tj" | "TJ" | "'" | "\""))
}

/// List painted XObjects accepted by `is_image`, in paint order
pub fn find_image_draws<F>(operations: &[Operation], is_image: F) -> Vec<ImageDraw>
where
    F: Fn(&[u8]) -> bool,
{
    let mut draws = Vec::new();
    let mut stack: Vec<Matrix> = Vec::new();
    let mut ctm = Matrix::IDENTITY;

    for op in operations {
        match op.operator.as_str() {
            "q" => stack.push(ctm),
            "Q" => {
                if let Some(saved) = stack.pop() {
                    ctm = saved;
                }
            }
            "cm" => match matrix_operands(&op.operands) {
                Some(m) => ctm = m.concat(&ctm),
                None => tracing::debug!("Ignoring malformed cm operands: {:?}", op.operands),
            },
            "Do" => {
                if let Some(Object::Name(name)) = op.operands.first() {
                    if is_image(name) {
                        draws.push(ImageDraw {
                            name: name.clone(),
                            ctm,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    draws
}

/// Numeric value of a PDF object
pub(crate) fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn matrix_operands(operands: &[Object]) -> Option<Matrix> {
    if operands.len() != 6 {
        return None;
    }
    let v: Vec<f32> = operands.iter().map(number).collect::<Option<_>>()?;
    Some(Matrix::new(v[0], v[1], v[2], v[3], v[4], v[5]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::Content;

    fn ops(src: &str) -> Vec<Operation> {
        Content::decode(src.as_bytes()).unwrap().operations
    }

    fn operators(ops: &[Operation]) -> Vec<&str> {
        ops.iter().map(|op| op.operator.as_str()).collect()
    }

    #[test]
    fn test_strip_text_keeps_graphics() {
        let src = "q 612 0 0 792 0 0 cm /Im0 Do Q BT /F1 12 Tf 72 700 Td (old) Tj ET 0 0 m 10 10 l S";
        let (kept, removed) = strip_text(ops(src));
        assert_eq!(removed, 1);
        assert_eq!(operators(&kept), vec!["q", "cm", "Do", "Q", "m", "l", "S"]);
        assert!(!contains_text(&kept));
    }

    #[test]
    fn test_strip_text_multiple_objects() {
        let src = "BT (a) Tj ET BT [(b) 10 (c)] TJ ET /Im1 Do";
        let (kept, removed) = strip_text(ops(src));
        assert_eq!(removed, 2);
        assert_eq!(operators(&kept), vec!["Do"]);
    }

    #[test]
    fn test_strip_text_keeps_state_set_inside_text_object() {
        let src = "BT 1 0 0 rg /F1 12 Tf 0.5 g (x) Tj /GS0 gs /CS0 cs 0.2 scn ET 0 0 m 10 10 l f";
        let (kept, removed) = strip_text(ops(src));
        assert_eq!(removed, 1);
        assert_eq!(
            operators(&kept),
            vec!["rg", "g", "gs", "cs", "scn", "m", "l", "f"]
        );
    }

    #[test]
    fn test_contains_text() {
        assert!(contains_text(&ops("BT (hi) Tj ET")));
        assert!(!contains_text(&ops("BT ET q Q")));
    }

    #[test]
    fn test_find_image_draws_tracks_nested_ctm() {
        let src = "q 1 0 0 1 50 100 cm q 200 0 0 300 0 0 cm /Im0 Do Q /Fm0 Do Q /Im1 Do";
        let draws = find_image_draws(&ops(src), |name| name.starts_with(b"Im"));

        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].name, b"Im0".to_vec());
        assert_eq!(draws[0].ctm, Matrix::new(200.0, 0.0, 0.0, 300.0, 50.0, 100.0));
        assert_eq!(draws[1].name, b"Im1".to_vec());
        assert_eq!(draws[1].ctm, Matrix::IDENTITY);
    }

    #[test]
    fn test_unbalanced_restore_is_ignored() {
        let src = "Q Q 2 0 0 2 0 0 cm /Im0 Do";
        let draws = find_image_draws(&ops(src), |_| true);
        assert_eq!(draws[0].ctm, Matrix::scale(2.0, 2.0));
    }
}
