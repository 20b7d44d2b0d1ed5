//! Geometry helpers
//!
//! Points, rectangles, quads and affine matrices shared by the OCR and PDF
//! layers. Matrices follow the PDF convention: a point `(x, y)` maps to
//! `(a*x + c*y + e, b*x + d*y + f)`.

use serde::{Deserialize, Serialize};

/// 2D point
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point
    pub fn distance(&self, other: &Point) -> f32 {
        ((other.x - self.x).powi(2) + (other.y - self.y).powi(2)).sqrt()
    }
}

/// Axis-aligned rectangle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_ltrb(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }

    /// Build from a PDF box array `[x0 y0 x1 y1]` (corners in any order)
    pub fn from_corners(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self::from_ltrb(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Affine transformation matrix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn new(a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn scale(sx: f32, sy: f32) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// Apply `self` first, then `other`
    pub fn concat(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn transform_point(&self, p: Point) -> Point {
        Point {
            x: self.a * p.x + self.c * p.y + self.e,
            y: self.b * p.x + self.d * p.y + self.f,
        }
    }

    /// Map from normalized image coordinates (origin top-left, v down) into
    /// the space of an image XObject drawn under `ctm`.
    ///
    /// Image space is the unit square with its first sample row at `y = 1`.
    pub fn image_placement(ctm: &Matrix) -> Matrix {
        Matrix::new(1.0, 0.0, 0.0, -1.0, 0.0, 1.0).concat(ctm)
    }

    /// Map from normalized coordinates of a rendered page (origin top-left,
    /// v down) into unrotated PDF user space.
    ///
    /// `page_box` is the crop box in PDF coordinates (y up), `rotation` the
    /// page's `/Rotate` value.
    pub fn rendered_page_placement(page_box: &Rect, rotation: i32) -> Matrix {
        let (x0, y0) = (page_box.x, page_box.y);
        let (x1, y1) = (page_box.right(), page_box.bottom());
        let (w, h) = (page_box.width, page_box.height);

        match rotation.rem_euclid(360) {
            90 => Matrix::new(0.0, h, w, 0.0, x0, y0),
            180 => Matrix::new(-w, 0.0, 0.0, h, x1, y0),
            270 => Matrix::new(0.0, -h, -w, 0.0, x1, y1),
            _ => Matrix::new(w, 0.0, 0.0, -h, x0, y1),
        }
    }

    /// Approximate horizontal and vertical extent of the unit square
    pub fn unit_extent(&self) -> (f32, f32) {
        (
            (self.a * self.a + self.b * self.b).sqrt(),
            (self.c * self.c + self.d * self.d).sqrt(),
        )
    }
}

/// Quadrilateral, corner names follow upright text orientation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Quad {
    pub ul: Point,
    pub ur: Point,
    pub ll: Point,
    pub lr: Point,
}

impl Quad {
    /// Quad from a top-down rectangle (y grows downward)
    pub fn from_rect(rect: &Rect) -> Self {
        Self {
            ul: Point::new(rect.x, rect.y),
            ur: Point::new(rect.right(), rect.y),
            ll: Point::new(rect.x, rect.bottom()),
            lr: Point::new(rect.right(), rect.bottom()),
        }
    }

    pub fn transform(&self, m: &Matrix) -> Quad {
        Quad {
            ul: m.transform_point(self.ul),
            ur: m.transform_point(self.ur),
            ll: m.transform_point(self.ll),
            lr: m.transform_point(self.lr),
        }
    }

    /// Smallest axis-aligned rectangle containing all four corners
    pub fn bounds(&self) -> Rect {
        let xs = [self.ul.x, self.ur.x, self.ll.x, self.lr.x];
        let ys = [self.ul.y, self.ur.y, self.ll.y, self.lr.y];
        let min = |v: &[f32; 4]| v.iter().copied().fold(f32::INFINITY, f32::min);
        let max = |v: &[f32; 4]| v.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        Rect::from_ltrb(min(&xs), min(&ys), max(&xs), max(&ys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_concat_applies_left_first() {
        let scale = Matrix::scale(2.0, 3.0);
        let translate = Matrix::new(1.0, 0.0, 0.0, 1.0, 10.0, 20.0);
        let m = scale.concat(&translate);
        let p = m.transform_point(Point::new(1.0, 1.0));
        assert!(approx(p.x, 12.0));
        assert!(approx(p.y, 23.0));
    }

    #[test]
    fn test_image_placement_top_left_maps_to_top_of_image() {
        // Image drawn as a 600x800 rectangle at (0, 0)
        let ctm = Matrix::new(600.0, 0.0, 0.0, 800.0, 0.0, 0.0);
        let placement = Matrix::image_placement(&ctm);

        let top_left = placement.transform_point(Point::new(0.0, 0.0));
        assert!(approx(top_left.x, 0.0));
        assert!(approx(top_left.y, 800.0));

        let bottom_right = placement.transform_point(Point::new(1.0, 1.0));
        assert!(approx(bottom_right.x, 600.0));
        assert!(approx(bottom_right.y, 0.0));
    }

    #[test]
    fn test_rendered_page_placement_unrotated() {
        let page = Rect::from_corners(0.0, 0.0, 612.0, 792.0);
        let m = Matrix::rendered_page_placement(&page, 0);
        let p = m.transform_point(Point::new(0.0, 0.0));
        assert!(approx(p.x, 0.0) && approx(p.y, 792.0));
        let p = m.transform_point(Point::new(1.0, 1.0));
        assert!(approx(p.x, 612.0) && approx(p.y, 0.0));
    }

    #[test]
    fn test_rendered_page_placement_rotated_90() {
        // Rotated clockwise: display top-left is the unrotated bottom-left
        let page = Rect::from_corners(0.0, 0.0, 100.0, 200.0);
        let m = Matrix::rendered_page_placement(&page, 90);
        let p = m.transform_point(Point::new(0.0, 0.0));
        assert!(approx(p.x, 0.0) && approx(p.y, 0.0));
        let p = m.transform_point(Point::new(1.0, 0.0));
        assert!(approx(p.x, 0.0) && approx(p.y, 200.0));
    }

    #[test]
    fn test_rendered_page_placement_rotated_270() {
        let page = Rect::from_corners(0.0, 0.0, 100.0, 200.0);
        let m = Matrix::rendered_page_placement(&page, -90);
        let p = m.transform_point(Point::new(0.0, 0.0));
        assert!(approx(p.x, 100.0) && approx(p.y, 200.0));
    }

    #[test]
    fn test_quad_bounds() {
        let quad = Quad::from_rect(&Rect::new(10.0, 20.0, 30.0, 5.0));
        let rotated = quad.transform(&Matrix::new(0.0, 1.0, -1.0, 0.0, 0.0, 0.0));
        let b = rotated.bounds();
        assert!(approx(b.x, -25.0));
        assert!(approx(b.y, 10.0));
        assert!(approx(b.width, 5.0));
        assert!(approx(b.height, 30.0));
    }
}
