//! Image metadata
//!
//! Stored resolution and EXIF orientation of image inputs. Both are
//! best-effort: anything missing or implausible reads as absent.

use std::io::Cursor;

use image::DynamicImage;

/// Resolutions outside this range are treated as unset
const DPI_RANGE: std::ops::RangeInclusive<f64> = 1.0..=10_000.0;

const INCHES_PER_METER: f64 = 0.0254;
const CM_PER_INCH: f64 = 2.54;

/// EXIF orientation value of an upright image
pub const UPRIGHT: u32 = 1;

/// Read the EXIF orientation tag (1-8), `UPRIGHT` when absent
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return UPRIGHT,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .filter(|v| (1..=8).contains(v))
        .unwrap_or(UPRIGHT)
}

/// Apply an EXIF orientation so the image is upright
///
/// 1 = normal, 2 = mirrored, 3 = 180°, 4 = flipped, 5 = mirrored + 90° CW,
/// 6 = 90° CW, 7 = mirrored + 270° CW, 8 = 270° CW
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Whether the orientation swaps width and height
pub fn swaps_axes(orientation: u32) -> bool {
    (5..=8).contains(&orientation)
}

/// Horizontal and vertical resolution stored in the file, in dpi
pub fn stored_density(bytes: &[u8], format: image::ImageFormat) -> Option<(f32, f32)> {
    let (x, y) = match format {
        image::ImageFormat::Png => png_density(bytes),
        image::ImageFormat::Jpeg => exif_density(bytes).or_else(|| jfif_density(bytes)),
        image::ImageFormat::Bmp => bmp_density(bytes),
        image::ImageFormat::WebP => exif_density(bytes),
        _ => None,
    }?;
    plausible(x, y)
}

/// Validate a resolution pair
pub fn plausible(x: f64, y: f64) -> Option<(f32, f32)> {
    (DPI_RANGE.contains(&x) && DPI_RANGE.contains(&y)).then_some((x as f32, y as f32))
}

/// Number of color components declared by a JPEG frame header
pub fn jpeg_components(bytes: &[u8]) -> Option<u8> {
    jpeg_segments(bytes)
        .find(|(marker, _)| is_sof(*marker))
        .and_then(|(_, payload)| payload.get(5).copied())
}

fn png_density(bytes: &[u8]) -> Option<(f64, f64)> {
    let reader = png::Decoder::new(Cursor::new(bytes)).read_info().ok()?;
    let dims = reader.info().pixel_dims?;
    match dims.unit {
        png::Unit::Meter => Some((
            dims.xppu as f64 * INCHES_PER_METER,
            dims.yppu as f64 * INCHES_PER_METER,
        )),
        png::Unit::Unspecified => None,
    }
}

fn exif_density(bytes: &[u8]) -> Option<(f64, f64)> {
    let mut cursor = Cursor::new(bytes);
    let reader = exif::Reader::new().read_from_container(&mut cursor).ok()?;

    let rational = |tag| match &reader.get_field(tag, exif::In::PRIMARY)?.value {
        exif::Value::Rational(values) => values.first().map(|r| r.to_f64()),
        _ => None,
    };
    let x = rational(exif::Tag::XResolution)?;
    let y = rational(exif::Tag::YResolution).unwrap_or(x);

    // 2 = inch (the default), 3 = centimeter
    let unit = reader
        .get_field(exif::Tag::ResolutionUnit, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(2);
    match unit {
        2 => Some((x, y)),
        3 => Some((x * CM_PER_INCH, y * CM_PER_INCH)),
        _ => None,
    }
}

fn jfif_density(bytes: &[u8]) -> Option<(f64, f64)> {
    let (_, app0) = jpeg_segments(bytes).find(|(marker, payload)| *marker == 0xE0 && payload.starts_with(b"JFIF\0"))?;
    if app0.len() < 12 {
        return None;
    }
    let x = u16::from_be_bytes([app0[8], app0[9]]) as f64;
    let y = u16::from_be_bytes([app0[10], app0[11]]) as f64;
    // 0 = aspect ratio only
    match app0[7] {
        1 => Some((x, y)),
        2 => Some((x * CM_PER_INCH, y * CM_PER_INCH)),
        _ => None,
    }
}

fn bmp_density(bytes: &[u8]) -> Option<(f64, f64)> {
    let header_size = u32::from_le_bytes(bytes.get(14..18)?.try_into().ok()?);
    if header_size < 40 {
        return None;
    }
    let x = i32::from_le_bytes(bytes.get(38..42)?.try_into().ok()?);
    let y = i32::from_le_bytes(bytes.get(42..46)?.try_into().ok()?);
    (x > 0 && y > 0).then(|| (x as f64 * INCHES_PER_METER, y as f64 * INCHES_PER_METER))
}

fn is_sof(marker: u8) -> bool {
    matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC)
}

/// Marker segments of a JPEG header, up to the start of scan
fn jpeg_segments(bytes: &[u8]) -> impl Iterator<Item = (u8, &[u8])> + '_ {
    let mut pos = if bytes.starts_with(&[0xFF, 0xD8]) { 2 } else { bytes.len() };

    std::iter::from_fn(move || {
        // Fill bytes may precede a marker
        while bytes.get(pos) == Some(&0xFF) && bytes.get(pos + 1) == Some(&0xFF) {
            pos += 1;
        }
        if bytes.get(pos) != Some(&0xFF) {
            return None;
        }
        let marker = *bytes.get(pos + 1)?;
        if marker == 0xDA || marker == 0xD9 {
            return None;
        }
        let len = u16::from_be_bytes([*bytes.get(pos + 2)?, *bytes.get(pos + 3)?]) as usize;
        if len < 2 {
            return None;
        }
        let payload = bytes.get(pos + 4..pos + 2 + len)?;
        pos += 2 + len;
        Some((marker, payload))
    })
}
