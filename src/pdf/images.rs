//! Image XObject decoding
//!
//! Turns the sample data of an image XObject into an `image::DynamicImage`
//! for OCR. Only encodings that can be decoded without a full renderer are
//! handled here; everything else reports `UnsupportedImage` so the caller can
//! fall back to rasterizing the page.

use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, Stream};

use super::error::{PdfError, PdfResult};

static BLACK: [u8; 4] = [0; 4];

/// Largest image decoded in memory; bigger ones are rendered instead
const MAX_IMAGE_PIXELS: usize = 144_000_000;

/// Color model of raw image samples
#[derive(Debug, Clone, PartialEq)]
enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    Indexed { base: Box<ColorSpace>, palette: Vec<u8> },
}

impl ColorSpace {
    fn components(&self) -> usize {
        match self {
            Self::Gray | Self::Indexed { .. } => 1,
            Self::Rgb => 3,
            Self::Cmyk => 4,
        }
    }
}

/// Decode an image XObject stream
pub fn decode_image(doc: &Document, stream: &Stream) -> PdfResult<DynamicImage> {
    let dict = &stream.dict;
    let filters = filter_names(doc, dict)?;

    match filters.as_slice() {
        [last] if is_dct(last) => {
            return image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)
                .map_err(Into::into);
        }
        _ => {}
    }

    if let Some(unsupported) = filters.iter().find(|f| !is_flate_or_lzw(f)) {
        return Err(PdfError::UnsupportedImage(
            String::from_utf8_lossy(unsupported).into_owned(),
        ));
    }

    let width = required_int(doc, dict, b"Width")?;
    let height = required_int(doc, dict, b"Height")?;
    pixel_count(width, height)?;

    let samples = if filters.is_empty() {
        stream.content.clone()
    } else {
        stream.decompressed_content()?
    };

    let is_mask = optional(doc, dict, b"ImageMask")
        .and_then(|o| o.as_bool().ok())
        .unwrap_or(false);

    let (color_space, bits) = if is_mask {
        (ColorSpace::Gray, 1)
    } else {
        let cs = match optional(doc, dict, b"ColorSpace") {
            Some(obj) => resolve_color_space(doc, obj)?,
            None => {
                return Err(PdfError::UnsupportedImage(
                    "image without color space".to_string(),
                ))
            }
        };
        let bits = required_int(doc, dict, b"BitsPerComponent")?;
        (cs, bits)
    };

    // Unpainted mask samples (1) come out white, like paper
    let invert = optional(doc, dict, b"Decode")
        .and_then(|o| o.as_array().ok())
        .map(|decode| decode_is_inverted(decode))
        .unwrap_or(false);

    decode_samples(&samples, width, height, bits, &color_space, invert)
}

fn is_dct(name: &[u8]) -> bool {
    name == b"DCTDecode" || name == b"DCT"
}

fn is_flate_or_lzw(name: &[u8]) -> bool {
    matches!(name, b"FlateDecode" | b"Fl" | b"LZWDecode" | b"LZW")
}

/// Number of pixels, refusing images past `MAX_IMAGE_PIXELS`
fn pixel_count(width: u32, height: u32) -> PdfResult<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .filter(|pixels| *pixels <= MAX_IMAGE_PIXELS)
        .ok_or_else(|| PdfError::UnsupportedImage(format!("{}x{} image is too large", width, height)))
}

fn optional<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let obj = dict.get(key).ok()?;
    doc.dereference(obj).ok().map(|(_, o)| o)
}

fn required_int(doc: &Document, dict: &Dictionary, key: &[u8]) -> PdfResult<u32> {
    optional(doc, dict, key)
        .and_then(|o| o.as_i64().ok())
        .filter(|v| *v > 0 && *v <= u32::MAX as i64)
        .map(|v| v as u32)
        .ok_or_else(|| {
            PdfError::Malformed(format!(
                "image /{} missing or invalid",
                String::from_utf8_lossy(key)
            ))
        })
}

fn filter_names(doc: &Document, dict: &Dictionary) -> PdfResult<Vec<Vec<u8>>> {
    let Some(filter) = optional(doc, dict, b"Filter") else {
        return Ok(Vec::new());
    };

    match filter {
        Object::Name(name) => Ok(vec![name.clone()]),
        Object::Array(items) => items
            .iter()
            .map(|item| {
                let (_, item) = doc.dereference(item)?;
                item.as_name()
                    .map(|n| n.to_vec())
                    .map_err(|_| PdfError::Malformed("non-name filter entry".into()))
            })
            .collect(),
        other => Err(PdfError::Malformed(format!("unexpected /Filter {:?}", other))),
    }
}

fn resolve_color_space(doc: &Document, obj: &Object) -> PdfResult<ColorSpace> {
    let (_, obj) = doc.dereference(obj)?;
    match obj {
        Object::Name(name) => match name.as_slice() {
            b"DeviceGray" | b"G" | b"CalGray" => Ok(ColorSpace::Gray),
            b"DeviceRGB" | b"RGB" | b"CalRGB" => Ok(ColorSpace::Rgb),
            b"DeviceCMYK" | b"CMYK" => Ok(ColorSpace::Cmyk),
            other => Err(PdfError::UnsupportedImage(format!(
                "color space {}",
                String::from_utf8_lossy(other)
            ))),
        },
        Object::Array(items) => {
            let family = items
                .first()
                .and_then(|o| o.as_name().ok())
                .ok_or_else(|| PdfError::Malformed("empty color space array".into()))?;

            match family {
                b"CalGray" => Ok(ColorSpace::Gray),
                b"CalRGB" => Ok(ColorSpace::Rgb),
                b"ICCBased" => {
                    let profile = items
                        .get(1)
                        .ok_or_else(|| PdfError::Malformed("ICCBased without profile".into()))?;
                    let (_, profile) = doc.dereference(profile)?;
                    let n = profile
                        .as_stream()
                        .ok()
                        .and_then(|s| s.dict.get(b"N").ok())
                        .and_then(|n| n.as_i64().ok())
                        .unwrap_or(3);
                    match n {
                        1 => Ok(ColorSpace::Gray),
                        3 => Ok(ColorSpace::Rgb),
                        4 => Ok(ColorSpace::Cmyk),
                        other => Err(PdfError::UnsupportedImage(format!(
                            "ICC profile with {} components",
                            other
                        ))),
                    }
                }
                b"Indexed" | b"I" => {
                    if items.len() < 4 {
                        return Err(PdfError::Malformed("short Indexed color space".into()));
                    }
                    let base = resolve_color_space(doc, &items[1])?;
                    if matches!(base, ColorSpace::Indexed { .. }) {
                        return Err(PdfError::Malformed("nested Indexed color space".into()));
                    }
                    let (_, lookup) = doc.dereference(&items[3])?;
                    let palette = match lookup {
                        Object::String(bytes, _) => bytes.clone(),
                        Object::Stream(s) => s.decompressed_content().unwrap_or_else(|_| s.content.clone()),
                        _ => return Err(PdfError::Malformed("invalid Indexed lookup".into())),
                    };
                    Ok(ColorSpace::Indexed {
                        base: Box::new(base),
                        palette,
                    })
                }
                other => Err(PdfError::UnsupportedImage(format!(
                    "color space {}",
                    String::from_utf8_lossy(other)
                ))),
            }
        }
        other => Err(PdfError::Malformed(format!("unexpected color space {:?}", other))),
    }
}

fn decode_is_inverted(decode: &[Object]) -> bool {
    let values: Vec<f32> = decode.iter().filter_map(super::content::number).collect();
    values.len() >= 2 && values[0] > values[1]
}

/// Expand packed samples into an 8-bit gray or RGB image
fn decode_samples(
    samples: &[u8],
    width: u32,
    height: u32,
    bits: u32,
    color_space: &ColorSpace,
    invert: bool,
) -> PdfResult<DynamicImage> {
    if !matches!(bits, 1 | 2 | 4 | 8 | 16) {
        return Err(PdfError::Malformed(format!("{} bits per component", bits)));
    }

    let pixels = pixel_count(width, height)?;
    let components = color_space.components();
    let stride = (width as usize)
        .checked_mul(components * bits as usize)
        .map(|row_bits| row_bits.div_ceil(8))
        .ok_or_else(|| PdfError::UnsupportedImage(format!("{} px rows are too wide", width)))?;
    let needed = stride
        .checked_mul(height as usize)
        .ok_or_else(|| PdfError::UnsupportedImage(format!("{}x{} image is too large", width, height)))?;
    if samples.len() < needed {
        return Err(PdfError::Malformed(format!(
            "image data too short: {} bytes, expected {}",
            samples.len(),
            needed
        )));
    }

    let max = ((1u32 << bits) - 1) as f32;
    let scale = |v: u32| -> u8 { ((v as f32) * 255.0 / max).round() as u8 };

    let read = |row: &[u8], index: usize| -> u32 {
        match bits {
            8 => row[index] as u32,
            16 => row[index * 2] as u32 * 257 + row[index * 2 + 1] as u32,
            _ => {
                let bit = index * bits as usize;
                let byte = row[bit / 8];
                let shift = 8 - bits as usize - (bit % 8);
                ((byte >> shift) as u32) & ((1u32 << bits) - 1)
            }
        }
    };
    // 16-bit samples are read as full u16 values
    let scale16 = |v: u32| -> u8 { (v / 257) as u8 };
    let to_u8 = |v: u32| if bits == 16 { scale16(v) } else { scale(v) };

    let base_rgb = |cs: &ColorSpace, px: &[u8]| -> [u8; 3] {
        match cs {
            ColorSpace::Gray => [px[0], px[0], px[0]],
            ColorSpace::Rgb => [px[0], px[1], px[2]],
            ColorSpace::Cmyk => cmyk_to_rgb(px[0], px[1], px[2], px[3]),
            ColorSpace::Indexed { .. } => [0, 0, 0],
        }
    };

    let rows = samples.chunks(stride).take(height as usize);

    match color_space {
        ColorSpace::Gray => {
            let mut out = Vec::with_capacity(pixels);
            for row in rows {
                for x in 0..width as usize {
                    let v = to_u8(read(row, x));
                    out.push(if invert { 255 - v } else { v });
                }
            }
            let img = GrayImage::from_raw(width, height, out)
                .ok_or_else(|| PdfError::Malformed("gray buffer size mismatch".into()))?;
            Ok(DynamicImage::ImageLuma8(img))
        }
        ColorSpace::Indexed { base, palette } => {
            let n = base.components();
            let mut out = Vec::with_capacity(pixels * 3);
            for row in rows {
                for x in 0..width as usize {
                    let index = read(row, x) as usize;
                    let entry = palette
                        .get(index * n..index * n + n)
                        .unwrap_or(&BLACK[..n]);
                    out.extend_from_slice(&base_rgb(base, entry));
                }
            }
            let img = RgbImage::from_raw(width, height, out)
                .ok_or_else(|| PdfError::Malformed("indexed buffer size mismatch".into()))?;
            Ok(DynamicImage::ImageRgb8(img))
        }
        ColorSpace::Rgb | ColorSpace::Cmyk => {
            let mut out = Vec::with_capacity(pixels * 3);
            let mut px = [0u8; 4];
            for row in rows {
                for x in 0..width as usize {
                    for (c, slot) in px.iter_mut().enumerate().take(components) {
                        let v = to_u8(read(row, x * components + c));
                        *slot = if invert { 255 - v } else { v };
                    }
                    out.extend_from_slice(&base_rgb(color_space, &px));
                }
            }
            let img = RgbImage::from_raw(width, height, out)
                .ok_or_else(|| PdfError::Malformed("rgb buffer size mismatch".into()))?;
            Ok(DynamicImage::ImageRgb8(img))
        }
    }
}

fn cmyk_to_rgb(c: u8, m: u8, y: u8, k: u8) -> [u8; 3] {
    let channel = |v: u8| ((255 - v as u32) * (255 - k as u32) / 255) as u8;
    [channel(c), channel(m), channel(y)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;
    use lopdf::dictionary;

    fn image_stream(dict: Dictionary, data: Vec<u8>) -> Stream {
        Stream::new(dict, data)
    }

    #[test]
    fn test_decode_rgb8() {
        let doc = Document::with_version("1.5");
        let stream = image_stream(
            dictionary! {
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 1,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            vec![255, 0, 0, 0, 0, 255],
        );

        let img = decode_image(&doc, &stream).unwrap();
        assert_eq!(img.dimensions(), (2, 1));
        let rgb = img.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(rgb.get_pixel(1, 0).0, [0, 0, 255]);
    }

    #[test]
    fn test_decode_one_bit_gray_with_row_padding() {
        let doc = Document::with_version("1.5");
        // 3 pixels per row -> 1 byte stride; rows: 101, 010
        let stream = image_stream(
            dictionary! {
                "Width" => 3,
                "Height" => 2,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 1,
            },
            vec![0b1010_0000, 0b0100_0000],
        );

        let img = decode_image(&doc, &stream).unwrap().to_luma8();
        assert_eq!(img.get_pixel(0, 0).0, [255]);
        assert_eq!(img.get_pixel(1, 0).0, [0]);
        assert_eq!(img.get_pixel(2, 0).0, [255]);
        assert_eq!(img.get_pixel(1, 1).0, [255]);
    }

    #[test]
    fn test_decode_inverted_gray() {
        let doc = Document::with_version("1.5");
        let stream = image_stream(
            dictionary! {
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Decode" => vec![1.into(), 0.into()],
            },
            vec![200],
        );

        let img = decode_image(&doc, &stream).unwrap().to_luma8();
        assert_eq!(img.get_pixel(0, 0).0, [55]);
    }

    #[test]
    fn test_decode_indexed() {
        let doc = Document::with_version("1.5");
        let palette = Object::String(vec![0, 0, 0, 10, 20, 30], lopdf::StringFormat::Hexadecimal);
        let stream = image_stream(
            dictionary! {
                "Width" => 2,
                "Height" => 1,
                "ColorSpace" => vec![Object::Name(b"Indexed".to_vec()), Object::Name(b"DeviceRGB".to_vec()), 1.into(), palette],
                "BitsPerComponent" => 8,
            },
            vec![1, 0],
        );

        let img = decode_image(&doc, &stream).unwrap().to_rgb8();
        assert_eq!(img.get_pixel(0, 0).0, [10, 20, 30]);
        assert_eq!(img.get_pixel(1, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_flate_samples() {
        let doc = Document::with_version("1.5");
        let mut stream = image_stream(
            dictionary! {
                "Width" => 2,
                "Height" => 2,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![1, 2, 3, 4],
        );
        let _ = stream.compress();
        assert!(stream.dict.has(b"Filter"));

        let img = decode_image(&doc, &stream).unwrap().to_luma8();
        assert_eq!(img.into_raw(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_unsupported_filter() {
        let doc = Document::with_version("1.5");
        let stream = image_stream(
            dictionary! {
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 1,
                "Filter" => "JBIG2Decode",
            },
            vec![0],
        );

        assert!(matches!(
            decode_image(&doc, &stream),
            Err(PdfError::UnsupportedImage(f)) if f == "JBIG2Decode"
        ));
    }

    #[test]
    fn test_oversized_image_is_left_to_the_renderer() {
        let doc = Document::with_version("1.5");
        let stream = image_stream(
            dictionary! {
                "Width" => 100_000,
                "Height" => 100_000,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            vec![0; 16],
        );
        assert!(matches!(decode_image(&doc, &stream), Err(PdfError::UnsupportedImage(_))));

        let wide = decode_samples(&[0; 16], u32::MAX, 2, 16, &ColorSpace::Cmyk, false);
        assert!(matches!(wide, Err(PdfError::UnsupportedImage(_))));
    }

    #[test]
    fn test_short_data_is_malformed() {
        let doc = Document::with_version("1.5");
        let stream = image_stream(
            dictionary! {
                "Width" => 10,
                "Height" => 10,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            vec![0; 20],
        );
        assert!(matches!(decode_image(&doc, &stream), Err(PdfError::Malformed(_))));
    }
}
