//! Image to PDF conversion
//!
//! Wraps scanned images into a PDF whose pages are exactly the images, so
//! the page pipeline can treat image inputs like scans. Multi-page TIFFs
//! become one page per frame.

use std::io::Cursor;

use image::{ColorType, DynamicImage, GenericImageView, GrayImage, ImageBuffer, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use tiff::decoder::{Decoder as TiffDecoder, DecodingResult};
use tiff::tags::Tag;

use super::error::{DocumentError, DocumentResult};
use super::metadata::{apply_orientation, jpeg_components, plausible, read_exif_orientation, stored_density, swaps_axes, UPRIGHT};

/// Name of the image XObject on each generated page
const IMAGE_NAME: &str = "Im0";

/// TIFF Orientation tag
const TIFF_ORIENTATION: u16 = 0x0112;

/// One decoded image, upright, with its resolution
struct Frame {
    image: DynamicImage,
    /// Horizontal and vertical dpi
    dpi: (f32, f32),
    /// The source JPEG can be embedded unchanged
    passthrough: bool,
}

impl Frame {
    fn new(image: DynamicImage, dpi: (f32, f32), orientation: u32) -> Self {
        let dpi = if swaps_axes(orientation) { (dpi.1, dpi.0) } else { dpi };
        Self {
            image: apply_orientation(image, orientation),
            dpi,
            passthrough: false,
        }
    }
}

/// Convert encoded image bytes into a PDF document
///
/// Each page measures `pixels * 72 / dpi` points, where `dpi` is the
/// resolution stored in the image and `fallback_dpi` when there is none.
/// EXIF orientation is applied. Upright baseline JPEG data in gray or RGB
/// is embedded unchanged; everything else is re-encoded as 8-bit samples
/// and left for Flate compression at save time.
pub fn image_to_pdf(bytes: &[u8], format: image::ImageFormat, fallback_dpi: f32) -> DocumentResult<Document> {
    if !(fallback_dpi.is_finite() && fallback_dpi > 0.0) {
        return Err(DocumentError::InvalidContent(format!(
            "Invalid image resolution: {}",
            fallback_dpi
        )));
    }
    let fallback = (fallback_dpi, fallback_dpi);

    let frames = match format {
        image::ImageFormat::Tiff => tiff_frames(bytes, fallback)?,
        _ => vec![single_frame(bytes, format, fallback)?],
    };

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::with_capacity(frames.len());
    for frame in &frames {
        let page_id = add_page(&mut doc, pages_id, frame, bytes)?;
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    tracing::debug!("Converted {:?} image to {} page(s)", format, frames.len());
    Ok(doc)
}

fn single_frame(bytes: &[u8], format: image::ImageFormat, fallback: (f32, f32)) -> DocumentResult<Frame> {
    let image = image::load_from_memory_with_format(bytes, format)?;
    check_size(&image)?;

    let orientation = read_exif_orientation(bytes);
    let dpi = stored_density(bytes, format).unwrap_or(fallback);

    // CMYK JPEGs decode to RGB, so the frame header decides
    let passthrough = format == image::ImageFormat::Jpeg
        && orientation == UPRIGHT
        && matches!(image.color(), ColorType::L8 | ColorType::Rgb8)
        && matches!(jpeg_components(bytes), Some(1 | 3));

    let mut frame = Frame::new(image, dpi, orientation);
    frame.passthrough = passthrough;
    Ok(frame)
}

fn tiff_frames(bytes: &[u8], fallback: (f32, f32)) -> DocumentResult<Vec<Frame>> {
    let mut decoder = TiffDecoder::new(Cursor::new(bytes))?;
    let mut frames = Vec::new();

    loop {
        let (width, height) = decoder.dimensions()?;
        let color = decoder.colortype()?;
        let dpi = tiff_density(&mut decoder).unwrap_or(fallback);
        let orientation = tag_number(&mut decoder, Tag::Unknown(TIFF_ORIENTATION))
            .map(|v| v as u32)
            .filter(|v| (1..=8).contains(v))
            .unwrap_or(UPRIGHT);

        let image = tiff_image(width, height, color, decoder.read_image()?)?;
        check_size(&image)?;
        frames.push(Frame::new(image, dpi, orientation));

        if !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }

    Ok(frames)
}

fn tiff_density<R: std::io::Read + std::io::Seek>(decoder: &mut TiffDecoder<R>) -> Option<(f32, f32)> {
    let x = tag_number(decoder, Tag::XResolution)?;
    let y = tag_number(decoder, Tag::YResolution).unwrap_or(x);
    // 1 = no absolute unit, 2 = inch (the default), 3 = centimeter
    match tag_number(decoder, Tag::ResolutionUnit).map(|u| u as u32).unwrap_or(2) {
        2 => plausible(x, y),
        3 => plausible(x * 2.54, y * 2.54),
        _ => None,
    }
}

fn tag_number<R: std::io::Read + std::io::Seek>(decoder: &mut TiffDecoder<R>, tag: Tag) -> Option<f64> {
    use tiff::decoder::ifd::Value;

    match decoder.find_tag(tag).ok()?? {
        Value::Rational(n, d) if d != 0 => Some(n as f64 / d as f64),
        Value::Short(v) => Some(v as f64),
        Value::Unsigned(v) => Some(v as f64),
        Value::Float(v) => Some(v as f64),
        Value::Double(v) => Some(v),
        _ => None,
    }
}

fn tiff_image(width: u32, height: u32, color: tiff::ColorType, data: DecodingResult) -> DocumentResult<DynamicImage> {
    use tiff::ColorType as Tc;

    let mismatch = || DocumentError::InvalidContent(format!("TIFF frame data does not match {:?}", color));

    let image = match (color, data) {
        (Tc::Gray(8), DecodingResult::U8(v)) => {
            DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, v).ok_or_else(mismatch)?)
        }
        (Tc::Gray(16), DecodingResult::U16(v)) => {
            DynamicImage::ImageLuma16(ImageBuffer::from_raw(width, height, v).ok_or_else(mismatch)?)
        }
        (Tc::GrayA(8), DecodingResult::U8(v)) => {
            DynamicImage::ImageLumaA8(ImageBuffer::from_raw(width, height, v).ok_or_else(mismatch)?)
        }
        (Tc::RGB(8), DecodingResult::U8(v)) => {
            DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, v).ok_or_else(mismatch)?)
        }
        (Tc::RGB(16), DecodingResult::U16(v)) => {
            DynamicImage::ImageRgb16(ImageBuffer::from_raw(width, height, v).ok_or_else(mismatch)?)
        }
        (Tc::RGBA(8), DecodingResult::U8(v)) => {
            DynamicImage::ImageRgba8(ImageBuffer::from_raw(width, height, v).ok_or_else(mismatch)?)
        }
        (Tc::RGBA(16), DecodingResult::U16(v)) => {
            DynamicImage::ImageRgba16(ImageBuffer::from_raw(width, height, v).ok_or_else(mismatch)?)
        }
        (Tc::CMYK(8), DecodingResult::U8(v)) => {
            let rgb = v
                .chunks_exact(4)
                .flat_map(|px| {
                    let k = 255 - px[3] as u32;
                    [0, 1, 2].map(|c| ((255 - px[c] as u32) * k / 255) as u8)
                })
                .collect();
            DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, rgb).ok_or_else(mismatch)?)
        }
        // Bilevel rows are packed and byte-aligned
        (Tc::Gray(1), DecodingResult::U8(v)) => {
            let stride = (width as usize).div_ceil(8);
            let mut gray = Vec::with_capacity(width as usize * height as usize);
            for row in v.chunks(stride).take(height as usize) {
                for x in 0..width as usize {
                    let bit = row.get(x / 8).map_or(0, |b| (b >> (7 - x % 8)) & 1);
                    gray.push(if bit == 1 { 255 } else { 0 });
                }
            }
            DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, gray).ok_or_else(mismatch)?)
        }
        (other, _) => {
            return Err(DocumentError::InvalidContent(format!(
                "Unsupported TIFF color type {:?}",
                other
            )))
        }
    };
    Ok(image)
}

fn check_size(image: &DynamicImage) -> DocumentResult<()> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(DocumentError::InvalidContent("Image has no pixels".into()));
    }
    Ok(())
}

/// Add one page painting `frame` edge to edge
fn add_page(doc: &mut Document, pages_id: ObjectId, frame: &Frame, source: &[u8]) -> DocumentResult<ObjectId> {
    let (width, height) = frame.image.dimensions();
    let page_width = width as f32 * 72.0 / frame.dpi.0;
    let page_height = height as f32 * 72.0 / frame.dpi.1;

    let image_id = doc.add_object(image_xobject(frame, source));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    page_width.into(),
                    0.into(),
                    0.into(),
                    page_height.into(),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(IMAGE_NAME.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    tracing::debug!(
        "Image page {}x{} px at {:.0}x{:.0} dpi -> {:.1}x{:.1}pt",
        width,
        height,
        frame.dpi.0,
        frame.dpi.1,
        page_width,
        page_height
    );

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), page_width.into(), page_height.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                IMAGE_NAME => image_id,
            },
        },
    }))
}

fn image_xobject(frame: &Frame, source: &[u8]) -> Stream {
    let img = &frame.image;
    let (width, height) = img.dimensions();
    let gray = is_grayscale(img.color());

    let color_space = if gray { "DeviceGray" } else { "DeviceRGB" };
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8,
    };

    // Pass-through keeps the original JPEG quality and size
    if frame.passthrough {
        let mut dict = dict;
        dict.set("Filter", "DCTDecode");
        return Stream::new(dict, source.to_vec()).with_compression(false);
    }

    let samples = if gray {
        img.to_luma8().into_raw()
    } else {
        img.to_rgb8().into_raw()
    };
    Stream::new(dict, samples)
}

fn is_grayscale(color: ColorType) -> bool {
    matches!(
        color,
        ColorType::L8 | ColorType::L16 | ColorType::La8 | ColorType::La16
    )
}
