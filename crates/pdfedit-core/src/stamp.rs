//! Content-stream stamping: watermarks, free text, images, page numbers.
//!
//! Stamps are drawn directly into appended content streams rather than as
//! annotations, so they survive viewers that ignore appearance streams.
//! Fonts are the standard-14 Helvetica (no embedding), and the horizontal
//! centering uses the usual `len * size / 4` width approximation.

use crate::annotations::parse_hex_color;
use crate::document::PdfDocument;
use crate::error::PdfEditError;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream, StringFormat};
use serde::{Deserialize, Serialize};
use std::io::Write;

const WATERMARK_GS: &str = "GSwm";
const WATERMARK_FONT: &str = "Fwm";
const STAMP_FONT: &str = "Fst";
const PAGENUM_FONT: &str = "Fpn";

/// Default image stamp footprint when no placement is given.
const DEFAULT_IMAGE_SIZE: (f32, f32) = (200.0, 100.0);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Watermark {
    pub text: String,
    pub font_size: f32,
    pub color: String,
    pub opacity: f32,
    pub rotation_degrees: f32,
}

impl Watermark {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            font_size: 48.0,
            color: "#808080".into(),
            opacity: 0.3,
            rotation_degrees: 45.0,
        }
    }
}

/// Free text drawn at a top-left anchored position on a single page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextStamp {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
    pub color: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageStamp {
    pub data: Vec<u8>,
    pub format: ImageFormat,
    /// Top-left anchored placement `(x, y, width, height)`; when `None` the
    /// image is fitted to 200x100 centered on the page.
    pub placement: Option<(f32, f32, f32, f32)>,
}

/// Header/footer lines with `{n}` and `{total}` placeholders.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeaderFooter {
    pub header: Option<String>,
    pub footer: Option<String>,
    pub font_size: f32,
    pub skip_first: bool,
}

impl HeaderFooter {
    pub fn page_numbers() -> Self {
        Self {
            header: None,
            footer: Some("{n}/{total}".into()),
            font_size: 10.0,
            skip_first: false,
        }
    }
}

fn centered_x(page_w: f32, text: &str, font_size: f32) -> f32 {
    page_w / 2.0 - text.len() as f32 * font_size / 4.0
}

fn rgb_ops(color: &str) -> Operation {
    let (r, g, b) = parse_hex_color(color).unwrap_or((0.0, 0.0, 0.0));
    Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)])
}

fn helvetica(doc: &mut PdfDocument) -> ObjectId {
    doc.add_object(Object::Dictionary(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    }))
}

/// Link `target` into the page's `Resources` under `category`/`name`,
/// following one level of indirection if the category dictionary is stored
/// as a reference.
fn register_resource(
    doc: &mut PdfDocument,
    page_index: usize,
    category: &str,
    name: &str,
    target: ObjectId,
) -> Result<(), PdfEditError> {
    enum Slot {
        Dict,
        Indirect(ObjectId),
        Missing,
    }
    let name_owned = name.to_string();
    let category_owned = category.to_string();
    let indirect = doc.with_page_resources_mut(page_index, move |res| {
        let slot = match res.get(category_owned.as_bytes()) {
            Ok(Object::Dictionary(_)) => Slot::Dict,
            Ok(Object::Reference(id)) => Slot::Indirect(*id),
            _ => Slot::Missing,
        };
        match slot {
            Slot::Dict => {
                if let Ok(Object::Dictionary(d)) = res.get_mut(category_owned.as_bytes()) {
                    d.set(name_owned.as_str(), Object::Reference(target));
                }
                None
            }
            Slot::Missing => {
                let mut d = Dictionary::new();
                d.set(name_owned.as_str(), Object::Reference(target));
                res.set(category_owned.as_str(), Object::Dictionary(d));
                None
            }
            Slot::Indirect(id) => Some(id),
        }
    })?;
    if let Some(id) = indirect {
        doc.get_dict_mut(id)?.set(name, Object::Reference(target));
    }
    Ok(())
}

/// Draw `watermark` across every page, rotated about its text origin and
/// blended through an `ExtGState` alpha.
pub fn apply_watermark(doc: &mut PdfDocument, watermark: &Watermark) -> Result<(), PdfEditError> {
    let font_id = helvetica(doc);
    let gs_id = doc.add_object(Object::Dictionary(dictionary! {
        "Type" => "ExtGState",
        "ca" => Object::Real(watermark.opacity),
        "CA" => Object::Real(watermark.opacity),
    }));
    let theta = watermark.rotation_degrees.to_radians();
    let (sin, cos) = theta.sin_cos();

    for page_index in 0..doc.page_count() {
        register_resource(doc, page_index, "Font", WATERMARK_FONT, font_id)?;
        register_resource(doc, page_index, "ExtGState", WATERMARK_GS, gs_id)?;

        let (w, h) = doc.page_size(page_index)?;
        let x = centered_x(w, &watermark.text, watermark.font_size);
        let y = h / 2.0;
        let ops = vec![
            Operation::new("q", vec![]),
            Operation::new("gs", vec![Object::Name(WATERMARK_GS.as_bytes().to_vec())]),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![
                    Object::Name(WATERMARK_FONT.as_bytes().to_vec()),
                    Object::Real(watermark.font_size),
                ],
            ),
            rgb_ops(&watermark.color),
            Operation::new(
                "Tm",
                vec![
                    Object::Real(cos),
                    Object::Real(sin),
                    Object::Real(-sin),
                    Object::Real(cos),
                    Object::Real(x),
                    Object::Real(y),
                ],
            ),
            Operation::new(
                "Tj",
                vec![Object::String(
                    watermark.text.clone().into_bytes(),
                    StringFormat::Literal,
                )],
            ),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ];
        doc.append_page_content(page_index, Content { operations: ops })?;
    }
    Ok(())
}

/// Draw free text on one page. `x`/`y` are top-left anchored page points.
pub fn apply_text_stamp(
    doc: &mut PdfDocument,
    page_index: usize,
    stamp: &TextStamp,
) -> Result<(), PdfEditError> {
    let font_id = helvetica(doc);
    register_resource(doc, page_index, "Font", STAMP_FONT, font_id)?;

    let (_, h) = doc.page_size(page_index)?;
    let ops = vec![
        Operation::new("q", vec![]),
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![
                Object::Name(STAMP_FONT.as_bytes().to_vec()),
                Object::Real(stamp.font_size),
            ],
        ),
        rgb_ops(&stamp.color),
        Operation::new(
            "Td",
            vec![Object::Real(stamp.x), Object::Real(h - stamp.y)],
        ),
        Operation::new(
            "Tj",
            vec![Object::String(
                stamp.text.clone().into_bytes(),
                StringFormat::Literal,
            )],
        ),
        Operation::new("ET", vec![]),
        Operation::new("Q", vec![]),
    ];
    doc.append_page_content(page_index, Content { operations: ops })
}

/// Place an image on one page as an image XObject.
pub fn apply_image_stamp(
    doc: &mut PdfDocument,
    page_index: usize,
    stamp: &ImageStamp,
) -> Result<(), PdfEditError> {
    let image_id = match stamp.format {
        ImageFormat::Png => embed_png(doc, &stamp.data)?,
        ImageFormat::Jpeg => embed_jpeg(doc, &stamp.data)?,
    };
    let name = format!("Im{}", image_id.0);
    register_resource(doc, page_index, "XObject", &name, image_id)?;

    let (page_w, page_h) = doc.page_size(page_index)?;
    let (x, y_bottom, w, h) = match stamp.placement {
        Some((x, y, w, h)) => (x, page_h - y - h, w, h),
        None => {
            let (w, h) = DEFAULT_IMAGE_SIZE;
            ((page_w - w) / 2.0, (page_h - h) / 2.0, w, h)
        }
    };
    let ops = vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                Object::Real(w),
                Object::Real(0.0),
                Object::Real(0.0),
                Object::Real(h),
                Object::Real(x),
                Object::Real(y_bottom),
            ],
        ),
        Operation::new("Do", vec![Object::Name(name.into_bytes())]),
        Operation::new("Q", vec![]),
    ];
    doc.append_page_content(page_index, Content { operations: ops })
}

/// Stamp header and/or footer lines on every page, substituting `{n}` with
/// the 1-based page number and `{total}` with the page count.
pub fn apply_header_footer(
    doc: &mut PdfDocument,
    layout: &HeaderFooter,
) -> Result<(), PdfEditError> {
    if layout.header.is_none() && layout.footer.is_none() {
        return Ok(());
    }
    let font_id = helvetica(doc);
    let total = doc.page_count();
    let size = if layout.font_size > 0.0 { layout.font_size } else { 10.0 };

    for page_index in 0..total {
        if layout.skip_first && page_index == 0 {
            continue;
        }
        register_resource(doc, page_index, "Font", PAGENUM_FONT, font_id)?;
        let (w, h) = doc.page_size(page_index)?;

        let mut ops = vec![Operation::new("q", vec![])];
        let mut lines = Vec::new();
        if let Some(template) = &layout.header {
            lines.push((substitute(template, page_index, total), h - 30.0));
        }
        if let Some(template) = &layout.footer {
            lines.push((substitute(template, page_index, total), 20.0));
        }
        for (text, y) in lines {
            ops.push(Operation::new("BT", vec![]));
            ops.push(Operation::new(
                "Tf",
                vec![
                    Object::Name(PAGENUM_FONT.as_bytes().to_vec()),
                    Object::Real(size),
                ],
            ));
            ops.push(Operation::new(
                "Td",
                vec![Object::Real(centered_x(w, &text, size)), Object::Real(y)],
            ));
            ops.push(Operation::new(
                "Tj",
                vec![Object::String(text.into_bytes(), StringFormat::Literal)],
            ));
            ops.push(Operation::new("ET", vec![]));
        }
        ops.push(Operation::new("Q", vec![]));
        doc.append_page_content(page_index, Content { operations: ops })?;
    }
    Ok(())
}

fn substitute(template: &str, page_index: usize, total: usize) -> String {
    template
        .replace("{n}", &(page_index + 1).to_string())
        .replace("{total}", &total.to_string())
}

/// Decode a PNG and re-emit its pixels as a FlateDecode image XObject.
/// Alpha channels are stripped; only 8-bit depth is supported.
fn embed_png(doc: &mut PdfDocument, data: &[u8]) -> Result<ObjectId, PdfEditError> {
    let decoder = png::Decoder::new(data);
    let mut reader = decoder
        .read_info()
        .map_err(|e| PdfEditError::Operation(format!("PNG decode failed: {}", e)))?;
    let mut buf = vec![0u8; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| PdfEditError::Operation(format!("PNG decode failed: {}", e)))?;
    if info.bit_depth != png::BitDepth::Eight {
        return Err(PdfEditError::Operation("Only 8-bit PNGs are supported".into()));
    }
    let pixels = &buf[..info.buffer_size()];

    let (samples, color_space): (Vec<u8>, &str) = match info.color_type {
        png::ColorType::Rgb => (pixels.to_vec(), "DeviceRGB"),
        png::ColorType::Grayscale => (pixels.to_vec(), "DeviceGray"),
        png::ColorType::Rgba => (
            pixels
                .chunks(4)
                .flat_map(|px| px[..3].to_vec())
                .collect(),
            "DeviceRGB",
        ),
        png::ColorType::GrayscaleAlpha => (
            pixels.chunks(2).map(|px| px[0]).collect(),
            "DeviceGray",
        ),
        png::ColorType::Indexed => {
            return Err(PdfEditError::Operation(
                "Indexed PNGs are not supported".into(),
            ))
        }
    };

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&samples)
        .map_err(|e| PdfEditError::Operation(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| PdfEditError::Operation(e.to_string()))?;

    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => info.width as i64,
        "Height" => info.height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };
    Ok(doc.add_object(Object::Stream(Stream::new(dict, compressed))))
}

/// Embed a JPEG untouched as a DCTDecode image XObject. Only the SOF header
/// is parsed, for dimensions and component count.
fn embed_jpeg(doc: &mut PdfDocument, data: &[u8]) -> Result<ObjectId, PdfEditError> {
    let (width, height, components) = jpeg_dimensions(data)
        .ok_or_else(|| PdfEditError::Operation("Could not parse JPEG header".into()))?;
    let color_space = if components == 1 { "DeviceGray" } else { "DeviceRGB" };

    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8,
        "Filter" => "DCTDecode",
    };
    Ok(doc.add_object(Object::Stream(Stream::new(dict, data.to_vec()))))
}

/// Walk JPEG segments to the first SOF marker and read (width, height,
/// components) from it.
fn jpeg_dimensions(data: &[u8]) -> Option<(u32, u32, u8)> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }
    let mut i = 2;
    while i + 9 < data.len() {
        if data[i] != 0xFF {
            return None;
        }
        let marker = data[i + 1];
        let is_sof = matches!(marker, 0xC0..=0xCF)
            && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            let height = u32::from(data[i + 5]) << 8 | u32::from(data[i + 6]);
            let width = u32::from(data[i + 7]) << 8 | u32::from(data[i + 8]);
            return Some((width, height, data[i + 9]));
        }
        let len = usize::from(data[i + 2]) << 8 | usize::from(data[i + 3]);
        i += 2 + len;
    }
    None
}
