//! Sticky notes, text markup and ink strokes.
//!
//! Sticky notes live as plain session state and are only baked into the
//! document on export; text markup is written straight into the page's
//! `Annots` array so undo snapshots capture it. Coordinates arriving from a
//! viewer are top-left based and pre-multiplied by the render scale; PDF user
//! space is bottom-left based, so both axes are converted here.

use crate::document::{number, PdfDocument};
use crate::error::PdfEditError;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Object, ObjectId, StringFormat};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Fill color for freshly created sticky notes.
pub const DEFAULT_NOTE_COLOR: &str = "#fffd8d";

/// Highlight markup renders translucent; strikeout and underline opaque.
const HIGHLIGHT_OPACITY: f32 = 0.4;

/// Side length of the rendered note icon, in PDF points.
const NOTE_ICON_SIZE: f32 = 24.0;

static NEXT_NOTE_ID: AtomicU64 = AtomicU64::new(1);

fn next_note_id() -> u64 {
    NEXT_NOTE_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkupKind {
    Highlight,
    StrikeOut,
    Underline,
}

impl MarkupKind {
    pub fn as_name(&self) -> &'static str {
        match self {
            MarkupKind::Highlight => "Highlight",
            MarkupKind::StrikeOut => "StrikeOut",
            MarkupKind::Underline => "Underline",
        }
    }

    pub fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"Highlight" => Some(MarkupKind::Highlight),
            b"StrikeOut" => Some(MarkupKind::StrikeOut),
            b"Underline" => Some(MarkupKind::Underline),
            _ => None,
        }
    }

    pub fn opacity(&self) -> f32 {
        match self {
            MarkupKind::Highlight => HIGHLIGHT_OPACITY,
            _ => 1.0,
        }
    }
}

/// A comment pinned to a point on a page. `x`/`y` are top-left based page
/// coordinates in PDF points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StickyNote {
    pub id: u64,
    pub page_index: usize,
    pub x: f32,
    pub y: f32,
    pub text: String,
    pub author: String,
    pub color: String,
}

impl StickyNote {
    pub fn new(page_index: usize, x: f32, y: f32, text: String, author: String) -> Self {
        Self {
            id: next_note_id(),
            page_index,
            x,
            y,
            text,
            author,
            color: DEFAULT_NOTE_COLOR.to_string(),
        }
    }
}

/// A highlight, strikeout or underline annotation already present in the
/// document graph, addressed by its object id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextMarkup {
    pub page_index: usize,
    pub object_id: ObjectId,
    pub kind: MarkupKind,
    pub rect: [f32; 4],
    pub quad_points: Vec<f32>,
    pub color: String,
    pub opacity: f32,
    pub author: String,
    pub contents: String,
}

/// Viewer-space rectangle: top-left origin, scaled by the render factor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClientRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// A freehand drawing stroke in viewer space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InkStroke {
    pub points: Vec<[f32; 2]>,
    pub color: String,
    pub width: f32,
}

/// Parse "#rrggbb" into normalized RGB components.
pub fn parse_hex_color(hex: &str) -> Option<(f32, f32, f32)> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0))
}

fn to_hex_color(r: f32, g: f32, b: f32) -> String {
    format!(
        "#{:02x}{:02x}{:02x}",
        (r.clamp(0.0, 1.0) * 255.0).round() as u8,
        (g.clamp(0.0, 1.0) * 255.0).round() as u8,
        (b.clamp(0.0, 1.0) * 255.0).round() as u8
    )
}

fn color_array(hex: &str) -> Vec<Object> {
    let (r, g, b) = parse_hex_color(hex).unwrap_or((1.0, 1.0, 0.0));
    vec![Object::Real(r), Object::Real(g), Object::Real(b)]
}

fn string_value(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

fn pdf_timestamp() -> String {
    chrono::Utc::now().format("D:%Y%m%d%H%M%SZ").to_string()
}

fn annot_color(dict: &Dictionary) -> Option<String> {
    let arr = dict.get(b"C").ok()?.as_array().ok()?;
    if arr.len() != 3 {
        return None;
    }
    Some(to_hex_color(
        number(&arr[0])?,
        number(&arr[1])?,
        number(&arr[2])?,
    ))
}

/// Collect all `/Text` annotations as session-level notes, converting the
/// anchor back to top-left page coordinates.
pub fn extract_sticky_notes(doc: &PdfDocument) -> Result<Vec<StickyNote>, PdfEditError> {
    let mut notes = Vec::new();
    for page_index in 0..doc.page_count() {
        let (_, page_h) = doc.page_size(page_index)?;
        for entry in doc.annots_entries(page_index)? {
            let Some(dict) = resolve_dict(doc, &entry) else {
                continue;
            };
            if !is_subtype(dict, b"Text") {
                continue;
            }
            let Some(rect) = rect_values(doc, dict) else {
                continue;
            };
            notes.push(StickyNote {
                id: next_note_id(),
                page_index,
                x: rect[0],
                y: page_h - rect[3],
                text: dict
                    .get(b"Contents")
                    .ok()
                    .and_then(string_value)
                    .unwrap_or_default(),
                author: dict
                    .get(b"T")
                    .ok()
                    .and_then(string_value)
                    .unwrap_or_default(),
                color: annot_color(dict).unwrap_or_else(|| DEFAULT_NOTE_COLOR.to_string()),
            });
        }
    }
    Ok(notes)
}

/// Write the session's notes into the document, replacing every existing
/// `/Text` annotation. Notes outside the current page range are dropped.
pub fn bake_sticky_notes(doc: &mut PdfDocument, notes: &[StickyNote]) -> Result<(), PdfEditError> {
    let page_count = doc.page_count();
    for page_index in 0..page_count {
        let keep: Vec<bool> = doc
            .annots_entries(page_index)?
            .iter()
            .map(|entry| match resolve_dict(doc, entry) {
                Some(dict) => !is_subtype(dict, b"Text"),
                None => true,
            })
            .collect();
        if keep.iter().any(|k| !k) {
            doc.with_annots_mut(page_index, false, |arr| {
                let mut it = keep.iter();
                arr.retain(|_| *it.next().unwrap_or(&true));
            })?;
        }
    }

    for note in notes {
        if note.page_index >= page_count {
            continue;
        }
        let (_, page_h) = doc.page_size(note.page_index)?;
        let top = page_h - note.y;
        let annot = dictionary! {
            "Type" => "Annot",
            "Subtype" => "Text",
            "Rect" => Object::Array(vec![
                Object::Real(note.x),
                Object::Real(top - NOTE_ICON_SIZE),
                Object::Real(note.x + NOTE_ICON_SIZE),
                Object::Real(top),
            ]),
            "Contents" => Object::String(note.text.clone().into_bytes(), StringFormat::Literal),
            "T" => Object::String(note.author.clone().into_bytes(), StringFormat::Literal),
            "Name" => "Comment",
            "Open" => false,
            "C" => Object::Array(color_array(&note.color)),
        };
        let annot_id = doc.add_object(Object::Dictionary(annot));
        doc.with_annots_mut(note.page_index, true, |arr| {
            arr.push(Object::Reference(annot_id));
        })?;
    }
    Ok(())
}

/// Turn viewer-space selection rectangles into one markup annotation.
///
/// Each rectangle becomes a quad; quads are listed top edge first
/// (x1,y1,x2,y1,x1,y2,x2,y2 with y1 the upper coordinate) and the
/// annotation `Rect` is the envelope of all quads. Rectangle heights are
/// deflated by 20% with the top edge held fixed, so the markup hugs the
/// text line rather than the full selection box.
pub fn create_markup(
    doc: &mut PdfDocument,
    page_index: usize,
    kind: MarkupKind,
    rects: &[ClientRect],
    scale: f32,
    color: &str,
    author: &str,
    contents: &str,
) -> Result<ObjectId, PdfEditError> {
    if rects.is_empty() {
        return Err(PdfEditError::Operation("No selection rectangles".into()));
    }
    if scale <= 0.0 {
        return Err(PdfEditError::Operation("Render scale must be positive".into()));
    }
    let (_, page_h) = doc.page_size(page_index)?;

    let mut quad_points = Vec::with_capacity(rects.len() * 8);
    let mut envelope = [f32::MAX, f32::MAX, f32::MIN, f32::MIN];
    for r in rects {
        let x1 = r.x / scale;
        let x2 = (r.x + r.width) / scale;
        let y1 = page_h - r.y / scale;
        let y2 = y1 - (r.height / scale) * 0.8;
        quad_points.extend_from_slice(&[x1, y1, x2, y1, x1, y2, x2, y2]);
        envelope[0] = envelope[0].min(x1);
        envelope[1] = envelope[1].min(y2);
        envelope[2] = envelope[2].max(x2);
        envelope[3] = envelope[3].max(y1);
    }

    let annot = dictionary! {
        "Type" => "Annot",
        "Subtype" => kind.as_name(),
        "Rect" => Object::Array(envelope.iter().map(|&v| Object::Real(v)).collect()),
        "QuadPoints" => Object::Array(quad_points.iter().map(|&v| Object::Real(v)).collect()),
        "C" => Object::Array(color_array(color)),
        "CA" => Object::Real(kind.opacity()),
        "T" => Object::String(author.as_bytes().to_vec(), StringFormat::Literal),
        "Contents" => Object::String(contents.as_bytes().to_vec(), StringFormat::Literal),
        "M" => Object::String(pdf_timestamp().into_bytes(), StringFormat::Literal),
    };
    let annot_id = doc.add_object(Object::Dictionary(annot));
    doc.with_annots_mut(page_index, true, |arr| {
        arr.push(Object::Reference(annot_id));
    })?;
    Ok(annot_id)
}

/// Collect all markup annotations reachable by reference. Entries with other
/// subtypes, or inlined directly into the `Annots` array, are skipped.
pub fn extract_markups(doc: &PdfDocument) -> Result<Vec<TextMarkup>, PdfEditError> {
    let mut markups = Vec::new();
    for page_index in 0..doc.page_count() {
        for entry in doc.annots_entries(page_index)? {
            let Object::Reference(object_id) = entry else {
                continue;
            };
            let Ok(dict) = doc.get_dict(object_id) else {
                continue;
            };
            let Some(kind) = dict
                .get(b"Subtype")
                .and_then(Object::as_name)
                .ok()
                .and_then(MarkupKind::from_name)
            else {
                continue;
            };
            let Some(rect) = rect_values(doc, dict) else {
                continue;
            };
            let quad_points = dict
                .get(b"QuadPoints")
                .ok()
                .and_then(|o| doc.resolve(o).as_array().ok())
                .map(|arr| arr.iter().filter_map(number).collect())
                .unwrap_or_default();
            markups.push(TextMarkup {
                page_index,
                object_id,
                kind,
                rect,
                quad_points,
                color: annot_color(dict).unwrap_or_else(|| "#ffff00".to_string()),
                opacity: dict
                    .get(b"CA")
                    .ok()
                    .and_then(number)
                    .unwrap_or(1.0),
                author: dict
                    .get(b"T")
                    .ok()
                    .and_then(string_value)
                    .unwrap_or_default(),
                contents: dict
                    .get(b"Contents")
                    .ok()
                    .and_then(string_value)
                    .unwrap_or_default(),
            });
        }
    }
    Ok(markups)
}

/// Rewrite an existing markup annotation in place, stamping a fresh
/// modification date.
pub fn update_markup(
    doc: &mut PdfDocument,
    object_id: ObjectId,
    kind: MarkupKind,
    color: &str,
    author: &str,
    contents: &str,
) -> Result<(), PdfEditError> {
    let timestamp = pdf_timestamp();
    let colors = color_array(color);
    let dict = doc.get_dict_mut(object_id)?;
    dict.set("Subtype", kind.as_name());
    dict.set("C", Object::Array(colors));
    dict.set("CA", Object::Real(kind.opacity()));
    dict.set(
        "T",
        Object::String(author.as_bytes().to_vec(), StringFormat::Literal),
    );
    dict.set(
        "Contents",
        Object::String(contents.as_bytes().to_vec(), StringFormat::Literal),
    );
    dict.set(
        "M",
        Object::String(timestamp.into_bytes(), StringFormat::Literal),
    );
    Ok(())
}

/// Unlink a markup annotation from whichever page's `Annots` array holds a
/// reference to it. The object itself is pruned on the next save.
pub fn delete_markup(doc: &mut PdfDocument, object_id: ObjectId) -> Result<(), PdfEditError> {
    let mut removed = false;
    for page_index in 0..doc.page_count() {
        let hit = doc
            .with_annots_mut(page_index, false, |arr| {
                let before = arr.len();
                arr.retain(|o| !matches!(o, Object::Reference(id) if *id == object_id));
                arr.len() != before
            })?
            .unwrap_or(false);
        removed |= hit;
    }
    if removed {
        Ok(())
    } else {
        Err(PdfEditError::Operation("Annotation not found".into()))
    }
}

/// Flatten freehand strokes into a content stream appended to the page.
///
/// Points arrive in viewer space; each is divided by `render_scale` and
/// y-flipped. Strokes with fewer than two points carry no visible path and
/// are skipped. Round caps and joins keep dense polylines smooth.
pub fn bake_ink(
    doc: &mut PdfDocument,
    page_index: usize,
    strokes: &[InkStroke],
    render_scale: f32,
) -> Result<(), PdfEditError> {
    if render_scale <= 0.0 {
        return Err(PdfEditError::Operation("Render scale must be positive".into()));
    }
    let (_, page_h) = doc.page_size(page_index)?;

    let mut ops = vec![Operation::new("q", vec![])];
    let mut drew = false;
    for stroke in strokes {
        if stroke.points.len() < 2 {
            continue;
        }
        let (r, g, b) = parse_hex_color(&stroke.color).unwrap_or((0.0, 0.0, 0.0));
        ops.push(Operation::new(
            "RG",
            vec![Object::Real(r), Object::Real(g), Object::Real(b)],
        ));
        ops.push(Operation::new(
            "w",
            vec![Object::Real(stroke.width / render_scale)],
        ));
        ops.push(Operation::new("J", vec![Object::Integer(1)]));
        ops.push(Operation::new("j", vec![Object::Integer(1)]));
        for (i, p) in stroke.points.iter().enumerate() {
            let x = p[0] / render_scale;
            let y = page_h - p[1] / render_scale;
            let op = if i == 0 { "m" } else { "l" };
            ops.push(Operation::new(op, vec![Object::Real(x), Object::Real(y)]));
        }
        ops.push(Operation::new("S", vec![]));
        drew = true;
    }
    if !drew {
        return Ok(());
    }
    ops.push(Operation::new("Q", vec![]));

    doc.append_page_content(page_index, Content { operations: ops })
}

fn resolve_dict<'a>(doc: &'a PdfDocument, entry: &'a Object) -> Option<&'a Dictionary> {
    doc.resolve(entry).as_dict().ok()
}

fn is_subtype(dict: &Dictionary, name: &[u8]) -> bool {
    dict.get(b"Subtype")
        .and_then(Object::as_name)
        .map(|n| n == name)
        .unwrap_or(false)
}

fn rect_values(doc: &PdfDocument, dict: &Dictionary) -> Option<[f32; 4]> {
    let arr = doc.resolve(dict.get(b"Rect").ok()?).as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    Some([
        number(&arr[0])?,
        number(&arr[1])?,
        number(&arr[2])?,
        number(&arr[3])?,
    ])
}
