//! Digital signature detection and the external signing boundary.
//!
//! Signing itself happens out of process: a local agent receives the
//! document and the placement rectangle, applies the cryptographic
//! signature, and returns the signed bytes. This module only detects
//! existing signatures and builds the agent payload.

use crate::error::PdfEditError;
use crate::document::PdfDocument;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use lopdf::Object;
use serde::{Deserialize, Serialize};

/// True when the document carries at least one filled signature.
///
/// A `/Type /Sig` dictionary whose `Contents` is empty or all zero bytes is
/// an unsigned placeholder left by form authoring tools and does not count.
pub fn has_signatures(doc: &PdfDocument) -> bool {
    doc.objects().any(|(_, obj)| {
        let dict = match obj {
            Object::Dictionary(d) => d,
            Object::Stream(s) => &s.dict,
            _ => return false,
        };
        let is_sig = dict
            .get(b"Type")
            .and_then(Object::as_name)
            .map(|n| n == b"Sig")
            .unwrap_or(false);
        if !is_sig {
            return false;
        }
        match dict.get(b"Contents") {
            Ok(Object::String(bytes, _)) => bytes.iter().any(|&b| b != 0),
            _ => false,
        }
    })
}

/// Where the visible signature widget goes, in top-left anchored page
/// points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignaturePlacement {
    pub page_index: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Payload handed to the signing agent. Corner coordinates are bottom-left
/// based and rounded to whole points; the page number is 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureRequest {
    pub document: String,
    pub page: u32,
    pub left: i64,
    pub bottom: i64,
    pub right: i64,
    pub top: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rubric: Option<String>,
}

impl SignatureRequest {
    pub fn new(
        document_bytes: &[u8],
        placement: &SignaturePlacement,
        page_height: f32,
        rubric_image: Option<&[u8]>,
    ) -> Self {
        let top = page_height - placement.y;
        Self {
            document: BASE64.encode(document_bytes),
            page: placement.page_index as u32 + 1,
            left: placement.x.round() as i64,
            bottom: (top - placement.height).round() as i64,
            right: (placement.x + placement.width).round() as i64,
            top: top.round() as i64,
            rubric: rubric_image.map(|img| BASE64.encode(img)),
        }
    }

    /// JSON body for the agent's HTTP endpoint.
    pub fn to_json(&self) -> Result<String, PdfEditError> {
        serde_json::to_string(self).map_err(|e| PdfEditError::Serialization(e.to_string()))
    }
}

/// External signing service. Implementations talk to a locally running
/// agent and return the fully signed document bytes.
pub trait SignatureAgent {
    fn sign(&self, request: &SignatureRequest) -> Result<Vec<u8>, PdfEditError>;
}
