//! AcroForm field filling.
//!
//! Values are collected in session state and only written into the field
//! dictionaries at export time. Appearance streams are not regenerated;
//! `NeedAppearances` is set so conforming viewers rebuild them on open.

use crate::document::PdfDocument;
use crate::error::PdfEditError;
use lopdf::{Object, ObjectId, StringFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FormValue {
    Text(String),
    Checkbox(bool),
    Choice(String),
}

/// Pending field values keyed by the field's partial name (`/T`).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FormValues {
    values: BTreeMap<String, FormValue>,
}

impl FormValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: FormValue) {
        self.values.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<FormValue> {
        self.values.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&FormValue> {
        self.values.get(name)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FormValue)> {
        self.values.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldType {
    Text,
    Button,
    Choice,
}

impl FieldType {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"Tx" => Some(FieldType::Text),
            b"Btn" => Some(FieldType::Button),
            b"Ch" => Some(FieldType::Choice),
            _ => None,
        }
    }
}

/// Write `values` into the document's AcroForm fields.
///
/// Fields whose name has no pending value are untouched; values whose type
/// does not match the field type, and field types outside
/// text/checkbox/choice, are skipped with a warning. A document without an
/// AcroForm is a no-op.
pub fn apply_form_values(doc: &mut PdfDocument, values: &FormValues) -> Result<(), PdfEditError> {
    if values.is_empty() {
        return Ok(());
    }
    let Some(acroform_id) = ensure_acroform_indirect(doc)? else {
        warn!("form values pending but document has no AcroForm");
        return Ok(());
    };

    let mut fields = Vec::new();
    let roots = field_roots(doc, acroform_id)?;
    for id in roots {
        collect_fields(doc, id, None, &mut fields, 0);
    }

    for (field_id, name, field_type) in fields {
        let Some(value) = values.get(&name) else {
            continue;
        };
        match (value, field_type) {
            (FormValue::Text(text), Some(FieldType::Text)) => {
                let dict = doc.get_dict_mut(field_id)?;
                dict.set(
                    "V",
                    Object::String(text.clone().into_bytes(), StringFormat::Literal),
                );
            }
            (FormValue::Checkbox(checked), Some(FieldType::Button)) => {
                let state = if *checked {
                    on_state(doc, field_id)
                } else {
                    b"Off".to_vec()
                };
                let dict = doc.get_dict_mut(field_id)?;
                dict.set("V", Object::Name(state.clone()));
                dict.set("AS", Object::Name(state));
            }
            (FormValue::Choice(choice), Some(FieldType::Choice)) => {
                let dict = doc.get_dict_mut(field_id)?;
                dict.set(
                    "V",
                    Object::String(choice.clone().into_bytes(), StringFormat::Literal),
                );
            }
            _ => {
                warn!(field = %name, "skipping field: unsupported or mismatched type");
            }
        }
    }

    doc.get_dict_mut(acroform_id)?
        .set("NeedAppearances", true);
    Ok(())
}

/// Catalog `AcroForm` as an object id, relocating an inline dictionary to an
/// indirect object if needed. `None` when the document has no form.
fn ensure_acroform_indirect(doc: &mut PdfDocument) -> Result<Option<ObjectId>, PdfEditError> {
    let catalog_id = doc
        .raw()
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|_| PdfEditError::Operation("no Root in trailer".into()))?;

    enum Slot {
        Indirect(ObjectId),
        Inline(lopdf::Dictionary),
        Missing,
    }
    let slot = {
        let catalog = doc.get_dict(catalog_id)?;
        match catalog.get(b"AcroForm") {
            Ok(Object::Reference(id)) => Slot::Indirect(*id),
            Ok(Object::Dictionary(d)) => Slot::Inline(d.clone()),
            _ => Slot::Missing,
        }
    };
    match slot {
        Slot::Indirect(id) => Ok(Some(id)),
        Slot::Inline(dict) => {
            let id = doc.add_object(Object::Dictionary(dict));
            doc.get_dict_mut(catalog_id)?
                .set("AcroForm", Object::Reference(id));
            Ok(Some(id))
        }
        Slot::Missing => Ok(None),
    }
}

fn field_roots(doc: &PdfDocument, acroform_id: ObjectId) -> Result<Vec<ObjectId>, PdfEditError> {
    let acroform = doc.get_dict(acroform_id)?;
    let Ok(fields) = acroform.get(b"Fields") else {
        return Ok(Vec::new());
    };
    let Ok(arr) = doc.resolve(fields).as_array() else {
        return Ok(Vec::new());
    };
    Ok(arr.iter().filter_map(|o| o.as_reference().ok()).collect())
}

/// Depth-first walk of the field tree, carrying the inherited `/FT` down
/// through `Kids`. Nodes without a `/T` are widget annotations, not fields.
fn collect_fields(
    doc: &PdfDocument,
    id: ObjectId,
    inherited: Option<FieldType>,
    out: &mut Vec<(ObjectId, String, Option<FieldType>)>,
    depth: usize,
) {
    if depth > 32 {
        return;
    }
    let Ok(dict) = doc.get_dict(id) else {
        return;
    };
    let field_type = dict
        .get(b"FT")
        .and_then(Object::as_name)
        .ok()
        .and_then(FieldType::from_name)
        .or(inherited);
    if let Ok(Object::String(name, _)) = dict.get(b"T") {
        out.push((
            id,
            String::from_utf8_lossy(name).into_owned(),
            field_type,
        ));
    }
    if let Ok(kids) = dict.get(b"Kids") {
        if let Ok(arr) = doc.resolve(kids).as_array() {
            let kid_ids: Vec<ObjectId> =
                arr.iter().filter_map(|o| o.as_reference().ok()).collect();
            for kid in kid_ids {
                collect_fields(doc, kid, field_type, out, depth + 1);
            }
        }
    }
}

/// The checkbox's "on" appearance name, read from `/AP /N`; `Yes` when the
/// field declares no appearance states.
fn on_state(doc: &PdfDocument, field_id: ObjectId) -> Vec<u8> {
    let fallback = b"Yes".to_vec();
    let Ok(dict) = doc.get_dict(field_id) else {
        return fallback;
    };
    let Some(ap) = dict.get(b"AP").ok().map(|o| doc.resolve(o)) else {
        return fallback;
    };
    let Ok(ap) = ap.as_dict() else {
        return fallback;
    };
    let Some(n) = ap.get(b"N").ok().map(|o| doc.resolve(o)) else {
        return fallback;
    };
    let Ok(n) = n.as_dict() else {
        return fallback;
    };
    for (key, _) in n.iter() {
        if key.as_slice() != b"Off" {
            return key.clone();
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::pdf_with_pages;
    use lopdf::dictionary;
    use pretty_assertions::assert_eq;

    fn doc_with_fields() -> (PdfDocument, ObjectId, ObjectId, ObjectId) {
        let mut doc = PdfDocument::load(&pdf_with_pages(1)).unwrap();
        let text = doc.add_object(Object::Dictionary(dictionary! {
            "FT" => "Tx",
            "T" => Object::String(b"name".to_vec(), StringFormat::Literal),
        }));
        let on_states = dictionary! {
            "Off" => Object::Dictionary(dictionary! {}),
            "On" => Object::Dictionary(dictionary! {}),
        };
        let checkbox = doc.add_object(Object::Dictionary(dictionary! {
            "FT" => "Btn",
            "T" => Object::String(b"agree".to_vec(), StringFormat::Literal),
            "AP" => Object::Dictionary(dictionary! {
                "N" => Object::Dictionary(on_states),
            }),
        }));
        let choice = doc.add_object(Object::Dictionary(dictionary! {
            "FT" => "Ch",
            "T" => Object::String(b"state".to_vec(), StringFormat::Literal),
        }));
        let acroform = doc.add_object(Object::Dictionary(dictionary! {
            "Fields" => Object::Array(vec![
                Object::Reference(text),
                Object::Reference(checkbox),
                Object::Reference(choice),
            ]),
        }));
        let catalog_id = doc
            .raw()
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .unwrap();
        doc.get_dict_mut(catalog_id)
            .unwrap()
            .set("AcroForm", Object::Reference(acroform));
        (doc, text, checkbox, choice)
    }

    #[test]
    fn fills_text_checkbox_and_choice() {
        let (mut doc, text_id, checkbox_id, choice_id) = doc_with_fields();
        let mut values = FormValues::new();
        values.set("name", FormValue::Text("Ada".into()));
        values.set("agree", FormValue::Checkbox(true));
        values.set("state", FormValue::Choice("CA".into()));
        apply_form_values(&mut doc, &values).unwrap();

        let text = doc.get_dict(text_id).unwrap();
        assert_eq!(
            text.get(b"V").unwrap(),
            &Object::String(b"Ada".to_vec(), StringFormat::Literal)
        );
        let checkbox = doc.get_dict(checkbox_id).unwrap();
        assert_eq!(checkbox.get(b"V").unwrap(), &Object::Name(b"On".to_vec()));
        assert_eq!(checkbox.get(b"AS").unwrap(), &Object::Name(b"On".to_vec()));
        let choice = doc.get_dict(choice_id).unwrap();
        assert_eq!(
            choice.get(b"V").unwrap(),
            &Object::String(b"CA".to_vec(), StringFormat::Literal)
        );
    }

    #[test]
    fn unchecking_sets_off() {
        let (mut doc, _, checkbox_id, _) = doc_with_fields();
        let mut values = FormValues::new();
        values.set("agree", FormValue::Checkbox(false));
        apply_form_values(&mut doc, &values).unwrap();
        let checkbox = doc.get_dict(checkbox_id).unwrap();
        assert_eq!(checkbox.get(b"AS").unwrap(), &Object::Name(b"Off".to_vec()));
    }

    #[test]
    fn sets_need_appearances() {
        let (mut doc, _, _, _) = doc_with_fields();
        let mut values = FormValues::new();
        values.set("name", FormValue::Text("x".into()));
        apply_form_values(&mut doc, &values).unwrap();

        let acroform_id = ensure_acroform_indirect(&mut doc).unwrap().unwrap();
        let acroform = doc.get_dict(acroform_id).unwrap();
        assert_eq!(acroform.get(b"NeedAppearances").unwrap(), &Object::Boolean(true));
    }

    #[test]
    fn mismatched_value_type_leaves_field_alone() {
        let (mut doc, text_id, _, _) = doc_with_fields();
        let mut values = FormValues::new();
        values.set("name", FormValue::Checkbox(true));
        apply_form_values(&mut doc, &values).unwrap();
        assert!(doc.get_dict(text_id).unwrap().get(b"V").is_err());
    }

    #[test]
    fn documents_without_forms_are_untouched() {
        let mut doc = PdfDocument::load(&pdf_with_pages(1)).unwrap();
        let mut values = FormValues::new();
        values.set("name", FormValue::Text("x".into()));
        apply_form_values(&mut doc, &values).unwrap();
    }
}
