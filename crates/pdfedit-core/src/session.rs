//! Editing session: one loaded document plus everything around it.
//!
//! The session owns the document, the page selection, the undo history and
//! the annotation caches, and funnels every user action through the same
//! commit cycle: snapshot history, apply the edit, serialize, reload,
//! re-extract. Reloading after every edit keeps object ids and page indices
//! consistent with what a fresh parse of the bytes would produce, so stale
//! references cannot leak into later operations. The commit cycle runs even
//! when the edit itself fails, restoring a consistent view of whatever state
//! the document ended up in.

use crate::annotations::{
    self, ClientRect, InkStroke, MarkupKind, StickyNote, TextMarkup,
};
use crate::document::PdfDocument;
use crate::error::PdfEditError;
use crate::forms::{self, FormValue, FormValues};
use crate::history::History;
use crate::mutation::{self, InsertPosition, MoveDirection};
use crate::selection::{parse_ranges, Selection};
use crate::signature::{
    has_signatures, SignatureAgent, SignaturePlacement, SignatureRequest,
};
use crate::stamp::{self, HeaderFooter, ImageStamp, TextStamp, Watermark};
use lopdf::ObjectId;
use tracing::{debug, info, warn};

#[derive(Default)]
pub struct EditSession {
    doc: Option<PdfDocument>,
    file_name: String,
    selection: Selection,
    history: History,
    notes: Vec<StickyNote>,
    markups: Vec<TextMarkup>,
    form_values: FormValues,
    signature_placement: Option<SignaturePlacement>,
    signed_bytes: Option<Vec<u8>>,
    signed: bool,
    busy: bool,
    revision: u64,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject re-entrant calls while another operation is running.
    fn run_exclusive<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, PdfEditError>,
    ) -> Result<R, PdfEditError> {
        if self.busy {
            return Err(PdfEditError::Busy);
        }
        self.busy = true;
        let result = f(self);
        self.busy = false;
        result
    }

    fn check_unlocked(&self) -> Result<(), PdfEditError> {
        if self.signed {
            Err(PdfEditError::DocumentSigned)
        } else {
            Ok(())
        }
    }

    /// Snapshot, edit, commit. The commit runs regardless of the edit's
    /// outcome; the edit's error wins when both fail.
    fn mutate<R>(
        &mut self,
        f: impl FnOnce(&mut PdfDocument, &mut Selection) -> Result<R, PdfEditError>,
    ) -> Result<R, PdfEditError> {
        self.run_exclusive(|s| {
            s.check_unlocked()?;
            let doc = s.doc.as_mut().ok_or(PdfEditError::NoDocument)?;
            let snapshot = doc.save()?;
            s.history.push(snapshot);
            let outcome = f(doc, &mut s.selection);
            let committed = s.commit();
            if let Err(e) = &outcome {
                warn!(error = %e, "edit failed; document recommitted");
            }
            outcome.and_then(|v| committed.map(|_| v))
        })
    }

    /// Serialize, reload, re-extract markup, drop stale state, bump revision.
    fn commit(&mut self) -> Result<(), PdfEditError> {
        let bytes = {
            let doc = self.doc.as_mut().ok_or(PdfEditError::NoDocument)?;
            doc.save()?
        };
        let reloaded = PdfDocument::load(&bytes)?;
        let page_count = reloaded.page_count();
        self.markups = annotations::extract_markups(&reloaded)?;
        self.signed = has_signatures(&reloaded);
        self.notes.retain(|n| n.page_index < page_count);
        self.selection.retain_valid(page_count);
        self.doc = Some(reloaded);
        self.revision += 1;
        debug!(revision = self.revision, page_count, "commit complete");
        Ok(())
    }

    /// Parse and adopt a new document. On parse failure the session keeps
    /// whatever document it already had.
    pub fn load_document(&mut self, bytes: &[u8], file_name: &str) -> Result<(), PdfEditError> {
        self.run_exclusive(|s| {
            let doc = PdfDocument::load(bytes)?;
            s.notes = annotations::extract_sticky_notes(&doc)?;
            s.markups = annotations::extract_markups(&doc)?;
            s.signed = has_signatures(&doc);
            s.signed_bytes = s.signed.then(|| bytes.to_vec());
            info!(
                file_name,
                pages = doc.page_count(),
                signed = s.signed,
                "document loaded"
            );
            s.doc = Some(doc);
            s.file_name = file_name.to_string();
            s.history.clear();
            s.selection.reset();
            s.form_values.clear();
            s.signature_placement = None;
            s.revision += 1;
            Ok(())
        })
    }

    pub fn has_document(&self) -> bool {
        self.doc.is_some()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn page_count(&self) -> usize {
        self.doc.as_ref().map(|d| d.page_count()).unwrap_or(0)
    }

    /// Monotonic counter the presentation layer polls to know when to
    /// re-render.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_signed(&self) -> bool {
        self.signed
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // ---- selection ----

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn toggle_page(&mut self, index: usize) -> Result<(), PdfEditError> {
        let page_count = self.page_count();
        if index >= page_count {
            return Err(PdfEditError::PageOutOfRange { index, page_count });
        }
        self.selection.toggle(index);
        self.revision += 1;
        Ok(())
    }

    pub fn select_range(&mut self, from: usize, to: usize) -> Result<(), PdfEditError> {
        let page_count = self.page_count();
        let hi = from.max(to);
        if hi >= page_count {
            return Err(PdfEditError::PageOutOfRange { index: hi, page_count });
        }
        self.selection.set_range(from, to);
        self.revision += 1;
        Ok(())
    }

    /// Select pages from a user-typed range string such as "1-3, 5".
    pub fn select_ranges(&mut self, input: &str) -> Result<(), PdfEditError> {
        let pages = parse_ranges(input)?;
        let page_count = self.page_count();
        if let Some(&max) = pages.iter().next_back() {
            if max >= page_count {
                return Err(PdfEditError::InvalidRange(format!(
                    "Page {} exceeds document ({} pages)",
                    max + 1,
                    page_count
                )));
            }
        }
        self.selection.replace(pages);
        self.revision += 1;
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.revision += 1;
    }

    // ---- page structure ----

    pub fn delete_selected_pages(&mut self) -> Result<(), PdfEditError> {
        let targets = self.selected_or_err()?;
        self.mutate(|doc, sel| {
            mutation::delete_pages(doc, &targets)?;
            sel.reset();
            Ok(())
        })
    }

    pub fn move_selected_pages(&mut self, direction: MoveDirection) -> Result<(), PdfEditError> {
        let targets = self.selected_or_err()?;
        let page_count = self.page_count();
        // Boundary moves are silent no-ops and must not pollute the history.
        let at_edge = match direction {
            MoveDirection::Up => targets.iter().next() == Some(&0),
            MoveDirection::Down => targets.iter().next_back().map(|&i| i + 1) == Some(page_count),
        };
        if at_edge {
            return Ok(());
        }
        self.mutate(|doc, sel| {
            if let Some(moved) = mutation::move_pages(doc, &targets, direction)? {
                sel.replace(moved);
            }
            Ok(())
        })
    }

    pub fn rotate_selected_pages(&mut self, delta: i64) -> Result<(), PdfEditError> {
        let targets = self.selected_or_err()?;
        self.mutate(|doc, _| mutation::rotate_pages(doc, &targets, delta))
    }

    /// Copy the selected pages into a standalone document and return its
    /// bytes. The session document is not modified beyond clearing the
    /// selection once the extract succeeds.
    pub fn extract_selected_pages(&mut self) -> Result<Vec<u8>, PdfEditError> {
        let targets = self.selected_or_err()?;
        self.run_exclusive(|s| {
            let doc = s.doc.as_ref().ok_or(PdfEditError::NoDocument)?;
            let mut extracted = mutation::extract_pages(doc, &targets)?;
            let bytes = extracted.save()?;
            s.selection.clear();
            s.revision += 1;
            Ok(bytes)
        })
    }

    /// Insert another document's pages around the current page (the
    /// selection anchor).
    pub fn insert_document(
        &mut self,
        bytes: &[u8],
        position: InsertPosition,
    ) -> Result<(), PdfEditError> {
        let src = PdfDocument::load(bytes)?;
        let anchor = self.selection.current();
        self.mutate(|doc, sel| {
            let inserted = mutation::insert_pages(doc, &src, position, anchor)?;
            info!(inserted, ?position, anchor, "pages inserted");
            sel.reset();
            Ok(())
        })
    }

    /// Merge the current document with `others` into a fresh document that
    /// replaces it. History does not carry across the merge.
    pub fn merge_with(&mut self, others: &[Vec<u8>], merged_name: &str) -> Result<(), PdfEditError> {
        self.run_exclusive(|s| {
            s.check_unlocked()?;
            let current = s.doc.as_ref().ok_or(PdfEditError::NoDocument)?;
            let mut docs = vec![current.clone()];
            for bytes in others {
                docs.push(PdfDocument::load(bytes)?);
            }
            let mut merged = mutation::merge_documents(&docs)?;
            let bytes = merged.save()?;
            let merged = PdfDocument::load(&bytes)?;
            info!(
                inputs = docs.len(),
                pages = merged.page_count(),
                "documents merged"
            );
            s.notes = annotations::extract_sticky_notes(&merged)?;
            s.markups = annotations::extract_markups(&merged)?;
            s.signed = has_signatures(&merged);
            s.doc = Some(merged);
            s.file_name = merged_name.to_string();
            s.history.clear();
            s.selection.reset();
            s.revision += 1;
            Ok(())
        })
    }

    // ---- history ----

    /// Restore the previous snapshot. Returns false when there is nothing
    /// to undo.
    pub fn undo(&mut self) -> Result<bool, PdfEditError> {
        self.run_exclusive(|s| {
            let doc = s.doc.as_mut().ok_or(PdfEditError::NoDocument)?;
            if !s.history.can_undo() {
                return Ok(false);
            }
            let current = doc.save()?;
            let Some(previous) = s.history.begin_undo(current) else {
                return Ok(false);
            };
            s.adopt_snapshot(&previous)?;
            debug!(depth = s.history.undo_depth(), "undo applied");
            Ok(true)
        })
    }

    pub fn redo(&mut self) -> Result<bool, PdfEditError> {
        self.run_exclusive(|s| {
            let doc = s.doc.as_mut().ok_or(PdfEditError::NoDocument)?;
            if !s.history.can_redo() {
                return Ok(false);
            }
            let current = doc.save()?;
            let Some(next) = s.history.begin_redo(current) else {
                return Ok(false);
            };
            s.adopt_snapshot(&next)?;
            debug!("redo applied");
            Ok(true)
        })
    }

    /// Swap the live document for a history snapshot. Session notes are not
    /// part of snapshots and survive, clipped to the restored page range.
    fn adopt_snapshot(&mut self, bytes: &[u8]) -> Result<(), PdfEditError> {
        let restored = PdfDocument::load(bytes)?;
        let page_count = restored.page_count();
        self.markups = annotations::extract_markups(&restored)?;
        self.signed = has_signatures(&restored);
        self.notes.retain(|n| n.page_index < page_count);
        self.selection.retain_valid(page_count);
        self.doc = Some(restored);
        self.revision += 1;
        Ok(())
    }

    // ---- sticky notes (session state, baked only at export) ----

    pub fn notes(&self) -> &[StickyNote] {
        &self.notes
    }

    pub fn add_sticky_note(
        &mut self,
        page_index: usize,
        x: f32,
        y: f32,
        text: String,
        author: String,
    ) -> Result<u64, PdfEditError> {
        self.check_unlocked()?;
        let page_count = self.page_count();
        if self.doc.is_none() {
            return Err(PdfEditError::NoDocument);
        }
        if page_index >= page_count {
            return Err(PdfEditError::PageOutOfRange { index: page_index, page_count });
        }
        let note = StickyNote::new(page_index, x, y, text, author);
        let id = note.id;
        self.notes.push(note);
        self.revision += 1;
        Ok(id)
    }

    pub fn update_sticky_note(
        &mut self,
        id: u64,
        text: String,
        color: Option<String>,
    ) -> Result<(), PdfEditError> {
        self.check_unlocked()?;
        let note = self
            .notes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| PdfEditError::Operation("Note not found".into()))?;
        note.text = text;
        if let Some(color) = color {
            note.color = color;
        }
        self.revision += 1;
        Ok(())
    }

    pub fn move_sticky_note(&mut self, id: u64, x: f32, y: f32) -> Result<(), PdfEditError> {
        self.check_unlocked()?;
        let note = self
            .notes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| PdfEditError::Operation("Note not found".into()))?;
        note.x = x;
        note.y = y;
        self.revision += 1;
        Ok(())
    }

    pub fn remove_sticky_note(&mut self, id: u64) -> Result<(), PdfEditError> {
        self.check_unlocked()?;
        let before = self.notes.len();
        self.notes.retain(|n| n.id != id);
        if self.notes.len() == before {
            return Err(PdfEditError::Operation("Note not found".into()));
        }
        self.revision += 1;
        Ok(())
    }

    // ---- text markup (lives in the document, goes through commit) ----

    pub fn markups(&self) -> &[TextMarkup] {
        &self.markups
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_text_markup(
        &mut self,
        page_index: usize,
        kind: MarkupKind,
        rects: &[ClientRect],
        scale: f32,
        color: &str,
        author: &str,
        contents: &str,
    ) -> Result<(), PdfEditError> {
        self.mutate(|doc, _| {
            annotations::create_markup(doc, page_index, kind, rects, scale, color, author, contents)
                .map(|_| ())
        })
    }

    pub fn update_text_markup(
        &mut self,
        object_id: ObjectId,
        kind: MarkupKind,
        color: &str,
        author: &str,
        contents: &str,
    ) -> Result<(), PdfEditError> {
        self.mutate(|doc, _| annotations::update_markup(doc, object_id, kind, color, author, contents))
    }

    pub fn delete_text_markup(&mut self, object_id: ObjectId) -> Result<(), PdfEditError> {
        self.mutate(|doc, _| annotations::delete_markup(doc, object_id))
    }

    /// Flatten freehand strokes into the page content.
    pub fn apply_ink(
        &mut self,
        page_index: usize,
        strokes: &[InkStroke],
        render_scale: f32,
    ) -> Result<(), PdfEditError> {
        self.mutate(|doc, _| annotations::bake_ink(doc, page_index, strokes, render_scale))
    }

    // ---- stamping ----

    pub fn apply_watermark(&mut self, watermark: &Watermark) -> Result<(), PdfEditError> {
        self.mutate(|doc, _| stamp::apply_watermark(doc, watermark))
    }

    pub fn apply_text_stamp(
        &mut self,
        page_index: usize,
        text_stamp: &TextStamp,
    ) -> Result<(), PdfEditError> {
        self.mutate(|doc, _| stamp::apply_text_stamp(doc, page_index, text_stamp))
    }

    pub fn apply_image_stamp(
        &mut self,
        page_index: usize,
        image_stamp: &ImageStamp,
    ) -> Result<(), PdfEditError> {
        self.mutate(|doc, _| stamp::apply_image_stamp(doc, page_index, image_stamp))
    }

    pub fn apply_header_footer(&mut self, layout: &HeaderFooter) -> Result<(), PdfEditError> {
        self.mutate(|doc, _| stamp::apply_header_footer(doc, layout))
    }

    // ---- forms ----

    pub fn form_values(&self) -> &FormValues {
        &self.form_values
    }

    pub fn set_form_value(
        &mut self,
        name: impl Into<String>,
        value: FormValue,
    ) -> Result<(), PdfEditError> {
        self.check_unlocked()?;
        self.form_values.set(name, value);
        self.revision += 1;
        Ok(())
    }

    pub fn clear_form_values(&mut self) {
        self.form_values.clear();
        self.revision += 1;
    }

    // ---- signing ----

    pub fn signature_placement(&self) -> Option<&SignaturePlacement> {
        self.signature_placement.as_ref()
    }

    pub fn set_signature_placement(&mut self, placement: SignaturePlacement) {
        self.signature_placement = Some(placement);
        self.revision += 1;
    }

    /// Hand the prepared document to the signing agent and adopt the signed
    /// bytes it returns. Pending forms and notes are baked in first, exactly
    /// as export would.
    pub fn sign_with(
        &mut self,
        agent: &dyn SignatureAgent,
        rubric_image: Option<&[u8]>,
    ) -> Result<(), PdfEditError> {
        self.run_exclusive(|s| {
            s.check_unlocked()?;
            let placement = s
                .signature_placement
                .ok_or_else(|| PdfEditError::Operation("No signature placement set".into()))?;
            let doc = s.doc.as_ref().ok_or(PdfEditError::NoDocument)?;
            let (_, page_height) = doc.page_size(placement.page_index)?;

            let mut prepared = doc.clone();
            forms::apply_form_values(&mut prepared, &s.form_values)?;
            annotations::bake_sticky_notes(&mut prepared, &s.notes)?;
            let bytes = prepared.save()?;

            let request = SignatureRequest::new(&bytes, &placement, page_height, rubric_image);
            let signed_bytes = agent.sign(&request)?;
            let signed_doc = PdfDocument::load(&signed_bytes)?;

            s.markups = annotations::extract_markups(&signed_doc)?;
            s.notes = annotations::extract_sticky_notes(&signed_doc)?;
            s.signed = has_signatures(&signed_doc);
            info!(signed = s.signed, "signing agent returned document");
            s.doc = Some(signed_doc);
            s.signed_bytes = Some(signed_bytes);
            s.file_name = format!("SIGNED_{}", s.file_name);
            s.history.clear();
            s.selection.reset();
            s.form_values.clear();
            s.revision += 1;
            Ok(())
        })
    }

    // ---- export ----

    /// Produce the downloadable bytes: form values applied and notes baked
    /// on a throwaway copy, so the live session stays editable. A signed
    /// document is returned byte-for-byte as the agent delivered it.
    pub fn export(&mut self) -> Result<Vec<u8>, PdfEditError> {
        self.run_exclusive(|s| {
            let doc = s.doc.as_ref().ok_or(PdfEditError::NoDocument)?;
            if s.signed {
                if let Some(bytes) = &s.signed_bytes {
                    return Ok(bytes.clone());
                }
                return doc.clone().save();
            }
            let mut out = doc.clone();
            forms::apply_form_values(&mut out, &s.form_values)?;
            annotations::bake_sticky_notes(&mut out, &s.notes)?;
            out.save()
        })
    }

    fn selected_or_err(&self) -> Result<std::collections::BTreeSet<usize>, PdfEditError> {
        if self.doc.is_none() {
            return Err(PdfEditError::NoDocument);
        }
        if self.selection.is_empty() {
            return Err(PdfEditError::InvalidRange("No pages selected".into()));
        }
        Ok(self.selection.indices().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::pdf_with_pages;
    use lopdf::{dictionary, Object, StringFormat};
    use pretty_assertions::assert_eq;

    fn session_with_pages(n: usize) -> EditSession {
        let mut session = EditSession::new();
        session.load_document(&pdf_with_pages(n), "test.pdf").unwrap();
        session
    }

    /// A one-page document carrying a filled signature, reachable from the
    /// page so pruning keeps it.
    fn signed_pdf() -> Vec<u8> {
        let mut doc = PdfDocument::load(&pdf_with_pages(1)).unwrap();
        let sig = doc.add_object(Object::Dictionary(dictionary! {
            "Type" => "Sig",
            "Contents" => Object::String(vec![0x30, 0x82], StringFormat::Hexadecimal),
        }));
        let widget = doc.add_object(Object::Dictionary(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => "Sig",
            "Rect" => Object::Array(vec![0.into(), 0.into(), 100.into(), 50.into()]),
            "V" => Object::Reference(sig),
        }));
        doc.with_annots_mut(0, true, |arr| arr.push(Object::Reference(widget)))
            .unwrap();
        doc.save().unwrap()
    }

    struct FixedAgent {
        bytes: Vec<u8>,
    }

    impl SignatureAgent for FixedAgent {
        fn sign(&self, _request: &SignatureRequest) -> Result<Vec<u8>, PdfEditError> {
            Ok(self.bytes.clone())
        }
    }

    #[test]
    fn load_failure_keeps_current_document() {
        let mut session = session_with_pages(3);
        let revision = session.revision();
        assert!(session.load_document(b"not a pdf", "bad.pdf").is_err());
        assert_eq!(session.page_count(), 3);
        assert_eq!(session.file_name(), "test.pdf");
        assert_eq!(session.revision(), revision);
    }

    #[test]
    fn delete_undo_redo_cycle() {
        let mut session = session_with_pages(5);
        session.select_ranges("2, 4").unwrap();
        session.delete_selected_pages().unwrap();
        assert_eq!(session.page_count(), 3);
        assert!(session.selection().is_empty());
        assert!(session.can_undo());

        assert!(session.undo().unwrap());
        assert_eq!(session.page_count(), 5);
        assert!(session.can_redo());

        assert!(session.redo().unwrap());
        assert_eq!(session.page_count(), 3);
    }

    #[test]
    fn new_edit_clears_redo() {
        let mut session = session_with_pages(4);
        session.toggle_page(0).unwrap();
        session.delete_selected_pages().unwrap();
        session.undo().unwrap();
        assert!(session.can_redo());

        session.toggle_page(1).unwrap();
        session.rotate_selected_pages(90).unwrap();
        assert!(!session.can_redo());
    }

    #[test]
    fn boundary_move_is_silent_and_unrecorded() {
        let mut session = session_with_pages(3);
        session.toggle_page(0).unwrap();
        let revision = session.revision();
        session.move_selected_pages(MoveDirection::Up).unwrap();
        assert_eq!(session.revision(), revision);
        assert!(!session.can_undo());
    }

    #[test]
    fn move_remaps_selection() {
        let mut session = session_with_pages(5);
        session.toggle_page(3).unwrap();
        session.move_selected_pages(MoveDirection::Down).unwrap();
        let selected: Vec<usize> = session.selection().indices().iter().copied().collect();
        assert_eq!(selected, vec![4]);
    }

    #[test]
    fn failed_edit_still_commits() {
        let mut session = session_with_pages(2);
        let revision = session.revision();
        let result = session.create_text_markup(
            0,
            MarkupKind::Highlight,
            &[],
            1.0,
            "#ffff00",
            "",
            "",
        );
        assert!(result.is_err());
        assert_eq!(session.revision(), revision + 1);
        assert!(session.can_undo());
    }

    #[test]
    fn reentrant_call_is_rejected_as_busy() {
        let mut session = session_with_pages(1);
        let result = session.run_exclusive(|s| s.export());
        assert!(matches!(result, Err(PdfEditError::Busy)));
        // The flag is released afterwards.
        assert!(session.export().is_ok());
    }

    #[test]
    fn markup_survives_commit_with_fresh_object_id() {
        let mut session = session_with_pages(2);
        let rects = [ClientRect { x: 10.0, y: 10.0, width: 80.0, height: 12.0 }];
        session
            .create_text_markup(1, MarkupKind::Highlight, &rects, 1.0, "#ffff00", "bob", "hi")
            .unwrap();
        assert_eq!(session.markups().len(), 1);
        let markup = &session.markups()[0];
        assert_eq!(markup.page_index, 1);
        assert_eq!(markup.contents, "hi");

        let id = markup.object_id;
        session
            .update_text_markup(id, MarkupKind::StrikeOut, "#ff0000", "bob", "fix")
            .unwrap();
        let markup = &session.markups()[0];
        assert_eq!(markup.kind, MarkupKind::StrikeOut);

        session.delete_text_markup(session.markups()[0].object_id).unwrap();
        assert!(session.markups().is_empty());
    }

    #[test]
    fn notes_stay_out_of_document_until_export() {
        let mut session = session_with_pages(2);
        session
            .add_sticky_note(0, 100.0, 40.0, "remember".into(), "alice".into())
            .unwrap();
        assert_eq!(session.notes().len(), 1);

        // Not in the live document yet.
        let live = session.doc.as_ref().unwrap();
        assert!(annotations::extract_sticky_notes(live).unwrap().is_empty());

        // But baked into the export.
        let exported = session.export().unwrap();
        let doc = PdfDocument::load(&exported).unwrap();
        let notes = annotations::extract_sticky_notes(&doc).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].text, "remember");
    }

    #[test]
    fn notes_on_deleted_pages_are_dropped() {
        let mut session = session_with_pages(3);
        session
            .add_sticky_note(2, 10.0, 10.0, "tail".into(), "a".into())
            .unwrap();
        session.toggle_page(2).unwrap();
        session.delete_selected_pages().unwrap();
        assert!(session.notes().is_empty());
    }

    #[test]
    fn signed_document_locks_editing() {
        let mut session = EditSession::new();
        session.load_document(&signed_pdf(), "contract.pdf").unwrap();
        assert!(session.is_signed());

        session.selection.toggle(0);
        assert!(matches!(
            session.delete_selected_pages(),
            Err(PdfEditError::DocumentSigned)
        ));
        assert!(matches!(
            session.add_sticky_note(0, 0.0, 0.0, "x".into(), "a".into()),
            Err(PdfEditError::DocumentSigned)
        ));
    }

    #[test]
    fn export_of_signed_document_returns_original_bytes() {
        let bytes = signed_pdf();
        let mut session = EditSession::new();
        session.load_document(&bytes, "contract.pdf").unwrap();
        assert_eq!(session.export().unwrap(), bytes);
    }

    #[test]
    fn sign_with_adopts_agent_output() {
        let mut session = session_with_pages(2);
        session.set_signature_placement(SignaturePlacement {
            page_index: 0,
            x: 50.0,
            y: 700.0,
            width: 150.0,
            height: 60.0,
        });
        let agent = FixedAgent { bytes: signed_pdf() };
        session.sign_with(&agent, None).unwrap();

        assert!(session.is_signed());
        assert_eq!(session.file_name(), "SIGNED_test.pdf");
        assert_eq!(session.page_count(), 1);
        assert!(!session.can_undo());
    }

    #[test]
    fn signing_without_placement_fails() {
        let mut session = session_with_pages(1);
        let agent = FixedAgent { bytes: signed_pdf() };
        assert!(session.sign_with(&agent, None).is_err());
    }

    #[test]
    fn extract_does_not_mutate_session() {
        let mut session = session_with_pages(4);
        session.select_ranges("1-2").unwrap();
        let bytes = session.extract_selected_pages().unwrap();
        assert_eq!(PdfDocument::load(&bytes).unwrap().page_count(), 2);
        assert_eq!(session.page_count(), 4);
        assert!(!session.can_undo());
        // The document is untouched but the selection is spent.
        assert!(session.selection().is_empty());
    }

    #[test]
    fn insert_replaces_anchor_page() {
        let mut session = session_with_pages(5);
        session.toggle_page(2).unwrap();
        session
            .insert_document(&pdf_with_pages(3), InsertPosition::Replace)
            .unwrap();
        assert_eq!(session.page_count(), 7);
        assert!(session.selection().is_empty());
    }

    #[test]
    fn merge_resets_history_and_renames() {
        let mut session = session_with_pages(2);
        session.toggle_page(0).unwrap();
        session.rotate_selected_pages(90).unwrap();
        assert!(session.can_undo());

        session
            .merge_with(&[pdf_with_pages(3)], "merged.pdf")
            .unwrap();
        assert_eq!(session.page_count(), 5);
        assert_eq!(session.file_name(), "merged.pdf");
        assert!(!session.can_undo());
    }

    #[test]
    fn operations_without_document_fail() {
        let mut session = EditSession::new();
        assert!(matches!(session.export(), Err(PdfEditError::NoDocument)));
        assert!(matches!(session.undo(), Err(PdfEditError::NoDocument)));
        assert!(matches!(
            session.delete_selected_pages(),
            Err(PdfEditError::NoDocument)
        ));
    }

    #[test]
    fn watermark_via_session_is_undoable() {
        let mut session = session_with_pages(2);
        session.apply_watermark(&Watermark::new("DRAFT")).unwrap();
        assert!(session.can_undo());
        assert!(session.undo().unwrap());
    }

    #[test]
    fn form_values_applied_only_at_export() {
        let mut session = session_with_pages(1);
        session
            .set_form_value("name", FormValue::Text("Ada".into()))
            .unwrap();
        // Document without AcroForm: export still succeeds, values skipped.
        assert!(session.export().is_ok());
        assert_eq!(session.form_values().len(), 1);
    }
}
