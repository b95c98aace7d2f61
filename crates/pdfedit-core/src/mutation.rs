//! Structural page edits over the document graph.
//!
//! Every algorithm here is written so that each intermediate step only
//! touches indices that are still valid at that moment: deletions run
//! high-to-low, moves insert the copy before removing the original, and
//! replace-insertion deletes the displaced page at its shifted position.

use crate::document::PdfDocument;
use crate::error::PdfEditError;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Before,
    After,
    Replace,
}

/// Delete the pages at `indices`.
///
/// Removal runs in descending order: removing low-to-high would shift every
/// subsequent index and invalidate the remaining targets.
pub fn delete_pages(doc: &mut PdfDocument, indices: &BTreeSet<usize>) -> Result<(), PdfEditError> {
    let page_count = doc.page_count();
    for &index in indices.iter().rev() {
        if index >= page_count {
            continue; // stale selection entry, nothing to remove
        }
        doc.remove_page_at(index)?;
    }
    Ok(())
}

/// Move the pages at `indices` one slot up or down.
///
/// Returns the selection at its new positions, or `None` when the move is a
/// boundary no-op (topmost page already first, or bottommost already last).
///
/// Each page moves by copy-insert-remove: the copy is inserted at the
/// adjacent slot first, and only then is the original (now shifted) removed.
/// Removing first would shift the insertion target. Up-moves process the
/// selection ascending, down-moves descending, so indices not yet processed
/// stay valid throughout.
pub fn move_pages(
    doc: &mut PdfDocument,
    indices: &BTreeSet<usize>,
    direction: MoveDirection,
) -> Result<Option<BTreeSet<usize>>, PdfEditError> {
    let (Some(&first), Some(&last)) = (indices.iter().next(), indices.iter().next_back()) else {
        return Ok(None);
    };
    let page_count = doc.page_count();

    match direction {
        MoveDirection::Up if first == 0 => return Ok(None),
        MoveDirection::Down if last + 1 >= page_count => return Ok(None),
        _ => {}
    }

    let mut moved = BTreeSet::new();
    match direction {
        MoveDirection::Up => {
            for &i in indices.iter() {
                let copy = doc.copy_page(i)?;
                doc.insert_page_at(i - 1, copy)?;
                // The original slid from i to i + 1 when the copy went in.
                doc.remove_page_at(i + 1)?;
                moved.insert(i - 1);
            }
        }
        MoveDirection::Down => {
            for &i in indices.iter().rev() {
                let copy = doc.copy_page(i)?;
                // Insert past the following page so the copy lands below it.
                doc.insert_page_at(i + 2, copy)?;
                doc.remove_page_at(i)?;
                moved.insert(i + 1);
            }
        }
    }
    Ok(Some(moved))
}

/// Add `delta` degrees to each selected page's rotation. Pure metadata;
/// no indices shift.
pub fn rotate_pages(
    doc: &mut PdfDocument,
    indices: &BTreeSet<usize>,
    delta: i64,
) -> Result<(), PdfEditError> {
    for &index in indices {
        doc.rotate_page(index, delta)?;
    }
    Ok(())
}

/// Build a new document holding copies of the selected pages, in ascending
/// index order. The source document is not modified.
pub fn extract_pages(
    doc: &PdfDocument,
    indices: &BTreeSet<usize>,
) -> Result<PdfDocument, PdfEditError> {
    if indices.is_empty() {
        return Err(PdfEditError::InvalidRange("No pages selected".into()));
    }
    let wanted: Vec<usize> = indices.iter().copied().collect();
    let mut extracted = PdfDocument::new_empty();
    let page_ids = extracted.copy_pages_from(doc, &wanted)?;
    for (position, id) in page_ids.into_iter().enumerate() {
        extracted.insert_page_at(position, id)?;
    }
    Ok(extracted)
}

/// Copy all pages of `src` into `doc` around `anchor`.
///
/// Insertion starts at `anchor` for `Before`/`Replace` and `anchor + 1` for
/// `After`, advancing the cursor after each page. For `Replace` the original
/// anchor page is deleted *after* insertion completes, at its shifted index
/// `anchor + inserted`; deleting first would invalidate the shift
/// computation. Returns the number of pages inserted.
pub fn insert_pages(
    doc: &mut PdfDocument,
    src: &PdfDocument,
    position: InsertPosition,
    anchor: usize,
) -> Result<usize, PdfEditError> {
    let page_count = doc.page_count();
    let anchor = if page_count == 0 {
        0
    } else {
        anchor.min(page_count - 1)
    };

    let all: Vec<usize> = (0..src.page_count()).collect();
    let copied = doc.copy_pages_from(src, &all)?;
    let inserted = copied.len();

    let mut cursor = match position {
        InsertPosition::Before | InsertPosition::Replace => anchor,
        InsertPosition::After => anchor + 1,
    };
    for id in copied {
        doc.insert_page_at(cursor, id)?;
        cursor += 1;
    }

    if position == InsertPosition::Replace && page_count > 0 {
        doc.remove_page_at(anchor + inserted)?;
    }
    Ok(inserted)
}

/// Combine documents into a brand-new one, appending every page of every
/// input in list order. Unlike [`insert_pages`] this does not augment an
/// existing document.
pub fn merge_documents(documents: &[PdfDocument]) -> Result<PdfDocument, PdfEditError> {
    if documents.is_empty() {
        return Err(PdfEditError::Operation("No documents to merge".into()));
    }
    let mut merged = PdfDocument::new_empty();
    let mut cursor = 0;
    for src in documents {
        let all: Vec<usize> = (0..src.page_count()).collect();
        let page_ids = merged.copy_pages_from(src, &all)?;
        for id in page_ids {
            merged.insert_page_at(cursor, id)?;
            cursor += 1;
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{page_label, pdf_with_pages};
    use pretty_assertions::assert_eq;

    fn labels(doc: &PdfDocument) -> Vec<String> {
        (0..doc.page_count()).map(|i| page_label(doc, i)).collect()
    }

    fn set(indices: &[usize]) -> BTreeSet<usize> {
        indices.iter().copied().collect()
    }

    #[test]
    fn delete_keeps_relative_order_of_survivors() {
        // 5 pages, delete {1, 3} -> originally 0, 2, 4 survive in order.
        let mut doc = PdfDocument::load(&pdf_with_pages(5)).unwrap();
        delete_pages(&mut doc, &set(&[1, 3])).unwrap();
        assert_eq!(labels(&doc), vec!["p0", "p2", "p4"]);
    }

    #[test]
    fn delete_all_pages_empties_document() {
        let mut doc = PdfDocument::load(&pdf_with_pages(3)).unwrap();
        delete_pages(&mut doc, &set(&[0, 1, 2])).unwrap();
        assert_eq!(doc.page_count(), 0);
    }

    #[test]
    fn move_down_swaps_with_follower() {
        // 5 pages, move {3} down: page 3 and 4 swap, selection becomes {4}.
        let mut doc = PdfDocument::load(&pdf_with_pages(5)).unwrap();
        let moved = move_pages(&mut doc, &set(&[3]), MoveDirection::Down)
            .unwrap()
            .unwrap();
        assert_eq!(labels(&doc), vec!["p0", "p1", "p2", "p4", "p3"]);
        assert_eq!(moved, set(&[4]));
    }

    #[test]
    fn move_up_swaps_with_predecessor() {
        let mut doc = PdfDocument::load(&pdf_with_pages(4)).unwrap();
        let moved = move_pages(&mut doc, &set(&[2]), MoveDirection::Up)
            .unwrap()
            .unwrap();
        assert_eq!(labels(&doc), vec!["p0", "p2", "p1", "p3"]);
        assert_eq!(moved, set(&[1]));
    }

    #[test]
    fn move_block_up_preserves_block_order() {
        let mut doc = PdfDocument::load(&pdf_with_pages(5)).unwrap();
        let moved = move_pages(&mut doc, &set(&[2, 3]), MoveDirection::Up)
            .unwrap()
            .unwrap();
        assert_eq!(labels(&doc), vec!["p0", "p2", "p3", "p1", "p4"]);
        assert_eq!(moved, set(&[1, 2]));
    }

    #[test]
    fn move_up_at_top_is_noop() {
        let mut doc = PdfDocument::load(&pdf_with_pages(3)).unwrap();
        let result = move_pages(&mut doc, &set(&[0, 2]), MoveDirection::Up).unwrap();
        assert!(result.is_none());
        assert_eq!(labels(&doc), vec!["p0", "p1", "p2"]);
    }

    #[test]
    fn move_down_at_bottom_is_noop() {
        let mut doc = PdfDocument::load(&pdf_with_pages(3)).unwrap();
        let result = move_pages(&mut doc, &set(&[2]), MoveDirection::Down).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn extract_copies_in_ascending_order_without_mutating_source() {
        let doc = PdfDocument::load(&pdf_with_pages(5)).unwrap();
        let extracted = extract_pages(&doc, &set(&[4, 0, 2])).unwrap();
        assert_eq!(labels(&extracted), vec!["p0", "p2", "p4"]);
        assert_eq!(doc.page_count(), 5);
    }

    #[test]
    fn extract_survives_serialization() {
        let doc = PdfDocument::load(&pdf_with_pages(4)).unwrap();
        let mut extracted = extract_pages(&doc, &set(&[1, 2])).unwrap();
        let bytes = extracted.save().unwrap();
        let reloaded = PdfDocument::load(&bytes).unwrap();
        assert_eq!(reloaded.page_count(), 2);
    }

    #[test]
    fn insert_before_places_pages_at_anchor() {
        let mut doc = PdfDocument::load(&pdf_with_pages(3)).unwrap();
        let src = PdfDocument::load(&pdf_with_pages(2)).unwrap();
        let n = insert_pages(&mut doc, &src, InsertPosition::Before, 1).unwrap();
        assert_eq!(n, 2);
        assert_eq!(labels(&doc), vec!["p0", "p0", "p1", "p1", "p2"]);
    }

    #[test]
    fn insert_after_places_pages_past_anchor() {
        let mut doc = PdfDocument::load(&pdf_with_pages(3)).unwrap();
        let src = PdfDocument::load(&pdf_with_pages(1)).unwrap();
        insert_pages(&mut doc, &src, InsertPosition::After, 1).unwrap();
        assert_eq!(labels(&doc), vec!["p0", "p1", "p0", "p2"]);
    }

    #[test]
    fn insert_replace_removes_anchor_page_after_insertion() {
        // 5-page doc, replace at anchor 2 with a 3-page doc: 7 pages remain,
        // the original page 2 is gone, 0/1 and 3/4 (now 5/6) are unchanged.
        let mut doc = PdfDocument::load(&pdf_with_pages(5)).unwrap();
        let src = PdfDocument::load(&pdf_with_pages(3)).unwrap();
        let n = insert_pages(&mut doc, &src, InsertPosition::Replace, 2).unwrap();
        assert_eq!(n, 3);
        assert_eq!(doc.page_count(), 7);
        assert_eq!(
            labels(&doc),
            vec!["p0", "p1", "p0", "p1", "p2", "p3", "p4"]
        );
    }

    #[test]
    fn merge_concatenates_in_list_order() {
        let a = PdfDocument::load(&pdf_with_pages(2)).unwrap();
        let b = PdfDocument::load(&pdf_with_pages(3)).unwrap();
        let mut merged = merge_documents(&[a, b]).unwrap();
        assert_eq!(merged.page_count(), 5);
        let bytes = merged.save().unwrap();
        assert_eq!(PdfDocument::load(&bytes).unwrap().page_count(), 5);
    }

    #[test]
    fn merge_empty_input_fails() {
        assert!(merge_documents(&[]).is_err());
    }
}
