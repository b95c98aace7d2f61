//! In-memory PDF editing engine: page restructuring, annotations, stamping,
//! form fill and a signing boundary, behind a single session type.
//!
//! The heart of the crate is [`EditSession`]: load a document, mutate it
//! through the session's operations, and export the result. Every mutating
//! operation runs the same commit cycle (serialize, reload, re-extract), so
//! the in-memory state always matches what a fresh parse of the bytes would
//! see, and every one of them is undoable through a bounded snapshot
//! history.
//!
//! The lower-level modules are usable on their own: [`mutation`] holds the
//! pure page algorithms over [`PdfDocument`], [`annotations`] the sticky
//! note/markup/ink handling, [`stamp`] the content-stream stamping and
//! [`forms`] the AcroForm filling.

pub mod annotations;
pub mod document;
pub mod error;
pub mod forms;
pub mod history;
pub mod mutation;
pub mod selection;
pub mod session;
pub mod signature;
pub mod stamp;

pub use annotations::{ClientRect, InkStroke, MarkupKind, StickyNote, TextMarkup};
pub use document::PdfDocument;
pub use error::PdfEditError;
pub use forms::{FormValue, FormValues};
pub use history::{History, MAX_HISTORY};
pub use mutation::{InsertPosition, MoveDirection};
pub use selection::{parse_ranges, Selection};
pub use session::EditSession;
pub use signature::{has_signatures, SignatureAgent, SignaturePlacement, SignatureRequest};
pub use stamp::{HeaderFooter, ImageFormat, ImageStamp, TextStamp, Watermark};


#[cfg(test)]
mod invariant_tests {
    use crate::history::{History, MAX_HISTORY};
    use crate::selection::Selection;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn history_depth_never_exceeds_bound(pushes in 0usize..40) {
            let mut history = History::new();
            for i in 0..pushes {
                history.push(vec![i as u8]);
            }
            prop_assert!(history.undo_depth() <= MAX_HISTORY);
        }

        #[test]
        fn undo_returns_exactly_what_was_pushed(
            snapshot in prop::collection::vec(any::<u8>(), 0..64)
        ) {
            let mut history = History::new();
            history.push(snapshot.clone());
            prop_assert_eq!(history.begin_undo(vec![0xff]), Some(snapshot));
        }

        #[test]
        fn retained_selection_stays_in_range(
            indices in prop::collection::btree_set(0usize..100, 0..20),
            page_count in 0usize..50,
        ) {
            let mut selection = Selection::new();
            selection.replace(indices);
            selection.set_current(99);
            selection.retain_valid(page_count);
            prop_assert!(selection.indices().iter().all(|&i| i < page_count));
            if page_count > 0 {
                prop_assert!(selection.current() < page_count);
            }
        }
    }
}
