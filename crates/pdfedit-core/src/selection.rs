//! Page selection tracking for bulk operations.

use crate::error::PdfEditError;
use std::collections::BTreeSet;

/// Set of selected page indices plus the last-clicked index used as the
/// anchor for range selection and single-page tools.
///
/// Indices are 0-based positions in the current document and are *not*
/// stable across structural edits; the mutation engine remaps or clears the
/// set after every operation that shifts indices.
#[derive(Debug, Default, Clone)]
pub struct Selection {
    pages: BTreeSet<usize>,
    current: usize,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&mut self, index: usize) {
        if !self.pages.remove(&index) {
            self.pages.insert(index);
        }
        self.current = index;
    }

    /// Replace the set with the inclusive range between `from` and `to`.
    pub fn set_range(&mut self, from: usize, to: usize) {
        let (lo, hi) = if from <= to { (from, to) } else { (to, from) };
        self.pages = (lo..=hi).collect();
        self.current = to;
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }

    /// Clear the set and reset the anchor, as after a destructive edit.
    pub fn reset(&mut self) {
        self.pages.clear();
        self.current = 0;
    }

    pub fn replace(&mut self, pages: BTreeSet<usize>) {
        self.pages = pages;
    }

    /// Drop entries that no longer point at a page and clamp the anchor.
    pub fn retain_valid(&mut self, page_count: usize) {
        self.pages.retain(|&i| i < page_count);
        if page_count == 0 {
            self.current = 0;
        } else if self.current >= page_count {
            self.current = page_count - 1;
        }
    }

    pub fn indices(&self) -> &BTreeSet<usize> {
        &self.pages
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.pages.contains(&index)
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn set_current(&mut self, index: usize) {
        self.current = index;
    }
}

/// Parse a page range string like "1-3, 5, 8-10" (1-based, as typed by the
/// user) into sorted unique 0-based page indices.
pub fn parse_ranges(input: &str) -> Result<BTreeSet<usize>, PdfEditError> {
    let mut pages = BTreeSet::new();

    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        if let Some((start, end)) = part.split_once('-') {
            let start: usize = start
                .trim()
                .parse()
                .map_err(|_| PdfEditError::InvalidRange(format!("Invalid start: {}", start)))?;
            let end: usize = end
                .trim()
                .parse()
                .map_err(|_| PdfEditError::InvalidRange(format!("Invalid end: {}", end)))?;

            if start == 0 || end == 0 {
                return Err(PdfEditError::InvalidRange("Pages are numbered from 1".into()));
            }
            if start > end {
                return Err(PdfEditError::InvalidRange(format!(
                    "Start {} > end {}",
                    start, end
                )));
            }

            for page in start..=end {
                pages.insert(page - 1);
            }
        } else {
            let page: usize = part
                .parse()
                .map_err(|_| PdfEditError::InvalidRange(format!("Invalid page: {}", part)))?;
            if page == 0 {
                return Err(PdfEditError::InvalidRange("Pages are numbered from 1".into()));
            }
            pages.insert(page - 1);
        }
    }

    Ok(pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn toggle_adds_and_removes() {
        let mut sel = Selection::new();
        sel.toggle(2);
        assert!(sel.contains(2));
        assert_eq!(sel.current(), 2);
        sel.toggle(2);
        assert!(!sel.contains(2));
    }

    #[test]
    fn set_range_is_inclusive_and_direction_agnostic() {
        let mut sel = Selection::new();
        sel.set_range(4, 1);
        assert_eq!(sel.indices().iter().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
        assert_eq!(sel.current(), 1);
    }

    #[test]
    fn retain_valid_drops_stale_indices() {
        let mut sel = Selection::new();
        sel.set_range(0, 4);
        sel.set_current(4);
        sel.retain_valid(3);
        assert_eq!(sel.indices().iter().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(sel.current(), 2);
    }

    #[test]
    fn retain_valid_on_empty_document() {
        let mut sel = Selection::new();
        sel.toggle(0);
        sel.retain_valid(0);
        assert!(sel.is_empty());
        assert_eq!(sel.current(), 0);
    }

    #[test]
    fn parse_ranges_complex() {
        let pages = parse_ranges("1-3, 5, 8-10").unwrap();
        assert_eq!(pages.into_iter().collect::<Vec<_>>(), vec![0, 1, 2, 4, 7, 8, 9]);
    }

    #[test]
    fn parse_ranges_deduplicates() {
        let pages = parse_ranges("1-3, 2-4").unwrap();
        assert_eq!(pages.into_iter().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn parse_ranges_rejects_zero_and_backwards() {
        assert!(parse_ranges("0").is_err());
        assert!(parse_ranges("5-2").is_err());
        assert!(parse_ranges("a-b").is_err());
    }
}
