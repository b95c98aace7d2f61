//! Thin wrapper over the lopdf object graph.
//!
//! All page-level structure is managed through the root `Pages` node's `Kids`
//! array: on load the page tree is normalized to a flat list (inheritable
//! attributes are pulled down into each page first), after which insert,
//! remove and reorder are plain `Kids` rewrites. Orphaned objects are pruned
//! on every save.

use crate::error::PdfEditError;
use lopdf::content::Content;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

/// Page attributes that may be inherited from ancestor `Pages` nodes.
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Default US Letter media box, used when a page declares no size at all.
pub const DEFAULT_PAGE_SIZE: (f32, f32) = (612.0, 792.0);

/// Mutable PDF object graph with page-level and object-level operations.
#[derive(Clone)]
pub struct PdfDocument {
    inner: Document,
}

impl PdfDocument {
    /// Parse a byte buffer into a mutable object graph.
    pub fn load(bytes: &[u8]) -> Result<Self, PdfEditError> {
        let inner = Document::load_mem(bytes).map_err(|e| PdfEditError::Parse(e.to_string()))?;
        let mut doc = Self { inner };
        doc.normalize_page_tree()?;
        Ok(doc)
    }

    /// Create an empty document with a catalog and an empty page tree.
    pub fn new_empty() -> Self {
        let mut inner = Document::with_version("1.7");
        let pages_id = inner.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => Object::Array(vec![]),
            "Count" => 0,
        });
        let catalog_id = inner.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        inner.trailer.set("Root", Object::Reference(catalog_id));
        Self { inner }
    }

    /// Serialize the graph to bytes, pruning orphaned objects first.
    pub fn save(&mut self) -> Result<Vec<u8>, PdfEditError> {
        self.inner.prune_objects();
        self.inner.compress();
        let mut buffer = Vec::new();
        self.inner
            .save_to(&mut buffer)
            .map_err(|e| PdfEditError::Serialization(e.to_string()))?;
        Ok(buffer)
    }

    pub fn page_count(&self) -> usize {
        self.inner.get_pages().len()
    }

    /// Page object ids in document order.
    pub fn page_ids(&self) -> Vec<ObjectId> {
        self.inner.get_pages().values().copied().collect()
    }

    pub fn page_id(&self, index: usize) -> Result<ObjectId, PdfEditError> {
        let ids = self.page_ids();
        ids.get(index).copied().ok_or(PdfEditError::PageOutOfRange {
            index,
            page_count: ids.len(),
        })
    }

    /// Insert an existing page object at `index` (clamped to the page count).
    pub fn insert_page_at(&mut self, index: usize, page_id: ObjectId) -> Result<(), PdfEditError> {
        let mut order = self.page_ids();
        let index = index.min(order.len());
        order.insert(index, page_id);
        self.set_page_order(&order)
    }

    /// Unlink the page at `index` from the page tree. The page object itself
    /// stays in the graph until the next save prunes it.
    pub fn remove_page_at(&mut self, index: usize) -> Result<(), PdfEditError> {
        let mut order = self.page_ids();
        if index >= order.len() {
            return Err(PdfEditError::PageOutOfRange {
                index,
                page_count: order.len(),
            });
        }
        order.remove(index);
        self.set_page_order(&order)
    }

    /// Clone the page dictionary at `index` into a new document-owned object.
    /// Content streams and resources are shared by reference.
    pub fn copy_page(&mut self, index: usize) -> Result<ObjectId, PdfEditError> {
        let page_id = self.page_id(index)?;
        let dict = self.inner.get_object(page_id)?.as_dict()?.clone();
        Ok(self.inner.add_object(Object::Dictionary(dict)))
    }

    /// Import the pages at `indices` from `src` into this document.
    ///
    /// Every object of `src` is imported with its id offset past this
    /// document's `max_id` and all references remapped, so the copied pages
    /// stay internally consistent. Returns the remapped page ids, which are
    /// not yet linked into the page tree.
    pub fn copy_pages_from(
        &mut self,
        src: &PdfDocument,
        indices: &[usize],
    ) -> Result<Vec<ObjectId>, PdfEditError> {
        let src_pages = src.page_ids();
        let mut wanted = Vec::with_capacity(indices.len());
        for &i in indices {
            let id = *src_pages.get(i).ok_or(PdfEditError::PageOutOfRange {
                index: i,
                page_count: src_pages.len(),
            })?;
            wanted.push(id);
        }

        let offset = self.inner.max_id;
        for (old_id, object) in src.inner.objects.iter() {
            let new_id = (old_id.0 + offset, old_id.1);
            self.inner
                .objects
                .insert(new_id, remap_object_refs(object.clone(), offset));
        }
        self.inner.max_id = src.inner.max_id + offset;

        Ok(wanted.into_iter().map(|id| (id.0 + offset, id.1)).collect())
    }

    /// Current rotation of the page, in degrees.
    pub fn page_rotation(&self, index: usize) -> Result<i64, PdfEditError> {
        let page_id = self.page_id(index)?;
        let dict = self.inner.get_object(page_id)?.as_dict()?;
        Ok(dict.get(b"Rotate").and_then(Object::as_i64).unwrap_or(0))
    }

    /// Add `delta` degrees to the page rotation, normalized to [0, 360).
    pub fn rotate_page(&mut self, index: usize, delta: i64) -> Result<(), PdfEditError> {
        let current = self.page_rotation(index)?;
        let page_id = self.page_id(index)?;
        let dict = self.inner.get_object_mut(page_id)?.as_dict_mut()?;
        dict.set("Rotate", (current + delta).rem_euclid(360));
        Ok(())
    }

    /// Page width and height from the MediaBox, falling back to US Letter.
    pub fn page_size(&self, index: usize) -> Result<(f32, f32), PdfEditError> {
        let page_id = self.page_id(index)?;
        let dict = self.inner.get_object(page_id)?.as_dict()?;
        if let Ok(obj) = dict.get(b"MediaBox") {
            if let Ok(arr) = self.resolve(obj).as_array() {
                if arr.len() == 4 {
                    if let (Some(x0), Some(y0), Some(x1), Some(y1)) = (
                        number(&arr[0]),
                        number(&arr[1]),
                        number(&arr[2]),
                        number(&arr[3]),
                    ) {
                        return Ok((x1 - x0, y1 - y0));
                    }
                }
            }
        }
        Ok(DEFAULT_PAGE_SIZE)
    }

    /// Follow a reference one level; non-references pass through unchanged.
    pub fn resolve<'a>(&'a self, obj: &'a Object) -> &'a Object {
        if let Object::Reference(id) = obj {
            self.inner.get_object(*id).unwrap_or(obj)
        } else {
            obj
        }
    }

    pub fn add_object(&mut self, obj: impl Into<Object>) -> ObjectId {
        self.inner.add_object(obj)
    }

    pub fn get_dict(&self, id: ObjectId) -> Result<&Dictionary, PdfEditError> {
        Ok(self.inner.get_object(id)?.as_dict()?)
    }

    pub fn get_dict_mut(&mut self, id: ObjectId) -> Result<&mut Dictionary, PdfEditError> {
        Ok(self.inner.get_object_mut(id)?.as_dict_mut()?)
    }

    /// Every indirect object in the graph, for whole-document scans.
    pub fn objects(&self) -> impl Iterator<Item = (&ObjectId, &Object)> {
        self.inner.objects.iter()
    }

    /// Cloned entries of the page's `Annots` array (empty if absent).
    pub fn annots_entries(&self, index: usize) -> Result<Vec<Object>, PdfEditError> {
        let page_id = self.page_id(index)?;
        let dict = self.inner.get_object(page_id)?.as_dict()?;
        match dict.get(b"Annots") {
            Ok(obj) => match self.resolve(obj) {
                Object::Array(arr) => Ok(arr.clone()),
                _ => Ok(Vec::new()),
            },
            Err(_) => Ok(Vec::new()),
        }
    }

    /// Mutate the page's `Annots` array in place, creating it when `create`
    /// is set. Handles both a direct array and a reference to one.
    pub fn with_annots_mut<R>(
        &mut self,
        index: usize,
        create: bool,
        f: impl FnOnce(&mut Vec<Object>) -> R,
    ) -> Result<Option<R>, PdfEditError> {
        let page_id = self.page_id(index)?;
        enum Loc {
            Indirect(ObjectId),
            Direct,
            Missing,
        }
        let loc = {
            let dict = self.inner.get_object(page_id)?.as_dict()?;
            match dict.get(b"Annots") {
                Ok(Object::Reference(id)) => Loc::Indirect(*id),
                Ok(Object::Array(_)) => Loc::Direct,
                _ => Loc::Missing,
            }
        };
        match loc {
            Loc::Indirect(id) => {
                let arr = self.inner.get_object_mut(id)?.as_array_mut()?;
                Ok(Some(f(arr)))
            }
            Loc::Direct => {
                let dict = self.inner.get_object_mut(page_id)?.as_dict_mut()?;
                let arr = dict.get_mut(b"Annots")?.as_array_mut()?;
                Ok(Some(f(arr)))
            }
            Loc::Missing if create => {
                let dict = self.inner.get_object_mut(page_id)?.as_dict_mut()?;
                dict.set("Annots", Object::Array(Vec::new()));
                let arr = dict.get_mut(b"Annots")?.as_array_mut()?;
                Ok(Some(f(arr)))
            }
            Loc::Missing => Ok(None),
        }
    }

    /// Mutate the page's `Resources` dictionary, creating it if absent.
    pub fn with_page_resources_mut<R>(
        &mut self,
        index: usize,
        f: impl FnOnce(&mut Dictionary) -> R,
    ) -> Result<R, PdfEditError> {
        let page_id = self.page_id(index)?;
        enum Loc {
            Indirect(ObjectId),
            Direct,
            Missing,
        }
        let loc = {
            let dict = self.inner.get_object(page_id)?.as_dict()?;
            match dict.get(b"Resources") {
                Ok(Object::Reference(id)) => Loc::Indirect(*id),
                Ok(Object::Dictionary(_)) => Loc::Direct,
                _ => Loc::Missing,
            }
        };
        match loc {
            Loc::Indirect(id) => {
                let res = self.inner.get_object_mut(id)?.as_dict_mut()?;
                Ok(f(res))
            }
            Loc::Direct | Loc::Missing => {
                let dict = self.inner.get_object_mut(page_id)?.as_dict_mut()?;
                if !dict.has(b"Resources") {
                    dict.set("Resources", Object::Dictionary(Dictionary::new()));
                }
                let res = dict.get_mut(b"Resources")?.as_dict_mut()?;
                Ok(f(res))
            }
        }
    }

    /// Append a content stream to the page, normalizing `Contents` to an
    /// array of stream references as needed.
    pub fn append_page_content(
        &mut self,
        index: usize,
        content: Content,
    ) -> Result<(), PdfEditError> {
        let page_id = self.page_id(index)?;
        let data = content
            .encode()
            .map_err(|e| PdfEditError::Operation(e.to_string()))?;
        let stream_id = self.inner.add_object(Stream::new(Dictionary::new(), data));

        enum Loc {
            Ref(ObjectId),
            Arr,
            Inline,
            Missing,
        }
        let loc = {
            let dict = self.inner.get_object(page_id)?.as_dict()?;
            match dict.get(b"Contents") {
                Ok(Object::Reference(id)) => Loc::Ref(*id),
                Ok(Object::Array(_)) => Loc::Arr,
                Ok(Object::Stream(_)) => Loc::Inline,
                _ => Loc::Missing,
            }
        };
        match loc {
            Loc::Ref(old) => {
                let dict = self.inner.get_object_mut(page_id)?.as_dict_mut()?;
                dict.set(
                    "Contents",
                    Object::Array(vec![Object::Reference(old), Object::Reference(stream_id)]),
                );
            }
            Loc::Arr => {
                let dict = self.inner.get_object_mut(page_id)?.as_dict_mut()?;
                dict.get_mut(b"Contents")?
                    .as_array_mut()?
                    .push(Object::Reference(stream_id));
            }
            Loc::Inline => {
                let old = {
                    let dict = self.inner.get_object_mut(page_id)?.as_dict_mut()?;
                    dict.remove(b"Contents")
                };
                let old_id = match old {
                    Some(obj) => self.inner.add_object(obj),
                    None => stream_id,
                };
                let dict = self.inner.get_object_mut(page_id)?.as_dict_mut()?;
                dict.set(
                    "Contents",
                    Object::Array(vec![Object::Reference(old_id), Object::Reference(stream_id)]),
                );
            }
            Loc::Missing => {
                let dict = self.inner.get_object_mut(page_id)?.as_dict_mut()?;
                dict.set("Contents", Object::Reference(stream_id));
            }
        }
        Ok(())
    }

    pub(crate) fn raw(&self) -> &Document {
        &self.inner
    }

    pub(crate) fn raw_mut(&mut self) -> &mut Document {
        &mut self.inner
    }

    fn pages_root_id(&self) -> Result<ObjectId, PdfEditError> {
        let root = self
            .inner
            .trailer
            .get(b"Root")
            .map_err(|_| PdfEditError::Operation("no Root in trailer".into()))?;
        let catalog_id = root.as_reference()?;
        let catalog = self.inner.get_object(catalog_id)?.as_dict()?;
        Ok(catalog.get(b"Pages")?.as_reference()?)
    }

    fn set_page_order(&mut self, order: &[ObjectId]) -> Result<(), PdfEditError> {
        let pages_id = self.pages_root_id()?;
        {
            let pages = self.inner.get_object_mut(pages_id)?.as_dict_mut()?;
            pages.set(
                "Kids",
                Object::Array(order.iter().map(|&id| Object::Reference(id)).collect()),
            );
            pages.set("Count", order.len() as i64);
        }
        for &id in order {
            if let Ok(Object::Dictionary(dict)) = self.inner.get_object_mut(id) {
                dict.set("Parent", Object::Reference(pages_id));
            }
        }
        Ok(())
    }

    /// Pull inheritable attributes down into each page dictionary, then
    /// flatten the page tree so every page is a direct child of the root
    /// `Pages` node. Makes subsequent `Kids` rewrites safe for documents
    /// that arrived with nested trees.
    fn normalize_page_tree(&mut self) -> Result<(), PdfEditError> {
        let order = self.page_ids();
        for &page_id in &order {
            for key in INHERITABLE_KEYS {
                let present = self
                    .inner
                    .get_object(page_id)
                    .ok()
                    .and_then(|o| o.as_dict().ok())
                    .map(|d| d.has(key))
                    .unwrap_or(false);
                if !present {
                    if let Some(value) = self.inherited_attr(page_id, key) {
                        if let Ok(Object::Dictionary(dict)) = self.inner.get_object_mut(page_id) {
                            dict.set(key.to_vec(), value);
                        }
                    }
                }
            }
        }
        self.set_page_order(&order)
    }

    /// Look `key` up in the page's ancestor chain (excluding the page itself).
    fn inherited_attr(&self, page_id: ObjectId, key: &[u8]) -> Option<Object> {
        let mut dict = self.inner.get_object(page_id).ok()?.as_dict().ok()?;
        // Bounded walk guards against cyclic Parent chains in malformed files.
        for _ in 0..64 {
            let parent_id = dict.get(b"Parent").ok()?.as_reference().ok()?;
            dict = self.inner.get_object(parent_id).ok()?.as_dict().ok()?;
            if let Ok(value) = dict.get(key) {
                return Some(value.clone());
            }
        }
        None
    }
}

/// Numeric value of an Integer or Real object.
pub(crate) fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(v) => Some(*v as f32),
        Object::Real(v) => Some(*v),
        _ => None,
    }
}

/// Recursively remap object references by `offset`.
fn remap_object_refs(obj: Object, offset: u32) -> Object {
    match obj {
        Object::Reference(id) => Object::Reference((id.0 + offset, id.1)),
        Object::Array(arr) => Object::Array(
            arr.into_iter()
                .map(|o| remap_object_refs(o, offset))
                .collect(),
        ),
        Object::Dictionary(mut dict) => {
            for (_, value) in dict.iter_mut() {
                *value = remap_object_refs(value.clone(), offset);
            }
            Object::Dictionary(dict)
        }
        Object::Stream(mut stream) => {
            for (_, value) in stream.dict.iter_mut() {
                *value = remap_object_refs(value.clone(), offset);
            }
            Object::Stream(stream)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::pdf_with_pages;
    use pretty_assertions::assert_eq;

    #[test]
    fn load_reports_page_count() {
        let bytes = pdf_with_pages(3);
        let doc = PdfDocument::load(&bytes).unwrap();
        assert_eq!(doc.page_count(), 3);
    }

    #[test]
    fn remove_page_shrinks_order() {
        let bytes = pdf_with_pages(3);
        let mut doc = PdfDocument::load(&bytes).unwrap();
        let before = doc.page_ids();
        doc.remove_page_at(1).unwrap();
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.page_ids(), vec![before[0], before[2]]);
    }

    #[test]
    fn remove_out_of_range_fails() {
        let bytes = pdf_with_pages(2);
        let mut doc = PdfDocument::load(&bytes).unwrap();
        assert!(matches!(
            doc.remove_page_at(5),
            Err(PdfEditError::PageOutOfRange { index: 5, page_count: 2 })
        ));
    }

    #[test]
    fn copy_then_insert_duplicates_page() {
        let bytes = pdf_with_pages(2);
        let mut doc = PdfDocument::load(&bytes).unwrap();
        let copy = doc.copy_page(0).unwrap();
        doc.insert_page_at(2, copy).unwrap();
        assert_eq!(doc.page_count(), 3);
        assert_eq!(doc.page_ids()[2], copy);
    }

    #[test]
    fn rotation_is_additive_and_normalized() {
        let bytes = pdf_with_pages(1);
        let mut doc = PdfDocument::load(&bytes).unwrap();
        doc.rotate_page(0, 90).unwrap();
        doc.rotate_page(0, 90).unwrap();
        assert_eq!(doc.page_rotation(0).unwrap(), 180);
        doc.rotate_page(0, 270).unwrap();
        assert_eq!(doc.page_rotation(0).unwrap(), 90);
        doc.rotate_page(0, -180).unwrap();
        assert_eq!(doc.page_rotation(0).unwrap(), 270);
    }

    #[test]
    fn copy_pages_from_imports_remapped_objects() {
        let mut dest = PdfDocument::load(&pdf_with_pages(1)).unwrap();
        let src = PdfDocument::load(&pdf_with_pages(2)).unwrap();
        let ids = dest.copy_pages_from(&src, &[0, 1]).unwrap();
        assert_eq!(ids.len(), 2);
        for id in ids {
            dest.insert_page_at(dest.page_count(), id).unwrap();
        }
        assert_eq!(dest.page_count(), 3);

        // Round-trip survives pruning, so the imported references are intact.
        let bytes = dest.save().unwrap();
        let reloaded = PdfDocument::load(&bytes).unwrap();
        assert_eq!(reloaded.page_count(), 3);
    }

    #[test]
    fn save_round_trip_preserves_order_after_edit() {
        let mut doc = PdfDocument::load(&pdf_with_pages(4)).unwrap();
        doc.remove_page_at(0).unwrap();
        let bytes = doc.save().unwrap();
        let reloaded = PdfDocument::load(&bytes).unwrap();
        assert_eq!(reloaded.page_count(), 3);
    }

    #[test]
    fn page_size_reads_media_box() {
        let doc = PdfDocument::load(&pdf_with_pages(1)).unwrap();
        let (w, h) = doc.page_size(0).unwrap();
        assert_eq!((w, h), (612.0, 792.0));
    }

    #[test]
    fn annots_created_on_demand() {
        let mut doc = PdfDocument::load(&pdf_with_pages(1)).unwrap();
        assert!(doc.annots_entries(0).unwrap().is_empty());
        let pushed = doc
            .with_annots_mut(0, true, |arr| {
                arr.push(Object::Null);
                arr.len()
            })
            .unwrap();
        assert_eq!(pushed, Some(1));
        assert_eq!(doc.annots_entries(0).unwrap().len(), 1);
    }
}
