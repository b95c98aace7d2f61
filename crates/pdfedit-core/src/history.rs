//! Bounded undo/redo history of serialized document snapshots.

/// Maximum number of undo snapshots retained; the oldest is evicted first.
pub const MAX_HISTORY: usize = 10;

/// Two stacks of raw PDF byte buffers. Snapshots are taken *before* each
/// mutating edit; redo candidates only exist between an `undo` and the next
/// new edit.
#[derive(Debug, Default)]
pub struct History {
    undo: Vec<Vec<u8>>,
    redo: Vec<Vec<u8>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the pre-edit state. Evicts the oldest snapshot past the bound
    /// and invalidates the redo path (linear history, no redo tree).
    pub fn push(&mut self, snapshot: Vec<u8>) {
        self.undo.push(snapshot);
        if self.undo.len() > MAX_HISTORY {
            self.undo.remove(0);
        }
        self.redo.clear();
    }

    /// Pop the most recent undo snapshot, stashing `current` as a redo
    /// candidate. Returns `None` when there is nothing to undo.
    pub fn begin_undo(&mut self, current: Vec<u8>) -> Option<Vec<u8>> {
        let previous = self.undo.pop()?;
        self.redo.push(current);
        Some(previous)
    }

    /// Mirror image of [`begin_undo`](Self::begin_undo).
    pub fn begin_redo(&mut self, current: Vec<u8>) -> Option<Vec<u8>> {
        let next = self.redo.pop()?;
        self.undo.push(current);
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
