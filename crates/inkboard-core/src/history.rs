//! Local undo/redo history of whole-canvas rasters.

use crate::surface::Raster;

/// Maximum number of rasters kept for undo.
pub const MAX_UNDO_HISTORY: usize = 20;

/// Bounded linear undo history.
///
/// The top of the undo stack is always the raster currently shown. Any new
/// entry clears the redo stack; there is no branching.
#[derive(Debug, Clone)]
pub struct UndoHistory {
    undo_stack: Vec<Raster>,
    redo_stack: Vec<Raster>,
    capacity: usize,
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl UndoHistory {
    pub fn new() -> Self {
        Self::with_capacity(MAX_UNDO_HISTORY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record the raster present before a mutation starts.
    ///
    /// Skipped when it matches the top, which is the usual case after a
    /// previous `record`.
    pub fn checkpoint(&mut self, raster: Raster) {
        self.redo_stack.clear();
        if self.undo_stack.last() != Some(&raster) {
            self.push(raster);
        }
    }

    /// Record the raster produced by a finished mutation.
    pub fn record(&mut self, raster: Raster) {
        self.redo_stack.clear();
        self.push(raster);
    }

    fn push(&mut self, raster: Raster) {
        self.undo_stack.push(raster);
        if self.undo_stack.len() > self.capacity {
            self.undo_stack.remove(0);
        }
    }

    /// Step back. Returns the raster to restore, or None if there is nothing older.
    pub fn undo(&mut self) -> Option<&Raster> {
        if self.undo_stack.len() < 2 {
            return None;
        }
        let current = self.undo_stack.pop()?;
        self.redo_stack.push(current);
        self.undo_stack.last()
    }

    /// Step forward again. Returns the raster to restore.
    pub fn redo(&mut self) -> Option<&Raster> {
        let next = self.redo_stack.pop()?;
        self.push(next);
        self.undo_stack.last()
    }

    pub fn can_undo(&self) -> bool {
        self.undo_stack.len() >= 2
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Number of rasters on the undo stack.
    pub fn len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo_stack.is_empty()
    }

    /// Forget everything.
    pub fn reset(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }
}
