//! Undo/redo manager using whole-document snapshots.
//!
//! Each entry is an owned deep copy of the document; nothing is shared with
//! the live document, so later edits can never reach back into history.

use regionmark_core::AnnotationDocument;

/// Manages undo/redo with document snapshots
#[derive(Debug, Clone)]
pub struct UndoManager {
    undo_stack: Vec<AnnotationDocument>,
    redo_stack: Vec<AnnotationDocument>,
    /// Maximum history size
    max_history: usize,
}

impl UndoManager {
    pub fn new(max_history: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_history,
        }
    }

    /// Save current state before mutation. Clears the redo stack.
    pub fn save_state(&mut self, doc: &AnnotationDocument) {
        self.undo_stack.push(doc.clone());
        self.redo_stack.clear();

        if self.undo_stack.len() > self.max_history {
            let excess = self.undo_stack.len() - self.max_history;
            self.undo_stack.drain(..excess);
        }
    }

    /// Pop the previous state, parking `current` on the redo stack
    pub fn undo(&mut self, current: &AnnotationDocument) -> Option<AnnotationDocument> {
        let prev = self.undo_stack.pop()?;
        self.redo_stack.push(current.clone());
        Some(prev)
    }

    /// Pop the next state, parking `current` on the undo stack
    pub fn redo(&mut self, current: &AnnotationDocument) -> Option<AnnotationDocument> {
        let next = self.redo_stack.pop()?;
        self.undo_stack.push(current.clone());
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new(100)
    }
}
