//! The authoritative in-memory model for the open image.
//!
//! Every mutation goes through [`DocumentStore`]: validate first, then
//! snapshot into history, clear redo, apply, mark dirty. A refused operation
//! returns an error and leaves document and history untouched.

use regionmark_core::{
    AnnotationDocument, EngineConfig, Layer, LayerId, LayerPatch, Shape, ShapeId,
};
use regionmark_geometry::{polygon_area, Vec2};

use crate::history::UndoManager;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("cannot remove the last layer")]
    LastLayer,
    #[error("no layer with id {0}")]
    UnknownLayer(LayerId),
    #[error("no shape {shape} in layer {layer}")]
    UnknownShape { layer: LayerId, shape: ShapeId },
    #[error("shape id {0} already exists")]
    DuplicateShape(ShapeId),
    #[error("layer {0} is locked")]
    LayerLocked(LayerId),
    #[error("invalid shape: {0}")]
    InvalidShape(&'static str),
}

/// Current selection. Either half may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub layer: Option<LayerId>,
    pub shape: Option<ShapeId>,
}

/// Owned document context passed by reference to whoever edits it
#[derive(Debug, Clone)]
pub struct DocumentStore {
    doc: AnnotationDocument,
    history: UndoManager,
    selection: Selection,
    dirty: bool,
    revision: u64,
    min_area: f64,
}

impl DocumentStore {
    pub fn new(doc: AnnotationDocument, config: &EngineConfig) -> Self {
        let mut store = Self {
            doc,
            history: UndoManager::new(config.history.max_entries),
            selection: Selection::default(),
            dirty: false,
            revision: 0,
            min_area: config.stroke.min_area,
        };
        store.reset_selection();
        store
    }

    pub fn document(&self) -> &AnnotationDocument {
        &self.doc
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Bumped on every change to the document, including undo/redo and loads
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Clear the dirty flag if nothing changed since `revision` was observed
    pub fn mark_clean_at(&mut self, revision: u64) -> bool {
        if self.revision != revision {
            return false;
        }
        self.dirty = false;
        true
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_count(&self) -> usize {
        self.history.undo_count()
    }

    pub fn redo_count(&self) -> usize {
        self.history.redo_count()
    }

    /// Replace the document wholesale. History does not survive this.
    pub fn set_document(&mut self, doc: AnnotationDocument) {
        self.doc = doc;
        if self.doc.layers.is_empty() {
            self.doc.layers.push(Layer::default());
        }
        self.doc.sort_layers();
        self.history.clear();
        self.dirty = false;
        self.revision += 1;
        self.reset_selection();
    }

    /// Layer new strokes go into: the selected layer, else the bottom layer
    pub fn active_layer(&self) -> Option<&Layer> {
        self.selection
            .layer
            .as_ref()
            .and_then(|id| self.doc.layer(id))
            .or_else(|| self.doc.layers.first())
    }

    // --- Selection (never recorded in history) ---

    pub fn select_layer(&mut self, layer: &LayerId) -> Result<(), StoreError> {
        self.require_layer(layer)?;
        self.selection = Selection {
            layer: Some(layer.clone()),
            shape: None,
        };
        Ok(())
    }

    pub fn select_shape(&mut self, layer: &LayerId, shape: &ShapeId) -> Result<(), StoreError> {
        self.require_shape(layer, shape)?;
        self.selection = Selection {
            layer: Some(layer.clone()),
            shape: Some(shape.clone()),
        };
        Ok(())
    }

    pub fn clear_shape_selection(&mut self) {
        self.selection.shape = None;
    }

    /// Select the topmost visible shape under an image-space position
    pub fn select_at(&mut self, image_pos: Vec2) -> Option<(LayerId, ShapeId)> {
        let hit = self.doc.shape_at(image_pos);
        match &hit {
            Some((layer, shape)) => {
                self.selection = Selection {
                    layer: Some(layer.clone()),
                    shape: Some(shape.clone()),
                };
            }
            None => self.clear_shape_selection(),
        }
        hit
    }

    // --- Layer mutations ---

    /// Add a layer stacked above all others
    pub fn add_layer(&mut self, name: impl Into<String>) -> LayerId {
        let layer = Layer::new(name, self.doc.next_z());
        let id = layer.id.clone();
        self.commit(|doc| doc.layers.push(layer));
        id
    }

    /// Rename / show / hide / lock. A patch that changes nothing records nothing.
    pub fn update_layer(&mut self, id: &LayerId, patch: &LayerPatch) -> Result<(), StoreError> {
        let current = self.require_layer(id)?;
        let mut updated = current.clone();
        if !patch.apply(&mut updated) {
            return Ok(());
        }
        self.commit(|doc| {
            if let Some(layer) = doc.layer_mut(id) {
                *layer = updated;
            }
        });
        Ok(())
    }

    /// Remove a layer and its shapes. The last layer is never removed.
    pub fn remove_layer(&mut self, id: &LayerId) -> Result<(), StoreError> {
        self.require_layer(id)?;
        if self.doc.layers.len() <= 1 {
            return Err(StoreError::LastLayer);
        }
        self.commit(|doc| doc.layers.retain(|l| &l.id != id));
        if self.selection.layer.as_ref() == Some(id) {
            self.reset_selection();
        }
        Ok(())
    }

    /// Move a layer `delta` places up or down the stack (clamped), swapping
    /// `z` with each neighbour it passes
    pub fn move_layer(&mut self, id: &LayerId, delta: isize) -> Result<(), StoreError> {
        let from = self
            .doc
            .layer_index(id)
            .ok_or_else(|| StoreError::UnknownLayer(id.clone()))?;
        let last = self.doc.layers.len() - 1;
        let to = from.saturating_add_signed(delta).min(last);
        if to == from {
            return Ok(());
        }
        self.commit(|doc| {
            // one neighbour swap per step; the set of z values is unchanged
            let mut at = from;
            while at != to {
                let next = if to > at { at + 1 } else { at - 1 };
                let z = doc.layers[at].z;
                doc.layers[at].z = doc.layers[next].z;
                doc.layers[next].z = z;
                doc.layers.swap(at, next);
                at = next;
            }
        });
        Ok(())
    }

    // --- Shape mutations ---

    pub fn add_shape(&mut self, layer: &LayerId, shape: Shape) -> Result<(), StoreError> {
        self.require_unlocked(layer)?;
        self.validate_shape(&shape)?;
        if self.doc.contains_shape_id(&shape.id) {
            return Err(StoreError::DuplicateShape(shape.id));
        }
        self.commit(|doc| {
            if let Some(target) = doc.layer_mut(layer) {
                target.shapes.push(shape);
            }
        });
        Ok(())
    }

    /// Replace a shape by id within its layer
    pub fn update_shape(&mut self, layer: &LayerId, shape: Shape) -> Result<(), StoreError> {
        self.require_unlocked(layer)?;
        self.require_shape(layer, &shape.id)?;
        self.validate_shape(&shape)?;
        self.commit(|doc| {
            if let Some(existing) = doc.layer_mut(layer).and_then(|l| l.shape_mut(&shape.id)) {
                *existing = shape;
            }
        });
        Ok(())
    }

    pub fn delete_shape(&mut self, layer: &LayerId, shape: &ShapeId) -> Result<(), StoreError> {
        self.require_unlocked(layer)?;
        self.require_shape(layer, shape)?;
        self.commit(|doc| {
            if let Some(target) = doc.layer_mut(layer) {
                target.shapes.retain(|s| &s.id != shape);
            }
        });
        if self.selection.shape.as_ref() == Some(shape) {
            self.selection.shape = None;
        }
        Ok(())
    }

    // --- History ---

    /// Returns false when there is nothing to undo
    pub fn undo(&mut self) -> bool {
        let Some(prev) = self.history.undo(&self.doc) else {
            return false;
        };
        self.restore(prev);
        true
    }

    /// Returns false when there is nothing to redo
    pub fn redo(&mut self) -> bool {
        let Some(next) = self.history.redo(&self.doc) else {
            return false;
        };
        self.restore(next);
        true
    }

    fn restore(&mut self, doc: AnnotationDocument) {
        self.doc = doc;
        self.dirty = true;
        self.revision += 1;
        self.repair_selection();
    }

    fn commit(&mut self, apply: impl FnOnce(&mut AnnotationDocument)) {
        self.history.save_state(&self.doc);
        apply(&mut self.doc);
        self.dirty = true;
        self.revision += 1;
    }

    fn reset_selection(&mut self) {
        self.selection = Selection {
            layer: self.doc.first_layer_id(),
            shape: None,
        };
    }

    /// Drop selection halves that no longer exist
    fn repair_selection(&mut self) {
        let layer_ok = self
            .selection
            .layer
            .as_ref()
            .is_some_and(|id| self.doc.layer(id).is_some());
        if !layer_ok {
            self.reset_selection();
            return;
        }
        let shape_ok = match (&self.selection.layer, &self.selection.shape) {
            (Some(layer), Some(shape)) => self
                .doc
                .layer(layer)
                .is_some_and(|l| l.contains_shape(shape)),
            _ => true,
        };
        if !shape_ok {
            self.selection.shape = None;
        }
    }

    fn require_layer(&self, id: &LayerId) -> Result<&Layer, StoreError> {
        self.doc
            .layer(id)
            .ok_or_else(|| StoreError::UnknownLayer(id.clone()))
    }

    fn require_unlocked(&self, id: &LayerId) -> Result<&Layer, StoreError> {
        let layer = self.require_layer(id)?;
        if layer.locked {
            return Err(StoreError::LayerLocked(id.clone()));
        }
        Ok(layer)
    }

    fn require_shape(&self, layer: &LayerId, shape: &ShapeId) -> Result<&Shape, StoreError> {
        self.require_layer(layer)?
            .shape(shape)
            .ok_or_else(|| StoreError::UnknownShape {
                layer: layer.clone(),
                shape: shape.clone(),
            })
    }

    fn validate_shape(&self, shape: &Shape) -> Result<(), StoreError> {
        if !shape.closed {
            return Err(StoreError::InvalidShape("shape is not closed"));
        }
        if shape.points.len() < 3 {
            return Err(StoreError::InvalidShape("fewer than 3 points"));
        }
        if polygon_area(&shape.points) < self.min_area {
            return Err(StoreError::InvalidShape("area below minimum"));
        }
        Ok(())
    }
}
