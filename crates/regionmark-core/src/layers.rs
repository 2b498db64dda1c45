//! Layer types for organizing shapes in the document.
//!
//! Layers provide visibility and lock controls and are painted in ascending
//! `z` order; shapes inside a layer paint in insertion order.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shapes::{Shape, ShapeId};

/// Layer identifier. Fresh ids are UUIDs; persisted ids are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerId(pub String);

impl LayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for LayerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LayerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Layer data structure
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    pub visible: bool,
    pub locked: bool,
    /// Stacking order; unique ordering is not required to be contiguous
    pub z: i64,
    pub shapes: Vec<Shape>,
}

impl Layer {
    pub fn new(name: impl Into<String>, z: i64) -> Self {
        Self::with_id(LayerId::new(), name, z)
    }

    pub fn with_id(id: LayerId, name: impl Into<String>, z: i64) -> Self {
        Self {
            id,
            name: name.into(),
            visible: true,
            locked: false,
            z,
            shapes: Vec::new(),
        }
    }

    pub fn shape(&self, id: &ShapeId) -> Option<&Shape> {
        self.shapes.iter().find(|s| &s.id == id)
    }

    pub fn shape_mut(&mut self, id: &ShapeId) -> Option<&mut Shape> {
        self.shapes.iter_mut().find(|s| &s.id == id)
    }

    pub fn contains_shape(&self, id: &ShapeId) -> bool {
        self.shape(id).is_some()
    }
}

impl Default for Layer {
    fn default() -> Self {
        Self::new("Layer 1", 0)
    }
}

/// Partial update for [`Layer`] properties (rename, visibility, lock)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerPatch {
    pub name: Option<String>,
    pub visible: Option<bool>,
    pub locked: Option<bool>,
}

impl LayerPatch {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn visible(visible: bool) -> Self {
        Self {
            visible: Some(visible),
            ..Self::default()
        }
    }

    pub fn locked(locked: bool) -> Self {
        Self {
            locked: Some(locked),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.visible.is_none() && self.locked.is_none()
    }

    /// Apply to a layer, returning true if anything changed
    pub fn apply(&self, layer: &mut Layer) -> bool {
        let mut changed = false;
        if let Some(name) = &self.name
            && &layer.name != name
        {
            layer.name = name.clone();
            changed = true;
        }
        if let Some(visible) = self.visible
            && layer.visible != visible
        {
            layer.visible = visible;
            changed = true;
        }
        if let Some(locked) = self.locked
            && layer.locked != locked
        {
            layer.locked = locked;
            changed = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_layer_is_visible_and_unlocked() {
        let layer = Layer::new("Cells", 3);
        assert!(layer.visible);
        assert!(!layer.locked);
        assert_eq!(layer.z, 3);
        assert!(layer.shapes.is_empty());
    }

    #[test]
    fn fresh_ids_are_unique() {
        assert_ne!(LayerId::new(), LayerId::new());
    }

    #[test]
    fn patch_reports_changes() {
        let mut layer = Layer::default();
        assert!(!LayerPatch::default().apply(&mut layer));
        assert!(!LayerPatch::visible(true).apply(&mut layer));
        assert!(LayerPatch::locked(true).apply(&mut layer));
        assert!(layer.locked);
        assert!(LayerPatch::rename("Nuclei").apply(&mut layer));
        assert_eq!(layer.name, "Nuclei");
    }
}
