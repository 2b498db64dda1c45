//! The annotation document for one image - layers, shapes and metadata.

use regionmark_geometry::{ImageSize, Vec2};
use serde::{Deserialize, Serialize};

use crate::layers::{Layer, LayerId};
use crate::shapes::{Shape, ShapeId};

/// Free-form annotator/device/revision info.
///
/// Values are kept exactly as stored, whatever their JSON type, and unknown
/// keys are preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotator: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Meta {
    /// Annotator, when it was stored as a plain string
    pub fn annotator_name(&self) -> Option<&str> {
        self.annotator.as_ref().and_then(serde_json::Value::as_str)
    }
}

/// All annotation state for the currently displayed image.
///
/// Invariants upheld by every constructor and by the session store: at least
/// one layer exists, and `layers` is sorted by ascending `z`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationDocument {
    pub image_id: String,
    pub image_size: ImageSize,
    pub layers: Vec<Layer>,
    pub meta: Meta,
}

impl AnnotationDocument {
    /// A fresh document with a single empty default layer
    pub fn new(image_id: impl Into<String>, image_size: ImageSize) -> Self {
        Self {
            image_id: image_id.into(),
            image_size,
            layers: vec![Layer::default()],
            meta: Meta::default(),
        }
    }

    pub fn layer(&self, id: &LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| &l.id == id)
    }

    pub fn layer_mut(&mut self, id: &LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| &l.id == id)
    }

    pub fn layer_index(&self, id: &LayerId) -> Option<usize> {
        self.layers.iter().position(|l| &l.id == id)
    }

    /// Bottom-most layer, used as the default drawing target
    pub fn first_layer_id(&self) -> Option<LayerId> {
        self.layers.first().map(|l| l.id.clone())
    }

    /// z for a layer stacked above every existing one
    pub fn next_z(&self) -> i64 {
        self.layers.iter().map(|l| l.z).max().map_or(0, |z| z + 1)
    }

    /// Restore ascending-z order (stable, so equal z keeps insertion order)
    pub fn sort_layers(&mut self) {
        self.layers.sort_by_key(|l| l.z);
    }

    /// Find the layer holding a shape id
    pub fn find_shape(&self, id: &ShapeId) -> Option<(&Layer, &Shape)> {
        self.layers
            .iter()
            .find_map(|layer| layer.shape(id).map(|shape| (layer, shape)))
    }

    pub fn contains_shape_id(&self, id: &ShapeId) -> bool {
        self.find_shape(id).is_some()
    }

    pub fn shape_count(&self) -> usize {
        self.layers.iter().map(|l| l.shapes.len()).sum()
    }

    /// Topmost visible shape containing an image-space position
    pub fn shape_at(&self, image_pos: Vec2) -> Option<(LayerId, ShapeId)> {
        self.layers
            .iter()
            .rev()
            .filter(|layer| layer.visible)
            .find_map(|layer| {
                layer
                    .shapes
                    .iter()
                    .rev()
                    .find(|shape| shape.contains(self.image_size, image_pos))
                    .map(|shape| (layer.id.clone(), shape.id.clone()))
            })
    }
}
