//! Persisted JSON format and the legacy shape upgrade.
//!
//! Documents are read into the `*Record` types first, then upgraded into the
//! in-memory model by [`upgrade`]. The upgrade is the only place that knows
//! about old shape kinds: it dispatches on the `type` tag and resamples legacy
//! circles into freehand polygons, so nothing downstream ever special-cases them.
//!
//! ```text
//! { image_id, image_size: {w, h},
//!   layers: [{id, name, visible, z, locked?,
//!             shapes: [{id, type: "freehand", points: [{x, y}], color,
//!                       label, created_at, updated_at, closed}]}],
//!   meta: {annotator?, device?, revision?, ...} }
//! ```

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use regionmark_geometry::{denormalize, normalize, polygon, polygon_area, ImageSize, Point};
use serde::{Deserialize, Serialize};

use crate::document::{AnnotationDocument, Meta};
use crate::layers::{Layer, LayerId};
use crate::shapes::{Shape, ShapeId};

#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    #[error("malformed annotation JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("annotation for image {image_id} has an empty image size")]
    EmptyImage { image_id: String },
}

/// Knobs for [`upgrade`]
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradeOptions {
    pub circle_segments: usize,
    /// Shapes below this normalized area are dropped
    pub min_area: f64,
    /// Color for legacy shapes that carried none
    pub default_color: String,
}

impl Default for UpgradeOptions {
    fn default() -> Self {
        Self {
            circle_segments: 32,
            min_area: 0.0005,
            default_color: "#ff3b30".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub image_id: String,
    pub image_size: ImageSize,
    #[serde(default)]
    pub layers: Vec<LayerRecord>,
    #[serde(default)]
    pub meta: Meta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerRecord {
    pub id: LayerId,
    pub name: String,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub z: i64,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub shapes: Vec<ShapeRecord>,
}

/// A persisted shape, discriminated by its `type` field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ShapeRecord {
    Freehand(FreehandRecord),
    /// Legacy representation, upgraded into a polygon on load
    Circle(CircleRecord),
    /// Any shape kind this version does not understand
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreehandRecord {
    pub id: ShapeId,
    pub points: Vec<Point>,
    pub color: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircleRecord {
    #[serde(default)]
    pub id: Option<ShapeId>,
    pub center: Point,
    /// Normalized against image width
    pub radius: f64,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl From<&Shape> for ShapeRecord {
    fn from(shape: &Shape) -> Self {
        ShapeRecord::Freehand(FreehandRecord {
            id: shape.id.clone(),
            points: shape.points.clone(),
            color: shape.color.clone(),
            label: shape.label.clone(),
            created_at: shape.created_at,
            updated_at: shape.updated_at,
            closed: shape.closed,
        })
    }
}

impl From<&Layer> for LayerRecord {
    fn from(layer: &Layer) -> Self {
        Self {
            id: layer.id.clone(),
            name: layer.name.clone(),
            visible: layer.visible,
            z: layer.z,
            locked: layer.locked,
            shapes: layer.shapes.iter().map(ShapeRecord::from).collect(),
        }
    }
}

impl From<&AnnotationDocument> for DocumentRecord {
    fn from(doc: &AnnotationDocument) -> Self {
        Self {
            image_id: doc.image_id.clone(),
            image_size: doc.image_size,
            layers: doc.layers.iter().map(LayerRecord::from).collect(),
            meta: doc.meta.clone(),
        }
    }
}

/// Serialize a document in the persisted format
pub fn to_json(doc: &AnnotationDocument) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&DocumentRecord::from(doc))
}

/// Parse persisted JSON and upgrade it into the current representation
pub fn from_json(json: &str, options: &UpgradeOptions) -> Result<AnnotationDocument, UpgradeError> {
    let record: DocumentRecord = serde_json::from_str(json)?;
    upgrade(record, options)
}

/// Upgrade a persisted record into a valid in-memory document.
///
/// - circles are resampled into `circle_segments`-vertex polygons
/// - unknown shape kinds, open freehand paths, and shapes that fail the
///   point-count or area invariant are dropped with a warning
/// - duplicate shape ids are reassigned
/// - a document without layers gains the default layer
pub fn upgrade(record: DocumentRecord, options: &UpgradeOptions) -> Result<AnnotationDocument, UpgradeError> {
    if record.image_size.is_empty() {
        return Err(UpgradeError::EmptyImage {
            image_id: record.image_id,
        });
    }
    let size = record.image_size;
    let mut seen = HashSet::new();

    let mut layers: Vec<Layer> = record
        .layers
        .into_iter()
        .map(|layer_record| {
            let mut layer = Layer::with_id(layer_record.id, layer_record.name, layer_record.z);
            layer.visible = layer_record.visible;
            layer.locked = layer_record.locked;
            for shape_record in layer_record.shapes {
                let Some(mut shape) = upgrade_shape(shape_record, size, options) else {
                    continue;
                };
                if shape.points.len() < 3 || polygon_area(&shape.points) < options.min_area {
                    tracing::warn!(shape = %shape.id, layer = %layer.id, "dropping degenerate shape");
                    continue;
                }
                if !seen.insert(shape.id.clone()) {
                    let fresh = ShapeId::new();
                    tracing::warn!(old = %shape.id, new = %fresh, "reassigning duplicate shape id");
                    seen.insert(fresh.clone());
                    shape.id = fresh;
                }
                layer.shapes.push(shape);
            }
            layer
        })
        .collect();

    if layers.is_empty() {
        layers.push(Layer::default());
    }

    let mut doc = AnnotationDocument {
        image_id: record.image_id,
        image_size: size,
        layers,
        meta: record.meta,
    };
    doc.sort_layers();
    Ok(doc)
}

fn upgrade_shape(record: ShapeRecord, size: ImageSize, options: &UpgradeOptions) -> Option<Shape> {
    match record {
        ShapeRecord::Freehand(f) if !f.closed => {
            tracing::warn!(shape = %f.id, "dropping open freehand shape");
            None
        }
        ShapeRecord::Freehand(f) => Some(Shape {
            id: f.id,
            points: f.points.into_iter().map(Point::clamped).collect(),
            color: f.color,
            label: f.label,
            created_at: f.created_at,
            updated_at: f.updated_at,
            closed: true,
        }),
        ShapeRecord::Circle(c) => {
            let center = denormalize(c.center.clamped(), size);
            let radius = c.radius.abs() * size.width();
            let points = polygon::circle_vertices(center, radius, options.circle_segments)
                .into_iter()
                .map(|v| normalize(v, size))
                .collect();
            let created_at = c.created_at.unwrap_or_else(Utc::now);
            let id = c.id.unwrap_or_default();
            tracing::debug!(shape = %id, "upgraded legacy circle");
            Some(Shape {
                id,
                points,
                color: c.color.unwrap_or_else(|| options.default_color.clone()),
                label: c.label,
                created_at,
                updated_at: c.updated_at.unwrap_or(created_at),
                closed: true,
            })
        }
        ShapeRecord::Unknown => {
            tracing::warn!("dropping shape of unknown type");
            None
        }
    }
}
