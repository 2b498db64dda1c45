//! Closed freehand regions.

use chrono::{DateTime, Utc};
use regionmark_geometry::{denormalize, polygon, polygon_area, ImageSize, Point, Vec2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shape identifier, unique within a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShapeId(pub String);

impl ShapeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ShapeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ShapeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ShapeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A closed freehand region in normalized coordinates.
///
/// Points are in drawing order; the first point is the closure anchor and is
/// not repeated at the end.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub id: ShapeId,
    pub points: Vec<Point>,
    pub color: String,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed: bool,
}

impl Shape {
    /// Stamp a freshly drawn region with a new id and timestamps
    pub fn freehand(points: Vec<Point>, color: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ShapeId::new(),
            points,
            color: color.into(),
            label: None,
            created_at: now,
            updated_at: now,
            closed: true,
        }
    }

    /// Enclosed area in normalized space
    pub fn area(&self) -> f64 {
        polygon_area(&self.points)
    }

    /// Vertices in image pixel space
    pub fn image_vertices(&self, size: ImageSize) -> Vec<Vec2> {
        self.points.iter().map(|p| denormalize(*p, size)).collect()
    }

    /// Hit-test an image-space position against the region
    pub fn contains(&self, size: ImageSize, image_pos: Vec2) -> bool {
        polygon::contains(&self.image_vertices(size), image_pos)
    }

    pub fn with_label(mut self, label: Option<String>) -> Self {
        self.label = label;
        self.updated_at = Utc::now();
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self.updated_at = Utc::now();
        self
    }
}
