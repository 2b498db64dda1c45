//! Geometry for the regionmark annotation canvas: coordinate-space
//! transforms, polygon math and the pan/zoom viewport.

pub mod coords;
pub mod polygon;
pub mod viewport;

pub use coords::{clamp_to_bounds, denormalize, distance, normalize, ImageSize, Point, Size, Vec2};
pub use polygon::{polygon_area, signed_area};
pub use viewport::{PinchTracker, ResetToken, Viewport, ViewportConfig};
