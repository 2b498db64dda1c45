//! Coordinate spaces used by the annotation canvas.
//!
//! Three frames are in play:
//! - view space: screen pixels inside the container
//! - image space: source image pixels, `[0, w] x [0, h]`
//! - normalized space: fractions of image width/height, `[0, 1] x [0, 1]`
//!
//! [`Vec2`] carries view or image positions; [`Point`] is always normalized.

use std::ops::{Add, Div, Mul, Sub};

use serde::{Deserialize, Serialize};

/// A position in view or image pixel space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another position
    pub fn distance(self, other: Vec2) -> f64 {
        distance(self, other)
    }

    /// Midpoint between two positions
    pub fn midpoint(self, other: Vec2) -> Vec2 {
        Vec2::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;

    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f64> for Vec2 {
    type Output = Vec2;

    fn div(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x / rhs, self.y / rhs)
    }
}

/// Width and height of a view-space area (e.g. the canvas container)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Pixel dimensions of the source image, authoritative for denormalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ImageSize {
    pub w: u32,
    pub h: u32,
}

impl ImageSize {
    pub fn new(w: u32, h: u32) -> Self {
        Self { w, h }
    }

    pub fn width(&self) -> f64 {
        f64::from(self.w)
    }

    pub fn height(&self) -> f64 {
        f64::from(self.h)
    }

    pub fn as_size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    /// Zero-sized images cannot be normalized against
    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }
}

/// A position in normalized space. Both components live in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// Create a normalized point, clamping both components into `[0, 1]`
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: clamp_unit(x),
            y: clamp_unit(y),
        }
    }

    /// Re-apply the unit clamp, e.g. after deserializing untrusted input
    pub fn clamped(self) -> Self {
        Self::new(self.x, self.y)
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

/// Convert an image-space position into normalized space.
///
/// Total: out-of-range inputs are clamped, never rejected. A zero-sized
/// image axis maps everything to 0 on that axis.
pub fn normalize(image_point: Vec2, size: ImageSize) -> Point {
    let x = if size.w == 0 { 0.0 } else { image_point.x / size.width() };
    let y = if size.h == 0 { 0.0 } else { image_point.y / size.height() };
    Point::new(x, y)
}

/// Convert a normalized point back into image space (rendering and hit-testing only)
pub fn denormalize(point: Point, size: ImageSize) -> Vec2 {
    Vec2::new(point.x * size.width(), point.y * size.height())
}

/// Clamp an image-space position to `[0, w] x [0, h]`
pub fn clamp_to_bounds(point: Vec2, size: ImageSize) -> Vec2 {
    Vec2::new(
        point.x.clamp(0.0, size.width()),
        point.y.clamp(0.0, size.height()),
    )
}

/// Euclidean distance between two positions
pub fn distance(a: Vec2, b: Vec2) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}
