//! Polygon math over closed point sequences.
//!
//! Every function treats the last point as implicitly connected back to
//! the first, so callers never repeat the closing vertex.

use std::f64::consts::TAU;

use crate::coords::{Point, Vec2};

/// Shoelace signed area. Positive for counter-clockwise winding in a y-up
/// frame (clockwise on screen, where y grows downward).
///
/// Returns 0 for fewer than 3 points.
pub fn signed_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0.0;
    for (i, a) in points.iter().enumerate() {
        let b = &points[(i + 1) % points.len()];
        twice_area += a.x * b.y - b.x * a.y;
    }
    twice_area / 2.0
}

/// Unsigned enclosed area of a normalized polygon, independent of winding
pub fn polygon_area(points: &[Point]) -> f64 {
    signed_area(points).abs()
}

/// Even-odd point-in-polygon test in any consistent frame
pub fn contains(polygon: &[Vec2], pos: Vec2) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (pi, pj) = (polygon[i], polygon[j]);
        if (pi.y > pos.y) != (pj.y > pos.y)
            && pos.x < (pj.x - pi.x) * (pos.y - pi.y) / (pj.y - pi.y) + pi.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Axis-aligned bounds `(min, max)` of a point set
pub fn bounds(points: &[Vec2]) -> Option<(Vec2, Vec2)> {
    let first = *points.first()?;
    let (mut min, mut max) = (first, first);
    for p in &points[1..] {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
    }
    Some((min, max))
}

/// Sample `segments` evenly spaced vertices on a circle, starting at angle 0
pub fn circle_vertices(center: Vec2, radius: f64, segments: usize) -> Vec<Vec2> {
    let segments = segments.max(3);
    (0..segments)
        .map(|i| {
            let theta = TAU * i as f64 / segments as f64;
            Vec2::new(center.x + radius * theta.cos(), center.y + radius * theta.sin())
        })
        .collect()
}
