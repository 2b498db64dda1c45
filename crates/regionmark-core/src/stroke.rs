//! Freehand stroke capture.
//!
//! A small explicit state machine: [`transition`] is a pure function from
//! `(state, event, context)` to the next state plus an optional outcome, so
//! it can be driven by any event source and tested without a surface.
//!
//! Positions arriving here are already in image space; the caller converts
//! from view space through the viewport.

use regionmark_geometry::{clamp_to_bounds, normalize, polygon_area, ImageSize, Point, Vec2};
use serde::{Deserialize, Serialize};

use crate::config::StrokeConfig;
use crate::layers::LayerId;
use crate::shapes::Shape;

/// Identifies one pointer (mouse, pen, or a single touch) for the duration of a press
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PointerId(pub u64);

/// Active editing tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    #[default]
    Draw,
    Pan,
    Select,
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Draw => "Draw",
            Tool::Pan => "Pan",
            Tool::Select => "Select",
        }
    }
}

/// Pointer input in image space
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CaptureEvent {
    Down { pointer: PointerId, pos: Vec2 },
    Move { pointer: PointerId, pos: Vec2 },
    Up { pointer: PointerId, pos: Vec2 },
    Cancel { pointer: PointerId },
}

/// Everything a transition needs to know about the world
#[derive(Debug, Clone, Copy)]
pub struct CaptureContext<'a> {
    pub tool: Tool,
    /// Layer new shapes are committed into
    pub layer_id: &'a LayerId,
    pub layer_locked: bool,
    pub image_size: ImageSize,
    pub config: &'a StrokeConfig,
}

/// An in-progress gesture
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub pointer: PointerId,
    pub layer_id: LayerId,
    /// Accumulated image-space samples, first point is the closure anchor
    pub path: Vec<Vec2>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum CaptureState {
    #[default]
    Idle,
    Capturing(Capture),
}

impl CaptureState {
    pub fn is_capturing(&self) -> bool {
        matches!(self, CaptureState::Capturing(_))
    }
}

/// Why a gesture was aborted before release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    SecondPointer,
    Cancelled,
}

/// User-facing reason a stroke did not become a shape
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum RejectReason {
    #[error("layer is locked")]
    LayerLocked,
    #[error("not closed: ends {gap_px:.0}px from its start")]
    NotClosed { gap_px: f64 },
    #[error("area too small")]
    AreaTooSmall { area: f64 },
    #[error("stroke interrupted")]
    Interrupted(Interruption),
}

/// Terminal result of a gesture. All outcomes leave the machine `Idle`.
#[derive(Debug, Clone, PartialEq)]
pub enum StrokeOutcome {
    /// Passed both gates; the shape should be added to `layer_id`
    Committed { layer_id: LayerId, shape: Shape },
    Rejected(RejectReason),
    /// Fewer than 3 points at release: a tap, not a failed attempt
    Discarded,
}

/// Advance the capture state machine by one event
pub fn transition(
    state: CaptureState,
    event: &CaptureEvent,
    ctx: &CaptureContext<'_>,
) -> (CaptureState, Option<StrokeOutcome>) {
    match (state, *event) {
        (CaptureState::Idle, CaptureEvent::Down { pointer, pos }) => {
            if ctx.tool != Tool::Draw {
                return (CaptureState::Idle, None);
            }
            if ctx.layer_locked {
                return (
                    CaptureState::Idle,
                    Some(StrokeOutcome::Rejected(RejectReason::LayerLocked)),
                );
            }
            let capture = Capture {
                pointer,
                layer_id: ctx.layer_id.clone(),
                path: vec![clamp_to_bounds(pos, ctx.image_size)],
            };
            (CaptureState::Capturing(capture), None)
        }
        (CaptureState::Idle, _) => (CaptureState::Idle, None),

        (CaptureState::Capturing(capture), CaptureEvent::Down { pointer, .. }) => {
            if pointer == capture.pointer {
                return (CaptureState::Capturing(capture), None);
            }
            (
                CaptureState::Idle,
                Some(StrokeOutcome::Rejected(RejectReason::Interrupted(
                    Interruption::SecondPointer,
                ))),
            )
        }
        (CaptureState::Capturing(mut capture), CaptureEvent::Move { pointer, pos }) => {
            if pointer == capture.pointer {
                append_sample(&mut capture.path, pos, ctx);
            }
            (CaptureState::Capturing(capture), None)
        }
        (CaptureState::Capturing(mut capture), CaptureEvent::Up { pointer, pos }) => {
            if pointer != capture.pointer {
                return (CaptureState::Capturing(capture), None);
            }
            append_sample(&mut capture.path, pos, ctx);
            (CaptureState::Idle, Some(finish(capture, ctx)))
        }
        (CaptureState::Capturing(capture), CaptureEvent::Cancel { pointer }) => {
            if pointer != capture.pointer {
                return (CaptureState::Capturing(capture), None);
            }
            (
                CaptureState::Idle,
                Some(StrokeOutcome::Rejected(RejectReason::Interrupted(
                    Interruption::Cancelled,
                ))),
            )
        }
    }
}

/// Decimating append: samples within the minimum spacing of the last point are dropped
fn append_sample(path: &mut Vec<Vec2>, pos: Vec2, ctx: &CaptureContext<'_>) {
    let pos = clamp_to_bounds(pos, ctx.image_size);
    match path.last() {
        Some(last) if last.distance(pos) <= ctx.config.min_point_spacing_px => {}
        _ => path.push(pos),
    }
}

/// Release gates: closure first, then area
fn finish(capture: Capture, ctx: &CaptureContext<'_>) -> StrokeOutcome {
    let path = capture.path;
    let (Some(first), Some(last)) = (path.first(), path.last()) else {
        return StrokeOutcome::Discarded;
    };
    if path.len() < 3 {
        return StrokeOutcome::Discarded;
    }

    let gap_px = first.distance(*last);
    if gap_px >= ctx.config.closure_threshold_px {
        return StrokeOutcome::Rejected(RejectReason::NotClosed { gap_px });
    }

    let points: Vec<Point> = path.iter().map(|p| normalize(*p, ctx.image_size)).collect();
    let area = polygon_area(&points);
    if area < ctx.config.min_area {
        return StrokeOutcome::Rejected(RejectReason::AreaTooSmall { area });
    }

    tracing::debug!(points = points.len(), area, layer = %capture.layer_id, "stroke accepted");
    StrokeOutcome::Committed {
        layer_id: capture.layer_id,
        shape: Shape::freehand(points, ctx.config.default_color.clone()),
    }
}

/// Owning wrapper around [`CaptureState`] for event-loop use
#[derive(Debug, Clone, Default)]
pub struct StrokeCapture {
    state: CaptureState,
}

impl StrokeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &CaptureState {
        &self.state
    }

    pub fn is_capturing(&self) -> bool {
        self.state.is_capturing()
    }

    /// Image-space preview of the path being drawn
    pub fn preview(&self) -> &[Vec2] {
        match &self.state {
            CaptureState::Capturing(capture) => &capture.path,
            CaptureState::Idle => &[],
        }
    }

    pub fn handle(&mut self, event: &CaptureEvent, ctx: &CaptureContext<'_>) -> Option<StrokeOutcome> {
        let (next, outcome) = transition(std::mem::take(&mut self.state), event, ctx);
        self.state = next;
        outcome
    }

    /// Drop any in-progress capture without an outcome (e.g. on document switch)
    pub fn reset(&mut self) {
        self.state = CaptureState::Idle;
    }
}
