//! Input router for the annotation surface.
//!
//! Takes raw pointer/wheel/resize events in view space and routes them to
//! the viewport (pan, zoom, pinch), the stroke capture machine, or a
//! selection hit test, depending on the active tool and how many pointers
//! are down.

use regionmark_core::{
    CaptureContext, CaptureEvent, EngineConfig, LayerId, PointerId, RejectReason, ShapeId,
    StrokeCapture, StrokeConfig, StrokeOutcome, Tool,
};
use regionmark_geometry::{ImageSize, PinchTracker, ResetToken, Size, Vec2, Viewport};
use serde::{Deserialize, Serialize};

use crate::store::{DocumentStore, StoreError};

/// Raw input in view space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    PointerDown { pointer: PointerId, pos: Vec2 },
    PointerMove { pointer: PointerId, pos: Vec2 },
    PointerUp { pointer: PointerId, pos: Vec2 },
    PointerCancel { pointer: PointerId },
    Wheel { pos: Vec2, delta_y: f64 },
    Resize { width: f64, height: f64 },
}

/// What the user should be told after an event, if anything
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasFeedback {
    Committed { layer_id: LayerId, shape_id: ShapeId },
    Rejected(RejectReason),
    Selected(Option<(LayerId, ShapeId)>),
    Refused(StoreError),
}

#[derive(Debug, Clone)]
pub struct Canvas {
    viewport: Viewport,
    capture: StrokeCapture,
    tool: Tool,
    /// Pointers currently down, in press order, with last known view position
    pointers: Vec<(PointerId, Vec2)>,
    pinch: Option<PinchTracker>,
    /// Pointer dragging the view under the pan tool
    drag: Option<PointerId>,
    /// Pending select tap
    tap: Option<PointerId>,
    stroke: StrokeConfig,
}

impl Canvas {
    pub fn new(container: Size, image: ImageSize, config: &EngineConfig) -> Self {
        Self {
            viewport: Viewport::new(container, image, config.viewport),
            capture: StrokeCapture::new(),
            tool: Tool::default(),
            pointers: Vec::new(),
            pinch: None,
            drag: None,
            tap: None,
            stroke: config.stroke.clone(),
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut Viewport {
        &mut self.viewport
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Switching tools abandons any gesture in flight
    pub fn set_tool(&mut self, tool: Tool) {
        if tool != self.tool {
            tracing::debug!(tool = tool.name(), "tool changed");
        }
        self.tool = tool;
        self.capture.reset();
        self.drag = None;
        self.tap = None;
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_capturing()
    }

    pub fn is_pinching(&self) -> bool {
        self.pinch.is_some()
    }

    /// Image-space path of the stroke being drawn
    pub fn preview(&self) -> &[Vec2] {
        self.capture.preview()
    }

    pub fn observe_reset(&mut self, token: ResetToken) -> bool {
        self.viewport.observe_reset(token)
    }

    /// A different document is now shown; drop all gesture state
    pub fn on_document_loaded(&mut self, image: ImageSize) {
        self.capture.reset();
        self.pointers.clear();
        self.pinch = None;
        self.drag = None;
        self.tap = None;
        self.viewport.set_image_size(image);
    }

    pub fn handle(&mut self, store: &mut DocumentStore, event: InputEvent) -> Option<CanvasFeedback> {
        match event {
            InputEvent::PointerDown { pointer, pos } => self.pointer_down(store, pointer, pos),
            InputEvent::PointerMove { pointer, pos } => self.pointer_move(store, pointer, pos),
            InputEvent::PointerUp { pointer, pos } => self.pointer_up(store, pointer, pos),
            InputEvent::PointerCancel { pointer } => self.pointer_cancel(store, pointer),
            InputEvent::Wheel { pos, delta_y } => {
                self.viewport.wheel(pos, delta_y);
                None
            }
            InputEvent::Resize { width, height } => {
                self.viewport.resize(Size::new(width, height));
                None
            }
        }
    }

    fn pointer_down(
        &mut self,
        store: &mut DocumentStore,
        pointer: PointerId,
        pos: Vec2,
    ) -> Option<CanvasFeedback> {
        self.track(pointer, pos);

        if self.pointers.len() >= 2 {
            // second finger: whatever the first one was doing becomes a pinch
            let aborted = if self.capture.is_capturing() {
                let pos = self.viewport.screen_to_image(pos);
                self.feed(store, CaptureEvent::Down { pointer, pos })
            } else {
                None
            };
            self.capture.reset();
            self.drag = None;
            self.tap = None;
            if self.pinch.is_none() {
                tracing::debug!("pinch started");
            }
            self.rebase_pinch();
            return aborted.and_then(|o| self.settle(store, o));
        }

        match self.tool {
            Tool::Draw => {
                let outcome = self.feed(store, CaptureEvent::Down {
                    pointer,
                    pos: self.viewport.screen_to_image(pos),
                })?;
                self.settle(store, outcome)
            }
            Tool::Pan => {
                self.drag = Some(pointer);
                None
            }
            Tool::Select => {
                self.tap = Some(pointer);
                None
            }
        }
    }

    fn pointer_move(
        &mut self,
        store: &mut DocumentStore,
        pointer: PointerId,
        pos: Vec2,
    ) -> Option<CanvasFeedback> {
        let previous = self.track(pointer, pos);

        if let Some(pinch) = self.pinch.as_mut() {
            if let [(_, a), (_, b), ..] = self.pointers[..] {
                pinch.update(&mut self.viewport, a, b);
            }
            return None;
        }

        if self.drag == Some(pointer)
            && let Some(previous) = previous
        {
            self.viewport.pan_by(pos - previous);
            return None;
        }

        let outcome = self.feed(store, CaptureEvent::Move {
            pointer,
            pos: self.viewport.screen_to_image(pos),
        })?;
        self.settle(store, outcome)
    }

    fn pointer_up(
        &mut self,
        store: &mut DocumentStore,
        pointer: PointerId,
        pos: Vec2,
    ) -> Option<CanvasFeedback> {
        self.untrack(pointer);

        if self.pinch.is_some() {
            self.rebase_pinch();
            return None;
        }

        if self.drag == Some(pointer) {
            self.drag = None;
            return None;
        }

        if self.tap == Some(pointer) {
            self.tap = None;
            let hit = store.select_at(self.viewport.screen_to_image(pos));
            return Some(CanvasFeedback::Selected(hit));
        }

        let outcome = self.feed(store, CaptureEvent::Up {
            pointer,
            pos: self.viewport.screen_to_image(pos),
        })?;
        self.settle(store, outcome)
    }

    fn pointer_cancel(&mut self, store: &mut DocumentStore, pointer: PointerId) -> Option<CanvasFeedback> {
        self.untrack(pointer);
        if self.pinch.is_some() {
            self.rebase_pinch();
        }
        if self.drag == Some(pointer) {
            self.drag = None;
        }
        if self.tap == Some(pointer) {
            self.tap = None;
        }
        let outcome = self.feed(store, CaptureEvent::Cancel { pointer })?;
        self.settle(store, outcome)
    }

    /// Re-anchor the pinch on the first two pointers down, or end it when
    /// fewer than two remain. Called whenever that pair may have changed.
    fn rebase_pinch(&mut self) {
        match self.pointers[..] {
            [(_, a), (_, b), ..] => self.pinch = Some(PinchTracker::begin(a, b)),
            _ => {
                if self.pinch.take().is_some() {
                    tracing::debug!("pinch ended");
                }
            }
        }
    }

    /// Run one capture event against the store's active layer
    fn feed(&mut self, store: &DocumentStore, event: CaptureEvent) -> Option<StrokeOutcome> {
        let layer = store.active_layer()?;
        let ctx = CaptureContext {
            tool: self.tool,
            layer_id: &layer.id,
            layer_locked: layer.locked,
            image_size: store.document().image_size,
            config: &self.stroke,
        };
        self.capture.handle(&event, &ctx)
    }

    /// Apply a finished stroke to the store and turn it into feedback
    fn settle(&mut self, store: &mut DocumentStore, outcome: StrokeOutcome) -> Option<CanvasFeedback> {
        match outcome {
            StrokeOutcome::Committed { layer_id, shape } => {
                let shape_id = shape.id.clone();
                match store.add_shape(&layer_id, shape) {
                    Ok(()) => Some(CanvasFeedback::Committed { layer_id, shape_id }),
                    Err(e) => {
                        tracing::warn!(error = %e, "accepted stroke refused by store");
                        Some(CanvasFeedback::Refused(e))
                    }
                }
            }
            StrokeOutcome::Rejected(reason) => {
                tracing::debug!(%reason, "stroke rejected");
                Some(CanvasFeedback::Rejected(reason))
            }
            StrokeOutcome::Discarded => None,
        }
    }

    /// Record a pointer position, returning the previous one if it was already down
    fn track(&mut self, pointer: PointerId, pos: Vec2) -> Option<Vec2> {
        match self.pointers.iter_mut().find(|(id, _)| *id == pointer) {
            Some((_, last)) => Some(std::mem::replace(last, pos)),
            None => {
                self.pointers.push((pointer, pos));
                None
            }
        }
    }

    fn untrack(&mut self, pointer: PointerId) {
        self.pointers.retain(|(id, _)| *id != pointer);
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::TAU;

    use regionmark_core::{AnnotationDocument, LayerPatch};

    use super::*;

    const A: PointerId = PointerId(1);
    const B: PointerId = PointerId(2);

    /// 800x600 image in an 800x600 container: view space equals image space
    fn setup() -> (Canvas, DocumentStore) {
        let config = EngineConfig::default();
        let image = ImageSize::new(800, 600);
        let store = DocumentStore::new(AnnotationDocument::new("img", image), &config);
        let canvas = Canvas::new(Size::new(800.0, 600.0), image, &config);
        (canvas, store)
    }

    fn circle(center: Vec2, radius: f64, n: usize) -> Vec<Vec2> {
        (0..n)
            .map(|i| {
                let a = TAU * i as f64 / n as f64;
                Vec2::new(center.x + radius * a.cos(), center.y + radius * a.sin())
            })
            .collect()
    }

    fn draw(canvas: &mut Canvas, store: &mut DocumentStore, path: &[Vec2]) -> Option<CanvasFeedback> {
        let (first, rest) = path.split_first()?;
        let (last, middle) = rest.split_last()?;
        assert_eq!(canvas.handle(store, InputEvent::PointerDown { pointer: A, pos: *first }), None);
        for pos in middle {
            canvas.handle(store, InputEvent::PointerMove { pointer: A, pos: *pos });
        }
        canvas.handle(store, InputEvent::PointerUp { pointer: A, pos: *last })
    }

    #[test]
    fn closed_stroke_lands_in_active_layer() {
        let (mut canvas, mut store) = setup();
        let mut path = circle(Vec2::new(400.0, 300.0), 100.0, 40);
        path.push(path[0] + Vec2::new(3.0, 0.0));

        let feedback = draw(&mut canvas, &mut store, &path);
        let layer = store.document().layers[0].id.clone();
        assert!(matches!(
            feedback,
            Some(CanvasFeedback::Committed { ref layer_id, .. }) if *layer_id == layer
        ));
        assert_eq!(store.document().shape_count(), 1);
        assert!(store.is_dirty());
        assert!(!canvas.is_capturing());
    }

    #[test]
    fn open_stroke_is_rejected_and_store_untouched() {
        let (mut canvas, mut store) = setup();
        let path: Vec<Vec2> = (0..=20).map(|i| Vec2::new(100.0 + 10.0 * i as f64, 300.0)).collect();
        let feedback = draw(&mut canvas, &mut store, &path);
        assert!(matches!(
            feedback,
            Some(CanvasFeedback::Rejected(RejectReason::NotClosed { .. }))
        ));
        assert_eq!(store.document().shape_count(), 0);
        assert!(!store.is_dirty());
    }

    #[test]
    fn locked_layer_rejects_at_press() {
        let (mut canvas, mut store) = setup();
        let layer = store.document().layers[0].id.clone();
        store.update_layer(&layer, &LayerPatch::locked(true)).unwrap();
        let feedback = canvas.handle(&mut store, InputEvent::PointerDown {
            pointer: A,
            pos: Vec2::new(10.0, 10.0),
        });
        assert_eq!(feedback, Some(CanvasFeedback::Rejected(RejectReason::LayerLocked)));
        assert!(!canvas.is_capturing());
    }

    #[test]
    fn second_pointer_aborts_stroke_and_starts_pinch() {
        let (mut canvas, mut store) = setup();
        canvas.handle(&mut store, InputEvent::PointerDown { pointer: A, pos: Vec2::new(300.0, 300.0) });
        canvas.handle(&mut store, InputEvent::PointerMove { pointer: A, pos: Vec2::new(320.0, 300.0) });
        assert!(canvas.is_capturing());

        let feedback = canvas.handle(&mut store, InputEvent::PointerDown {
            pointer: B,
            pos: Vec2::new(500.0, 300.0),
        });
        assert!(matches!(feedback, Some(CanvasFeedback::Rejected(RejectReason::Interrupted(_)))));
        assert!(!canvas.is_capturing());
        assert!(canvas.is_pinching());

        // spread the fingers: zooms in
        canvas.handle(&mut store, InputEvent::PointerMove { pointer: B, pos: Vec2::new(720.0, 300.0) });
        assert!(canvas.viewport().scale() > 1.0);

        // lifting both ends the pinch without producing a stroke
        canvas.handle(&mut store, InputEvent::PointerUp { pointer: B, pos: Vec2::new(720.0, 300.0) });
        assert!(!canvas.is_pinching());
        canvas.handle(&mut store, InputEvent::PointerUp { pointer: A, pos: Vec2::new(320.0, 300.0) });
        assert_eq!(store.document().shape_count(), 0);
        assert!(!store.can_undo());
    }

    fn assert_view_unchanged(canvas: &Canvas, (scale, translation): (f64, Vec2)) {
        let viewport = canvas.viewport();
        assert!((viewport.scale() - scale).abs() < 1e-9, "{} vs {scale}", viewport.scale());
        assert!(viewport.translation().distance(translation) < 1e-9);
    }

    #[test]
    fn pinch_follows_pointer_pair_changes() {
        let (mut canvas, mut store) = setup();
        const C: PointerId = PointerId(3);
        let (a, b, c) = (Vec2::new(300.0, 300.0), Vec2::new(500.0, 300.0), Vec2::new(400.0, 450.0));
        canvas.handle(&mut store, InputEvent::PointerDown { pointer: A, pos: a });
        canvas.handle(&mut store, InputEvent::PointerDown { pointer: B, pos: b });
        canvas.handle(&mut store, InputEvent::PointerDown { pointer: C, pos: c });
        assert!(canvas.is_pinching());

        // A lifts: the pair becomes (B, C). B re-reporting its position is not a gesture.
        canvas.handle(&mut store, InputEvent::PointerUp { pointer: A, pos: a });
        assert!(canvas.is_pinching());
        let before = (canvas.viewport().scale(), canvas.viewport().translation());
        canvas.handle(&mut store, InputEvent::PointerMove { pointer: B, pos: b });
        assert_view_unchanged(&canvas, before);

        // spreading the new pair zooms
        canvas.handle(&mut store, InputEvent::PointerMove { pointer: C, pos: Vec2::new(300.0, 600.0) });
        assert!(canvas.viewport().scale() > 1.0);

        // cancelling one of three re-anchors too
        canvas.handle(&mut store, InputEvent::PointerDown { pointer: A, pos: a });
        let before = (canvas.viewport().scale(), canvas.viewport().translation());
        canvas.handle(&mut store, InputEvent::PointerCancel { pointer: B });
        canvas.handle(&mut store, InputEvent::PointerMove { pointer: C, pos: Vec2::new(300.0, 600.0) });
        assert_view_unchanged(&canvas, before);

        canvas.handle(&mut store, InputEvent::PointerCancel { pointer: C });
        assert!(!canvas.is_pinching());
        assert_eq!(store.document().shape_count(), 0);
    }

    #[test]
    fn wheel_zooms_about_pointer() {
        let (mut canvas, mut store) = setup();
        let pivot = Vec2::new(200.0, 150.0);
        let before = canvas.viewport().screen_to_image(pivot);
        canvas.handle(&mut store, InputEvent::Wheel { pos: pivot, delta_y: -120.0 });
        assert!((canvas.viewport().scale() - 1.1).abs() < 1e-9);
        let after = canvas.viewport().screen_to_image(pivot);
        assert!(before.distance(after) < 1e-9);
    }

    #[test]
    fn pan_tool_drags_zoomed_view() {
        let (mut canvas, mut store) = setup();
        canvas.viewport_mut().apply_zoom(Vec2::new(400.0, 300.0), 2.0);
        let start = canvas.viewport().translation();
        canvas.set_tool(Tool::Pan);
        canvas.handle(&mut store, InputEvent::PointerDown { pointer: A, pos: Vec2::new(400.0, 300.0) });
        canvas.handle(&mut store, InputEvent::PointerMove { pointer: A, pos: Vec2::new(450.0, 320.0) });
        canvas.handle(&mut store, InputEvent::PointerUp { pointer: A, pos: Vec2::new(450.0, 320.0) });
        let moved = canvas.viewport().translation() - start;
        assert!((moved.x - 50.0).abs() < 1e-9);
        assert!((moved.y - 20.0).abs() < 1e-9);
        assert_eq!(store.document().shape_count(), 0);
    }

    #[test]
    fn select_tool_taps_shapes() {
        let (mut canvas, mut store) = setup();
        let mut path = circle(Vec2::new(400.0, 300.0), 100.0, 40);
        path.push(path[0]);
        let Some(CanvasFeedback::Committed { layer_id, shape_id }) = draw(&mut canvas, &mut store, &path)
        else {
            panic!("stroke should commit");
        };

        canvas.set_tool(Tool::Select);
        let pos = Vec2::new(400.0, 300.0);
        canvas.handle(&mut store, InputEvent::PointerDown { pointer: A, pos });
        let feedback = canvas.handle(&mut store, InputEvent::PointerUp { pointer: A, pos });
        assert_eq!(feedback, Some(CanvasFeedback::Selected(Some((layer_id, shape_id.clone())))));
        assert_eq!(store.selection().shape, Some(shape_id));
    }

    #[test]
    fn input_events_parse_from_json() {
        let json = r#"[
            {"type": "pointer_down", "pointer": 1, "pos": {"x": 1.0, "y": 2.0}},
            {"type": "wheel", "pos": {"x": 0.0, "y": 0.0}, "delta_y": -3.0},
            {"type": "resize", "width": 640.0, "height": 480.0}
        ]"#;
        let events: Vec<InputEvent> = serde_json::from_str(json).unwrap();
        assert_eq!(events[0], InputEvent::PointerDown { pointer: PointerId(1), pos: Vec2::new(1.0, 2.0) });
        assert_eq!(events.len(), 3);
    }
}
