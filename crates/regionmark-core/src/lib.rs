//! Core types for regionmark: the annotation document model, its persisted
//! JSON format, and freehand stroke capture.

pub mod config;
pub mod document;
pub mod layers;
pub mod shapes;
pub mod stroke;
pub mod wire;

pub use config::{ConfigError, EngineConfig, HistoryConfig, SessionConfig, StrokeConfig};
pub use document::{AnnotationDocument, Meta};
pub use layers::{Layer, LayerId, LayerPatch};
pub use shapes::{Shape, ShapeId};
pub use stroke::{
    CaptureContext, CaptureEvent, CaptureState, Interruption, PointerId, RejectReason, StrokeCapture,
    StrokeOutcome, Tool,
};
pub use wire::{UpgradeError, UpgradeOptions};
