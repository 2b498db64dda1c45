//! Editing session for regionmark: the document store with undo history,
//! the canvas input router, and the load/save lifecycle against a
//! persistence backend.

pub mod backend;
pub mod canvas;
pub mod history;
pub mod lifecycle;
pub mod runtime;
pub mod store;

#[cfg(test)]
mod testing;

pub use backend::{load_catalog, AnnotationBackend, ImageInfo, ImagePage};
pub use canvas::{Canvas, CanvasFeedback, InputEvent};
pub use history::UndoManager;
pub use lifecycle::{
    DocumentLifecycle, LoadOutcome, SaveFeedback, SaveKind, SaveReceipt, SaveTicket, SessionError,
};
pub use runtime::{Command, Notice, Session};
pub use store::{DocumentStore, Selection, StoreError};
