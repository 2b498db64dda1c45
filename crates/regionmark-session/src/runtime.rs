//! Single-threaded event loop driving one editing session.
//!
//! Commands, the autosave timer and save completions are all handled from
//! one `select!` loop, so the store is only ever touched by one event at a
//! time and ordering is simply arrival order.

use regionmark_core::{LayerId, LayerPatch, Shape, ShapeId, Tool};
use regionmark_geometry::{ResetToken, Size};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::backend::AnnotationBackend;
use crate::canvas::{Canvas, CanvasFeedback, InputEvent};
use crate::lifecycle::{DocumentLifecycle, LoadOutcome, SaveFeedback, SaveKind, SessionError};
use crate::store::{DocumentStore, StoreError};

/// Requests into a running session
#[derive(Debug, Clone)]
pub enum Command {
    Input(InputEvent),
    Open(usize),
    Next,
    Prev,
    Save,
    Undo,
    Redo,
    SetTool(Tool),
    ResetView,
    FitView,
    AddLayer(String),
    UpdateLayer(LayerId, LayerPatch),
    RemoveLayer(LayerId),
    MoveLayer(LayerId, isize),
    SelectLayer(LayerId),
    UpdateShape(LayerId, Shape),
    DeleteShape(LayerId, ShapeId),
    Shutdown,
}

/// Things the host should show the user
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Opened { image_id: String, outcome: LoadOutcome },
    Canvas(CanvasFeedback),
    Save(SaveFeedback),
    Refused(StoreError),
    Error(String),
}

pub struct Session<B: AnnotationBackend> {
    lifecycle: DocumentLifecycle<B>,
    canvas: Canvas,
    reset: ResetToken,
}

impl<B: AnnotationBackend> Session<B> {
    pub fn new(lifecycle: DocumentLifecycle<B>, container: Size) -> Self {
        let image = lifecycle.store().document().image_size;
        let canvas = Canvas::new(container, image, lifecycle.config());
        Self {
            lifecycle,
            canvas,
            reset: ResetToken::default(),
        }
    }

    pub fn lifecycle(&self) -> &DocumentLifecycle<B> {
        &self.lifecycle
    }

    pub fn lifecycle_mut(&mut self) -> &mut DocumentLifecycle<B> {
        &mut self.lifecycle
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn store(&self) -> &DocumentStore {
        self.lifecycle.store()
    }

    /// Apply one command. `Shutdown` is handled by [`Session::run`].
    pub async fn handle_command(&mut self, command: Command) -> Option<Notice> {
        match command {
            Command::Input(event) => self
                .canvas
                .handle(self.lifecycle.store_mut(), event)
                .map(Notice::Canvas),
            Command::Open(index) => {
                let result = self.lifecycle.open_index(index).await.map(Some);
                self.opened(result)
            }
            Command::Next => {
                let result = self.lifecycle.next().await;
                self.opened(result)
            }
            Command::Prev => {
                let result = self.lifecycle.prev().await;
                self.opened(result)
            }
            Command::Save => {
                // feedback arrives with the completion
                if self.lifecycle.spawn_save(SaveKind::Explicit).is_none() {
                    return Some(Notice::Error(SessionError::NothingOpen.to_string()));
                }
                None
            }
            Command::Undo => {
                self.lifecycle.store_mut().undo();
                None
            }
            Command::Redo => {
                self.lifecycle.store_mut().redo();
                None
            }
            Command::SetTool(tool) => {
                self.canvas.set_tool(tool);
                None
            }
            Command::ResetView => {
                self.reset = self.reset.next();
                self.canvas.observe_reset(self.reset);
                None
            }
            Command::FitView => {
                self.canvas.viewport_mut().fit_to_container();
                None
            }
            Command::AddLayer(name) => {
                let id = self.lifecycle.store_mut().add_layer(name);
                refused(self.lifecycle.store_mut().select_layer(&id))
            }
            Command::UpdateLayer(id, patch) => {
                refused(self.lifecycle.store_mut().update_layer(&id, &patch))
            }
            Command::RemoveLayer(id) => refused(self.lifecycle.store_mut().remove_layer(&id)),
            Command::MoveLayer(id, delta) => {
                refused(self.lifecycle.store_mut().move_layer(&id, delta))
            }
            Command::SelectLayer(id) => refused(self.lifecycle.store_mut().select_layer(&id)),
            Command::UpdateShape(layer, shape) => {
                refused(self.lifecycle.store_mut().update_shape(&layer, shape))
            }
            Command::DeleteShape(layer, shape) => {
                refused(self.lifecycle.store_mut().delete_shape(&layer, &shape))
            }
            Command::Shutdown => None,
        }
    }

    fn opened(&mut self, result: Result<Option<LoadOutcome>, SessionError>) -> Option<Notice> {
        match result {
            Ok(Some(outcome)) => {
                let doc = self.lifecycle.store().document();
                let notice = Notice::Opened {
                    image_id: doc.image_id.clone(),
                    outcome,
                };
                self.canvas.on_document_loaded(doc.image_size);
                Some(notice)
            }
            Ok(None) => None,
            Err(e) => Some(Notice::Error(e.to_string())),
        }
    }

    /// Run until `Shutdown` or until every command sender is gone. Pending
    /// edits get a last autosave and in-flight saves are awaited before
    /// returning.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>, notices: mpsc::UnboundedSender<Notice>) -> Self {
        let mut autosave = tokio::time::interval(self.lifecycle.config().session.autosave_interval());
        autosave.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        autosave.tick().await;

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => {
                        if let Some(notice) = self.handle_command(command).await {
                            let _ = notices.send(notice);
                        }
                    }
                },
                _ = autosave.tick() => {
                    self.lifecycle.autosave_tick();
                }
                Some(receipt) = self.lifecycle.next_save_completion() => {
                    if let Some(feedback) = self.lifecycle.complete_save(receipt) {
                        let _ = notices.send(Notice::Save(feedback));
                    }
                }
            }
        }

        tracing::debug!(pending = self.lifecycle.pending_saves(), "session shutting down");
        self.lifecycle.autosave_tick();
        for feedback in self.lifecycle.flush().await {
            let _ = notices.send(Notice::Save(feedback));
        }
        self
    }
}

fn refused(result: Result<(), StoreError>) -> Option<Notice> {
    result.err().map(|e| {
        tracing::debug!(error = %e, "edit refused");
        Notice::Refused(e)
    })
}
