//! Document lifecycle: which image is open, loading its annotations, and
//! getting edits back to the backend.
//!
//! Saves snapshot the document synchronously and run as independent tasks,
//! so several can be in flight at once. A completion only clears the dirty
//! flag if it still describes the open document at its current revision;
//! anything else is a stale response and is ignored.

use std::sync::Arc;

use regionmark_core::wire::{self, DocumentRecord};
use regionmark_core::{AnnotationDocument, EngineConfig};
use tokio::task::JoinSet;

use crate::backend::{load_catalog, AnnotationBackend, ImageInfo};
use crate::store::DocumentStore;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to list images: {0:#}")]
    Catalog(anyhow::Error),
    #[error("image index {index} out of range (catalog has {len} images)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("no image with id {0}")]
    UnknownImage(String),
    #[error("no image is open")]
    NothingOpen,
}

/// How the open document came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Persisted annotations were found and upgraded
    Loaded,
    /// The image had never been annotated
    Fresh,
    /// The fetch or upgrade failed; an empty document stands in
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveKind {
    Explicit,
    Autosave,
}

/// What a save was a snapshot of
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveTicket {
    pub image_id: String,
    pub revision: u64,
    pub kind: SaveKind,
}

#[derive(Debug)]
pub struct SaveReceipt {
    pub ticket: SaveTicket,
    pub result: anyhow::Result<()>,
}

/// Reported for explicit saves only; autosave outcomes stay silent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveFeedback {
    Saved { image_id: String },
    Failed { image_id: String, message: String },
}

pub struct DocumentLifecycle<B: AnnotationBackend> {
    backend: Arc<B>,
    config: EngineConfig,
    catalog: Vec<ImageInfo>,
    index: Option<usize>,
    store: DocumentStore,
    saves: JoinSet<SaveReceipt>,
    /// (image id, revision) of the last autosave sent and not known to have failed
    last_autosave: Option<(String, u64)>,
}

impl<B: AnnotationBackend> DocumentLifecycle<B> {
    /// A lifecycle with an empty catalog and nothing open
    pub fn new(backend: Arc<B>, config: EngineConfig) -> Self {
        let store = DocumentStore::new(AnnotationDocument::new("", Default::default()), &config);
        Self {
            backend,
            config,
            catalog: Vec::new(),
            index: None,
            store,
            saves: JoinSet::new(),
            last_autosave: None,
        }
    }

    /// Fetch the catalog and open its first image, if any
    pub async fn connect(backend: Arc<B>, config: EngineConfig) -> Result<Self, SessionError> {
        let mut lifecycle = Self::new(backend, config);
        lifecycle.refresh_catalog().await?;
        if !lifecycle.catalog.is_empty() {
            lifecycle.open_index(0).await?;
        }
        Ok(lifecycle)
    }

    pub async fn refresh_catalog(&mut self) -> Result<(), SessionError> {
        let catalog = load_catalog(self.backend.as_ref(), self.config.session.page_size)
            .await
            .map_err(SessionError::Catalog)?;
        // keep pointing at the same image if it is still listed
        let current = self.current().map(|info| info.id.clone());
        self.index = current.and_then(|id| catalog.iter().position(|info| info.id == id));
        self.catalog = catalog;
        Ok(())
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &[ImageInfo] {
        &self.catalog
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn current(&self) -> Option<&ImageInfo> {
        self.index.and_then(|i| self.catalog.get(i))
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut DocumentStore {
        &mut self.store
    }

    pub fn pending_saves(&self) -> usize {
        self.saves.len()
    }

    pub async fn open_id(&mut self, image_id: &str) -> Result<LoadOutcome, SessionError> {
        let index = self
            .catalog
            .iter()
            .position(|info| info.id == image_id)
            .ok_or_else(|| SessionError::UnknownImage(image_id.to_string()))?;
        self.open_index(index).await
    }

    /// Switch to another image. Unsaved edits on the current one are sent as
    /// an autosave first; its completion will be stale and cannot touch the
    /// new document.
    pub async fn open_index(&mut self, index: usize) -> Result<LoadOutcome, SessionError> {
        let info = self
            .catalog
            .get(index)
            .cloned()
            .ok_or(SessionError::IndexOutOfRange {
                index,
                len: self.catalog.len(),
            })?;

        if self.index.is_some() && self.store.is_dirty() {
            self.spawn_save(SaveKind::Autosave);
        }

        let (doc, outcome) = match self.backend.get_annotation(&info.id).await {
            Ok(Some(record)) => match self.upgrade(record, &info) {
                Ok(doc) => (doc, LoadOutcome::Loaded),
                Err(e) => {
                    tracing::warn!(image = %info.id, error = %e, "annotation unreadable; starting empty");
                    (AnnotationDocument::new(info.id.clone(), info.size()), LoadOutcome::Fallback)
                }
            },
            Ok(None) => (AnnotationDocument::new(info.id.clone(), info.size()), LoadOutcome::Fresh),
            Err(e) => {
                tracing::warn!(image = %info.id, error = %format!("{e:#}"), "annotation fetch failed; starting empty");
                (AnnotationDocument::new(info.id.clone(), info.size()), LoadOutcome::Fallback)
            }
        };

        tracing::info!(
            image = %info.id,
            index,
            ?outcome,
            shapes = doc.shape_count(),
            "document opened"
        );
        self.store.set_document(doc);
        self.index = Some(index);
        self.last_autosave = None;

        if outcome != LoadOutcome::Fallback {
            self.prefetch_neighbors(index);
        }
        Ok(outcome)
    }

    /// Open the next image. `Ok(None)` at the end of the catalog.
    pub async fn next(&mut self) -> Result<Option<LoadOutcome>, SessionError> {
        let Some(index) = self.index else {
            return Err(SessionError::NothingOpen);
        };
        if index + 1 >= self.catalog.len() {
            return Ok(None);
        }
        self.open_index(index + 1).await.map(Some)
    }

    /// Open the previous image. `Ok(None)` at the start of the catalog.
    pub async fn prev(&mut self) -> Result<Option<LoadOutcome>, SessionError> {
        let Some(index) = self.index else {
            return Err(SessionError::NothingOpen);
        };
        if index == 0 {
            return Ok(None);
        }
        self.open_index(index - 1).await.map(Some)
    }

    fn upgrade(&self, record: DocumentRecord, info: &ImageInfo) -> Result<AnnotationDocument, regionmark_core::UpgradeError> {
        let mut doc = wire::upgrade(record, &self.config.upgrade_options())?;
        if doc.image_id != info.id {
            tracing::warn!(stored = %doc.image_id, image = %info.id, "annotation image id mismatch; using catalog id");
            doc.image_id = info.id.clone();
        }
        Ok(doc)
    }

    /// Warm the backend for the images either side of `index`. Best effort.
    fn prefetch_neighbors(&self, index: usize) {
        let neighbors = [index.checked_sub(1), index.checked_add(1)];
        for info in neighbors.into_iter().flatten().filter_map(|i| self.catalog.get(i)) {
            let backend = Arc::clone(&self.backend);
            let id = info.id.clone();
            tokio::spawn(async move {
                match backend.image_bytes(&id).await {
                    Ok(bytes) => tracing::debug!(image = %id, bytes = bytes.len(), "prefetched"),
                    Err(e) => tracing::debug!(image = %id, error = %e, "prefetch failed"),
                }
            });
        }
    }

    /// Snapshot the document now and send it in the background
    pub fn spawn_save(&mut self, kind: SaveKind) -> Option<SaveTicket> {
        self.index?;
        let doc = self.store.document();
        let record = DocumentRecord::from(doc);
        let ticket = SaveTicket {
            image_id: doc.image_id.clone(),
            revision: self.store.revision(),
            kind,
        };
        if kind == SaveKind::Autosave {
            self.last_autosave = Some((ticket.image_id.clone(), ticket.revision));
        }
        tracing::debug!(image = %ticket.image_id, revision = ticket.revision, ?kind, "save sent");

        let backend = Arc::clone(&self.backend);
        let sent = ticket.clone();
        self.saves.spawn(async move {
            let result = backend
                .save_annotation(&sent.image_id, &record, sent.kind == SaveKind::Autosave)
                .await;
            SaveReceipt { ticket: sent, result }
        });
        Some(ticket)
    }

    /// Timer tick: autosave if there is something new to save
    pub fn autosave_tick(&mut self) -> Option<SaveTicket> {
        if !self.store.is_dirty() {
            return None;
        }
        let current = (self.store.document().image_id.clone(), self.store.revision());
        if self.last_autosave.as_ref() == Some(&current) {
            return None;
        }
        self.spawn_save(SaveKind::Autosave)
    }

    /// Wait for the next in-flight save. `None` when nothing is in flight.
    pub async fn next_save_completion(&mut self) -> Option<SaveReceipt> {
        loop {
            match self.saves.join_next().await? {
                Ok(receipt) => return Some(receipt),
                Err(e) => tracing::warn!(error = %e, "save task did not complete"),
            }
        }
    }

    /// Apply a save result to the session
    pub fn complete_save(&mut self, receipt: SaveReceipt) -> Option<SaveFeedback> {
        let SaveReceipt { ticket, result } = receipt;
        match result {
            Ok(()) => {
                if self.store.document().image_id != ticket.image_id {
                    tracing::warn!(image = %ticket.image_id, "stale save response for a document no longer open");
                } else if self.store.mark_clean_at(ticket.revision) {
                    tracing::debug!(image = %ticket.image_id, revision = ticket.revision, "saved");
                } else {
                    tracing::debug!(
                        image = %ticket.image_id,
                        revision = ticket.revision,
                        current = self.store.revision(),
                        "edited while saving; still dirty"
                    );
                }
                match ticket.kind {
                    SaveKind::Explicit => {
                        tracing::info!(image = %ticket.image_id, "annotations saved");
                        Some(SaveFeedback::Saved {
                            image_id: ticket.image_id,
                        })
                    }
                    SaveKind::Autosave => None,
                }
            }
            Err(e) => {
                let message = format!("{e:#}");
                match ticket.kind {
                    SaveKind::Autosave => {
                        tracing::warn!(image = %ticket.image_id, error = %message, "autosave failed");
                        if self.last_autosave.as_ref().is_some_and(|(id, rev)| {
                            *id == ticket.image_id && *rev == ticket.revision
                        }) {
                            self.last_autosave = None;
                        }
                        None
                    }
                    SaveKind::Explicit => {
                        tracing::warn!(image = %ticket.image_id, error = %message, "save failed");
                        Some(SaveFeedback::Failed {
                            image_id: ticket.image_id,
                            message,
                        })
                    }
                }
            }
        }
    }

    /// Wait for every in-flight save and apply it
    pub async fn flush(&mut self) -> Vec<SaveFeedback> {
        let mut feedback = Vec::new();
        while let Some(receipt) = self.next_save_completion().await {
            feedback.extend(self.complete_save(receipt));
        }
        feedback
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use regionmark_core::Shape;
    use regionmark_geometry::Point;

    use super::*;
    use crate::testing::MemoryBackend;

    fn square(x0: f64) -> Shape {
        Shape::freehand(
            vec![
                Point::new(x0, 0.1),
                Point::new(x0 + 0.2, 0.1),
                Point::new(x0 + 0.2, 0.3),
                Point::new(x0, 0.3),
            ],
            "#00ff00",
        )
    }

    async fn open(n: usize) -> (Arc<MemoryBackend>, DocumentLifecycle<MemoryBackend>) {
        let backend = Arc::new(MemoryBackend::with_images(n));
        let lifecycle = DocumentLifecycle::connect(Arc::clone(&backend), EngineConfig::default())
            .await
            .unwrap();
        (backend, lifecycle)
    }

    fn scribble(lifecycle: &mut DocumentLifecycle<MemoryBackend>, x0: f64) {
        let store = lifecycle.store_mut();
        let layer = store.document().layers[0].id.clone();
        store.add_shape(&layer, square(x0)).unwrap();
    }

    #[tokio::test]
    async fn fresh_image_gets_default_document() {
        let (_, lifecycle) = open(3).await;
        assert_eq!(lifecycle.index(), Some(0));
        let doc = lifecycle.store().document();
        assert_eq!(doc.image_id, "img-0");
        assert_eq!(doc.layers.len(), 1);
        assert_eq!(doc.image_size.w, 1000);
        assert!(!lifecycle.store().is_dirty());
    }

    #[tokio::test]
    async fn failed_fetch_falls_back_to_empty_document() {
        let backend = Arc::new(MemoryBackend::with_images(2));
        backend.fail_load("img-1");
        let mut lifecycle = DocumentLifecycle::connect(Arc::clone(&backend), EngineConfig::default())
            .await
            .unwrap();
        assert_eq!(lifecycle.next().await.unwrap(), Some(LoadOutcome::Fallback));
        let store = lifecycle.store();
        assert_eq!(store.document().image_id, "img-1");
        assert_eq!(store.document().shape_count(), 0);
        assert_eq!(store.selection().layer, store.document().first_layer_id());
        assert!(!store.is_dirty());
    }

    #[tokio::test]
    async fn legacy_circle_is_upgraded_on_load() {
        let backend = Arc::new(MemoryBackend::with_images(1));
        let record: DocumentRecord = serde_json::from_str(
            r#"{
                "image_id": "img-0",
                "image_size": {"w": 1000, "h": 800},
                "layers": [{"id": "L", "name": "Old", "visible": true, "z": 0,
                            "shapes": [{"type": "circle", "center": {"x": 0.5, "y": 0.5}, "radius": 0.1}]}],
                "meta": {}
            }"#,
        )
        .unwrap();
        backend.put("img-0", record);

        let mut lifecycle = DocumentLifecycle::new(Arc::clone(&backend), EngineConfig::default());
        lifecycle.refresh_catalog().await.unwrap();
        assert_eq!(lifecycle.open_index(0).await.unwrap(), LoadOutcome::Loaded);
        let doc = lifecycle.store().document();
        assert_eq!(doc.shape_count(), 1);
        assert_eq!(doc.layers[0].shapes[0].points.len(), 32);
        assert!(doc.layers[0].shapes[0].closed);
    }

    #[tokio::test]
    async fn navigation_stops_at_catalog_ends() {
        let (_, mut lifecycle) = open(2).await;
        assert_eq!(lifecycle.prev().await.unwrap(), None);
        assert_eq!(lifecycle.next().await.unwrap(), Some(LoadOutcome::Fresh));
        assert_eq!(lifecycle.next().await.unwrap(), None);
        assert_eq!(lifecycle.index(), Some(1));
        assert!(matches!(
            lifecycle.open_index(5).await,
            Err(SessionError::IndexOutOfRange { index: 5, len: 2 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn successful_load_prefetches_neighbors() {
        let (backend, mut lifecycle) = open(4).await;
        lifecycle.open_index(2).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        let fetched = backend.fetched();
        assert!(fetched.contains(&"img-1".to_string()));
        assert!(fetched.contains(&"img-3".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn prefetch_failure_is_swallowed() {
        let (backend, mut lifecycle) = open(4).await;
        backend.fail_image("img-1");
        assert_eq!(lifecycle.open_index(2).await.unwrap(), LoadOutcome::Fresh);
        tokio::time::sleep(Duration::from_millis(1)).await;

        let fetched = backend.fetched();
        assert!(fetched.contains(&"img-1".to_string()));
        assert!(fetched.contains(&"img-3".to_string()));
        // the session carries on as if nothing happened
        assert_eq!(lifecycle.store().document().image_id, "img-2");
        assert_eq!(lifecycle.next().await.unwrap(), Some(LoadOutcome::Fresh));
        assert_eq!(lifecycle.prev().await.unwrap(), Some(LoadOutcome::Fresh));
    }

    #[tokio::test]
    async fn explicit_save_reports_success_and_clears_dirty() {
        let (backend, mut lifecycle) = open(1).await;
        scribble(&mut lifecycle, 0.1);
        lifecycle.spawn_save(SaveKind::Explicit).unwrap();
        let feedback = lifecycle.flush().await;
        assert_eq!(feedback, vec![SaveFeedback::Saved { image_id: "img-0".into() }]);
        assert!(!lifecycle.store().is_dirty());
        let saves = backend.saves();
        assert_eq!(saves.len(), 1);
        assert!(!saves[0].autosave);
        assert_eq!(saves[0].record.layers[0].shapes.len(), 1);
    }

    #[tokio::test]
    async fn failed_explicit_save_keeps_dirty_and_reports() {
        let (backend, mut lifecycle) = open(1).await;
        backend.set_fail_saves(true);
        scribble(&mut lifecycle, 0.1);
        lifecycle.spawn_save(SaveKind::Explicit);
        let feedback = lifecycle.flush().await;
        assert!(matches!(feedback.as_slice(), [SaveFeedback::Failed { .. }]));
        assert!(lifecycle.store().is_dirty());
    }

    #[tokio::test]
    async fn failed_autosave_is_silent_and_retried() {
        let (backend, mut lifecycle) = open(1).await;
        backend.set_fail_saves(true);
        scribble(&mut lifecycle, 0.1);
        assert!(lifecycle.autosave_tick().is_some());
        assert!(lifecycle.flush().await.is_empty());
        assert!(lifecycle.store().is_dirty());

        backend.set_fail_saves(false);
        assert!(lifecycle.autosave_tick().is_some());
        assert!(lifecycle.flush().await.is_empty());
        assert!(!lifecycle.store().is_dirty());
        assert!(backend.saves()[0].autosave);
    }

    #[tokio::test]
    async fn clean_document_is_not_autosaved() {
        let (backend, mut lifecycle) = open(1).await;
        assert!(lifecycle.autosave_tick().is_none());
        assert!(backend.saves().is_empty());
    }

    #[tokio::test]
    async fn autosave_is_not_repeated_for_the_same_revision() {
        let (backend, mut lifecycle) = open(1).await;
        backend.set_save_delay(Duration::from_millis(50));
        scribble(&mut lifecycle, 0.1);
        assert!(lifecycle.autosave_tick().is_some());
        assert!(lifecycle.autosave_tick().is_none());
        assert_eq!(lifecycle.pending_saves(), 1);
        lifecycle.flush().await;
    }

    #[tokio::test(start_paused = true)]
    async fn edits_during_a_save_keep_the_document_dirty() {
        let (backend, mut lifecycle) = open(1).await;
        backend.set_save_delay(Duration::from_millis(100));
        scribble(&mut lifecycle, 0.1);
        lifecycle.spawn_save(SaveKind::Autosave);
        scribble(&mut lifecycle, 0.5);
        lifecycle.flush().await;
        assert!(lifecycle.store().is_dirty());
        // the in-flight save carried the snapshot taken when it was sent
        assert_eq!(backend.saves()[0].record.layers[0].shapes.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_save_never_touches_the_new_document() {
        let (backend, mut lifecycle) = open(2).await;
        backend.set_save_delay(Duration::from_millis(100));
        scribble(&mut lifecycle, 0.1);

        // leaving a dirty document sends it along
        lifecycle.next().await.unwrap();
        assert_eq!(lifecycle.pending_saves(), 1);
        scribble(&mut lifecycle, 0.1);

        lifecycle.flush().await;
        assert_eq!(lifecycle.store().document().image_id, "img-1");
        assert!(lifecycle.store().is_dirty());
        let saves = backend.saves();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].image_id, "img-0");
    }

    #[tokio::test(start_paused = true)]
    async fn save_from_an_earlier_visit_cannot_clean_a_reopened_document() {
        let (backend, mut lifecycle) = open(2).await;
        backend.set_save_delay(Duration::from_millis(100));
        scribble(&mut lifecycle, 0.1);
        let sent_at = lifecycle.store().revision();

        // away and back while the autosave of the first visit is in flight
        lifecycle.next().await.unwrap();
        lifecycle.prev().await.unwrap();
        assert_eq!(lifecycle.store().document().image_id, "img-0");
        assert_eq!(lifecycle.pending_saves(), 1);
        scribble(&mut lifecycle, 0.5);
        assert_ne!(lifecycle.store().revision(), sent_at);

        // same image id, older revision: the completion leaves dirty alone
        let receipt = lifecycle.next_save_completion().await.unwrap();
        assert_eq!(receipt.ticket.image_id, "img-0");
        assert_eq!(receipt.ticket.revision, sent_at);
        assert_eq!(lifecycle.complete_save(receipt), None);
        assert!(lifecycle.store().is_dirty());

        lifecycle.spawn_save(SaveKind::Explicit);
        lifecycle.flush().await;
        assert!(!lifecycle.store().is_dirty());
        assert_eq!(backend.saves().len(), 2);
    }
}
