//! Persistence collaborator contract.
//!
//! The session never touches storage directly; it talks to an
//! [`AnnotationBackend`], which may be a directory on disk, an HTTP service,
//! or an in-memory fake in tests.

use anyhow::Result;
use async_trait::async_trait;
use regionmark_core::wire::DocumentRecord;
use regionmark_geometry::ImageSize;
use serde::{Deserialize, Serialize};

/// One entry in the image catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub id: String,
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl ImageInfo {
    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }
}

/// One page of a catalog listing. `next_cursor` is the id of the last item
/// when more items follow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePage {
    pub items: Vec<ImageInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait AnnotationBackend: Send + Sync + 'static {
    /// Paginated catalog listing, ordered by id
    async fn list(&self, cursor: Option<&str>, limit: usize) -> Result<ImagePage>;

    /// `Ok(None)` means the image has never been annotated
    async fn get_annotation(&self, image_id: &str) -> Result<Option<DocumentRecord>>;

    /// Must be atomic: readers never observe a partially written document
    async fn save_annotation(&self, image_id: &str, record: &DocumentRecord, autosave: bool) -> Result<()>;

    async fn image_bytes(&self, image_id: &str) -> Result<Vec<u8>>;
}

/// Walk every page of the catalog
pub async fn load_catalog<B: AnnotationBackend + ?Sized>(backend: &B, page_size: usize) -> Result<Vec<ImageInfo>> {
    let limit = page_size.max(1);
    let mut images = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = backend.list(cursor.as_deref(), limit).await?;
        images.extend(page.items);
        match page.next_cursor {
            // a cursor that does not advance would loop forever
            Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
            _ => break,
        }
    }
    tracing::debug!(count = images.len(), "catalog loaded");
    Ok(images)
}

#[cfg(test)]
mod tests {
    use crate::testing::MemoryBackend;

    use super::*;

    #[tokio::test]
    async fn catalog_pages_through_every_image() {
        let backend = MemoryBackend::with_images(7);
        let first = backend.list(None, 3).await.unwrap();
        assert_eq!(first.items.len(), 3);
        assert_eq!(first.next_cursor.as_deref(), Some(first.items[2].id.as_str()));

        let all = load_catalog(&backend, 3).await.unwrap();
        let ids: Vec<_> = all.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["img-0", "img-1", "img-2", "img-3", "img-4", "img-5", "img-6"]);
    }

    #[test]
    fn page_json_omits_missing_cursor() {
        let page = ImagePage {
            items: vec![ImageInfo {
                id: "a".into(),
                name: "a.png".into(),
                width: 4,
                height: 3,
            }],
            next_cursor: None,
        };
        let json = serde_json::to_string(&page).unwrap();
        assert!(!json.contains("next_cursor"));
        assert_eq!(page.items[0].size(), ImageSize::new(4, 3));
    }
}
