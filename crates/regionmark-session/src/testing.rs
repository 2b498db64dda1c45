//! In-memory backend for session tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use regionmark_core::wire::DocumentRecord;

use crate::backend::{AnnotationBackend, ImageInfo, ImagePage};

#[derive(Debug, Clone, PartialEq)]
pub struct SaveCall {
    pub image_id: String,
    pub record: DocumentRecord,
    pub autosave: bool,
}

#[derive(Default)]
struct State {
    annotations: HashMap<String, DocumentRecord>,
    saves: Vec<SaveCall>,
    fetched: Vec<String>,
    failing_loads: HashSet<String>,
    failing_images: HashSet<String>,
    fail_saves: bool,
    save_delay: Duration,
}

#[derive(Default)]
pub struct MemoryBackend {
    images: Vec<ImageInfo>,
    state: Mutex<State>,
}

impl MemoryBackend {
    /// `n` images named `img-0..`, 1000x800 each
    pub fn with_images(n: usize) -> Self {
        let images = (0..n)
            .map(|i| ImageInfo {
                id: format!("img-{i}"),
                name: format!("slide {i}"),
                width: 1000,
                height: 800,
            })
            .collect();
        Self {
            images,
            state: Mutex::default(),
        }
    }

    pub fn put(&self, image_id: &str, record: DocumentRecord) {
        self.state.lock().unwrap().annotations.insert(image_id.to_string(), record);
    }

    pub fn fail_load(&self, image_id: &str) {
        self.state.lock().unwrap().failing_loads.insert(image_id.to_string());
    }

    pub fn fail_image(&self, image_id: &str) {
        self.state.lock().unwrap().failing_images.insert(image_id.to_string());
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.state.lock().unwrap().fail_saves = fail;
    }

    pub fn set_save_delay(&self, delay: Duration) {
        self.state.lock().unwrap().save_delay = delay;
    }

    pub fn saves(&self) -> Vec<SaveCall> {
        self.state.lock().unwrap().saves.clone()
    }

    pub fn fetched(&self) -> Vec<String> {
        self.state.lock().unwrap().fetched.clone()
    }
}

#[async_trait]
impl AnnotationBackend for MemoryBackend {
    async fn list(&self, cursor: Option<&str>, limit: usize) -> Result<ImagePage> {
        let mut sorted = self.images.clone();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));
        let start = match cursor {
            Some(c) => sorted.iter().position(|i| i.id.as_str() > c).unwrap_or(sorted.len()),
            None => 0,
        };
        let items: Vec<ImageInfo> = sorted.iter().skip(start).take(limit).cloned().collect();
        let more = start + items.len() < sorted.len();
        let next_cursor = if more { items.last().map(|i| i.id.clone()) } else { None };
        Ok(ImagePage { items, next_cursor })
    }

    async fn get_annotation(&self, image_id: &str) -> Result<Option<DocumentRecord>> {
        let state = self.state.lock().unwrap();
        if state.failing_loads.contains(image_id) {
            return Err(anyhow!("connection reset while fetching {image_id}"));
        }
        Ok(state.annotations.get(image_id).cloned())
    }

    async fn save_annotation(&self, image_id: &str, record: &DocumentRecord, autosave: bool) -> Result<()> {
        let delay = self.state.lock().unwrap().save_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if state.fail_saves {
            return Err(anyhow!("backend unavailable"));
        }
        state.annotations.insert(image_id.to_string(), record.clone());
        state.saves.push(SaveCall {
            image_id: image_id.to_string(),
            record: record.clone(),
            autosave,
        });
        Ok(())
    }

    async fn image_bytes(&self, image_id: &str) -> Result<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        state.fetched.push(image_id.to_string());
        if state.failing_images.contains(image_id) {
            return Err(anyhow!("image {image_id} unavailable"));
        }
        Ok(image_id.as_bytes().to_vec())
    }
}
