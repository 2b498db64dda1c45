//! Directory-backed persistence for regionmark.
//!
//! Layout under the data directory:
//!
//! ```text
//! images/index.json              catalog: [{id, name, width, height}]
//! images/<id>.<ext>              raster bytes
//! annotations/<id>.json          explicit saves
//! annotations/<id>.autosave.json autosaves, preferred on load when newer
//! ```
//!
//! Every write goes to a temp file in the target directory and is renamed
//! into place, so a reader never sees half a document.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use regionmark_core::wire::DocumentRecord;
use regionmark_session::{AnnotationBackend, ImageInfo, ImagePage};
use tempfile::NamedTempFile;

const INDEX_FILE: &str = "index.json";
const AUTOSAVE_SUFFIX: &str = ".autosave.json";

#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    fn annotations_dir(&self) -> PathBuf {
        self.root.join("annotations")
    }

    fn annotation_path(&self, image_id: &str) -> PathBuf {
        self.annotations_dir().join(format!("{image_id}.json"))
    }

    fn autosave_path(&self, image_id: &str) -> PathBuf {
        self.annotations_dir().join(format!("{image_id}{AUTOSAVE_SUFFIX}"))
    }

    /// Catalog sorted by id. A missing index means no images yet.
    fn read_index(&self) -> Result<Vec<ImageInfo>> {
        let path = self.images_dir().join(INDEX_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {:?}", path)),
        };
        let mut images: Vec<ImageInfo> =
            serde_json::from_str(&content).with_context(|| format!("Malformed image index {:?}", path))?;
        images.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(images)
    }

    /// Write the catalog index
    pub fn write_index(&self, images: &[ImageInfo]) -> Result<()> {
        let json = serde_json::to_vec_pretty(images)?;
        write_atomic(&self.images_dir().join(INDEX_FILE), &json)
    }
}

/// Ids become file names; keep them from escaping their directory
fn check_id(image_id: &str) -> Result<()> {
    if image_id.is_empty()
        || image_id.starts_with('.')
        || image_id.contains(['/', '\\'])
        || image_id.contains("..")
    {
        bail!("invalid image id {image_id:?}");
    }
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("{:?} has no parent directory", path))?;
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {:?}", dir))?;
    let mut tmp = NamedTempFile::new_in(dir).with_context(|| format!("Failed to create temp file in {:?}", dir))?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("Failed to save to {:?}", path))?;
    Ok(())
}

/// Read and parse a record, with its modification time. `None` if absent.
fn read_record(path: &Path) -> Result<Option<(DocumentRecord, SystemTime)>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to read from {:?}", path)),
    };
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH);
    let record = serde_json::from_str(&content).with_context(|| format!("Malformed annotation {:?}", path))?;
    Ok(Some((record, modified)))
}

#[async_trait]
impl AnnotationBackend for FsBackend {
    async fn list(&self, cursor: Option<&str>, limit: usize) -> Result<ImagePage> {
        let images = self.read_index()?;
        let start = match cursor {
            Some(cursor) => images.partition_point(|info| info.id.as_str() <= cursor),
            None => 0,
        };
        let items: Vec<ImageInfo> = images.iter().skip(start).take(limit).cloned().collect();
        let next_cursor = if start + items.len() < images.len() {
            items.last().map(|info| info.id.clone())
        } else {
            None
        };
        Ok(ImagePage { items, next_cursor })
    }

    async fn get_annotation(&self, image_id: &str) -> Result<Option<DocumentRecord>> {
        check_id(image_id)?;
        let explicit = read_record(&self.annotation_path(image_id))?;
        let autosave = match read_record(&self.autosave_path(image_id)) {
            Ok(autosave) => autosave,
            Err(e) => {
                tracing::warn!(image = image_id, error = %format!("{e:#}"), "ignoring unreadable autosave");
                None
            }
        };
        let record = match (explicit, autosave) {
            (Some((saved, saved_at)), Some((auto, auto_at))) => {
                if auto_at > saved_at {
                    tracing::debug!(image = image_id, "using newer autosave");
                    auto
                } else {
                    saved
                }
            }
            (Some((saved, _)), None) => saved,
            (None, Some((auto, _))) => auto,
            (None, None) => return Ok(None),
        };
        Ok(Some(record))
    }

    async fn save_annotation(&self, image_id: &str, record: &DocumentRecord, autosave: bool) -> Result<()> {
        check_id(image_id)?;
        let json = serde_json::to_vec_pretty(record)?;
        if autosave {
            return write_atomic(&self.autosave_path(image_id), &json);
        }
        write_atomic(&self.annotation_path(image_id), &json)?;
        // an explicit save supersedes any autosave
        match fs::remove_file(self.autosave_path(image_id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to remove superseded autosave"),
        }
    }

    async fn image_bytes(&self, image_id: &str) -> Result<Vec<u8>> {
        check_id(image_id)?;
        let dir = self.images_dir();
        let entries = fs::read_dir(&dir).with_context(|| format!("Failed to read {:?}", dir))?;
        for entry in entries {
            let path = entry?.path();
            if path.file_stem().and_then(|s| s.to_str()) == Some(image_id)
                && path.file_name().and_then(|s| s.to_str()) != Some(INDEX_FILE)
            {
                return fs::read(&path).with_context(|| format!("Failed to read from {:?}", path));
            }
        }
        bail!("no image file for {image_id} in {:?}", dir)
    }
}
