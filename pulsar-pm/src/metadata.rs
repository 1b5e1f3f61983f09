//! Per-file metadata sidecars (comment history and tags)
//!
//! Metadata for `<dir>/<file>` is stored as JSON in the hidden sidecar
//! `<dir>/.<file>.pulsar.json`. Hidden entries are filtered out of listings,
//! so sidecars never show up as files.

use pulsar_common::events::FileComment;
use pulsar_common::fs::Filesystem;
use pulsar_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const SIDECAR_SUFFIX: &str = ".pulsar.json";

/// Comment history and unique tags of one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    #[serde(default)]
    pub comments: Vec<FileComment>,
    /// Unique, in insertion order
    #[serde(default)]
    pub tags: Vec<String>,
}

impl FileMetadata {
    /// Add a tag; returns false if it was already present
    pub fn add_tag(&mut self, tag: &str) -> bool {
        if self.tags.iter().any(|t| t == tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }

    /// Remove a tag; returns false if it was absent
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|t| t != tag);
        self.tags.len() != before
    }

    pub fn add_comment(&mut self, text: &str) {
        self.comments.push(FileComment {
            text: text.to_string(),
            timestamp: chrono::Utc::now(),
        });
    }
}

/// Sidecar location for `file`
pub fn sidecar_path(file: &Path) -> Result<PathBuf> {
    let name = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidInput(format!("Not a file path: {}", file.display())))?;
    let sidecar = format!(".{}{}", name, SIDECAR_SUFFIX);
    Ok(match file.parent() {
        Some(parent) => parent.join(sidecar),
        None => PathBuf::from(sidecar),
    })
}

/// Reads and writes metadata sidecars through the filesystem capability
#[derive(Clone)]
pub struct MetadataStore {
    fs: Arc<dyn Filesystem>,
}

impl MetadataStore {
    pub fn new(fs: Arc<dyn Filesystem>) -> Self {
        Self { fs }
    }

    /// Metadata of `file`; empty when no sidecar exists yet
    pub async fn load(&self, file: &Path) -> Result<FileMetadata> {
        let path = sidecar_path(file)?;
        if !self.fs.exists(&path).await {
            return Ok(FileMetadata::default());
        }
        let bytes = self.fs.read_file(&path).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Append a comment to the history of `file`
    pub async fn save_comment(&self, file: &Path, comment: &str) -> Result<FileMetadata> {
        let comment = comment.trim();
        if comment.is_empty() {
            return Err(Error::InvalidInput("Comment is empty".to_string()));
        }
        let mut metadata = self.load(file).await?;
        metadata.add_comment(comment);
        self.store(file, &metadata).await?;
        info!("Comment saved for {}", file.display());
        Ok(metadata)
    }

    /// Add `tag` to `file`; adding an existing tag changes nothing
    pub async fn save_tag(&self, file: &Path, tag: &str) -> Result<FileMetadata> {
        let tag = validate_tag(tag)?;
        let mut metadata = self.load(file).await?;
        if metadata.add_tag(tag) {
            self.store(file, &metadata).await?;
            info!("Tag '{}' added to {}", tag, file.display());
        } else {
            debug!("Tag '{}' already on {}", tag, file.display());
        }
        Ok(metadata)
    }

    /// Remove `tag` from `file`; removing an absent tag is a no-op
    pub async fn delete_tag(&self, file: &Path, tag: &str) -> Result<FileMetadata> {
        let tag = validate_tag(tag)?;
        let mut metadata = self.load(file).await?;
        if metadata.remove_tag(tag) {
            self.store(file, &metadata).await?;
            info!("Tag '{}' removed from {}", tag, file.display());
        } else {
            debug!("Tag '{}' not on {}", tag, file.display());
        }
        Ok(metadata)
    }

    async fn store(&self, file: &Path, metadata: &FileMetadata) -> Result<()> {
        let path = sidecar_path(file)?;
        let bytes = serde_json::to_vec_pretty(metadata)?;
        self.fs.write_file(&path, &bytes).await
    }
}

fn validate_tag(tag: &str) -> Result<&str> {
    let tag = tag.trim();
    if tag.is_empty() {
        return Err(Error::InvalidInput("Tag is empty".to_string()));
    }
    Ok(tag)
}
