//! Filesystem capability consumed by the path resolvers
//!
//! The resolvers never call `std::fs`/`tokio::fs` directly; they go through
//! [`Filesystem`] so tests and alternative storage backends can stand in.

use crate::Result;
use async_trait::async_trait;
use std::path::Path;
use tracing::warn;

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// One child of a listed directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Dot-prefixed entries (including metadata sidecars)
    pub fn is_hidden(&self) -> bool {
        self.name.starts_with('.')
    }
}

/// Filesystem operations the core depends on
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// List the direct children of `path`
    async fn list_children(&self, path: &Path) -> Result<Vec<DirEntry>>;

    /// Create `path` and any missing parents; succeeds if it already exists
    async fn make_dir(&self, path: &Path) -> Result<()>;

    /// Write `bytes` to `path`, replacing any existing content
    async fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<()>;

    /// Copy `src` to `dst`
    async fn copy_file(&self, src: &Path, dst: &Path) -> Result<()>;

    /// Read the whole file at `path`
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Whether anything exists at `path`
    async fn exists(&self, path: &Path) -> bool;
}

/// [`Filesystem`] backed by the local disk through `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

#[async_trait]
impl Filesystem for LocalFs {
    async fn list_children(&self, path: &Path) -> Result<Vec<DirEntry>> {
        let mut reader = tokio::fs::read_dir(path).await?;
        let mut entries = Vec::new();

        while let Some(entry) = reader.next_entry().await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(raw) => {
                    warn!("Skipping non UTF-8 entry {:?} in {}", raw, path.display());
                    continue;
                }
            };
            // follow symlinks so linked folders still navigate
            let kind = match tokio::fs::metadata(entry.path()).await {
                Ok(meta) if meta.is_dir() => EntryKind::Directory,
                Ok(_) => EntryKind::File,
                Err(e) => {
                    warn!("Skipping unreadable entry {}: {}", entry.path().display(), e);
                    continue;
                }
            };
            entries.push(DirEntry { name, kind });
        }

        Ok(entries)
    }

    async fn make_dir(&self, path: &Path) -> Result<()> {
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    async fn write_file(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn copy_file(&self, src: &Path, dst: &Path) -> Result<()> {
        tokio::fs::copy(src, dst).await?;
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}
