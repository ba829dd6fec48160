//! Local filesystem directory handles.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::{AccessMode, DirEntry, DirectoryHandle, EntryKind, PermissionState, check_component};

/// A directory on the local filesystem.
///
/// Entries are listed in name order so that repeated scans of an unchanged
/// directory enumerate identically.
#[derive(Debug, Clone)]
pub struct FsDirectory {
    path: PathBuf,
    name: String,
}

impl FsDirectory {
    /// Wrap an existing directory.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { path, name }
    }

    /// Filesystem path behind this handle.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl DirectoryHandle for FsDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn request_permission(&self, mode: AccessMode) -> PermissionState {
        let metadata = match fs::metadata(&self.path).await {
            Ok(metadata) => metadata,
            Err(e) => {
                debug!("Permission check failed for {}: {e}", self.path.display());
                return PermissionState::Denied;
            }
        };

        if !metadata.is_dir() {
            return PermissionState::Denied;
        }

        if mode == AccessMode::ReadWrite && metadata.permissions().readonly() {
            return PermissionState::Denied;
        }

        // Listing proves read access.
        match fs::read_dir(&self.path).await {
            Ok(_) => PermissionState::Granted,
            Err(e) => {
                debug!("Cannot list {}: {e}", self.path.display());
                PermissionState::Denied
            }
        }
    }

    async fn get_directory(&self, name: &str) -> io::Result<Arc<dyn DirectoryHandle>> {
        check_component(name)?;
        let path = self.path.join(name);
        let metadata = fs::metadata(&path).await?;
        if !metadata.is_dir() {
            return Err(io::Error::other(format!(
                "{} is not a directory",
                path.display()
            )));
        }
        Ok(Arc::new(FsDirectory::new(path)))
    }

    async fn entries(&self) -> io::Result<Vec<DirEntry>> {
        let mut dir = fs::read_dir(&self.path).await?;
        let mut entries = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            let kind = if file_type.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            entries.push(DirEntry::new(
                entry.file_name().to_string_lossy().into_owned(),
                kind,
            ));
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn read_file(&self, name: &str) -> io::Result<String> {
        check_component(name)?;
        fs::read_to_string(self.path.join(name)).await
    }
}
