//! Storage root handles.
//!
//! A [`DirectoryHandle`] is a capability-scoped grant to a directory tree.
//! Callers never see paths: children are reached one name at a time, and
//! access must be re-confirmed with [`DirectoryHandle::request_permission`]
//! because the grant can be revoked between sessions.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod fs;
pub mod memory;

pub use fs::FsDirectory;
pub use memory::MemoryDirectory;

/// Access level requested on a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    Read,
    ReadWrite,
}

/// Outcome of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Granted,
    Denied,
    /// The user has not answered yet.
    Prompt,
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// A granted directory.
///
/// Missing children are reported as [`io::ErrorKind::NotFound`]; any other
/// error kind means the handle itself is unusable.
#[async_trait]
pub trait DirectoryHandle: Send + Sync {
    /// Name of this directory.
    fn name(&self) -> &str;

    /// Re-confirm access to this directory.
    async fn request_permission(&self, mode: AccessMode) -> PermissionState;

    /// Open a child directory.
    async fn get_directory(&self, name: &str) -> io::Result<Arc<dyn DirectoryHandle>>;

    /// List the entries of this directory in enumeration order.
    async fn entries(&self) -> io::Result<Vec<DirEntry>>;

    /// Read a child file as UTF-8 text.
    async fn read_file(&self, name: &str) -> io::Result<String>;
}

/// Reject names that would escape the handle.
pub(crate) fn check_component(name: &str) -> io::Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid entry name: {name:?}"),
        ));
    }
    Ok(())
}
