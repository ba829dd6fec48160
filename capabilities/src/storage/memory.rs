//! In-memory directory handles.
//!
//! Useful for embedding capabilities that ship with the host and for
//! exercising permission revocation, slow reads and listing failures.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{AccessMode, DirEntry, DirectoryHandle, EntryKind, PermissionState, check_component};

#[derive(Debug, Clone)]
enum Node {
    File(Arc<str>),
    Directory(Arc<MemoryDirectory>),
}

/// An immutable in-memory directory tree with a revocable grant.
///
/// Revoking the root revokes every directory reached through it. Duplicate
/// entry names are allowed and are enumerated as added.
#[derive(Debug)]
pub struct MemoryDirectory {
    name: String,
    entries: Vec<(String, Node)>,
    revoked: Arc<AtomicBool>,
    read_only: bool,
    read_delay: Option<Duration>,
    permission_delay: Option<Duration>,
    listing_error: Option<io::ErrorKind>,
}

impl MemoryDirectory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            revoked: Arc::new(AtomicBool::new(false)),
            read_only: false,
            read_delay: None,
            permission_delay: None,
            listing_error: None,
        }
    }

    /// Add a file.
    pub fn with_file(mut self, name: impl Into<String>, contents: impl Into<String>) -> Self {
        let contents: String = contents.into();
        self.entries.push((name.into(), Node::File(contents.into())));
        self
    }

    /// Add a subdirectory. Its name is taken from the child.
    pub fn with_dir(mut self, mut child: MemoryDirectory) -> Self {
        child.share_grant(&self.revoked);
        self.entries
            .push((child.name.clone(), Node::Directory(Arc::new(child))));
        self
    }

    /// Delay every file read in this directory.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Delay every permission request on this directory.
    pub fn with_permission_delay(mut self, delay: Duration) -> Self {
        self.permission_delay = Some(delay);
        self
    }

    /// Make [`DirectoryHandle::entries`] fail with the given error kind.
    pub fn with_listing_error(mut self, kind: io::ErrorKind) -> Self {
        self.listing_error = Some(kind);
        self
    }

    /// Grant read access only.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Withdraw the grant.
    pub fn revoke(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }

    /// Restore the grant.
    pub fn grant(&self) {
        self.revoked.store(false, Ordering::SeqCst);
    }

    fn share_grant(&mut self, revoked: &Arc<AtomicBool>) {
        self.revoked = Arc::clone(revoked);
        for (_, node) in &mut self.entries {
            if let Node::Directory(dir) = node {
                // Children are still uniquely owned while the tree is built.
                if let Some(dir) = Arc::get_mut(dir) {
                    dir.share_grant(revoked);
                }
            }
        }
    }

    fn ensure_granted(&self) -> io::Result<()> {
        if self.revoked.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("access to {} was revoked", self.name),
            ));
        }
        Ok(())
    }

    fn find(&self, name: &str) -> Option<&Node> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, node)| node)
    }
}

#[async_trait]
impl DirectoryHandle for MemoryDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn request_permission(&self, mode: AccessMode) -> PermissionState {
        if let Some(delay) = self.permission_delay {
            tokio::time::sleep(delay).await;
        }
        if self.revoked.load(Ordering::SeqCst) {
            return PermissionState::Denied;
        }
        if mode == AccessMode::ReadWrite && self.read_only {
            return PermissionState::Denied;
        }
        PermissionState::Granted
    }

    async fn get_directory(&self, name: &str) -> io::Result<Arc<dyn DirectoryHandle>> {
        check_component(name)?;
        self.ensure_granted()?;
        match self.find(name) {
            Some(Node::Directory(dir)) => Ok(Arc::clone(dir) as Arc<dyn DirectoryHandle>),
            Some(Node::File(_)) => Err(io::Error::other(format!("{name} is not a directory"))),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{name} not found in {}", self.name),
            )),
        }
    }

    async fn entries(&self) -> io::Result<Vec<DirEntry>> {
        self.ensure_granted()?;
        if let Some(kind) = self.listing_error {
            return Err(io::Error::new(
                kind,
                format!("cannot list {}", self.name),
            ));
        }
        Ok(self
            .entries
            .iter()
            .map(|(name, node)| {
                let kind = match node {
                    Node::File(_) => EntryKind::File,
                    Node::Directory(_) => EntryKind::Directory,
                };
                DirEntry::new(name.clone(), kind)
            })
            .collect())
    }

    async fn read_file(&self, name: &str) -> io::Result<String> {
        check_component(name)?;
        self.ensure_granted()?;
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        match self.find(name) {
            Some(Node::File(contents)) => Ok(contents.to_string()),
            Some(Node::Directory(_)) => Err(io::Error::other(format!("{name} is a directory"))),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{name} not found in {}", self.name),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tree() -> MemoryDirectory {
        MemoryDirectory::new("root")
            .with_file("README.md", "hello")
            .with_dir(MemoryDirectory::new("tools").with_dir(
                MemoryDirectory::new("csv-to-json").with_file("index.toml", "interface = 1"),
            ))
    }

    #[tokio::test]
    async fn test_navigation() {
        let root = tree();
        let tools = root.get_directory("tools").await.unwrap();
        let entries = tools.entries().await.unwrap();
        assert_eq!(entries, vec![DirEntry::new("csv-to-json", EntryKind::Directory)]);

        let tool = tools.get_directory("csv-to-json").await.unwrap();
        assert_eq!(tool.read_file("index.toml").await.unwrap(), "interface = 1");
    }

    #[tokio::test]
    async fn test_revoke_applies_to_children() {
        let root = tree();
        let tools = root.get_directory("tools").await.unwrap();

        root.revoke();
        assert_eq!(
            root.request_permission(AccessMode::Read).await,
            PermissionState::Denied
        );
        let err = tools.entries().await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);

        root.grant();
        assert!(tools.entries().await.is_ok());
    }

    #[tokio::test]
    async fn test_read_only_grant() {
        let root = MemoryDirectory::new("root").read_only();
        assert_eq!(
            root.request_permission(AccessMode::Read).await,
            PermissionState::Granted
        );
        assert_eq!(
            root.request_permission(AccessMode::ReadWrite).await,
            PermissionState::Denied
        );
    }

    #[tokio::test]
    async fn test_permission_delay() {
        let root = MemoryDirectory::new("root").with_permission_delay(Duration::from_millis(20));
        let started = std::time::Instant::now();
        assert_eq!(
            root.request_permission(AccessMode::Read).await,
            PermissionState::Granted
        );
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_listing_error() {
        let root = MemoryDirectory::new("root").with_listing_error(io::ErrorKind::Other);
        assert!(root.entries().await.is_err());
    }
}
