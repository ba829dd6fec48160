//! Discovery session.
//!
//! Owns the current storage root and drives scans of it into the registry.
//! A new scan request supersedes the one in flight: the older task is
//! aborted, and should it still complete, its generation ticket is stale and
//! the registry refuses it.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::AbortHandle;
use tracing::{debug, info};

use crate::error::{DiscoveryError, Result};
use crate::registry::CapabilityRegistry;
use crate::scanner::{DiscoveryScanner, ScanReport};
use crate::storage::DirectoryHandle;

/// What happened to a scan request.
#[derive(Debug)]
pub enum ScanOutcome {
    /// The scan finished and its descriptors are now in the registry.
    Published { generation: u64, report: ScanReport },

    /// A newer request took over before this scan could be published.
    Superseded { generation: u64 },
}

impl ScanOutcome {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Published { generation, .. } | Self::Superseded { generation } => *generation,
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }

    /// The scan report, if this scan was published.
    pub fn report(&self) -> Option<&ScanReport> {
        match self {
            Self::Published { report, .. } => Some(report),
            Self::Superseded { .. } => None,
        }
    }
}

/// Binds a storage root to a registry.
pub struct DiscoverySession {
    scanner: Arc<DiscoveryScanner>,
    registry: Arc<CapabilityRegistry>,
    root: Mutex<Option<Arc<dyn DirectoryHandle>>>,
    in_flight: Mutex<Option<AbortHandle>>,
}

impl DiscoverySession {
    pub fn new(scanner: DiscoveryScanner, registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            scanner: Arc::new(scanner),
            registry,
            root: Mutex::new(None),
            in_flight: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn scanner(&self) -> &DiscoveryScanner {
        &self.scanner
    }

    /// The storage root currently bound, if any.
    pub fn root(&self) -> Option<Arc<dyn DirectoryHandle>> {
        self.root
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Bind a new storage root and scan it.
    pub async fn set_root(&self, root: Arc<dyn DirectoryHandle>) -> Result<ScanOutcome> {
        info!("Storage root changed to {}", root.name());
        *self.root.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&root));
        self.scan(root).await
    }

    /// Scan the current root again.
    pub async fn rescan(&self) -> Result<ScanOutcome> {
        let root = self.root().ok_or(DiscoveryError::NoRoot)?;
        self.scan(root).await
    }

    /// Forget the root, empty the registry and release modules that were
    /// never loaded.
    pub async fn clear_root(&self) {
        self.root
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(previous) = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            previous.abort();
        }
        self.registry.replace_all(Vec::new()).await;
        self.scanner.activator().blobs().revoke_all();
    }

    async fn scan(&self, root: Arc<dyn DirectoryHandle>) -> Result<ScanOutcome> {
        let (ticket, handle) = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            let ticket = self.registry.issue_ticket();
            let scanner = Arc::clone(&self.scanner);
            let handle = tokio::spawn(async move { scanner.scan(root.as_ref()).await });
            if let Some(previous) = in_flight.replace(handle.abort_handle()) {
                debug!("Aborting scan superseded by generation {ticket}");
                previous.abort();
            }
            (ticket, handle)
        };

        match handle.await {
            Ok(Ok(report)) => {
                if self.registry.publish(ticket, report.descriptors.clone()).await {
                    Ok(ScanOutcome::Published {
                        generation: ticket,
                        report,
                    })
                } else {
                    Ok(ScanOutcome::Superseded { generation: ticket })
                }
            }
            Ok(Err(_)) if !self.registry.is_current(ticket) => {
                Ok(ScanOutcome::Superseded { generation: ticket })
            }
            Ok(Err(e)) => Err(e),
            Err(e) if e.is_cancelled() => {
                debug!("Scan {ticket} was cancelled");
                Ok(ScanOutcome::Superseded { generation: ticket })
            }
            Err(e) => Err(DiscoveryError::Task(e.to_string())),
        }
    }
}
