//! Discovery scanner.
//!
//! Walks `<root>/<tools_dir>/*/<entry_file>`, runs every source through the
//! transform and activation stages, and builds descriptors. A broken
//! capability folder only produces a [`ScanDiagnostic`]; the scan itself
//! fails only when the root cannot be used.

use std::collections::HashSet;
use std::io;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::activation::ModuleActivator;
use crate::config::RegistryConfig;
use crate::descriptor::CapabilityDescriptor;
use crate::error::{CandidateError, DiscoveryError, Result};
use crate::kernel::KernelCatalog;
use crate::storage::{AccessMode, DirectoryHandle, PermissionState};
use crate::transform::{ManifestTransform, SourceTransform};

/// A capability folder that was excluded from a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanDiagnostic {
    /// Folder name.
    pub capability: String,

    /// Why it was excluded.
    pub problem: CandidateError,
}

impl std::fmt::Display for ScanDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.capability, self.problem)
    }
}

/// Result of one discovery scan.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Descriptors in enumeration order.
    pub descriptors: Vec<CapabilityDescriptor>,

    /// Folders that were skipped, in enumeration order.
    pub diagnostics: Vec<ScanDiagnostic>,
}

impl ScanReport {
    pub fn ids(&self) -> Vec<&str> {
        self.descriptors.iter().map(|d| d.id.as_str()).collect()
    }
}

/// Finds capabilities under a storage root.
pub struct DiscoveryScanner {
    config: RegistryConfig,
    transform: Arc<dyn SourceTransform>,
    activator: ModuleActivator,
}

impl DiscoveryScanner {
    /// Create a scanner using the TOML module transform.
    pub fn new(config: RegistryConfig, kernels: KernelCatalog) -> Self {
        Self {
            config,
            transform: Arc::new(ManifestTransform::new()),
            activator: ModuleActivator::new(kernels),
        }
    }

    /// Use a different transform stage.
    pub fn with_transform(mut self, transform: Arc<dyn SourceTransform>) -> Self {
        self.transform = transform;
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn activator(&self) -> &ModuleActivator {
        &self.activator
    }

    /// Run one full scan of `root`.
    pub async fn scan(&self, root: &dyn DirectoryHandle) -> Result<ScanReport> {
        info!("Scanning storage root {} for capabilities", root.name());

        match timeout(
            self.config.permission_timeout(),
            root.request_permission(AccessMode::Read),
        )
        .await
        {
            Ok(PermissionState::Granted) => {}
            Ok(state) => {
                warn!("Storage root {} is not accessible: {state:?}", root.name());
                return Err(DiscoveryError::PermissionDenied(root.name().to_string()));
            }
            Err(_) => {
                warn!("Permission request for {} timed out", root.name());
                return Err(DiscoveryError::PermissionDenied(format!(
                    "{} (timed out)",
                    root.name()
                )));
            }
        }

        let tools_path = format!("{}/{}", root.name(), self.config.tools_dir);
        let tools = match root.get_directory(&self.config.tools_dir).await {
            Ok(tools) => tools,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("No {tools_path} directory, nothing to load");
                return Ok(ScanReport::default());
            }
            Err(e) => return Err(root_error(tools_path, e)),
        };

        let entries = tools
            .entries()
            .await
            .map_err(|e| root_error(tools_path.clone(), e))?;

        let mut candidates = Vec::new();
        for entry in entries {
            if entry.is_dir() {
                debug!("Found capability folder: {}", entry.name);
                candidates.push(entry.name);
            } else {
                debug!("Skipping non-directory entry: {}", entry.name);
            }
        }

        let tools = tools.as_ref();
        // `buffered` yields results in input order whatever the completion order.
        let results: Vec<_> = stream::iter(candidates)
            .map(|name| async move {
                let result = self.load_candidate(tools, &name).await;
                (name, result)
            })
            .buffered(self.config.concurrency())
            .collect()
            .await;

        let mut report = ScanReport::default();
        let mut seen = HashSet::new();
        for (name, result) in results {
            let problem = match result {
                Ok(descriptor) if seen.insert(descriptor.id.clone()) => {
                    debug!("Discovered capability: {}", descriptor.id);
                    report.descriptors.push(descriptor);
                    continue;
                }
                Ok(_) => CandidateError::DuplicateId,
                Err(problem) => problem,
            };
            warn!("Failed to load capability {name}: {problem}");
            report.diagnostics.push(ScanDiagnostic {
                capability: name,
                problem,
            });
        }

        info!(
            "Discovered {} capabilities in {tools_path} ({} skipped)",
            report.descriptors.len(),
            report.diagnostics.len()
        );
        Ok(report)
    }

    async fn load_candidate(
        &self,
        tools: &dyn DirectoryHandle,
        name: &str,
    ) -> std::result::Result<CapabilityDescriptor, CandidateError> {
        let file = format!("{name}/{}", self.config.entry_file);

        let read = async {
            let folder = tools.get_directory(name).await?;
            folder.read_file(&self.config.entry_file).await
        };

        let source = match timeout(self.config.read_timeout(), read).await {
            Ok(Ok(source)) => source,
            Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => {
                return Err(CandidateError::MissingEntryFile { file });
            }
            Ok(Err(e)) => {
                return Err(CandidateError::Read {
                    file,
                    message: e.to_string(),
                });
            }
            Err(_) => {
                return Err(CandidateError::Timeout {
                    file,
                    after_ms: self.config.read_timeout_ms,
                });
            }
        };
        debug!("Read {file}, {} bytes", source.len());

        let code = self.transform.transform(&source, &file)?;
        let loader = self.activator.activate(name, code);

        Ok(CapabilityDescriptor::new(name, &source, loader))
    }
}

fn root_error(path: String, source: io::Error) -> DiscoveryError {
    error!("Error accessing {path}: {source}");
    DiscoveryError::Root { path, source }
}
