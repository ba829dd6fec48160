//! Module activation stage.
//!
//! Transformed module text is parked in a [`ModuleBlobs`] table and the
//! resulting [`CapabilityLoader`] holds the only reference to it. The first
//! call to [`CapabilityLoader::load`] imports the module through that
//! reference, releases it, and resolves the default export against the
//! [`KernelCatalog`]. The outcome is cached for every later call.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::error::ActivationError;
use crate::kernel::{CAPABILITY_INTERFACE_VERSION, KernelCatalog, LoadedCapability};

/// Export used when a module does not name its default.
pub const DEFAULT_EXPORT: &str = "default";

/// In-memory table of module texts addressed by temporary URLs.
#[derive(Clone, Default)]
pub struct ModuleBlobs {
    table: Arc<BlobTable>,
}

#[derive(Default)]
struct BlobTable {
    next: AtomicU64,
    blobs: Mutex<HashMap<String, Arc<str>>>,
}

impl BlobTable {
    fn revoke(&self, url: &str) {
        let mut blobs = self.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        if blobs.remove(url).is_some() {
            debug!("Revoked module blob {url}");
        }
    }
}

impl ModuleBlobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `code` and return the guard that owns its URL.
    pub fn create(&self, code: impl Into<Arc<str>>) -> BlobGuard {
        let n = self.table.next.fetch_add(1, Ordering::Relaxed);
        let url = format!("blob:toolbox/{n}");
        self.table
            .blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.clone(), code.into());
        BlobGuard {
            url,
            table: Arc::clone(&self.table),
        }
    }

    /// Read the module text behind a live URL.
    pub fn fetch(&self, url: &str) -> Option<Arc<str>> {
        self.table
            .blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url)
            .cloned()
    }

    /// Release every live blob. Loaders that were never invoked fail with
    /// [`ActivationError::BlobRevoked`] afterwards.
    pub fn revoke_all(&self) -> usize {
        let mut blobs = self.table.blobs.lock().unwrap_or_else(PoisonError::into_inner);
        let released = blobs.len();
        blobs.clear();
        if released > 0 {
            debug!("Revoked {released} module blobs");
        }
        released
    }

    /// Number of blobs not yet released.
    pub fn live(&self) -> usize {
        self.table
            .blobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl fmt::Debug for ModuleBlobs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleBlobs")
            .field("live", &self.live())
            .finish()
    }
}

/// Owner of a blob URL. The blob is released when the guard drops.
pub struct BlobGuard {
    url: String,
    table: Arc<BlobTable>,
}

impl BlobGuard {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for BlobGuard {
    fn drop(&mut self) {
        self.table.revoke(&self.url);
    }
}

impl fmt::Debug for BlobGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("BlobGuard").field(&self.url).finish()
    }
}

/// Module body produced by the transform stage.
#[derive(Debug, Deserialize)]
struct ModuleBody {
    interface: Option<u32>,
    default: Option<String>,
    /// Only the selected export is decoded; the others may be anything.
    #[serde(default)]
    exports: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ExportDecl {
    kernel: String,
    title: Option<String>,
    description: Option<String>,
    #[serde(default)]
    options: serde_json::Value,
}

/// Turns module text into lazily evaluated loaders.
#[derive(Debug, Clone)]
pub struct ModuleActivator {
    blobs: ModuleBlobs,
    kernels: Arc<KernelCatalog>,
}

impl ModuleActivator {
    pub fn new(kernels: KernelCatalog) -> Self {
        Self {
            blobs: ModuleBlobs::new(),
            kernels: Arc::new(kernels),
        }
    }

    /// Blob table backing this activator.
    pub fn blobs(&self) -> &ModuleBlobs {
        &self.blobs
    }

    pub fn kernels(&self) -> &KernelCatalog {
        &self.kernels
    }

    /// Park `code` and return a loader for capability `id`.
    ///
    /// Nothing is evaluated until the loader is first invoked.
    pub fn activate(&self, id: &str, code: String) -> CapabilityLoader {
        let guard = self.blobs.create(code);
        debug!("Activated capability {id} at {}", guard.url());
        CapabilityLoader {
            inner: Arc::new(LoaderInner {
                id: id.to_string(),
                blobs: self.blobs.clone(),
                kernels: Arc::clone(&self.kernels),
                pending: Mutex::new(Some(guard)),
                cell: OnceCell::new(),
            }),
        }
    }
}

/// Deferred, cached activation handle of one capability.
///
/// Clones share the same cached outcome.
#[derive(Clone)]
pub struct CapabilityLoader {
    inner: Arc<LoaderInner>,
}

struct LoaderInner {
    id: String,
    blobs: ModuleBlobs,
    kernels: Arc<KernelCatalog>,
    pending: Mutex<Option<BlobGuard>>,
    cell: OnceCell<Result<Arc<LoadedCapability>, ActivationError>>,
}

impl CapabilityLoader {
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Evaluate the module on first use and return its entry point.
    pub async fn load(&self) -> Result<Arc<LoadedCapability>, ActivationError> {
        self.inner
            .cell
            .get_or_init(|| self.inner.import())
            .await
            .clone()
    }

    /// Whether the module has been evaluated.
    pub fn is_loaded(&self) -> bool {
        self.inner.cell.initialized()
    }
}

impl fmt::Debug for CapabilityLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityLoader")
            .field("id", &self.inner.id)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl LoaderInner {
    async fn import(&self) -> Result<Arc<LoadedCapability>, ActivationError> {
        let guard = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let code = guard.as_ref().and_then(|g| self.blobs.fetch(g.url()));
        // Release the URL before evaluating, whatever the outcome.
        drop(guard);

        let result = match code {
            Some(code) => self.evaluate(&code),
            None => Err(ActivationError::BlobRevoked {
                capability: self.id.clone(),
            }),
        };

        match &result {
            Ok(loaded) => debug!("Loaded capability {} via kernel {}", self.id, loaded.kernel),
            Err(e) => warn!("Failed to load capability {}: {e}", self.id),
        }
        result
    }

    fn evaluate(&self, code: &str) -> Result<Arc<LoadedCapability>, ActivationError> {
        let invalid = |message: String| ActivationError::InvalidExport {
            capability: self.id.clone(),
            message,
        };

        let body: ModuleBody = serde_json::from_str(code).map_err(|e| invalid(e.to_string()))?;

        let found = body
            .interface
            .ok_or_else(|| invalid("module does not declare an interface version".to_string()))?;
        if found != CAPABILITY_INTERFACE_VERSION {
            return Err(ActivationError::InterfaceMismatch {
                capability: self.id.clone(),
                expected: CAPABILITY_INTERFACE_VERSION,
                found,
            });
        }

        let export_name = body.default.unwrap_or_else(|| DEFAULT_EXPORT.to_string());
        let Some(export) = body.exports.get(&export_name) else {
            return Err(ActivationError::MissingEntryPoint {
                capability: self.id.clone(),
                export: export_name,
            });
        };
        let export = ExportDecl::deserialize(export)
            .map_err(|e| invalid(format!("export `{export_name}`: {e}")))?;

        let kernel = self
            .kernels
            .get(&export.kernel)
            .ok_or_else(|| ActivationError::UnknownKernel {
                capability: self.id.clone(),
                kernel: export.kernel.clone(),
            })?;

        let capability = kernel.instantiate(&export.options).map_err(invalid)?;

        let mut loaded = LoadedCapability::new(&self.id, &export_name, &export.kernel, capability);
        loaded.title = export.title.clone();
        loaded.description = export.description.clone();
        Ok(Arc::new(loaded))
    }
}
