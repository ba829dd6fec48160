//! The interface every capability entry point implements.
//!
//! A capability module does not carry native code. Its default export binds
//! to a [`Kernel`] provided by the host and configures it with options; the
//! kernel validates those options and produces the runnable [`Capability`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RunError;

/// Version of the capability interface this host implements.
pub const CAPABILITY_INTERFACE_VERSION: u32 = 1;

/// A runnable capability.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Process one input and produce the rendered output.
    async fn run(&self, input: &str) -> Result<String, RunError>;
}

/// A host-provided implementation that capability modules bind to.
pub trait Kernel: Send + Sync {
    /// Name modules refer to in `kernel = "..."`.
    fn name(&self) -> &str;

    /// Build a capability from the export's options.
    fn instantiate(&self, options: &serde_json::Value) -> Result<Arc<dyn Capability>, String>;
}

/// Kernels available to the activation stage.
#[derive(Clone, Default)]
pub struct KernelCatalog {
    kernels: BTreeMap<String, Arc<dyn Kernel>>,
}

impl KernelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a kernel, replacing any kernel with the same name.
    pub fn register(&mut self, kernel: Arc<dyn Kernel>) {
        self.kernels.insert(kernel.name().to_string(), kernel);
    }

    /// Builder form of [`KernelCatalog::register`].
    pub fn with(mut self, kernel: Arc<dyn Kernel>) -> Self {
        self.register(kernel);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Kernel>> {
        self.kernels.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.kernels.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }
}

impl fmt::Debug for KernelCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.kernels.keys()).finish()
    }
}

/// The resolved entry point of an activated capability module.
#[derive(Clone)]
pub struct LoadedCapability {
    /// Capability id (source folder name).
    pub id: String,

    /// Name of the export that was used.
    pub export: String,

    /// Kernel the export binds to.
    pub kernel: String,

    /// Title declared by the export, if any.
    pub title: Option<String>,

    /// Description declared by the export, if any.
    pub description: Option<String>,

    capability: Arc<dyn Capability>,
}

impl LoadedCapability {
    pub(crate) fn new(
        id: impl Into<String>,
        export: impl Into<String>,
        kernel: impl Into<String>,
        capability: Arc<dyn Capability>,
    ) -> Self {
        Self {
            id: id.into(),
            export: export.into(),
            kernel: kernel.into(),
            title: None,
            description: None,
            capability,
        }
    }

    /// Run the capability.
    pub async fn run(&self, input: &str) -> Result<String, RunError> {
        self.capability.run(input).await
    }
}

impl fmt::Debug for LoadedCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedCapability")
            .field("id", &self.id)
            .field("export", &self.export)
            .field("kernel", &self.kernel)
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}
