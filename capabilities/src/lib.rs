//! # Toolbox Capabilities
//!
//! Runtime discovery and loading of pluggable toolbox capabilities.
//!
//! - **Transform**: lower a capability's source text into a module body
//! - **Activate**: park the module and resolve its entry point lazily, once
//! - **Discover**: scan `<root>/tools/*/index.toml` and build descriptors,
//!   tolerating broken folders
//! - **Register**: publish the latest scan for the host shell
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Capability Registry                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  DirectoryHandle ──► DiscoveryScanner ──► CapabilityRegistry   │
//! │                        │         │                  │           │
//! │                        ▼         ▼                  ▼           │
//! │           SourceTransform  ModuleActivator      ToolHost       │
//! │                                  │                              │
//! │                                  ▼                              │
//! │                            KernelCatalog                        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod activation;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod host;
pub mod kernel;
pub mod registry;
pub mod scanner;
pub mod session;
pub mod storage;
pub mod transform;

pub use activation::{CapabilityLoader, ModuleActivator, ModuleBlobs};
pub use config::RegistryConfig;
pub use descriptor::{CapabilityDescriptor, display_name};
pub use error::{
    ActivationError, CandidateError, DiscoveryError, HostError, Result, RunError, TransformError,
};
pub use host::{MountState, ToolHost};
pub use kernel::{CAPABILITY_INTERFACE_VERSION, Capability, Kernel, KernelCatalog, LoadedCapability};
pub use registry::CapabilityRegistry;
pub use scanner::{DiscoveryScanner, ScanDiagnostic, ScanReport};
pub use session::{DiscoverySession, ScanOutcome};
pub use storage::{AccessMode, DirEntry, DirectoryHandle, EntryKind, FsDirectory, MemoryDirectory, PermissionState};
pub use transform::{ManifestTransform, SourceTransform};
