//! Error types for capability discovery and activation.

use thiserror::Error;

/// Result type alias for discovery operations.
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// A capability's source text could not be lowered into a module body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to transform {filename}: {message}")]
pub struct TransformError {
    /// Logical filename of the source, e.g. `csv-to-json/index.toml`.
    pub filename: String,

    /// Diagnostic produced by the parser.
    pub message: String,
}

impl TransformError {
    pub fn new(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            message: message.into(),
        }
    }
}

/// Errors produced when a capability loader evaluates its module.
///
/// Loaders cache their outcome, so this type is `Clone`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActivationError {
    /// The default export does not name an export of the module.
    #[error("capability {capability} has no usable entry point (export `{export}` is not defined)")]
    MissingEntryPoint { capability: String, export: String },

    /// The module targets a different capability interface.
    #[error("capability {capability} targets interface v{found}, host supports v{expected}")]
    InterfaceMismatch {
        capability: String,
        expected: u32,
        found: u32,
    },

    /// The export binds to a kernel the host does not provide.
    #[error("capability {capability} requires unknown kernel `{kernel}`")]
    UnknownKernel { capability: String, kernel: String },

    /// Malformed module body or options rejected by the kernel.
    #[error("capability {capability} has an invalid export: {message}")]
    InvalidExport { capability: String, message: String },

    /// The module blob was released before it could be imported.
    #[error("module for capability {capability} was released before import")]
    BlobRevoked { capability: String },
}

/// Root-level failures of a discovery scan.
///
/// Per-capability problems never surface here; they are reported as
/// [`crate::scanner::ScanDiagnostic`]s instead.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Access to the storage root was declined, revoked or timed out.
    #[error("permission denied for storage root {0}")]
    PermissionDenied(String),

    /// The root or its tools directory could not be opened.
    #[error("could not open {path}: {source}")]
    Root {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A rescan was requested before any storage root was granted.
    #[error("no storage root has been selected")]
    NoRoot,

    /// The scan task failed unexpectedly.
    #[error("scan task failed: {0}")]
    Task(String),
}

/// Failures while a capability is executing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// The input was rejected by the capability.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A remote service the capability depends on failed.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

/// Errors surfaced by the host shell.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// No capability is currently mounted.
    #[error("no capability is mounted")]
    NothingMounted,

    /// The mounted capability failed.
    #[error("{id}: {source}")]
    Run {
        id: String,
        #[source]
        source: RunError,
    },
}

/// Why one capability folder was left out of a scan.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CandidateError {
    /// The folder has no entry file.
    #[error("missing entry file {file}")]
    MissingEntryFile { file: String },

    /// The entry file could not be read.
    #[error("failed to read {file}: {message}")]
    Read { file: String, message: String },

    /// Reading the entry file took too long.
    #[error("reading {file} timed out after {after_ms}ms")]
    Timeout { file: String, after_ms: u64 },

    /// The source did not transform.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// An earlier folder already claimed this id.
    #[error("duplicate capability id")]
    DuplicateId,
}
