//! # Toolbox KV
//!
//! Local persistence for toolbox tools: a key/value store scoped by tool,
//! and a document repository on top of it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Tool Data                                 │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  DocumentRepository ──► KeyValueStore                           │
//! │                           │         │                           │
//! │                           ▼         ▼                           │
//! │                    FileKvStore  MemoryKvStore                   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod documents;
pub mod error;
pub mod file;
pub mod store;

pub use documents::{DOCUMENTS_NAMESPACE, DocumentDraft, DocumentRepository, ToolDocument};
pub use error::{KvError, Result};
pub use file::FileKvStore;
pub use store::{KeyValueStore, MemoryKvStore};
