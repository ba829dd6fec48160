//! Capability descriptors.

use crate::activation::CapabilityLoader;

/// Metadata and loader of one discovered capability.
#[derive(Debug, Clone)]
pub struct CapabilityDescriptor {
    /// Source folder name, unique within a registry.
    pub id: String,

    /// Human-readable label derived from the id.
    pub display_name: String,

    /// Short description.
    pub description: String,

    /// SHA-256 of the capability's source text.
    pub source_digest: String,

    /// Deferred activation handle.
    pub loader: CapabilityLoader,
}

impl CapabilityDescriptor {
    /// Build a descriptor for folder `id`.
    pub fn new(id: impl Into<String>, source: &str, loader: CapabilityLoader) -> Self {
        let id = id.into();
        Self {
            display_name: display_name(&id),
            description: format!("Tool: {id}"),
            source_digest: source_digest(source),
            id,
            loader,
        }
    }
}

/// `csv-to-json` becomes `Csv To Json`.
///
/// Separators (`-`, `_`) become spaces and every ASCII letter that starts a
/// word is upper-cased; the rest of the text is left alone. Only ASCII
/// letters and digits count as word characters, so `élan` becomes `éLan`.
pub fn display_name(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    let mut at_word_start = true;

    for c in id.chars() {
        let c = if c == '-' || c == '_' { ' ' } else { c };
        if c.is_ascii_alphanumeric() {
            out.push(if at_word_start { c.to_ascii_uppercase() } else { c });
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }

    out
}

/// Hex-encoded SHA-256 of `source`.
pub fn source_digest(source: &str) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}
