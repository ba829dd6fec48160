//! Capability registry.
//!
//! The `CapabilityRegistry` holds the descriptors of the latest published
//! discovery scan. It is written by the discovery session only and read
//! freely by the host shell.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::descriptor::CapabilityDescriptor;

/// The published set of capabilities.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    state: RwLock<RegistryState>,

    /// Last generation ticket handed out.
    tickets: AtomicU64,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Generation of the scan these descriptors came from.
    generation: u64,

    /// Descriptors in discovery order.
    ordered: Vec<CapabilityDescriptor>,

    /// Position of each id in `ordered`.
    index: HashMap<String, usize>,
}

impl RegistryState {
    fn rebuild(&mut self, generation: u64, descriptors: Vec<CapabilityDescriptor>) {
        let mut ordered = Vec::with_capacity(descriptors.len());
        let mut index = HashMap::with_capacity(descriptors.len());

        for descriptor in descriptors {
            if index.contains_key(&descriptor.id) {
                warn!("Ignoring duplicate capability id: {}", descriptor.id);
                continue;
            }
            index.insert(descriptor.id.clone(), ordered.len());
            ordered.push(descriptor);
        }

        self.generation = generation;
        self.ordered = ordered;
        self.index = index;
    }
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// All descriptors of the current generation, in discovery order.
    pub async fn list(&self) -> Vec<CapabilityDescriptor> {
        self.state.read().await.ordered.clone()
    }

    /// Look up a descriptor by id.
    pub async fn get(&self, id: &str) -> Option<CapabilityDescriptor> {
        let state = self.state.read().await;
        state.index.get(id).map(|&i| state.ordered[i].clone())
    }

    /// Replace the whole contents.
    ///
    /// Duplicate ids keep their first occurrence. Any scan still in flight
    /// becomes stale.
    pub async fn replace_all(&self, descriptors: Vec<CapabilityDescriptor>) {
        let mut state = self.state.write().await;
        let generation = self.issue_ticket();
        state.rebuild(generation, descriptors);
        info!(
            "Registry replaced: {} capabilities (generation {generation})",
            state.ordered.len()
        );
    }

    /// Start a new generation. Only the most recently issued ticket can be
    /// published.
    pub(crate) fn issue_ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether `ticket` is still the most recent one.
    pub(crate) fn is_current(&self, ticket: u64) -> bool {
        self.tickets.load(Ordering::SeqCst) == ticket
    }

    /// Replace the contents with the result of scan `ticket` if no newer
    /// generation was started since. Returns whether it was applied.
    pub(crate) async fn publish(&self, ticket: u64, descriptors: Vec<CapabilityDescriptor>) -> bool {
        let mut state = self.state.write().await;
        if !self.is_current(ticket) {
            debug!(
                "Discarding stale scan {ticket}, latest is {}",
                self.tickets.load(Ordering::SeqCst)
            );
            return false;
        }
        state.rebuild(ticket, descriptors);
        info!(
            "Published {} capabilities (generation {ticket})",
            state.ordered.len()
        );
        true
    }

    /// Generation of the current contents; zero before the first publish.
    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.ordered.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.ordered.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ModuleActivator;
    use crate::kernel::test_support;
    use pretty_assertions::assert_eq;

    fn descriptor(activator: &ModuleActivator, id: &str) -> CapabilityDescriptor {
        CapabilityDescriptor::new(id, id, activator.activate(id, String::new()))
    }

    fn ids(descriptors: &[CapabilityDescriptor]) -> Vec<&str> {
        descriptors.iter().map(|d| d.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let registry = CapabilityRegistry::new();
        assert!(registry.is_empty().await);
        assert_eq!(registry.generation().await, 0);
        assert!(registry.get("anything").await.is_none());
    }

    #[tokio::test]
    async fn test_replace_all_preserves_order() {
        let activator = ModuleActivator::new(test_support::catalog());
        let registry = CapabilityRegistry::new();

        registry
            .replace_all(vec![
                descriptor(&activator, "markdown-notes"),
                descriptor(&activator, "csv-to-json"),
            ])
            .await;

        let listed = registry.list().await;
        assert_eq!(ids(&listed), vec!["markdown-notes", "csv-to-json"]);
        assert_eq!(registry.get("csv-to-json").await.unwrap().display_name, "Csv To Json");
        assert_eq!(registry.generation().await, 1);

        registry.replace_all(vec![descriptor(&activator, "local-chat")]).await;
        assert_eq!(ids(&registry.list().await), vec!["local-chat"]);
        assert!(registry.get("csv-to-json").await.is_none());
        assert_eq!(registry.generation().await, 2);
    }

    #[tokio::test]
    async fn test_duplicates_keep_first() {
        let activator = ModuleActivator::new(test_support::catalog());
        let registry = CapabilityRegistry::new();
        let first = descriptor(&activator, "dup");
        let first_digest = first.source_digest.clone();
        let mut second = descriptor(&activator, "dup");
        second.source_digest = "other".to_string();

        registry.replace_all(vec![first, second]).await;

        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get("dup").await.unwrap().source_digest, first_digest);
    }

    #[tokio::test]
    async fn test_publish_rejects_stale_tickets() {
        let activator = ModuleActivator::new(test_support::catalog());
        let registry = CapabilityRegistry::new();

        let older = registry.issue_ticket();
        let newer = registry.issue_ticket();
        assert!(!registry.is_current(older));

        // The older scan finishes first but is no longer the latest.
        assert!(!registry.publish(older, vec![descriptor(&activator, "older")]).await);
        assert!(registry.is_empty().await);

        assert!(registry.publish(newer, vec![descriptor(&activator, "newer")]).await);
        assert_eq!(ids(&registry.list().await), vec!["newer"]);
        assert_eq!(registry.generation().await, newer);
    }

    #[tokio::test]
    async fn test_replace_all_invalidates_in_flight_ticket() {
        let activator = ModuleActivator::new(test_support::catalog());
        let registry = CapabilityRegistry::new();

        let ticket = registry.issue_ticket();
        registry.replace_all(vec![descriptor(&activator, "manual")]).await;

        assert!(!registry.publish(ticket, vec![descriptor(&activator, "scanned")]).await);
        assert_eq!(ids(&registry.list().await), vec!["manual"]);
    }
}
