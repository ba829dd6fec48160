//! Host shell contract.
//!
//! The `ToolHost` mounts one capability at a time: it resolves the id in the
//! registry, reports `Loading` while the loader runs, and ends in either
//! `Mounted` or `Failed` with the loader's message. Opening another
//! capability while one is loading discards the earlier result.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::HostError;
use crate::kernel::LoadedCapability;
use crate::registry::CapabilityRegistry;

/// What the host is currently showing.
#[derive(Debug, Clone, Default)]
pub enum MountState {
    /// Nothing selected.
    #[default]
    Idle,

    /// Waiting for a loader.
    Loading { id: String },

    /// A capability is ready to run.
    Mounted {
        id: String,
        capability: Arc<LoadedCapability>,
    },

    /// Loading failed; `message` is shown verbatim.
    Failed { id: String, message: String },
}

impl MountState {
    /// Id of the selected capability.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Loading { id } | Self::Mounted { id, .. } | Self::Failed { id, .. } => Some(id),
        }
    }

    pub fn is_mounted(&self) -> bool {
        matches!(self, Self::Mounted { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Mounts capabilities from a registry.
pub struct ToolHost {
    registry: Arc<CapabilityRegistry>,
    state: watch::Sender<MountState>,
    selection: AtomicU64,
}

impl ToolHost {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        let (state, _) = watch::channel(MountState::Idle);
        Self {
            registry,
            state,
            selection: AtomicU64::new(0),
        }
    }

    /// Follow state changes.
    pub fn subscribe(&self) -> watch::Receiver<MountState> {
        self.state.subscribe()
    }

    /// Snapshot of the current state.
    pub fn current(&self) -> MountState {
        self.state.borrow().clone()
    }

    /// Select and mount capability `id`.
    ///
    /// Returns the state this selection settled in. If a later `open`
    /// overtook it, the returned state is the one published by that call.
    pub async fn open(&self, id: &str) -> MountState {
        let selection = self.selection.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(descriptor) = self.registry.get(id).await else {
            warn!("Unknown tool requested: {id}");
            return self.settle(
                selection,
                MountState::Failed {
                    id: id.to_string(),
                    message: format!("Unknown tool: {id}"),
                },
            );
        };

        self.settle(selection, MountState::Loading { id: id.to_string() });

        let next = match descriptor.loader.load().await {
            Ok(capability) => {
                debug!("Mounted capability {id}");
                MountState::Mounted {
                    id: id.to_string(),
                    capability,
                }
            }
            Err(e) => MountState::Failed {
                id: id.to_string(),
                message: e.to_string(),
            },
        };
        self.settle(selection, next)
    }

    /// Unmount whatever is shown.
    pub fn close(&self) {
        self.selection.fetch_add(1, Ordering::SeqCst);
        self.state.send_replace(MountState::Idle);
    }

    /// Run the mounted capability on `input`.
    pub async fn run(&self, input: &str) -> Result<String, HostError> {
        let MountState::Mounted { id, capability } = self.current() else {
            return Err(HostError::NothingMounted);
        };
        capability
            .run(input)
            .await
            .map_err(|source| HostError::Run { id, source })
    }

    fn settle(&self, selection: u64, state: MountState) -> MountState {
        if self.selection.load(Ordering::SeqCst) == selection {
            self.state.send_replace(state.clone());
            state
        } else {
            debug!("Dropping stale mount result for {:?}", state.id());
            self.current()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::ModuleActivator;
    use crate::descriptor::CapabilityDescriptor;
    use crate::error::RunError;
    use crate::kernel::test_support;
    use crate::transform::{ManifestTransform, SourceTransform};

    const ECHO: &str = "interface = 1\n[exports.default]\nkernel = \"echo\"\n";
    const GHOST: &str = "interface = 1\ndefault = \"Missing\"\n";

    async fn host() -> ToolHost {
        let activator = ModuleActivator::new(test_support::catalog());
        let transform = ManifestTransform::new();
        let descriptor = |id: &str, source: &str| {
            let code = transform.transform(source, id).unwrap();
            CapabilityDescriptor::new(id, source, activator.activate(id, code))
        };

        let registry = Arc::new(CapabilityRegistry::new());
        registry
            .replace_all(vec![descriptor("echo", ECHO), descriptor("ghost", GHOST)])
            .await;
        ToolHost::new(registry)
    }

    #[tokio::test]
    async fn test_open_mounts_and_runs() {
        let host = host().await;
        let mut updates = host.subscribe();

        let state = host.open("echo").await;
        assert!(state.is_mounted());
        assert!(updates.has_changed().unwrap());
        assert!(updates.borrow_and_update().is_mounted());

        assert_eq!(host.run("hello").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let host = host().await;
        let state = host.open("nope").await;
        assert_eq!(state.error(), Some("Unknown tool: nope"));
    }

    #[tokio::test]
    async fn test_load_failure_is_shown_and_host_stays_usable() {
        let host = host().await;

        let state = host.open("ghost").await;
        let message = state.error().unwrap();
        assert!(message.contains("ghost"));
        assert!(message.contains("Missing"));
        assert!(matches!(host.run("x").await, Err(HostError::NothingMounted)));

        assert!(host.open("echo").await.is_mounted());
    }

    #[tokio::test]
    async fn test_reopen_reuses_loaded_capability() {
        let host = host().await;
        let MountState::Mounted { capability: a, .. } = host.open("echo").await else {
            panic!("echo should mount");
        };
        host.close();
        assert!(matches!(host.current(), MountState::Idle));

        let MountState::Mounted { capability: b, .. } = host.open("echo").await else {
            panic!("echo should mount again");
        };
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_run_error_keeps_capability_mounted() {
        let host = host().await;
        host.open("echo").await;

        let err = host.run("").await.unwrap_err();
        assert_eq!(
            err,
            HostError::Run {
                id: "echo".to_string(),
                source: RunError::InvalidInput("empty input".to_string()),
            }
        );
        assert!(host.current().is_mounted());
    }
}
