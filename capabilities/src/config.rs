//! Configuration for capability discovery.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default name of the directory holding capability folders.
pub const DEFAULT_TOOLS_DIR: &str = "tools";

/// Default name of the entry file inside each capability folder.
pub const DEFAULT_ENTRY_FILE: &str = "index.toml";

/// Settings that control a discovery scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Subdirectory of the storage root that holds capability folders.
    pub tools_dir: String,

    /// Entry file read from every capability folder.
    pub entry_file: String,

    /// Upper bound for reading one entry file.
    pub read_timeout_ms: u64,

    /// Upper bound for the permission re-check on the storage root.
    pub permission_timeout_ms: u64,

    /// How many capability folders are processed at once.
    pub max_concurrent_loads: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            tools_dir: DEFAULT_TOOLS_DIR.to_string(),
            entry_file: DEFAULT_ENTRY_FILE.to_string(),
            read_timeout_ms: 5_000,
            permission_timeout_ms: 30_000,
            max_concurrent_loads: 4,
        }
    }
}

impl RegistryConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Read a config from a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let text = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_toml_str(&text)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Set the tools directory name.
    pub fn with_tools_dir(mut self, dir: impl Into<String>) -> Self {
        self.tools_dir = dir.into();
        self
    }

    /// Set the entry file name.
    pub fn with_entry_file(mut self, file: impl Into<String>) -> Self {
        self.entry_file = file.into();
        self
    }

    /// Set the per-file read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the permission request timeout.
    pub fn with_permission_timeout(mut self, timeout: Duration) -> Self {
        self.permission_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the number of folders processed concurrently.
    pub fn with_max_concurrent_loads(mut self, n: usize) -> Self {
        self.max_concurrent_loads = n;
        self
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn permission_timeout(&self) -> Duration {
        Duration::from_millis(self.permission_timeout_ms)
    }

    /// Concurrency limit, never below one.
    pub fn concurrency(&self) -> usize {
        self.max_concurrent_loads.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::new();
        assert_eq!(config.tools_dir, "tools");
        assert_eq!(config.entry_file, "index.toml");
        assert_eq!(config.read_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RegistryConfig::from_toml_str(
            r#"
entry_file = "index.tsx"
max_concurrent_loads = 0
"#,
        )
        .unwrap();

        assert_eq!(config.entry_file, "index.tsx");
        assert_eq!(config.tools_dir, "tools");
        assert_eq!(config.concurrency(), 1);
    }

    #[test]
    fn test_builder() {
        let config = RegistryConfig::new()
            .with_tools_dir("plugins")
            .with_read_timeout(Duration::from_millis(250));

        assert_eq!(config.tools_dir, "plugins");
        assert_eq!(config.read_timeout_ms, 250);
    }
}
