//! Configuration file for the `toolbox` binary.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use toolbox_capabilities::RegistryConfig;
use toolbox_llm::ProviderConfig;
use tracing::debug;

/// Top-level `toolbox.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolboxConfig {
    /// Where settings and saved documents live. `~` expands to home.
    pub data_dir: Option<PathBuf>,

    /// Storage root used when `--root` is not given.
    pub root: Option<PathBuf>,

    pub registry: RegistryConfig,

    /// Provider shared by kernels whose options name none.
    pub llm: Option<ProviderConfig>,
}

impl ToolboxConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        toml::from_str(text).context("invalid toolbox config")
    }

    /// Load `path`, or the default config file if it exists, or defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };
        debug!("Loading config from {}", path.display());
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Resolved data directory.
    pub fn data_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => expand_home(dir),
            None => dirs::data_dir()
                .map(|dir| dir.join("toolbox"))
                .context("no data directory on this platform; set `data_dir`"),
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("toolbox").join("config.toml"))
}

fn expand_home(path: &Path) -> anyhow::Result<PathBuf> {
    let Ok(rest) = path.strip_prefix("~") else {
        return Ok(path.to_path_buf());
    };
    let home = dirs::home_dir().context("cannot expand `~`: no home directory")?;
    Ok(home.join(rest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use toolbox_llm::ProviderKind;

    #[test]
    fn test_parse_full_config() {
        let config = ToolboxConfig::from_toml_str(
            r#"
data_dir = "/var/lib/toolbox"
root = "/srv/toolbox"

[registry]
tools_dir = "plugins"

[llm]
kind = "local"
endpoint = "http://localhost:1234/v1/chat/completions"
"#,
        )
        .unwrap();

        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/var/lib/toolbox"));
        assert_eq!(config.root, Some(PathBuf::from("/srv/toolbox")));
        assert_eq!(config.registry.tools_dir, "plugins");
        assert_eq!(config.registry.entry_file, "index.toml");
        assert_eq!(config.llm.unwrap().kind, ProviderKind::Local);
    }

    #[test]
    fn test_empty_config() {
        let config = ToolboxConfig::from_toml_str("").unwrap();
        assert_eq!(config, ToolboxConfig::default());
    }

    #[test]
    fn test_unknown_provider_kind() {
        assert!(ToolboxConfig::from_toml_str("[llm]\nkind = \"azure\"").is_err());
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(
            expand_home(Path::new("/abs/path")).unwrap(),
            PathBuf::from("/abs/path")
        );
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/.toolbox")).unwrap(), home.join(".toolbox"));
        }
    }
}
