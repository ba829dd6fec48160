//! # Toolbox CLI
//!
//! Host shell for toolbox capabilities: scan a storage root, mount a
//! capability and run it, and manage the settings and documents tools save.

pub mod config;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use toolbox_capabilities::{
    CapabilityRegistry, DiscoveryScanner, DiscoverySession, FsDirectory, MountState, ScanReport,
    ToolHost,
};
use toolbox_kv::{DocumentDraft, DocumentRepository, FileKvStore};
use toolbox_tools::{ToolDeps, builtin_catalog};
use tracing::{info, warn};

pub use config::ToolboxConfig;

#[derive(Parser, Debug)]
#[command(name = "toolbox")]
#[command(about = "Discover and run pluggable toolbox capabilities")]
pub struct Cli {
    /// Config file (defaults to the platform config dir).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan a storage root and list the capabilities found.
    List {
        /// Storage root containing a `tools/` directory.
        #[arg(long)]
        root: Option<PathBuf>,
    },

    /// Mount one capability and run it on some input.
    Run {
        #[arg(long)]
        root: Option<PathBuf>,

        /// Capability id (its folder name).
        id: String,

        /// Read input from this file instead of stdin.
        #[arg(long)]
        input: Option<PathBuf>,

        /// Save the output as a document with this title.
        #[arg(long)]
        save: Option<String>,
    },

    /// Read or write a tool setting.
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// Inspect saved documents.
    #[command(subcommand)]
    Docs(DocsCommand),
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    Get {
        tool: String,
        key: String,
    },
    Set {
        tool: String,
        key: String,

        /// JSON value; anything that is not valid JSON is stored as a string.
        value: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum DocsCommand {
    List {
        /// Only documents saved by this tool.
        #[arg(long)]
        tool: Option<String>,
    },
}

/// Install the stderr log subscriber (`RUST_LOG`, default `info`).
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Everything a command needs.
struct Shell {
    config: ToolboxConfig,
    repository: DocumentRepository,
}

impl Shell {
    async fn open(config: ToolboxConfig) -> anyhow::Result<Self> {
        let data_dir = config.data_dir()?;
        let store = FileKvStore::open(&data_dir)
            .await
            .with_context(|| format!("failed to open data dir {}", data_dir.display()))?;
        Ok(Self {
            config,
            repository: DocumentRepository::new(Arc::new(store)),
        })
    }

    fn deps(&self) -> ToolDeps {
        let deps = ToolDeps::new(self.repository.clone());
        let Some(llm) = &self.config.llm else {
            return deps;
        };
        match llm.build() {
            Ok(provider) => deps.with_provider(provider),
            Err(e) => {
                warn!("LLM provider unavailable: {e}");
                deps
            }
        }
    }

    /// Scan `root` into a fresh session.
    async fn discover(
        &self,
        root: Option<PathBuf>,
    ) -> anyhow::Result<(DiscoverySession, ScanReport)> {
        let root = root
            .or_else(|| self.config.root.clone())
            .context("no storage root: pass --root or set `root` in the config")?;

        let scanner = DiscoveryScanner::new(self.config.registry.clone(), builtin_catalog(self.deps()));
        let session = DiscoverySession::new(scanner, Arc::new(CapabilityRegistry::new()));
        let outcome = session
            .set_root(Arc::new(FsDirectory::new(&root)))
            .await
            .context("could not load capabilities")?;

        let report = outcome
            .report()
            .cloned()
            .context("scan was superseded")?;
        for diagnostic in &report.diagnostics {
            warn!("Skipped {diagnostic}");
        }
        Ok((session, report))
    }
}

/// Run one parsed command, writing results to `out`.
pub async fn run(cli: Cli, out: &mut (dyn Write + Send)) -> anyhow::Result<()> {
    let config = ToolboxConfig::load(cli.config.as_deref())?;
    let shell = Shell::open(config).await?;

    match cli.command {
        Command::List { root } => {
            let (_session, report) = shell.discover(root).await?;
            for descriptor in &report.descriptors {
                writeln!(
                    out,
                    "{}\t{}\t{}",
                    descriptor.id,
                    descriptor.display_name,
                    &descriptor.source_digest[..12]
                )?;
            }
            for diagnostic in &report.diagnostics {
                writeln!(out, "! {diagnostic}")?;
            }
        }
        Command::Run {
            root,
            id,
            input,
            save,
        } => {
            let (session, _report) = shell.discover(root).await?;
            let host = ToolHost::new(Arc::clone(session.registry()));
            if let MountState::Failed { message, .. } = host.open(&id).await {
                bail!(message);
            }

            let input = read_input(input).await?;
            let output = host.run(&input).await?;
            writeln!(out, "{output}")?;

            if let Some(title) = save {
                let document = shell
                    .repository
                    .upsert_document(DocumentDraft::new(&id, title, output))
                    .await?;
                info!("Saved document {}", document.id);
            }
        }
        Command::Settings(SettingsCommand::Get { tool, key }) => {
            match shell.repository.get_setting(&tool, &key).await? {
                Some(value) => writeln!(out, "{value}")?,
                None => bail!("no setting {key} for {tool}"),
            }
        }
        Command::Settings(SettingsCommand::Set { tool, key, value }) => {
            let value = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
            shell.repository.set_setting(&tool, &key, value).await?;
        }
        Command::Docs(DocsCommand::List { tool }) => {
            for document in shell.repository.list_documents(tool.as_deref()).await? {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}",
                    document.id,
                    document.tool,
                    document.updated_at.to_rfc3339(),
                    document.title
                )?;
            }
        }
    }
    Ok(())
}

async fn read_input(path: Option<PathBuf>) -> anyhow::Result<String> {
    match path {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut input = String::new();
            tokio::io::stdin()
                .read_to_string(&mut input)
                .await
                .context("failed to read stdin")?;
            Ok(input)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from([
            "toolbox",
            "run",
            "--root",
            "/data",
            "csv-to-json",
            "--input",
            "people.csv",
            "--save",
            "People",
        ])
        .unwrap();

        let Command::Run {
            root,
            id,
            input,
            save,
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(root, Some(PathBuf::from("/data")));
        assert_eq!(id, "csv-to-json");
        assert_eq!(input, Some(PathBuf::from("people.csv")));
        assert_eq!(save.as_deref(), Some("People"));
    }

    #[test]
    fn test_parse_settings_and_global_config() {
        let cli = Cli::try_parse_from([
            "toolbox",
            "settings",
            "set",
            "prompt-analyzer",
            "goal",
            "\"Write a haiku\"",
            "--config",
            "toolbox.toml",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("toolbox.toml")));
        assert!(matches!(
            cli.command,
            Command::Settings(SettingsCommand::Set { .. })
        ));
    }

    #[test]
    fn test_run_requires_id() {
        assert!(Cli::try_parse_from(["toolbox", "run", "--root", "/data"]).is_err());
    }
}
