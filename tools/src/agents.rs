//! `agent-manager`: keep a roster of agents and the crews they form.
//!
//! Input is one JSON command, e.g.
//!
//! ```json
//! { "op": "upsert_crew", "name": "Research", "purpose": "Dig", "agents": ["Analyst"] }
//! ```
//!
//! Agents and crews are stored as two lists in the tool's settings. Every
//! command answers with the roster as it stands afterwards.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolbox_capabilities::{Capability, Kernel, RunError};
use toolbox_kv::DocumentRepository;
use tracing::{debug, warn};

use crate::ToolDeps;

pub const KERNEL_NAME: &str = "agent-manager";

pub const AGENTS_KEY: &str = "agents";
pub const CREWS_KEY: &str = "crews";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub name: String,
    pub profile: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crew {
    pub name: String,
    pub purpose: String,

    /// Names of member agents.
    #[serde(default)]
    pub agents: Vec<String>,
}

/// Agents and crews as stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Roster {
    pub agents: Vec<Agent>,
    pub crews: Vec<Crew>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Command {
    List,
    UpsertAgent {
        name: String,
        #[serde(default)]
        profile: String,
        /// Current name when renaming.
        #[serde(default)]
        previous: Option<String>,
    },
    DeleteAgent {
        name: String,
    },
    DuplicateAgent {
        name: String,
    },
    UpsertCrew {
        name: String,
        #[serde(default)]
        purpose: String,
        #[serde(default)]
        agents: Vec<String>,
        #[serde(default)]
        previous: Option<String>,
    },
    DeleteCrew {
        name: String,
    },
    DuplicateCrew {
        name: String,
    },
}

fn copy_name(name: &str) -> String {
    format!("Copy of {name}")
}

impl Roster {
    fn upsert_agent(&mut self, agent: Agent, previous: Option<&str>) -> Result<(), RunError> {
        let target = previous.unwrap_or(&agent.name).to_string();
        let existing = self.agents.iter().position(|a| a.name == target);
        if self
            .agents
            .iter()
            .enumerate()
            .any(|(i, a)| a.name == agent.name && Some(i) != existing)
        {
            return Err(RunError::InvalidInput(format!(
                "agent {} already exists",
                agent.name
            )));
        }

        match existing {
            Some(i) => {
                let old = std::mem::replace(&mut self.agents[i], agent);
                let new_name = &self.agents[i].name;
                if old.name != *new_name {
                    for member in self.crews.iter_mut().flat_map(|c| c.agents.iter_mut()) {
                        if *member == old.name {
                            member.clone_from(new_name);
                        }
                    }
                }
            }
            None if previous.is_some() => {
                return Err(RunError::InvalidInput(format!("no agent named {target}")));
            }
            None => self.agents.push(agent),
        }
        Ok(())
    }

    /// Remove an agent and drop it from every crew.
    fn delete_agent(&mut self, name: &str) {
        self.agents.retain(|a| a.name != name);
        for crew in &mut self.crews {
            crew.agents.retain(|a| a != name);
        }
    }

    fn duplicate_agent(&mut self, name: &str) -> Result<(), RunError> {
        let agent = self
            .agents
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| RunError::InvalidInput(format!("no agent named {name}")))?;
        let copy = Agent {
            name: copy_name(&agent.name),
            profile: agent.profile.clone(),
        };
        self.agents.push(copy);
        Ok(())
    }

    fn upsert_crew(&mut self, mut crew: Crew, previous: Option<&str>) -> Result<(), RunError> {
        if let Some(unknown) = crew
            .agents
            .iter()
            .find(|member| !self.agents.iter().any(|a| &a.name == *member))
        {
            return Err(RunError::InvalidInput(format!("no agent named {unknown}")));
        }
        let mut seen = Vec::with_capacity(crew.agents.len());
        crew.agents.retain(|member| {
            let fresh = !seen.contains(member);
            if fresh {
                seen.push(member.clone());
            }
            fresh
        });

        let target = previous.unwrap_or(&crew.name).to_string();
        let existing = self.crews.iter().position(|c| c.name == target);
        if self
            .crews
            .iter()
            .enumerate()
            .any(|(i, c)| c.name == crew.name && Some(i) != existing)
        {
            return Err(RunError::InvalidInput(format!(
                "crew {} already exists",
                crew.name
            )));
        }

        match existing {
            Some(i) => self.crews[i] = crew,
            None if previous.is_some() => {
                return Err(RunError::InvalidInput(format!("no crew named {target}")));
            }
            None => self.crews.push(crew),
        }
        Ok(())
    }

    fn duplicate_crew(&mut self, name: &str) -> Result<(), RunError> {
        let crew = self
            .crews
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| RunError::InvalidInput(format!("no crew named {name}")))?;
        let copy = Crew {
            name: copy_name(&crew.name),
            ..crew.clone()
        };
        self.crews.push(copy);
        Ok(())
    }

    /// Apply `command`; returns whether the roster changed.
    fn apply(&mut self, command: Command) -> Result<bool, RunError> {
        match command {
            Command::List => return Ok(false),
            Command::UpsertAgent {
                name,
                profile,
                previous,
            } => self.upsert_agent(
                Agent {
                    name: required(name)?,
                    profile,
                },
                previous.as_deref(),
            )?,
            Command::DeleteAgent { name } => self.delete_agent(&name),
            Command::DuplicateAgent { name } => self.duplicate_agent(&name)?,
            Command::UpsertCrew {
                name,
                purpose,
                agents,
                previous,
            } => self.upsert_crew(
                Crew {
                    name: required(name)?,
                    purpose,
                    agents,
                },
                previous.as_deref(),
            )?,
            Command::DeleteCrew { name } => self.crews.retain(|c| c.name != name),
            Command::DuplicateCrew { name } => self.duplicate_crew(&name)?,
        }
        Ok(true)
    }
}

fn required(name: String) -> Result<String, RunError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RunError::InvalidInput("name is empty".to_string()));
    }
    Ok(name.to_string())
}

/// Kernel for the agent manager. Takes no options.
#[derive(Clone)]
pub struct AgentManagerKernel {
    deps: ToolDeps,
}

impl AgentManagerKernel {
    pub fn new(deps: ToolDeps) -> Self {
        Self { deps }
    }
}

impl Kernel for AgentManagerKernel {
    fn name(&self) -> &str {
        KERNEL_NAME
    }

    fn instantiate(&self, _options: &Value) -> Result<Arc<dyn Capability>, String> {
        Ok(Arc::new(AgentManager {
            repository: self.deps.repository().clone(),
        }))
    }
}

struct AgentManager {
    repository: DocumentRepository,
}

impl AgentManager {
    async fn load_list<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, RunError> {
        let saved = self
            .repository
            .get_setting(KERNEL_NAME, key)
            .await
            .map_err(|e| RunError::Failed(e.to_string()))?;
        Ok(match saved.map(serde_json::from_value::<Vec<T>>) {
            Some(Ok(list)) => list,
            Some(Err(e)) => {
                warn!("Ignoring unreadable {key}: {e}");
                Vec::new()
            }
            None => Vec::new(),
        })
    }

    async fn load(&self) -> Result<Roster, RunError> {
        Ok(Roster {
            agents: self.load_list(AGENTS_KEY).await?,
            crews: self.load_list(CREWS_KEY).await?,
        })
    }

    async fn save(&self, roster: &Roster) -> Result<(), RunError> {
        let failed = |e: &dyn std::fmt::Display| RunError::Failed(e.to_string());
        let agents = serde_json::to_value(&roster.agents).map_err(|e| failed(&e))?;
        let crews = serde_json::to_value(&roster.crews).map_err(|e| failed(&e))?;
        self.repository
            .set_setting(KERNEL_NAME, AGENTS_KEY, agents)
            .await
            .map_err(|e| failed(&e))?;
        self.repository
            .set_setting(KERNEL_NAME, CREWS_KEY, crews)
            .await
            .map_err(|e| failed(&e))
    }
}

#[async_trait]
impl Capability for AgentManager {
    async fn run(&self, input: &str) -> Result<String, RunError> {
        let command: Command = if input.trim().is_empty() {
            Command::List
        } else {
            serde_json::from_str(input)
                .map_err(|e| RunError::InvalidInput(format!("invalid command: {e}")))?
        };

        let mut roster = self.load().await?;
        if roster.apply(command)? {
            self.save(&roster).await?;
            debug!(
                "Saved {} agents and {} crews",
                roster.agents.len(),
                roster.crews.len()
            );
        }
        serde_json::to_string_pretty(&roster).map_err(|e| RunError::Failed(e.to_string()))
    }
}
