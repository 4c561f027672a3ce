//! Process-wide agent registry
//!
//! Built once at startup and read-only afterwards, so it can be shared by
//! `Arc` across concurrent sessions without synchronization.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::definition::{Agent, ToolSpec};
use super::handoff;
use crate::constants::handoff::TRANSFER_PREFIX;

/// Registry validation error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no agents registered")]
    Empty,

    #[error("agent registered twice: {0}")]
    DuplicateAgent(String),

    #[error("agent '{agent}' declares tool '{tool}' twice")]
    DuplicateTool { agent: String, tool: String },

    #[error("agent '{agent}' declares reserved tool name '{tool}'")]
    ReservedToolName { agent: String, tool: String },

    #[error("agent '{agent}' hands off to unknown agent '{target}'")]
    UnknownHandoff { agent: String, target: String },

    #[error("agent '{0}' lists itself as a handoff target")]
    SelfHandoff(String),

    #[error("default agent not registered: {0}")]
    UnknownDefault(String),
}

/// Immutable set of agents with a default (root) agent
#[derive(Debug)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<Agent>>,
    /// Registration order, for stable listings
    order: Vec<String>,
    default_agent: Arc<Agent>,
}

impl AgentRegistry {
    pub fn builder() -> AgentRegistryBuilder {
        AgentRegistryBuilder::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Agent>> {
        self.agents.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// The agent a new session starts with
    pub fn default_agent(&self) -> Arc<Agent> {
        self.default_agent.clone()
    }

    /// Agents in registration order
    pub fn agents(&self) -> impl Iterator<Item = &Arc<Agent>> {
        self.order.iter().filter_map(|name| self.agents.get(name))
    }

    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// First agent registered with the escalated tier
    pub fn escalated_agent(&self) -> Option<Arc<Agent>> {
        self.agents().find(|a| a.is_escalated()).cloned()
    }

    /// Every agent reachable from `start` by following handoffs, including
    /// `start` itself
    pub fn reachable_from(&self, start: &str) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([start.to_string()]);
        while let Some(name) = queue.pop_front() {
            let Some(agent) = self.agents.get(&name) else {
                continue;
            };
            if !seen.insert(name) {
                continue;
            }
            queue.extend(agent.handoffs.iter().cloned());
        }
        seen
    }

    /// Tools advertised to the channel while `agent` is active: its own tools
    /// followed by one generated transfer tool per handoff target
    pub fn session_tools(&self, agent: &Agent) -> Vec<ToolSpec> {
        let mut tools = agent.tools.clone();
        tools.extend(
            agent
                .handoffs
                .iter()
                .filter_map(|target| self.agents.get(target))
                .map(|target| handoff::transfer_tool(target)),
        );
        tools
    }
}

/// Builder for [`AgentRegistry`]
#[derive(Debug, Default)]
pub struct AgentRegistryBuilder {
    agents: Vec<Agent>,
    default_agent: Option<String>,
}

impl AgentRegistryBuilder {
    pub fn agent(mut self, agent: Agent) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn agents(mut self, agents: impl IntoIterator<Item = Agent>) -> Self {
        self.agents.extend(agents);
        self
    }

    /// Set the starting agent (defaults to the first registered)
    pub fn default_agent(mut self, name: impl Into<String>) -> Self {
        self.default_agent = Some(name.into());
        self
    }

    pub fn build(self) -> Result<AgentRegistry, RegistryError> {
        let first = self.agents.first().ok_or(RegistryError::Empty)?.name.clone();

        let mut agents = HashMap::new();
        let mut order = Vec::with_capacity(self.agents.len());
        for agent in &self.agents {
            if agents.contains_key(&agent.name) {
                return Err(RegistryError::DuplicateAgent(agent.name.clone()));
            }
            let mut tool_names = HashSet::new();
            for tool in &agent.tools {
                if tool.name.starts_with(TRANSFER_PREFIX) {
                    return Err(RegistryError::ReservedToolName {
                        agent: agent.name.clone(),
                        tool: tool.name.clone(),
                    });
                }
                if !tool_names.insert(tool.name.as_str()) {
                    return Err(RegistryError::DuplicateTool {
                        agent: agent.name.clone(),
                        tool: tool.name.clone(),
                    });
                }
            }
            order.push(agent.name.clone());
            agents.insert(agent.name.clone(), Arc::new(agent.clone()));
        }

        for agent in &self.agents {
            for target in &agent.handoffs {
                if *target == agent.name {
                    return Err(RegistryError::SelfHandoff(agent.name.clone()));
                }
                if !agents.contains_key(target) {
                    return Err(RegistryError::UnknownHandoff {
                        agent: agent.name.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        let default_name = self.default_agent.unwrap_or(first);
        let default_agent = agents
            .get(&default_name)
            .cloned()
            .ok_or(RegistryError::UnknownDefault(default_name))?;

        debug!(agents = agents.len(), default = %default_agent.name, "Agent registry built");

        Ok(AgentRegistry {
            agents,
            order,
            default_agent,
        })
    }
}
