//! Built-in agent sets
//!
//! Each scenario is a registry of agents plus the local tool handlers those
//! agents rely on. Tools an agent declares without a handler here are
//! resolved by the remote side of the channel.

mod chat_supervisor;
mod customer_service;
mod simple_handoff;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::agent::{AgentRegistry, RegistryError};
use crate::tools::ToolRegistry;

/// Unrecognized scenario name
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown scenario '{0}' (expected one of: simple_handoff, customer_service_retail, chat_supervisor)")]
pub struct UnknownScenario(pub String);

/// A built-in agent set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scenario {
    /// Greeter that hands off to a haiku writer
    SimpleHandoff,
    /// Authentication, returns and sales agents with a simulated human
    CustomerServiceRetail,
    /// Fast chat agent escalating to a supervisor
    #[default]
    ChatSupervisor,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [
        Scenario::SimpleHandoff,
        Scenario::CustomerServiceRetail,
        Scenario::ChatSupervisor,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::SimpleHandoff => "simple_handoff",
            Scenario::CustomerServiceRetail => "customer_service_retail",
            Scenario::ChatSupervisor => "chat_supervisor",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Scenario::SimpleHandoff => "Greeter that transfers to a haiku writer",
            Scenario::CustomerServiceRetail => {
                "Snowboard retailer: authentication, returns, sales and a human agent"
            }
            Scenario::ChatSupervisor => "Realtime chat agent backed by a text supervisor",
        }
    }

    /// Agent registry using the scenario's own root agent
    pub fn registry(&self) -> Result<AgentRegistry, RegistryError> {
        self.build_registry(None)
    }

    /// Agent registry, optionally starting from a different agent
    pub fn build_registry(&self, default_agent: Option<&str>) -> Result<AgentRegistry, RegistryError> {
        let (agents, root) = match self {
            Scenario::SimpleHandoff => simple_handoff::agents(),
            Scenario::CustomerServiceRetail => customer_service::agents(),
            Scenario::ChatSupervisor => chat_supervisor::agents(),
        };
        AgentRegistry::builder()
            .agents(agents)
            .default_agent(default_agent.unwrap_or(root))
            .build()
    }

    /// Local tool handlers. The supervisor tool is not included: it needs a
    /// model and is registered by the session builder.
    pub fn tools(&self) -> ToolRegistry {
        match self {
            Scenario::SimpleHandoff => ToolRegistry::new(),
            Scenario::CustomerServiceRetail => customer_service::tools(),
            Scenario::ChatSupervisor => chat_supervisor::tools(),
        }
    }

    /// Whether any agent escalates through the supervisor tool
    pub fn needs_supervisor(&self) -> bool {
        matches!(self, Scenario::ChatSupervisor)
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = UnknownScenario;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "simple_handoff" | "simpleHandoff" => Ok(Scenario::SimpleHandoff),
            "customer_service_retail" | "customerServiceRetail" => {
                Ok(Scenario::CustomerServiceRetail)
            }
            "chat_supervisor" | "chatSupervisor" => Ok(Scenario::ChatSupervisor),
            other => Err(UnknownScenario(other.to_string())),
        }
    }
}
