//! Agent configuration types

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cost/capability class of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityTier {
    /// Realtime, cheap agent that talks to the user
    Fast,
    /// Higher-capability agent consulted through escalation
    Escalated,
}

/// A tool an agent declares to the channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema for parameters
    pub parameters: Value,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A named agent configuration. Immutable once registered.
#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub name: String,
    pub instructions: String,
    /// Ordered tool declarations; names are unique within an agent
    pub tools: Vec<ToolSpec>,
    /// Agents this agent may transfer control to
    pub handoffs: BTreeSet<String>,
    pub tier: Option<CapabilityTier>,
    /// Shown to agents that can transfer to this one
    pub handoff_description: Option<String>,
}

impl Agent {
    pub fn new(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            tools: Vec::new(),
            handoffs: BTreeSet::new(),
            tier: None,
            handoff_description: None,
        }
    }

    pub fn with_tool(mut self, tool: ToolSpec) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = ToolSpec>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn with_handoff(mut self, target: impl Into<String>) -> Self {
        self.handoffs.insert(target.into());
        self
    }

    pub fn with_handoffs<S: Into<String>>(mut self, targets: impl IntoIterator<Item = S>) -> Self {
        self.handoffs.extend(targets.into_iter().map(Into::into));
        self
    }

    pub fn with_tier(mut self, tier: CapabilityTier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_handoff_description(mut self, description: impl Into<String>) -> Self {
        self.handoff_description = Some(description.into());
        self
    }

    /// Look up a declared tool
    pub fn tool(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tool(name).is_some()
    }

    pub fn can_hand_off_to(&self, target: &str) -> bool {
        self.handoffs.contains(target)
    }

    pub fn is_escalated(&self) -> bool {
        self.tier == Some(CapabilityTier::Escalated)
    }
}
