//! Orchestration constants and configuration defaults
//!
//! Centralized location for magic numbers and default values

use std::time::Duration;

/// Timeout configurations
pub mod timeouts {
    use super::*;

    /// Default local tool execution timeout
    pub const TOOL_EXECUTION: Duration = Duration::from_secs(30);
    /// Deadline for a whole supervisor exchange, including its tool rounds
    pub const ESCALATION: Duration = Duration::from_secs(20);
    /// Deadline for a single guardrail classification
    pub const CLASSIFICATION: Duration = Duration::from_secs(10);
    /// HTTP connect timeout for backend collaborators
    pub const HTTP_CONNECT: Duration = Duration::from_secs(10);
}

/// Escalation limits
pub mod escalation {
    use super::*;

    /// Maximum supervisor rounds (model call + tool resolution) per escalation
    pub const MAX_ROUNDS: usize = 10;

    /// Slack added to the escalation deadline when it bounds the supervisor
    /// tool's execution
    pub const DEADLINE_MARGIN: Duration = Duration::from_secs(1);

    /// Maximum nesting of tool calls inside tool calls
    pub const MAX_TOOL_DEPTH: usize = 4;

    /// Reserved tool name the fast agent calls to escalate
    pub const SUPERVISOR_TOOL: &str = "getNextResponseFromSupervisor";

    /// Parameter carrying the fast agent's context for the supervisor
    pub const SUPERVISOR_CONTEXT_PARAM: &str = "relevantContextFromLastUserMessage";

    /// Returned to the fast agent when the supervisor exchange fails
    pub const APOLOGY: &str =
        "I'm sorry, I'm having trouble looking that up right now. Could you give me a moment and ask again?";
}

/// Handoff conventions
pub mod handoff {
    /// Prefix of generated transfer tools: `transfer_to_<agent>`
    pub const TRANSFER_PREFIX: &str = "transfer_to_";
}

/// Guardrail configuration
pub mod guardrail {
    /// Number of prior messages sent to the classifier as context
    pub const CONTEXT_WINDOW: usize = 3;
    /// Brand the OFF_BRAND category is judged against
    pub const COMPANY_NAME: &str = "newTelco";
}

/// Transcript placeholders
pub mod transcript {
    /// Shown while a user message is still being transcribed
    pub const TRANSCRIBING: &str = "[Transcribing...]";
    /// Stored when a user message finalizes without any text
    pub const INAUDIBLE: &str = "[inaudible]";
}

/// Backend (Responses-compatible HTTP API) defaults
pub mod backend {
    pub const BASE_URL: &str = "https://api.openai.com/v1";
    pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
    pub const SUPERVISOR_MODEL: &str = "gpt-4.1";
    pub const CLASSIFIER_MODEL: &str = "gpt-4o-mini";
}

/// Credential defaults
pub mod credentials {
    /// Environment variable holding the ephemeral session token
    pub const TOKEN_ENV: &str = "SWITCHBOARD_SESSION_TOKEN";
}

/// Configuration paths
pub mod paths {
    /// Config directory name under the platform config dir
    pub const CONFIG_DIR_NAME: &str = "switchboard";
    /// Config file name
    pub const CONFIG_FILE_NAME: &str = "config.toml";
}
