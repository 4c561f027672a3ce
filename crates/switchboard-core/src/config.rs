//! Engine configuration
//!
//! Loaded from `<config dir>/switchboard/config.toml`. A missing file yields
//! the defaults; every section and field is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::constants;
use crate::scenarios::Scenario;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Built-in agent set to run
    pub scenario: String,
    /// Override the scenario's root agent
    pub default_agent: Option<String>,
    pub timeouts: TimeoutConfig,
    pub escalation: EscalationConfig,
    pub guardrail: GuardrailConfig,
    pub backend: BackendConfig,
    pub credentials: CredentialsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scenario: Scenario::default().name().to_string(),
            default_agent: None,
            timeouts: TimeoutConfig::default(),
            escalation: EscalationConfig::default(),
            guardrail: GuardrailConfig::default(),
            backend: BackendConfig::default(),
            credentials: CredentialsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub tool_ms: u64,
    pub escalation_ms: u64,
    pub classification_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            tool_ms: constants::timeouts::TOOL_EXECUTION.as_millis() as u64,
            escalation_ms: constants::timeouts::ESCALATION.as_millis() as u64,
            classification_ms: constants::timeouts::CLASSIFICATION.as_millis() as u64,
        }
    }
}

impl TimeoutConfig {
    pub fn tool(&self) -> Duration {
        Duration::from_millis(self.tool_ms)
    }

    pub fn escalation(&self) -> Duration {
        Duration::from_millis(self.escalation_ms)
    }

    pub fn classification(&self) -> Duration {
        Duration::from_millis(self.classification_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub max_rounds: usize,
    /// Spoken when the supervisor cannot answer
    pub apology: String,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            max_rounds: constants::escalation::MAX_ROUNDS,
            apology: constants::escalation::APOLOGY.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    pub context_window: usize,
    pub company_name: String,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            context_window: constants::guardrail::CONTEXT_WINDOW,
            company_name: constants::guardrail::COMPANY_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub supervisor_model: String,
    pub classifier_model: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: constants::backend::BASE_URL.to_string(),
            api_key_env: constants::backend::API_KEY_ENV.to_string(),
            supervisor_model: constants::backend::SUPERVISOR_MODEL.to_string(),
            classifier_model: constants::backend::CLASSIFIER_MODEL.to_string(),
        }
    }
}

impl BackendConfig {
    /// API key from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Environment variable holding the session token
    pub token_env: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            token_env: constants::credentials::TOKEN_ENV.to_string(),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| {
            dir.join(constants::paths::CONFIG_DIR_NAME)
                .join(constants::paths::CONFIG_FILE_NAME)
        })
    }

    /// Load from `path`, or from the default location
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => match Self::default_path() {
                Some(path) => Self::load_from_path(&path),
                None => Ok(Self::default()),
            },
        }
    }

    /// Load from a specific path. A missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.timeouts;
        if t.tool_ms == 0 || t.escalation_ms == 0 || t.classification_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be greater than zero".into()));
        }
        if self.escalation.max_rounds == 0 {
            return Err(ConfigError::Invalid("escalation.max_rounds must be at least 1".into()));
        }
        self.scenario()?;
        Ok(())
    }

    /// The configured built-in scenario
    pub fn scenario(&self) -> Result<Scenario, ConfigError> {
        self.scenario
            .parse()
            .map_err(|e: crate::scenarios::UnknownScenario| ConfigError::Invalid(e.to_string()))
    }
}
