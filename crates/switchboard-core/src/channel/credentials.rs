//! Session credential collaborators

use async_trait::async_trait;

/// Verdict on an ephemeral session token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    Valid(String),
    Rejected(String),
}

/// Supplies the token a session connects with
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn token(&self) -> anyhow::Result<TokenStatus>;
}

/// Reads the token from an environment variable
pub struct EnvCredentials {
    var: String,
}

impl EnvCredentials {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentials {
    async fn token(&self) -> anyhow::Result<TokenStatus> {
        Ok(match std::env::var(&self.var) {
            Ok(token) if !token.trim().is_empty() => TokenStatus::Valid(token),
            Ok(_) => TokenStatus::Rejected(format!("{} is empty", self.var)),
            Err(_) => TokenStatus::Rejected(format!("{} is not set", self.var)),
        })
    }
}

/// Fixed verdict, for offline replays and tests
pub struct StaticCredentials(TokenStatus);

impl StaticCredentials {
    pub fn valid(token: impl Into<String>) -> Self {
        Self(TokenStatus::Valid(token.into()))
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self(TokenStatus::Rejected(reason.into()))
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn token(&self) -> anyhow::Result<TokenStatus> {
        Ok(self.0.clone())
    }
}
