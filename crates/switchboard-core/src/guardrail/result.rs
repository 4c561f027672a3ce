//! Guardrail result attached to an assistant message

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Category returned by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModerationCategory {
    None,
    Offensive,
    OffBrand,
    Violence,
}

impl ModerationCategory {
    pub const ALL: [ModerationCategory; 4] = [
        ModerationCategory::None,
        ModerationCategory::Offensive,
        ModerationCategory::OffBrand,
        ModerationCategory::Violence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationCategory::None => "NONE",
            ModerationCategory::Offensive => "OFFENSIVE",
            ModerationCategory::OffBrand => "OFF_BRAND",
            ModerationCategory::Violence => "VIOLENCE",
        }
    }
}

impl fmt::Display for ModerationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModerationCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown moderation category: {}", s))
    }
}

/// Moderation status of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardrailStatus {
    InProgress,
    /// Classification finished without a verdict; never produced by the
    /// pipeline itself, kept for channels that report it
    Done,
    Fail,
    Pass,
}

impl GuardrailStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, GuardrailStatus::InProgress)
    }
}

/// Result of classifying one assistant message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub status: GuardrailStatus,
    /// Category reported by the classifier (absent if it never answered)
    pub category: Option<ModerationCategory>,
    pub rationale: Option<String>,
}

impl GuardrailResult {
    /// A freshly created, unsettled result
    pub fn pending() -> Self {
        Self {
            status: GuardrailStatus::InProgress,
            category: None,
            rationale: None,
        }
    }

    /// Map a classifier category: `None` passes, anything else fails
    pub fn classified(category: ModerationCategory, rationale: Option<String>) -> Self {
        let status = match category {
            ModerationCategory::None => GuardrailStatus::Pass,
            _ => GuardrailStatus::Fail,
        };
        Self {
            status,
            category: Some(category),
            rationale,
        }
    }

    /// Fail-closed result for a classification that could not complete
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: GuardrailStatus::Fail,
            category: None,
            rationale: Some(reason.into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_safe_to_display(&self) -> bool {
        self.status == GuardrailStatus::Pass
    }

    /// Apply a terminal outcome. A result settles exactly once; later
    /// outcomes are ignored and `false` is returned.
    pub fn settle(&mut self, outcome: GuardrailResult) -> bool {
        if self.is_terminal() || !outcome.is_terminal() {
            return false;
        }
        *self = outcome;
        true
    }
}
