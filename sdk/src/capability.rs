//! Capability interface
//!
//! A capability is an opaque executor for one task domain. The engine hands it
//! a fully built brief and receives a structured reply. How the work is done
//! (LLM, human, script) is not the engine's concern.

use crate::types::{TaskType, UnknownTaskType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which capability a stage or workflow invokes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    Planning,
    Task(TaskType),
}

impl CapabilityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Task(task) => task.as_str(),
        }
    }
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityKind {
    type Err = UnknownTaskType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "planning" | "plan" | "pm" => Ok(Self::Planning),
            other => other.parse().map(Self::Task),
        }
    }
}

impl From<TaskType> for CapabilityKind {
    fn from(task: TaskType) -> Self {
        Self::Task(task)
    }
}

impl Serialize for CapabilityKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Status reported by a capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Success,
    /// The capability had nothing to do for this request
    NotApplicable,
    Error,
}

/// Structured result of one capability invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityReply {
    pub status: ReplyStatus,
    pub artifact: String,
}

impl CapabilityReply {
    pub fn success(artifact: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Success,
            artifact: artifact.into(),
        }
    }

    pub fn not_applicable(artifact: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::NotApplicable,
            artifact: artifact.into(),
        }
    }

    pub fn error(artifact: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            artifact: artifact.into(),
        }
    }
}

/// Raised when a capability cannot complete an invocation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// Upstream quota exhausted. Retry by re-delivering the event later.
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("capability failed: {0}")]
    Failed(String),
}

impl CapabilityError {
    /// Classify free-form error text, detecting rate-limit markers
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if is_rate_limit_message(&message) {
            Self::RateLimited(message)
        } else {
            Self::Failed(message)
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// True when error text carries a rate-limit marker
pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("rate_limit") || lower.contains("rate limit") || lower.contains("429")
}

/// An executor for one capability kind
#[async_trait]
pub trait Capability: Send + Sync {
    /// The kind this capability serves
    fn kind(&self) -> CapabilityKind;

    /// Run the capability against a brief
    async fn invoke(&self, brief: &str) -> Result<CapabilityReply, CapabilityError>;
}
