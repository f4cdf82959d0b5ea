//! Workflow and pipeline outcomes
//!
//! Every workflow converts its failures into an [`Outcome`]. Nothing below the
//! dispatcher is allowed to propagate an error past this point.

use crate::capability::CapabilityKind;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        })
    }
}

/// Why a workflow or stage failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Upstream quota exhausted; retry by re-delivery
    RateLimited,
    Capability,
    /// The planning capability replied with something that is not a task list
    InvalidPlan,
    /// Every tracker write the workflow depended on was rejected
    TrackerWrite,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::Capability => "capability",
            Self::InvalidPlan => "invalid_plan",
            Self::TrackerWrite => "tracker_write",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    NotApplicable,
    Failed,
}

/// Result of one attempted pipeline stage
#[derive(Debug, Clone, Serialize)]
pub struct StageResult {
    pub name: String,
    pub capability: CapabilityKind,
    pub status: StageStatus,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    pub duration_ms: u64,
}

impl StageResult {
    /// Completed or explicitly not applicable
    pub fn is_finished(&self) -> bool {
        matches!(self.status, StageStatus::Completed | StageStatus::NotApplicable)
    }
}

/// Structured result of a workflow run
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub status: OutcomeStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<StageResult>,
    /// Non-fatal collaborator write failures
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Outcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            message: message.into(),
            failure: None,
            stages: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            message: message.into(),
            failure: Some(kind),
            stages: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Skipped,
            message: message.into(),
            failure: None,
            stages: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with_stages(mut self, stages: Vec<StageResult>) -> Self {
        self.stages = stages;
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}
