//! Ticketing collaborator interface
//!
//! The engine never mutates a tracked item in place. Every write goes through
//! this trait: creating sub-issues and moving an item to another workflow state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A sub-issue to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIssue {
    pub title: String,
    pub description: String,
    pub labels: Vec<String>,
}

impl NewIssue {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            labels: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        if !self.labels.contains(&label) {
            self.labels.push(label);
        }
        self
    }
}

/// Ticketing write failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TicketingError {
    /// The target system has no workflow state with this name
    #[error("workflow state not found: {0}")]
    StateNotFound(String),

    #[error("issue not found: {0}")]
    IssueNotFound(String),

    #[error("tracker rejected credentials")]
    Unauthorized,

    #[error("tracker API error: {0}")]
    Api(String),

    #[error("tracker request failed: {0}")]
    Request(String),

    #[error("tracker not configured: {0}")]
    NotConfigured(String),
}

/// Write access to the external tracker
#[async_trait]
pub trait Ticketing: Send + Sync {
    /// Create an issue and return its human-readable identifier
    async fn create_issue(&self, issue: &NewIssue) -> Result<String, TicketingError>;

    /// Move an issue to the named workflow state
    async fn update_status(&self, issue_id: &str, state_name: &str) -> Result<(), TicketingError>;
}
