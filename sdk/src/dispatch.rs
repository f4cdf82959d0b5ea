//! Dispatch handle
//!
//! The transport layer never runs workflows itself. It parses a request, hands
//! it to a [`DispatchHandle`] and maps the returned [`DispatchStatus`] onto its
//! own response codes.

use crate::types::TrackedItem;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Work submitted to the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchRequest {
    /// Classify the item and run the selected workflow
    Classify(TrackedItem),
    /// Run the full sequential pipeline for the item
    Pipeline(TrackedItem),
}

impl DispatchRequest {
    pub fn item(&self) -> &TrackedItem {
        match self {
            Self::Classify(item) | Self::Pipeline(item) => item,
        }
    }
}

/// Immediate answer to a dispatch request
///
/// Accepted work completes in the background; its result is only visible in
/// the tracker, the logs and the run ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchStatus {
    Accepted { run_id: String, job: String },
    Skipped { reason: String },
    /// Worker queue saturated
    Busy,
    /// Dispatcher shutting down
    Unavailable,
}

/// Body of the manual trigger endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TriggerRequest {
    #[serde(default)]
    pub requirement: String,
    /// Run the full pipeline instead of classifying
    #[serde(default)]
    pub pipeline: bool,
}

impl TriggerRequest {
    /// Convert into a dispatch request; `None` when the requirement is blank
    pub fn into_dispatch(self) -> Option<DispatchRequest> {
        let requirement = self.requirement.trim();
        if requirement.is_empty() {
            return None;
        }
        let item = TrackedItem::manual(requirement);
        Some(if self.pipeline {
            DispatchRequest::Pipeline(item)
        } else {
            DispatchRequest::Classify(item)
        })
    }
}

/// Handle through which the transport submits work
#[async_trait]
pub trait DispatchHandle: Send + Sync {
    async fn dispatch(&self, request: DispatchRequest) -> DispatchStatus;
}
