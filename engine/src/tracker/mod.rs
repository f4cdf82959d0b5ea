//! Issue tracker clients
//!
//! Implementations of [`sdk::Ticketing`] for external trackers.

pub mod linear;

pub use linear::LinearClient;

use async_trait::async_trait;
use sdk::{NewIssue, Ticketing, TicketingError};

/// Stand-in used when no tracker credentials are available
///
/// Every write fails with [`TicketingError::NotConfigured`], which the
/// workflows record as a non-fatal warning.
#[derive(Debug, Clone)]
pub struct Unconfigured {
    reason: String,
}

impl Unconfigured {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Ticketing for Unconfigured {
    async fn create_issue(&self, _issue: &NewIssue) -> Result<String, TicketingError> {
        Err(TicketingError::NotConfigured(self.reason.clone()))
    }

    async fn update_status(&self, _issue_id: &str, _state: &str) -> Result<(), TicketingError> {
        Err(TicketingError::NotConfigured(self.reason.clone()))
    }
}
