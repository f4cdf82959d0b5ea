//! Status transitions with fallback state names
//!
//! Trackers are configured in different languages, so the terminal state may
//! be "Done" in one workspace and "已完成" in another. Names are tried in
//! order; only an unknown-state rejection moves on to the next name.

use sdk::{Ticketing, TicketingError};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("no target state names configured")]
    NoStates,

    #[error("none of the states {0:?} exist in the tracker")]
    NoneAccepted(Vec<String>),

    #[error(transparent)]
    Write(#[from] TicketingError),
}

/// Move `issue_id` to the first state in `names` the tracker accepts
///
/// Returns the state name that was written.
pub async fn transition(
    ticketing: &dyn Ticketing,
    issue_id: &str,
    names: &[String],
) -> Result<String, TransitionError> {
    if names.is_empty() {
        return Err(TransitionError::NoStates);
    }

    for name in names {
        match ticketing.update_status(issue_id, name).await {
            Ok(()) => return Ok(name.clone()),
            Err(TicketingError::StateNotFound(_)) => {
                debug!(issue_id, state = %name, "State not found, trying next name");
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(TransitionError::NoneAccepted(names.to_vec()))
}
