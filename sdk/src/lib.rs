//! Foreman SDK
//!
//! Shared library providing the domain types, collaborator traits and errors
//! used by the engine and by the webhook transport.

/// Error types and handling
pub mod errors;

/// Tracked items, task types and routing decisions
pub mod types;

/// Capability interface consumed by the pipeline
pub mod capability;

/// Ticketing collaborator interface
pub mod ticketing;

/// Workflow and pipeline outcomes
pub mod outcome;

/// Inbound webhook payload parsing
pub mod event;

/// Dispatch handle used by the transport layer
pub mod dispatch;

// Re-export commonly used types
pub use capability::{Capability, CapabilityError, CapabilityKind, CapabilityReply, ReplyStatus};
pub use dispatch::{DispatchHandle, DispatchRequest, DispatchStatus, TriggerRequest};
pub use errors::{EngineError, ForemanErrorExt};
pub use event::{InboundEvent, IssueAction, PayloadError};
pub use outcome::{FailureKind, Outcome, OutcomeStatus, StageResult, StageStatus};
pub use ticketing::{NewIssue, Ticketing, TicketingError};
pub use types::{Decision, ItemSource, TaskType, TrackedItem};
