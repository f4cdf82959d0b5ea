//! Foreman Engine Library
//!
//! Routes tracker events to an AI development team. Inbound items are
//! classified, dispatched onto a bounded worker pool and run through
//! capability pipelines whose results are written back to the tracker.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// Run ledger and idempotency claims
pub mod db;

/// LLM provider abstraction layer
pub mod llm;

/// Capability registry backed by LLM personas
pub mod capability;

/// Issue tracker clients
pub mod tracker;

/// Item classification rules
pub mod router;

/// Briefs, plans and the sequential pipeline
pub mod conductor;

/// Decomposition, execution and pipeline workflows
pub mod workflows;

/// Bounded worker pool with idempotent intake
pub mod dispatcher;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
