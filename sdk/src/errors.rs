//! Error types and handling
//!
//! This module provides the error types used at the crate boundaries of Foreman.
//! All errors implement the `ForemanErrorExt` trait which provides operator-facing
//! hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Error messages never carry secrets (API keys, webhook secrets). Callers that
//! wrap upstream error text are expected to scrub it first.

use thiserror::Error;

/// Trait for Foreman error extensions
///
/// Provides additional context for errors, including operator-facing hints
/// and recoverability information.
pub trait ForemanErrorExt {
    /// Returns a short hint that is safe to show in logs and HTTP responses
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried, usually by re-delivering the event.
    /// Non-recoverable errors need a configuration or deployment change.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Database**: SQLite ledger and claim store failures
/// - **Secrets**: Missing API keys or keychain failures
/// - **Collaborators**: Tracker and capability failures
/// - **Transport**: Malformed payloads and signature failures
/// - **Dispatch**: Queue saturation and shutdown
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ForemanErrorExt};
///
/// let error = EngineError::QueueFull;
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::InvalidSignature;
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Secret errors
    #[error("Secret not configured: {0}")]
    SecretMissing(String),

    #[error("Keyring error: {0}")]
    KeyringError(String),

    // Collaborator errors
    #[error("Tracker error: {0}")]
    Tracker(String),

    #[error("Capability error: {0}")]
    Capability(String),

    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    // Transport errors
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid signature")]
    InvalidSignature,

    // Dispatch errors
    #[error("Dispatch queue is full")]
    QueueFull,

    #[error("Dispatcher is shutting down")]
    DispatcherClosed,

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ForemanErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Database(_) => "Ledger database unavailable. Check the data directory",
            Self::SecretMissing(_) => "Set the secret in the environment or the system keychain",
            Self::KeyringError(_) => "Failed to access secure storage. Check system keychain",
            Self::Tracker(_) => "Tracker request failed. Check the API key and team id",
            Self::Capability(_) => "Capability failed. Re-deliver the event to retry",
            Self::LLMProvider(_) => "LLM provider unavailable. Check your API keys and network",
            Self::InvalidPayload(_) => "Request body is not a supported webhook payload",
            Self::InvalidSignature => "Webhook signature verification failed",
            Self::QueueFull => "Too many events in flight. Retry later",
            Self::DispatcherClosed => "Server is shutting down",
            Self::Network(_) => "Network operation failed. Check your connection",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_)
            | Self::SecretMissing(_)
            | Self::InvalidPayload(_)
            | Self::InvalidSignature
            | Self::DispatcherClosed => false,

            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_not_recoverable() {
        assert!(!EngineError::InvalidSignature.is_recoverable());
        assert!(!EngineError::InvalidPayload("bad json".to_string()).is_recoverable());
    }

    #[test]
    fn test_backpressure_is_recoverable() {
        let err = EngineError::QueueFull;
        assert!(err.is_recoverable());
        assert_eq!(err.user_hint(), "Too many events in flight. Retry later");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: EngineError = io.into();
        assert!(matches!(err, EngineError::Io(_)));
        assert!(err.to_string().contains("missing"));
    }
}
