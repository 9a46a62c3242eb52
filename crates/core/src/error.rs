//! Error types for the parley domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each component has its own error enum; all of them roll up into [`Error`].

use serde::Serialize;
use thiserror::Error;

/// The top-level error type for all parley operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Command errors ---
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    // --- Capability errors ---
    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    // --- Action errors ---
    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Component errors ---

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Durable store unavailable: {0}")]
    Unavailable(String),
}

/// Raised by a prefix-command handler.
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Failed(String),
}

/// Raised by the external capability registry.
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    #[error("Capability not available: {0}")]
    NotAvailable(String),

    #[error("Capability {name} failed: {reason}")]
    InvocationFailed { name: String, reason: String },
}

/// Typed failures of the action executor.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Capability '{capability}' required by {action_id} is not available")]
    UnavailableCapability { action_id: String, capability: String },

    #[error("Action {action_id} failed: {reason}")]
    ExecutionFailed { action_id: String, reason: String },

    #[error("Action {action_id} timed out after {timeout_ms}ms")]
    Timeout { action_id: String, timeout_ms: u64 },
}

impl ActionError {
    /// Stable reason code surfaced to callers.
    pub fn code(&self) -> &'static str {
        match self {
            ActionError::UnknownAction(_) => "unknown_action",
            ActionError::UnavailableCapability { .. } => "unavailable_capability",
            ActionError::ExecutionFailed { .. } | ActionError::Timeout { .. } => {
                "execution_failure"
            }
        }
    }
}

impl From<CapabilityError> for CommandError {
    fn from(err: CapabilityError) -> Self {
        CommandError::Failed(err.to_string())
    }
}

/// Text of a caught panic payload, or `fallback` when the payload is not a
/// string.
pub fn panic_message(payload: &(dyn std::any::Any + Send), fallback: &str) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        fallback.to_string()
    }
}
