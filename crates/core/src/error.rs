//! Error types for the Intervet domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Intervet operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Validation errors: rejected before any mutation ---
    #[error("Validation error: {constraint}")]
    Validation { constraint: String },

    // --- Lookup failures: no mutation performed ---
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    // --- Model gateway errors ---
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Storage errors ---
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

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

impl Error {
    /// Construct a validation error naming the violated constraint.
    pub fn validation(constraint: impl Into<String>) -> Self {
        Self::Validation {
            constraint: constraint.into(),
        }
    }

    /// Construct a not-found error for the given entity kind and id.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures talking to the language-model endpoint.
///
/// The caller must not retry automatically — retry policy is an explicit
/// decision left to the caller, which in practice falls back to previously
/// available content instead.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("LM request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed LM response: {0}")]
    MalformedResponse(String),
}

/// Tool-level failures. These are not hard failures for a turn: the
/// dispatcher feeds them back to the model as tool output so it can adapt.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Unsupported tool: {0}")]
    Unsupported(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage error: {0}")]
    Backend(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_error_displays_correctly() {
        let err = Error::Gateway(GatewayError::ApiError {
            status_code: 502,
            message: "upstream unavailable".into(),
        });
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("upstream unavailable"));
    }

    #[test]
    fn validation_error_names_constraint() {
        let err = Error::validation("Points should be within [0, 5]");
        assert!(err.to_string().contains("[0, 5]"));
    }

    #[test]
    fn not_found_error_names_entity() {
        let err = Error::not_found("Session", "abc-123");
        assert_eq!(err.to_string(), "Session not found: abc-123");
    }
}
