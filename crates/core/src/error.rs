//! Error types for the Taskmate domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] wraps them.

use thiserror::Error;

use crate::turn::ConversationId;

/// The top-level error type for all Taskmate operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model gateway errors (fatal for the request) ---
    #[error("Model gateway error: {0}")]
    Gateway(#[from] GatewayError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Storage errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Configuration errors (startup) ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Message cannot be empty")]
    EmptyMessage,

    /// A chat request failed after its turns were saved; the caller can
    /// continue the conversation from `conversation_id`.
    #[error("{source}")]
    Interrupted {
        conversation_id: ConversationId,
        source: Box<Error>,
    },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The conversation an interrupted request was saved under.
    pub fn conversation_id(&self) -> Option<&ConversationId> {
        match self {
            Error::Interrupted { conversation_id, .. } => Some(conversation_id),
            _ => None,
        }
    }

    /// The underlying failure, looking through [`Error::Interrupted`].
    pub fn root(&self) -> &Error {
        match self {
            Error::Interrupted { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failure of the model completion boundary.
///
/// This is the only error class a `ModelGateway` produces.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Gateway not configured: {0}")]
    NotConfigured(String),

    #[error("Model call timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Network error: {0}")]
    Network(String),
}

impl GatewayError {
    /// Whether re-issuing the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::RateLimited { .. } | GatewayError::Timeout { .. } | GatewayError::Network(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool {0}")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{tool_name} failed: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("tool {tool_name} timed out after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },

    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Corrupt stored record: {0}")]
    Serialization(String),
}
