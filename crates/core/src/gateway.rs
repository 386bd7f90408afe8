//! ModelGateway trait: the boundary to the language-model completion service.
//!
//! A gateway takes the current conversation context plus the registered tool
//! specs and returns exactly one [`ModelResponse`]. It performs a single
//! request/response exchange: retries, timeouts and cancellation are the
//! agent loop's business.
//!
//! Implementations: OpenAI-compatible endpoints (OpenRouter, OpenAI, Ollama).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::tool::{ToolCall, ToolSpec};
use crate::turn::ConversationContext;

/// Substituted when the model returns neither text nor tool calls.
pub const EMPTY_ANSWER_FALLBACK: &str = "Okay, noted!";

/// What the model wants to do next: answer, or call tools. Never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModelResponse {
    FinalAnswer { text: String },
    ToolRequest { calls: Vec<ToolCall> },
}

impl ModelResponse {
    /// Normalize a loosely-typed provider reply into the strict union.
    ///
    /// Any tool call wins over text. With no calls the text is the answer,
    /// and blank text is replaced by [`EMPTY_ANSWER_FALLBACK`].
    pub fn from_parts(text: Option<String>, calls: Vec<ToolCall>) -> Self {
        if !calls.is_empty() {
            return ModelResponse::ToolRequest { calls };
        }
        let text = text.map(|t| t.trim().to_string()).unwrap_or_default();
        if text.is_empty() {
            ModelResponse::FinalAnswer {
                text: EMPTY_ANSWER_FALLBACK.to_string(),
            }
        } else {
            ModelResponse::FinalAnswer { text }
        }
    }

    /// Re-apply the [`from_parts`](Self::from_parts) rules to a response
    /// built by hand: an empty call list becomes an answer, and so does
    /// blank text.
    pub fn normalize(self) -> Self {
        match self {
            ModelResponse::ToolRequest { calls } => Self::from_parts(None, calls),
            ModelResponse::FinalAnswer { text } => Self::from_parts(Some(text), Vec::new()),
        }
    }

    pub fn final_answer(text: impl Into<String>) -> Self {
        ModelResponse::FinalAnswer { text: text.into() }
    }
}

/// The core ModelGateway trait.
///
/// The agent loop calls `complete()` without knowing which provider is
/// behind it.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// A human-readable name for this gateway (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Send the context and tool specs, get the model's next move.
    async fn complete(
        &self,
        context: &ConversationContext,
        tools: &[ToolSpec],
    ) -> std::result::Result<ModelResponse, GatewayError>;
}
