//! Turn and ConversationContext domain types.
//!
//! These are the value objects that flow through a chat request:
//! storage loads prior turns → the context builder selects a window →
//! the agent loop appends new turns → storage persists the new ones.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::{ToolCall, ToolResult};

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The wire role a turn is serialized under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// One entry in a conversation's ordered history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    /// Text typed by the end user.
    User { text: String },

    /// A final answer from the assistant.
    Assistant { text: String },

    /// A batch of tool invocations requested by the assistant.
    ToolRequest { calls: Vec<ToolCall> },

    /// The outcome of one invocation from the preceding batch.
    ToolResult(ToolResult),
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Turn::User { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Turn::Assistant { text: text.into() }
    }

    pub fn role(&self) -> Role {
        match self {
            Turn::User { .. } => Role::User,
            Turn::Assistant { .. } | Turn::ToolRequest { .. } => Role::Assistant,
            Turn::ToolResult(_) => Role::Tool,
        }
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, Turn::ToolResult(_))
    }

    /// Text content for user and assistant turns.
    pub fn text(&self) -> Option<&str> {
        match self {
            Turn::User { text } | Turn::Assistant { text } => Some(text),
            _ => None,
        }
    }
}

/// The bounded prompt for a single chat request.
///
/// Holds the system instruction, the prior turns selected from history, and
/// every turn appended while the request runs. Only the latter are handed
/// back for persistence.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    system_prompt: String,
    turns: Vec<Turn>,
    prior_len: usize,
}

impl ConversationContext {
    /// Create a context from a system instruction and already-selected prior turns.
    pub fn new(system_prompt: impl Into<String>, prior: Vec<Turn>) -> Self {
        let prior_len = prior.len();
        Self {
            system_prompt: system_prompt.into(),
            turns: prior,
            prior_len,
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// All conversational turns, oldest first (system instruction excluded).
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Turns carried over from persisted history.
    pub fn prior_turns(&self) -> &[Turn] {
        &self.turns[..self.prior_len]
    }

    /// Turns produced by the current request.
    pub fn new_turns(&self) -> &[Turn] {
        &self.turns[self.prior_len..]
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
