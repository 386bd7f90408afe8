//! Prompt assembly: system instruction + bounded history + the new message.

use std::collections::HashSet;

use taskmate_config::AgentConfig;
use taskmate_core::turn::{ConversationContext, Turn};
use tracing::debug;

/// Built-in system instruction.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Taskmate, an assistant that manages the user's to-do list. \
You can add, list, complete, update and delete tasks using the provided tools. \
Whenever the user's request matches one of these operations, call the matching tool \
instead of answering in text. Never guess task ids: list the tasks first if you need them. \
After the tools have run, confirm what was done in one or two short sentences.";

/// Prior turns kept in the window when nothing else is configured.
pub const DEFAULT_MAX_TURNS: usize = 10;

/// Builds the [`ConversationContext`] for one request.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_prompt: String,
    max_turns: usize,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        let builder = Self::new().with_max_turns(config.history_turns);
        match &config.system_prompt {
            Some(prompt) => builder.with_system_prompt(prompt.clone()),
            None => builder,
        }
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Select the most recent prior turns and append the new user turn.
    ///
    /// `history` is oldest first. The window may grow past `max_turns` so a
    /// tool request is never separated from its results.
    pub fn build(&self, history: &[Turn], user_text: &str) -> ConversationContext {
        let start = window_start(history, self.max_turns);
        let prior = well_formed(&history[start..]);
        debug!(
            loaded = history.len(),
            kept = prior.len(),
            max_turns = self.max_turns,
            "Context window selected"
        );

        let mut context = ConversationContext::new(self.system_prompt.clone(), prior);
        context.push(Turn::user(user_text));
        context
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Index of the first kept turn. A cut that lands on a tool result moves
/// back to the tool request that produced it.
fn window_start(history: &[Turn], max_turns: usize) -> usize {
    let mut start = history.len().saturating_sub(max_turns);
    while start > 0 && start < history.len() && history[start].is_tool_result() {
        start -= 1;
    }
    start
}

/// Drop tool results without a request, and tool requests whose results
/// are incomplete. Providers reject either shape.
fn well_formed(window: &[Turn]) -> Vec<Turn> {
    let mut kept = Vec::with_capacity(window.len());
    let mut i = 0;

    while i < window.len() {
        match &window[i] {
            Turn::ToolRequest { calls } => {
                let results = &window[i + 1..];
                let n = results.iter().take_while(|t| t.is_tool_result()).count();
                let answered: HashSet<&str> = results[..n]
                    .iter()
                    .filter_map(|t| match t {
                        Turn::ToolResult(r) => Some(r.call_id.as_str()),
                        _ => None,
                    })
                    .collect();

                if calls.iter().all(|c| answered.contains(c.call_id.as_str())) {
                    kept.extend_from_slice(&window[i..=i + n]);
                } else {
                    debug!(calls = calls.len(), results = n, "Dropping incomplete tool exchange");
                }
                i += n + 1;
            }
            Turn::ToolResult(_) => {
                // orphan: its request fell outside the loaded history
                i += 1;
            }
            turn => {
                kept.push(turn.clone());
                i += 1;
            }
        }
    }

    kept
}
