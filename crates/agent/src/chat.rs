//! ChatService: one user message in, one reply out, history persisted.
//!
//! Ties the conversation store, the context builder and the agent loop
//! together. This is what the HTTP gateway and the CLI call.

use std::sync::Arc;

use serde::Serialize;
use taskmate_core::error::Error;
use taskmate_core::identity::UserIdentity;
use taskmate_core::store::ConversationStore;
use taskmate_core::tool::ToolSpec;
use taskmate_core::turn::{ConversationId, Turn};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::ContextBuilder;
use crate::loop_runner::{AgentLoop, AgentStatus};

const DEFAULT_HISTORY_LOAD_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub conversation_id: ConversationId,
    pub text: String,
    pub status: AgentStatus,
    pub iterations: u32,
}

pub struct ChatService {
    agent: AgentLoop,
    context_builder: ContextBuilder,
    store: Arc<dyn ConversationStore>,
    history_load_limit: usize,
}

impl ChatService {
    pub fn new(
        agent: AgentLoop,
        context_builder: ContextBuilder,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            agent,
            context_builder,
            store,
            history_load_limit: DEFAULT_HISTORY_LOAD_LIMIT,
        }
    }

    /// How many stored turns to load before windowing.
    pub fn with_history_load_limit(mut self, limit: usize) -> Self {
        self.history_load_limit = limit;
        self
    }

    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.agent.registry().specs()
    }

    pub async fn send(
        &self,
        identity: &UserIdentity,
        conversation_id: Option<&ConversationId>,
        text: &str,
    ) -> Result<ChatReply, Error> {
        self.send_until_cancelled(identity, conversation_id, text, &CancellationToken::new())
            .await
    }

    /// Handle one message. Without a conversation id a new conversation is
    /// started for `identity`.
    pub async fn send_until_cancelled(
        &self,
        identity: &UserIdentity,
        conversation_id: Option<&ConversationId>,
        text: &str,
        cancel: &CancellationToken,
    ) -> Result<ChatReply, Error> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyMessage);
        }

        let conversation_id = match conversation_id {
            Some(id) => {
                self.authorize(identity, id).await?;
                id.clone()
            }
            None => self.store.create_conversation(identity).await?,
        };

        let history = self
            .store
            .load_recent_turns(&conversation_id, self.history_load_limit)
            .await?;
        let mut context = self.context_builder.build(&history, text);

        let result = self
            .agent
            .run_until_cancelled(&mut context, identity, cancel)
            .await;

        match result {
            Ok(outcome) => {
                self.store
                    .append_turns(&conversation_id, context.new_turns())
                    .await?;
                info!(
                    conversation_id = %conversation_id,
                    status = ?outcome.status,
                    new_turns = context.new_turns().len(),
                    "Conversation updated"
                );
                Ok(ChatReply {
                    conversation_id,
                    text: outcome.text,
                    status: outcome.status,
                    iterations: outcome.iterations,
                })
            }
            Err(e @ (Error::Gateway(_) | Error::Cancelled)) => {
                // keep what happened so far; the next request continues from it
                if let Err(store_err) = self
                    .store
                    .append_turns(&conversation_id, context.new_turns())
                    .await
                {
                    warn!(conversation_id = %conversation_id, error = %store_err, "Failed to persist partial turns");
                }
                Err(Error::Interrupted {
                    conversation_id,
                    source: Box::new(e),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Recent turns of a conversation the caller owns, oldest first.
    pub async fn history(
        &self,
        identity: &UserIdentity,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Turn>, Error> {
        self.authorize(identity, conversation_id).await?;
        Ok(self.store.load_recent_turns(conversation_id, limit).await?)
    }

    /// Someone else's conversation looks exactly like a missing one.
    async fn authorize(&self, identity: &UserIdentity, id: &ConversationId) -> Result<(), Error> {
        match self.store.owner_of(id).await? {
            Some(owner) if &owner == identity => Ok(()),
            _ => Err(Error::ConversationNotFound(id.to_string())),
        }
    }
}
