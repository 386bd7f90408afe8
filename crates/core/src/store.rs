//! ConversationStore trait: durable, append-ordered conversation history.
//!
//! The orchestrator reads a bounded window of prior turns before a request
//! and appends the request's new turns afterwards. Implementations live in
//! `taskmate-store` (in-memory and SQLite).

use async_trait::async_trait;

use crate::error::StoreError;
use crate::identity::UserIdentity;
use crate::turn::{ConversationId, Turn};

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Start a new, empty conversation owned by `owner`.
    async fn create_conversation(
        &self,
        owner: &UserIdentity,
    ) -> std::result::Result<ConversationId, StoreError>;

    /// The owner of a conversation, or `None` if it does not exist.
    async fn owner_of(
        &self,
        id: &ConversationId,
    ) -> std::result::Result<Option<UserIdentity>, StoreError>;

    /// Append turns in order after everything already stored.
    async fn append_turns(
        &self,
        id: &ConversationId,
        turns: &[Turn],
    ) -> std::result::Result<(), StoreError>;

    /// The most recent `limit` turns, oldest first.
    async fn load_recent_turns(
        &self,
        id: &ConversationId,
        limit: usize,
    ) -> std::result::Result<Vec<Turn>, StoreError>;
}
