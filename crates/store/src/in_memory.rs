//! In-memory backend: useful for testing and ephemeral sessions.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use taskmate_core::error::StoreError;
use taskmate_core::identity::UserIdentity;
use taskmate_core::store::ConversationStore;
use taskmate_core::task::{NewTask, Task, TaskFilter, TaskPatch, TaskRepository};
use taskmate_core::turn::{ConversationId, Turn};
use tokio::sync::RwLock;

struct Conversation {
    owner: UserIdentity,
    turns: Vec<Turn>,
}

#[derive(Default)]
struct State {
    conversations: HashMap<ConversationId, Conversation>,
    tasks: Vec<Task>,
    last_task_id: i64,
}

/// Keeps conversations and tasks in process memory. Nothing survives a restart.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_conversation(&self, owner: &UserIdentity) -> Result<ConversationId, StoreError> {
        let id = ConversationId::new();
        self.state.write().await.conversations.insert(
            id.clone(),
            Conversation {
                owner: owner.clone(),
                turns: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn owner_of(&self, id: &ConversationId) -> Result<Option<UserIdentity>, StoreError> {
        let state = self.state.read().await;
        Ok(state.conversations.get(id).map(|c| c.owner.clone()))
    }

    async fn append_turns(&self, id: &ConversationId, turns: &[Turn]) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let conversation = state
            .conversations
            .get_mut(id)
            .ok_or_else(|| StoreError::QueryFailed(format!("unknown conversation {id}")))?;
        conversation.turns.extend_from_slice(turns);
        Ok(())
    }

    async fn load_recent_turns(
        &self,
        id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Turn>, StoreError> {
        let state = self.state.read().await;
        let Some(conversation) = state.conversations.get(id) else {
            return Ok(Vec::new());
        };
        let start = conversation.turns.len().saturating_sub(limit);
        Ok(conversation.turns[start..].to_vec())
    }
}

#[async_trait]
impl TaskRepository for InMemoryStore {
    async fn create(&self, owner: &UserIdentity, task: NewTask) -> Result<Task, StoreError> {
        let mut state = self.state.write().await;
        state.last_task_id += 1;
        let now = Utc::now();
        let task = Task {
            id: state.last_task_id,
            owner: owner.clone(),
            title: task.title,
            description: task.description,
            category: task.category,
            completed: false,
            created_at: now,
            updated_at: now,
        };
        state.tasks.push(task.clone());
        Ok(task)
    }

    async fn list(&self, owner: &UserIdentity, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .tasks
            .iter()
            .filter(|t| &t.owner == owner && filter.matches(t))
            .cloned()
            .collect())
    }

    async fn complete(&self, owner: &UserIdentity, ids: &[i64]) -> Result<Vec<i64>, StoreError> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut matched: Vec<i64> = state
            .tasks
            .iter_mut()
            .filter(|t| &t.owner == owner && ids.contains(&t.id))
            .map(|t| {
                t.completed = true;
                t.updated_at = now;
                t.id
            })
            .collect();
        matched.sort_unstable();
        Ok(matched)
    }

    async fn delete(&self, owner: &UserIdentity, ids: &[i64]) -> Result<Vec<i64>, StoreError> {
        let mut state = self.state.write().await;
        let mut removed = Vec::new();
        state.tasks.retain(|t| {
            let hit = &t.owner == owner && ids.contains(&t.id);
            if hit {
                removed.push(t.id);
            }
            !hit
        });
        removed.sort_unstable();
        Ok(removed)
    }

    async fn update(
        &self,
        owner: &UserIdentity,
        id: i64,
        patch: &TaskPatch,
    ) -> Result<Option<Task>, StoreError> {
        let mut state = self.state.write().await;
        let Some(task) = state
            .tasks
            .iter_mut()
            .find(|t| t.id == id && &t.owner == owner)
        else {
            return Ok(None);
        };
        patch.apply(task);
        Ok(Some(task.clone()))
    }
}
