//! Task domain types and the TaskRepository trait.
//!
//! Every repository operation is scoped by owner: a user can only ever see
//! or mutate their own tasks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::identity::UserIdentity;

/// A single to-do item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub owner: UserIdentity,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// The shape the model sees. The owner is deliberately left out.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "title": self.title,
            "description": self.description,
            "status": if self.completed { "complete" } else { "pending" },
            "category": self.category,
            "created_at": self.created_at.to_rfc3339(),
            "updated_at": self.updated_at.to_rfc3339(),
        })
    }
}

/// Fields for creating a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Completion state used to filter listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatusFilter {
    Complete,
    #[serde(alias = "pending")]
    Incomplete,
}

impl TaskStatusFilter {
    pub fn matches(self, task: &Task) -> bool {
        match self {
            TaskStatusFilter::Complete => task.completed,
            TaskStatusFilter::Incomplete => !task.completed,
        }
    }
}

impl std::str::FromStr for TaskStatusFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "complete" | "completed" | "done" => Ok(TaskStatusFilter::Complete),
            "incomplete" | "pending" | "open" => Ok(TaskStatusFilter::Incomplete),
            other => Err(format!("unknown task status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskFilter {
    pub category: Option<String>,
    pub status: Option<TaskStatusFilter>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        let category_ok = self
            .category
            .as_ref()
            .is_none_or(|c| task.category.as_deref() == Some(c.as_str()));
        let status_ok = self.status.is_none_or(|s| s.matches(task));
        category_ok && status_ok
    }
}

/// Partial update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.completed.is_none()
    }

    /// Apply to a task in place, bumping `updated_at` when anything changed.
    pub fn apply(&self, task: &mut Task) {
        if self.is_empty() {
            return;
        }
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = Some(description.clone());
        }
        if let Some(category) = &self.category {
            task.category = Some(category.clone());
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        task.updated_at = Utc::now();
    }
}

/// Owner-scoped task persistence.
///
/// Implementations: in-memory (tests, ephemeral sessions) and SQLite.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, owner: &UserIdentity, task: NewTask) -> Result<Task, StoreError>;

    async fn list(&self, owner: &UserIdentity, filter: &TaskFilter) -> Result<Vec<Task>, StoreError>;

    /// Mark tasks complete; returns the ids that matched, in ascending order.
    async fn complete(&self, owner: &UserIdentity, ids: &[i64]) -> Result<Vec<i64>, StoreError>;

    /// Delete tasks; returns the ids that matched, in ascending order.
    async fn delete(&self, owner: &UserIdentity, ids: &[i64]) -> Result<Vec<i64>, StoreError>;

    async fn update(
        &self,
        owner: &UserIdentity,
        id: i64,
        patch: &TaskPatch,
    ) -> Result<Option<Task>, StoreError>;
}
