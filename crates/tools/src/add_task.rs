//! add_task: create a new task for the caller.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use taskmate_core::error::ToolError;
use taskmate_core::identity::UserIdentity;
use taskmate_core::task::{NewTask, TaskRepository};
use taskmate_core::tool::Tool;
use tracing::debug;

use crate::{non_blank, parse_args};

#[derive(Debug, Deserialize)]
struct AddTaskArgs {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

pub struct AddTaskTool {
    repo: Arc<dyn TaskRepository>,
}

impl AddTaskTool {
    pub fn new(repo: Arc<dyn TaskRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl Tool for AddTaskTool {
    fn name(&self) -> &str {
        "add_task"
    }

    fn description(&self) -> &str {
        "Create a new task on the user's to-do list. \
         Use this whenever the user asks to add, remember or schedule something."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": {
                    "type": "string",
                    "description": "Short title of the task"
                },
                "description": {
                    "type": "string",
                    "description": "Optional longer description"
                },
                "category": {
                    "type": "string",
                    "description": "Optional category, e.g. 'work' or 'groceries'"
                }
            },
            "required": ["title"]
        })
    }

    async fn execute(
        &self,
        identity: &UserIdentity,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let args: AddTaskArgs = parse_args(arguments)?;
        let title = args.title.trim();
        if title.is_empty() {
            return Err(ToolError::InvalidArguments("title cannot be empty".into()));
        }

        let task = self
            .repo
            .create(
                identity,
                NewTask {
                    title: title.to_string(),
                    description: non_blank(args.description),
                    category: non_blank(args.category),
                },
            )
            .await?;

        debug!(task_id = task.id, user = %identity, "Task added");
        Ok(task.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskmate_core::task::TaskFilter;
    use taskmate_store::InMemoryStore;

    #[tokio::test]
    async fn adds_task_for_caller() {
        let store = Arc::new(InMemoryStore::new());
        let tool = AddTaskTool::new(store.clone());
        let user = UserIdentity::from("alice");

        let out = tool
            .execute(&user, json!({"title": " Groceries ", "category": "home"}))
            .await
            .unwrap();
        assert_eq!(out["id"], 1);
        assert_eq!(out["title"], "Groceries");
        assert_eq!(out["status"], "pending");

        let tasks = store.list(&user, &TaskFilter::default()).await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].category.as_deref(), Some("home"));
    }

    #[tokio::test]
    async fn blank_title_is_rejected() {
        let tool = AddTaskTool::new(Arc::new(InMemoryStore::new()));
        let err = tool
            .execute(&UserIdentity::from("alice"), json!({"title": "   "}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn missing_title_is_rejected() {
        let tool = AddTaskTool::new(Arc::new(InMemoryStore::new()));
        let err = tool
            .execute(&UserIdentity::from("alice"), json!({"category": "home"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("title"));
    }
}
