//! update_task: change fields of an existing task.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use taskmate_core::error::ToolError;
use taskmate_core::identity::UserIdentity;
use taskmate_core::task::{TaskPatch, TaskRepository, TaskStatusFilter};
use taskmate_core::tool::Tool;

use crate::{non_blank, parse_args};

#[derive(Debug, Deserialize)]
struct UpdateTaskArgs {
    task_id: i64,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl UpdateTaskArgs {
    fn patch(&self) -> Result<TaskPatch, ToolError> {
        let completed = non_blank(self.status.clone())
            .map(|s| s.parse::<TaskStatusFilter>())
            .transpose()
            .map_err(ToolError::InvalidArguments)?
            .map(|s| s == TaskStatusFilter::Complete);

        let patch = TaskPatch {
            title: non_blank(self.title.clone()),
            description: self.description.clone(),
            category: non_blank(self.category.clone()),
            completed,
        };
        if patch.is_empty() {
            return Err(ToolError::InvalidArguments(
                "nothing to update: give at least one of title, description, category, status"
                    .into(),
            ));
        }
        Ok(patch)
    }
}

pub struct UpdateTaskTool {
    repo: Arc<dyn TaskRepository>,
}

impl UpdateTaskTool {
    pub fn new(repo: Arc<dyn TaskRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl Tool for UpdateTaskTool {
    fn name(&self) -> &str {
        "update_task"
    }

    fn description(&self) -> &str {
        "Update an existing task's title, description, category or status."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task_id": {
                    "type": "integer",
                    "description": "Id of the task to update"
                },
                "title": { "type": "string", "description": "New title" },
                "description": { "type": "string", "description": "New description" },
                "category": { "type": "string", "description": "New category" },
                "status": {
                    "type": "string",
                    "enum": ["pending", "complete"],
                    "description": "New status"
                }
            },
            "required": ["task_id"]
        })
    }

    async fn execute(
        &self,
        identity: &UserIdentity,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let args: UpdateTaskArgs = parse_args(arguments)?;
        let patch = args.patch()?;

        match self.repo.update(identity, args.task_id, &patch).await? {
            Some(task) => Ok(task.to_json()),
            None => Err(ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("task {} not found", args.task_id),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use taskmate_core::task::NewTask;
    use taskmate_store::InMemoryStore;

    async fn setup() -> (UpdateTaskTool, UserIdentity) {
        let store = Arc::new(InMemoryStore::new());
        let user = UserIdentity::from("alice");
        store
            .create(
                &user,
                NewTask {
                    title: "Milk".into(),
                    ..NewTask::default()
                },
            )
            .await
            .unwrap();
        (UpdateTaskTool::new(store), user)
    }

    #[tokio::test]
    async fn updates_title_and_status() {
        let (tool, user) = setup().await;
        let out = tool
            .execute(&user, json!({"task_id": 1, "title": "Oat milk", "status": "complete"}))
            .await
            .unwrap();
        assert_eq!(out["title"], "Oat milk");
        assert_eq!(out["status"], "complete");
    }

    #[tokio::test]
    async fn unknown_task_is_an_error() {
        let (tool, user) = setup().await;
        let err = tool
            .execute(&user, json!({"task_id": 99, "title": "x"}))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "update_task failed: task 99 not found");
    }

    #[tokio::test]
    async fn empty_patch_is_invalid() {
        let (tool, user) = setup().await;
        let err = tool.execute(&user, json!({"task_id": 1})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
