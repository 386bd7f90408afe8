//! delete_task: remove tasks from the caller's list.

use async_trait::async_trait;
use std::sync::Arc;
use taskmate_core::error::ToolError;
use taskmate_core::identity::UserIdentity;
use taskmate_core::task::TaskRepository;
use taskmate_core::tool::Tool;
use tracing::info;

use crate::complete_task::{TaskIdsArgs, task_ids_schema};

pub struct DeleteTaskTool {
    repo: Arc<dyn TaskRepository>,
}

impl DeleteTaskTool {
    pub fn new(repo: Arc<dyn TaskRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl Tool for DeleteTaskTool {
    fn name(&self) -> &str {
        "delete_task"
    }

    fn description(&self) -> &str {
        "Permanently delete tasks by id. Only use this when the user clearly asks to remove tasks."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        task_ids_schema("delete")
    }

    async fn execute(
        &self,
        identity: &UserIdentity,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let ids = TaskIdsArgs::parse(arguments)?;
        let deleted = self.repo.delete(identity, &ids).await?;
        if deleted.is_empty() {
            return Err(ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("no tasks found with ids {ids:?}"),
            });
        }
        info!(user = %identity, ?deleted, "Tasks deleted");
        Ok(serde_json::json!({ "deleted_ids": deleted }))
    }
}
