//! complete_task: mark one or more of the caller's tasks as done.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use taskmate_core::error::ToolError;
use taskmate_core::identity::UserIdentity;
use taskmate_core::task::TaskRepository;
use taskmate_core::tool::Tool;

use crate::parse_args;

#[derive(Debug, Deserialize)]
pub(crate) struct TaskIdsArgs {
    pub task_ids: Vec<i64>,
}

impl TaskIdsArgs {
    pub(crate) fn parse(arguments: serde_json::Value) -> Result<Vec<i64>, ToolError> {
        let args: TaskIdsArgs = parse_args(arguments)?;
        if args.task_ids.is_empty() {
            return Err(ToolError::InvalidArguments("task_ids cannot be empty".into()));
        }
        Ok(args.task_ids)
    }
}

pub(crate) fn task_ids_schema(verb: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "task_ids": {
                "type": "array",
                "items": { "type": "integer" },
                "description": format!("Ids of the tasks to {verb}")
            }
        },
        "required": ["task_ids"]
    })
}

pub struct CompleteTaskTool {
    repo: Arc<dyn TaskRepository>,
}

impl CompleteTaskTool {
    pub fn new(repo: Arc<dyn TaskRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl Tool for CompleteTaskTool {
    fn name(&self) -> &str {
        "complete_task"
    }

    fn description(&self) -> &str {
        "Mark tasks as complete by id. Call list_tasks first if you do not know the ids."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        task_ids_schema("mark as complete")
    }

    async fn execute(
        &self,
        identity: &UserIdentity,
        arguments: serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let ids = TaskIdsArgs::parse(arguments)?;
        let completed = self.repo.complete(identity, &ids).await?;
        if completed.is_empty() {
            return Err(ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("no tasks found with ids {ids:?}"),
            });
        }
        Ok(serde_json::json!({ "completed_ids": completed }))
    }
}
