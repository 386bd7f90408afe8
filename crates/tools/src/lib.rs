//! Task-management tools for Taskmate.
//!
//! Each tool wraps one `TaskRepository` operation. The model supplies the
//! arguments; the owner always comes from the identity the dispatcher hands
//! in, never from the arguments.

pub mod add_task;
pub mod complete_task;
pub mod delete_task;
pub mod list_tasks;
pub mod update_task;

use serde::de::DeserializeOwned;
use std::sync::Arc;
use taskmate_core::error::ToolError;
use taskmate_core::task::TaskRepository;
use taskmate_core::tool::ToolRegistry;

pub use add_task::AddTaskTool;
pub use complete_task::CompleteTaskTool;
pub use delete_task::DeleteTaskTool;
pub use list_tasks::ListTasksTool;
pub use update_task::UpdateTaskTool;

/// Create a registry holding all five task tools, backed by `repo`.
pub fn default_registry(repo: Arc<dyn TaskRepository>) -> taskmate_core::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(AddTaskTool::new(repo.clone())))?;
    registry.register(Box::new(ListTasksTool::new(repo.clone())))?;
    registry.register(Box::new(CompleteTaskTool::new(repo.clone())))?;
    registry.register(Box::new(DeleteTaskTool::new(repo.clone())))?;
    registry.register(Box::new(UpdateTaskTool::new(repo)))?;
    Ok(registry)
}

/// Decode model-supplied arguments into a tool's typed argument struct.
pub(crate) fn parse_args<T: DeserializeOwned>(arguments: serde_json::Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Trim a free-text field; blank becomes `None`.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
